//! Full matrix from checkpointed rows (O(N²))

use std::io::Write;
use std::sync::atomic::{AtomicUsize, Ordering};

use ndarray::Array2;
use rayon::prelude::*;
use tracing::info;

use crate::checkpoint::CheckpointStore;
use crate::error::{Result, SimilarityError};
use crate::metric::{Image, SimilarityMetric};
use crate::row::calculate_similarity_row;

/// Compute or load every row, in row order.
///
/// Rows are independent and their checkpoint files disjoint, so the parallel
/// path needs no locking. The first error aborts the batch; rows already
/// written stay on disk for the next run.
pub fn compute_rows<M: SimilarityMetric + ?Sized>(
    images: &[Image],
    metric: &M,
    store: &CheckpointStore,
    parallel: bool,
) -> Result<Vec<(usize, Vec<f64>)>> {
    let total = images.len();
    let done = AtomicUsize::new(0);
    let run = |i: usize| -> Result<(usize, Vec<f64>)> {
        let result = calculate_similarity_row(i, images, metric, store)?;
        let finished = done.fetch_add(1, Ordering::Relaxed) + 1;
        info!(
            processed = finished,
            total,
            percent = %format!("{:.2}", 100.0 * finished as f64 / total as f64),
            "rows completed"
        );
        Ok(result)
    };

    if parallel {
        // Indexed collect keeps row order
        (0..total).into_par_iter().map(run).collect()
    } else {
        (0..total).map(run).collect()
    }
}

/// Build the N×N matrix, mirroring each row's `j >= i` entries across the diagonal.
pub fn assemble(n: usize, rows: &[(usize, Vec<f64>)]) -> Result<Array2<f64>> {
    let mut matrix = Array2::<f64>::zeros((n, n));
    for (i, row) in rows {
        let i = *i;
        if i >= n {
            return Err(SimilarityError::IndexOutOfRange { index: i, len: n });
        }
        if row.len() != n {
            return Err(SimilarityError::RowLength { index: i, expected: n, got: row.len() });
        }
        for j in i..n {
            matrix[[i, j]] = row[j];
            matrix[[j, i]] = row[j];
        }
    }
    Ok(matrix)
}

/// One line per row, each value followed by a comma.
pub fn write_csv<W: Write>(matrix: &Array2<f64>, mut out: W) -> Result<()> {
    for row in matrix.rows() {
        let mut line = String::new();
        for v in row {
            line.push_str(&v.to_string());
            line.push(',');
        }
        writeln!(out, "{line}")?;
    }
    out.flush()?;
    Ok(())
}
