//! Python Bindings for Similarity Kernel

use pyo3::exceptions::{PyIOError, PyValueError};
use pyo3::prelude::*;

use crate::error::SimilarityError;
use crate::metric::{Image, Metric};
use crate::checkpoint::CheckpointStore;

fn to_py_err(e: SimilarityError) -> PyErr {
    match e {
        SimilarityError::CheckpointRead { .. }
        | SimilarityError::CheckpointWrite { .. }
        | SimilarityError::Io(_) => PyIOError::new_err(e.to_string()),
        _ => PyValueError::new_err(e.to_string()),
    }
}

/// Nested lists (rows of pixels) to 2-D images.
fn to_images(images: Vec<Vec<Vec<f32>>>) -> PyResult<Vec<Image>> {
    images
        .into_iter()
        .enumerate()
        .map(|(idx, rows)| {
            let height = rows.len();
            let width = rows.first().map_or(0, Vec::len);
            if rows.iter().any(|r| r.len() != width) {
                return Err(PyValueError::new_err(format!("image {idx} is ragged")));
            }
            let flat: Vec<f32> = rows.into_iter().flatten().collect();
            Image::from_shape_vec((height, width), flat)
                .map_err(|e| PyValueError::new_err(format!("image {idx}: {e}")))
        })
        .collect()
}

fn parse_metric(s: &str) -> PyResult<Metric> {
    s.parse().map_err(to_py_err)
}

// ============================================================================
// PAIRWISE
// ============================================================================

/// Score for one pair: 1 on the diagonal, 1 - S(a, b) otherwise
#[pyfunction]
#[pyo3(signature = (i, j, images, metric = "ssim"))]
fn calculate_similarity(
    i: usize,
    j: usize,
    images: Vec<Vec<Vec<f32>>>,
    metric: &str,
) -> PyResult<(usize, usize, f64)> {
    let images = to_images(images)?;
    crate::pairwise::calculate_similarity(i, j, &images, &parse_metric(metric)?).map_err(to_py_err)
}

// ============================================================================
// ROWS & MATRIX
// ============================================================================

/// Compute or load row i from the checkpoint directory
#[pyfunction]
#[pyo3(signature = (i, images, checkpoint_dir = "./checkpoints", metric = "ssim"))]
fn calculate_similarity_row(
    py: Python<'_>,
    i: usize,
    images: Vec<Vec<Vec<f32>>>,
    checkpoint_dir: &str,
    metric: &str,
) -> PyResult<(usize, Vec<f64>)> {
    let images = to_images(images)?;
    let metric = parse_metric(metric)?;
    let store = CheckpointStore::new(checkpoint_dir);
    py.allow_threads(|| crate::row::calculate_similarity_row(i, &images, &metric, &store))
        .map_err(to_py_err)
}

/// All rows in parallel, assembled into a symmetric matrix
#[pyfunction]
#[pyo3(signature = (images, checkpoint_dir = "./checkpoints", metric = "ssim"))]
fn similarity_matrix(
    py: Python<'_>,
    images: Vec<Vec<Vec<f32>>>,
    checkpoint_dir: &str,
    metric: &str,
) -> PyResult<Vec<Vec<f64>>> {
    let images = to_images(images)?;
    let metric = parse_metric(metric)?;
    let store = CheckpointStore::new(checkpoint_dir);
    let matrix = py
        .allow_threads(|| {
            let rows = crate::matrix::compute_rows(&images, &metric, &store, true)?;
            crate::matrix::assemble(images.len(), &rows)
        })
        .map_err(to_py_err)?;
    Ok(matrix.rows().into_iter().map(|r| r.to_vec()).collect())
}

// ============================================================================
// MODULE EXPORT
// ============================================================================

#[pymodule]
fn similarity_kernel(_py: Python, m: &PyModule) -> PyResult<()> {
    m.add_function(wrap_pyfunction!(calculate_similarity, m)?)?;
    m.add_function(wrap_pyfunction!(calculate_similarity_row, m)?)?;
    m.add_function(wrap_pyfunction!(similarity_matrix, m)?)?;
    Ok(())
}
