//! Row computation with checkpointing
//!
//! Row `i` holds the scores of image `i` against every image `j >= i`.
//! Entries below `i` stay zero. A checkpoint on disk short-circuits the
//! computation and is returned as-is.

use std::time::Instant;

use tracing::info;

use crate::checkpoint::CheckpointStore;
use crate::error::{Result, SimilarityError};
use crate::metric::{Image, SimilarityMetric};
use crate::pairwise::{pair_score, SELF_SCORE};

/// Compute (or load) row `i`, returned as `(i, row)`.
pub fn calculate_similarity_row<M: SimilarityMetric + ?Sized>(
    i: usize,
    images: &[Image],
    metric: &M,
    store: &CheckpointStore,
) -> Result<(usize, Vec<f64>)> {
    if let Some(row) = store.load(i)? {
        return Ok((i, row));
    }

    let n = images.len();
    if i >= n {
        return Err(SimilarityError::IndexOutOfRange { index: i, len: n });
    }

    let start = Instant::now();
    info!(row = i, "computing row");

    let mut row = vec![0.0; n];
    let anchor = &images[i];
    for j in i..n {
        row[j] = if j == i {
            SELF_SCORE
        } else {
            pair_score(metric, anchor, &images[j])?
        };
    }

    store.save(i, &row)?;
    info!(row = i, elapsed_ms = start.elapsed().as_millis() as u64, "row done");
    Ok((i, row))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use ndarray::Array2;
    use std::fs;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::tempdir;

    /// Images are tagged by their first pixel; pairs of equal tags score 1,
    /// anything else scores 0.4.
    pub(crate) struct TagMetric {
        pub calls: AtomicUsize,
    }

    impl TagMetric {
        pub(crate) fn new() -> Self {
            Self { calls: AtomicUsize::new(0) }
        }
    }

    impl SimilarityMetric for TagMetric {
        fn similarity(&self, a: &Image, b: &Image) -> Result<f64> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if a.dim() != b.dim() {
                return Err(SimilarityError::ShapeMismatch { left: a.dim(), right: b.dim() });
            }
            Ok(if a[[0, 0]] == b[[0, 0]] { 1.0 } else { 0.4 })
        }
    }

    pub(crate) fn tagged(tag: f32) -> Image {
        Array2::from_elem((2, 2), tag)
    }

    fn assert_row(actual: &[f64], expected: &[f64]) {
        assert_eq!(actual.len(), expected.len());
        for (a, e) in actual.iter().zip(expected) {
            assert!((a - e).abs() < 1e-12, "{actual:?} vs {expected:?}");
        }
    }

    #[test]
    fn test_scenario_a_a_b() {
        let dir = tempdir().unwrap();
        let store = CheckpointStore::new(dir.path().join("checkpoints"));
        let images = vec![tagged(1.0), tagged(1.0), tagged(2.0)];
        let metric = TagMetric::new();

        let (i0, r0) = calculate_similarity_row(0, &images, &metric, &store).unwrap();
        let (i1, r1) = calculate_similarity_row(1, &images, &metric, &store).unwrap();
        let (i2, r2) = calculate_similarity_row(2, &images, &metric, &store).unwrap();
        assert_eq!((i0, i1, i2), (0, 1, 2));
        assert_row(&r0, &[1.0, 0.0, 0.6]);
        assert_row(&r1, &[0.0, 1.0, 0.6]);
        assert_row(&r2, &[0.0, 0.0, 1.0]);
    }

    #[test]
    fn test_diagonal_and_asymmetric_fill() {
        let dir = tempdir().unwrap();
        let store = CheckpointStore::new(dir.path());
        let images: Vec<Image> = (0..5).map(|t| tagged(t as f32)).collect();
        let metric = TagMetric::new();

        let rows: Vec<Vec<f64>> = (0..5)
            .map(|i| calculate_similarity_row(i, &images, &metric, &store).unwrap().1)
            .collect();
        for i in 0..5 {
            assert_eq!(rows[i][i], 1.0);
            for j in 0..i {
                assert_eq!(rows[i][j], 0.0);
                assert!((rows[j][i] - 0.6).abs() < 1e-12);
            }
        }
    }

    #[test]
    fn test_second_call_reads_checkpoint() {
        let dir = tempdir().unwrap();
        let store = CheckpointStore::new(dir.path());
        let images = vec![tagged(1.0), tagged(2.0), tagged(3.0)];
        let metric = TagMetric::new();

        let first = calculate_similarity_row(0, &images, &metric, &store).unwrap();
        let calls = metric.calls.load(Ordering::SeqCst);
        assert_eq!(calls, 2);
        let second = calculate_similarity_row(0, &images, &metric, &store).unwrap();
        assert_eq!(first, second);
        assert_eq!(metric.calls.load(Ordering::SeqCst), calls);
    }

    #[test]
    fn test_stale_checkpoint_returned_as_is() {
        let dir = tempdir().unwrap();
        let store = CheckpointStore::new(dir.path());
        let stale = vec![9.0, 8.0, 7.0, 6.0, 5.0];
        store.save(1, &stale).unwrap();

        let images = vec![tagged(1.0), tagged(2.0)];
        let metric = TagMetric::new();
        let (i, row) = calculate_similarity_row(1, &images, &metric, &store).unwrap();
        assert_eq!(i, 1);
        assert_eq!(row, stale);
        assert_eq!(metric.calls.load(Ordering::SeqCst), 0);

        // Checkpoint wins even past the end of the image list
        let (_, row) = calculate_similarity_row(1, &[], &metric, &store).unwrap();
        assert_eq!(row, stale);
    }

    #[test]
    fn test_out_of_range_without_checkpoint() {
        let dir = tempdir().unwrap();
        let store = CheckpointStore::new(dir.path());
        let images = vec![tagged(1.0)];
        let err = calculate_similarity_row(4, &images, &TagMetric::new(), &store).unwrap_err();
        assert!(matches!(err, SimilarityError::IndexOutOfRange { index: 4, len: 1 }));
    }

    #[test]
    fn test_metric_error_leaves_no_checkpoint() {
        let dir = tempdir().unwrap();
        let store = CheckpointStore::new(dir.path());
        let images = vec![tagged(1.0), Array2::from_elem((3, 3), 1.0f32)];
        let err = calculate_similarity_row(0, &images, &TagMetric::new(), &store).unwrap_err();
        assert!(matches!(err, SimilarityError::ShapeMismatch { .. }));
        assert!(!store.path_for(0).exists());
    }

    #[test]
    fn test_unwritable_checkpoint_dir() {
        let dir = tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        fs::write(&blocker, b"x").unwrap();
        let store = CheckpointStore::new(blocker.join("checkpoints"));
        let images = vec![tagged(1.0), tagged(2.0)];
        let metric = TagMetric::new();
        let err = calculate_similarity_row(0, &images, &metric, &store).unwrap_err();
        assert!(matches!(err, SimilarityError::CheckpointWrite { .. }));
        // Row was computed before the write failed
        assert_eq!(metric.calls.load(Ordering::SeqCst), 1);
        assert!(!store.path_for(0).exists());
    }

    #[test]
    fn test_corrupt_checkpoint_not_recomputed() {
        let dir = tempdir().unwrap();
        let store = CheckpointStore::new(dir.path());
        fs::write(store.path_for(0), b"not a row").unwrap();
        let metric = TagMetric::new();
        let err = calculate_similarity_row(0, &[tagged(1.0)], &metric, &store).unwrap_err();
        assert!(matches!(err, SimilarityError::CheckpointCorrupt { .. }));
        assert_eq!(metric.calls.load(Ordering::SeqCst), 0);
    }
}
