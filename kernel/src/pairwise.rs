//! Pairwise scores: 1 on the diagonal, `1 - S(a, b)` elsewhere.

use crate::error::{Result, SimilarityError};
use crate::metric::{Image, SimilarityMetric};

/// Diagonal value. Off-diagonal entries are dissimilarities.
pub const SELF_SCORE: f64 = 1.0;

/// Score between two images: `1 - S(a, b)`.
pub fn pair_score<M: SimilarityMetric + ?Sized>(metric: &M, a: &Image, b: &Image) -> Result<f64> {
    Ok(1.0 - metric.similarity(a, b)?)
}

pub(crate) fn image_at(images: &[Image], index: usize) -> Result<&Image> {
    images
        .get(index)
        .ok_or(SimilarityError::IndexOutOfRange { index, len: images.len() })
}

/// Score for the pair `(i, j)`, returned as `(i, j, score)`.
pub fn calculate_similarity<M: SimilarityMetric + ?Sized>(
    i: usize,
    j: usize,
    images: &[Image],
    metric: &M,
) -> Result<(usize, usize, f64)> {
    if i == j {
        return Ok((i, j, SELF_SCORE));
    }
    let score = pair_score(metric, image_at(images, i)?, image_at(images, j)?)?;
    Ok((i, j, score))
}
