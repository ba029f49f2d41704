//! Similarity Kernel - Rust Acceleration Core
//! 
//! Pairwise structural-similarity scores over a set of grayscale images:
//! - Metrics (Gaussian SSIM, uniform-window SSIM, mean absolute difference)
//! - Row computation with per-row checkpoints (resumable batches)
//! - Matrix assembly and CSV export

pub mod error;
pub mod metric;
pub mod pairwise;
pub mod checkpoint;
pub mod row;
pub mod matrix;
pub mod loader;
pub mod config;

#[cfg(feature = "python")]
mod bindings;

pub use checkpoint::CheckpointStore;
pub use config::MatrixConfig;
pub use error::{Result, SimilarityError};
pub use metric::{GaussianSsim, Image, MeanAbsDiff, Metric, SimilarityMetric, UniformSsim};
pub use pairwise::calculate_similarity;
pub use row::calculate_similarity_row;
