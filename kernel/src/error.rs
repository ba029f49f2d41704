//! Error types for similarity computation and checkpointing.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for kernel operations.
pub type Result<T> = std::result::Result<T, SimilarityError>;

/// Errors surfaced by the kernel. Nothing is recovered locally.
#[derive(Debug, Error)]
pub enum SimilarityError {
    /// The two images cannot be compared by the metric.
    #[error("Shape mismatch: {left:?} vs {right:?}")]
    ShapeMismatch {
        left: (usize, usize),
        right: (usize, usize),
    },

    /// An image with zero rows or columns.
    #[error("Empty image")]
    EmptyImage,

    /// Image smaller than the comparison window.
    #[error("Image {shape:?} smaller than {min}x{min} window")]
    ImageTooSmall { min: usize, shape: (usize, usize) },

    /// Image index outside the collection.
    #[error("Index {index} out of range for {len} images")]
    IndexOutOfRange { index: usize, len: usize },

    /// Checkpoint file exists but could not be read.
    #[error("Failed to read checkpoint {}: {source}", .path.display())]
    CheckpointRead {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Checkpoint file was read but does not decode.
    #[error("Corrupt checkpoint {}: {reason}", .path.display())]
    CheckpointCorrupt { path: PathBuf, reason: String },

    /// Checkpoint directory or file could not be written.
    #[error("Failed to write checkpoint {}: {source}", .path.display())]
    CheckpointWrite {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// A row handed to matrix assembly has the wrong length.
    #[error("Row {index} has {got} values, expected {expected}")]
    RowLength {
        index: usize,
        expected: usize,
        got: usize,
    },

    /// Image file could not be decoded.
    #[error("Failed to load image {}: {source}", .path.display())]
    ImageLoad {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    /// No usable images were found.
    #[error("No images found in {}", .0.display())]
    NoImages(PathBuf),

    /// Invalid configuration.
    #[error("Invalid config: {0}")]
    Config(String),

    /// Other I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}
