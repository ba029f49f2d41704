//! Batch configuration.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::checkpoint::{CheckpointStore, DEFAULT_CHECKPOINT_DIR};
use crate::error::{Result, SimilarityError};
use crate::metric::Metric;

/// Settings for a similarity-matrix run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatrixConfig {
    /// Where per-row checkpoints live.
    pub checkpoint_dir: PathBuf,
    pub metric: Metric,
    /// Compute rows on the rayon pool.
    pub parallel: bool,
    /// Worker threads; `None` uses the global pool.
    pub threads: Option<usize>,
}

impl Default for MatrixConfig {
    fn default() -> Self {
        Self {
            checkpoint_dir: PathBuf::from(DEFAULT_CHECKPOINT_DIR),
            metric: Metric::default(),
            parallel: true,
            threads: None,
        }
    }
}

impl MatrixConfig {
    /// Read a JSON config file. Missing keys take their defaults.
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&text)
            .map_err(|e| SimilarityError::Config(format!("{}: {e}", path.display())))?;
        config.validate()?;
        Ok(config)
    }

    pub fn with_checkpoint_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.checkpoint_dir = dir.into();
        self
    }

    pub fn with_metric(mut self, metric: Metric) -> Self {
        self.metric = metric;
        self
    }

    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    pub fn with_threads(mut self, threads: Option<usize>) -> Self {
        self.threads = threads;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.threads == Some(0) {
            return Err(SimilarityError::Config("threads must be at least 1".to_string()));
        }
        Ok(())
    }

    pub fn store(&self) -> CheckpointStore {
        CheckpointStore::new(&self.checkpoint_dir)
    }
}
