//! Run Configuration Module
//!
//! Every hyperparameter of a training run in one serializable value. The same
//! value builds the model, drives the trainer and names the run directory.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::dataset::augmentation::AugmentationConfig;
use crate::dataset::cifar::CLASS_NAMES;
use crate::model::cnn::CifarCnnConfig;
use crate::utils::error::{CifarError, Result};

/// File name of the saved configuration inside a run directory
pub const CONFIG_FILE: &str = "config.json";

/// Configuration for a single training run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    /// Directory holding (or receiving) `cifar-10-batches-bin`
    pub dataset_root: PathBuf,

    /// Parent directory for run directories
    pub log_dir: PathBuf,

    /// SGD learning rate
    pub learning_rate: f64,

    /// SGD momentum constant
    pub momentum: f64,

    /// Images per batch
    pub batch_size: usize,

    /// Number of passes over the training set
    pub epochs: usize,

    /// Validate every N epochs
    pub val_frequency: usize,

    /// Write training metrics every N steps
    pub log_frequency: usize,

    /// Log a progress line every N steps
    pub print_frequency: usize,

    /// Threads preparing batches
    pub worker_count: usize,

    /// Dropout rate for both classifier layers
    pub dropout: f64,

    /// Number of output classes
    pub class_count: usize,

    /// Training-set augmentation
    pub augmentation: AugmentationConfig,

    /// Seed for shuffling and augmentation
    pub seed: u64,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            dataset_root: PathBuf::from("data/cifar10"),
            log_dir: PathBuf::from("logs"),
            learning_rate: 0.01,
            momentum: 0.9,
            batch_size: 128,
            epochs: 20,
            val_frequency: 2,
            log_frequency: 10,
            print_frequency: 10,
            worker_count: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
            dropout: 0.0,
            class_count: super::DEFAULT_NUM_CLASSES,
            augmentation: AugmentationConfig::default(),
            seed: 42,
        }
    }
}

impl RunConfig {
    /// Reject settings the trainer cannot run with
    pub fn validate(&self) -> Result<()> {
        let positive = [
            ("batch_size", self.batch_size),
            ("val_frequency", self.val_frequency),
            ("log_frequency", self.log_frequency),
            ("print_frequency", self.print_frequency),
            ("worker_count", self.worker_count),
        ];
        for (name, value) in positive {
            if value == 0 {
                return Err(CifarError::Config(format!("{} must be greater than 0", name)));
            }
        }

        // Labels always come from the CIFAR-10 files
        if self.class_count != CLASS_NAMES.len() {
            return Err(CifarError::Config(format!(
                "class_count must be {} for CIFAR-10, got {}",
                CLASS_NAMES.len(),
                self.class_count
            )));
        }

        if !(self.learning_rate > 0.0) {
            return Err(CifarError::Config(format!(
                "learning_rate must be positive, got {}",
                self.learning_rate
            )));
        }

        if !(0.0..1.0).contains(&self.dropout) {
            return Err(CifarError::Config(format!(
                "dropout must be in range [0.0, 1.0), got {}",
                self.dropout
            )));
        }

        if !(0.0..1.0).contains(&self.momentum) {
            return Err(CifarError::Config(format!(
                "momentum must be in range [0.0, 1.0), got {}",
                self.momentum
            )));
        }

        self.augmentation.validate()
    }

    /// Architecture settings for this run
    pub fn model_config(&self) -> CifarCnnConfig {
        CifarCnnConfig::new()
            .with_class_count(self.class_count)
            .with_dropout(self.dropout)
    }

    /// Save configuration to a JSON file
    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Load configuration from a JSON file
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(CifarError::PathNotFound(path.to_path_buf()));
        }
        let json = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&json)?;
        config.validate()?;
        Ok(config)
    }
}
