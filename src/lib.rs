//! # CIFAR-10 CNN
//!
//! Trains a small convolutional network on CIFAR-10 with the Burn framework
//! and logs training and validation curves per run.
//!
//! ## Modules
//!
//! - `backend`: CPU and accelerator backend selection
//! - `dataset`: CIFAR-10 binary reader, download, augmentation and batching
//! - `model`: the CNN and the run configuration
//! - `training`: trainer, optimizer and run directory naming
//! - `utils`: logging, metrics, the metrics sink and error types
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use cifar_cnn::backend::CpuTrainingBackend;
//! use cifar_cnn::model::RunConfig;
//! use cifar_cnn::training::run_training;
//!
//! let config = RunConfig::default();
//! let outcome = run_training::<CpuTrainingBackend>(&config, Default::default(), false)?;
//! println!("logs in {:?}", outcome.run_dir);
//! ```

pub mod backend;
pub mod dataset;
pub mod model;
pub mod training;
pub mod utils;

// Re-export commonly used items for convenience
pub use dataset::{BatchSource, CifarBatch, CifarBatcher, CifarDataset, CifarItem, CifarLoader};
pub use model::cnn::{CifarCnn, CifarCnnConfig};
pub use model::config::RunConfig;
pub use training::trainer::{Trainer, TrainerMode, TrainingState};
pub use utils::error::{CifarError, Result};
pub use utils::summary::{JsonlSummaryWriter, MemorySink, MetricsSink};
