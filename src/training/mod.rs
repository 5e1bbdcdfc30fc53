//! Training module for the CIFAR CNN
//!
//! This module provides:
//! - The trainer with its periodic logging and validation schedule
//! - Momentum SGD on top of Burn's optimizer adaptor
//! - Unique run directory naming
//! - A complete run from a `RunConfig`

pub mod optimizer;
pub mod run;
pub mod run_dir;
pub mod trainer;

pub use optimizer::MomentumSgd;
pub use run::{run_training, RunOutcome};
pub use run_dir::{unique_run_dir, RunDirParams};
pub use trainer::{Trainer, TrainerMode, TrainingState, ValidationSummary};
