//! Model module for the CIFAR-10 CNN using the Burn framework
//!
//! This module provides:
//! - The fixed-topology CNN as an ordered list of tagged layers
//! - The run configuration that parameterizes model, optimizer and data

pub mod cnn;
pub mod config;

// Re-export main types for convenience
pub use cnn::{CifarCnn, CifarCnnConfig, Layer};
pub use config::RunConfig;

/// Default number of classes for CIFAR-10
pub const DEFAULT_NUM_CLASSES: usize = 10;
