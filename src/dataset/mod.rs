//! Dataset module for loading and batching CIFAR-10
//!
//! This module provides:
//! - Reading the CIFAR-10 binary batch files
//! - Downloading and extracting the archive
//! - Training-time augmentation
//! - Batch iteration and Burn batching

pub mod augmentation;
pub mod cifar;
pub mod download;
pub mod loader;

pub use augmentation::{AugmentationConfig, Augmenter};
pub use cifar::{CifarBatch, CifarBatcher, CifarDataset, CifarItem, CifarSplit, CLASS_NAMES};
pub use download::download_cifar10;
pub use loader::{BatchSource, CifarLoader};
