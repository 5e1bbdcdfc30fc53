//! Error Handling Module
//!
//! Defines the error type shared by the dataset, training and logging layers.
//! Uses thiserror for ergonomic error definitions.

use std::path::PathBuf;

use thiserror::Error;

/// Main error type for CIFAR training operations
#[derive(Error, Debug)]
pub enum CifarError {
    /// Malformed or missing dataset files
    #[error("Dataset error: {0}")]
    Dataset(String),

    /// Fetching or unpacking the dataset archive failed
    #[error("Download error: {0}")]
    Download(String),

    /// Error with model operations (recording, loading)
    #[error("Model error: {0}")]
    Model(String),

    /// Error raised inside the training loop
    #[error("Training error: {0}")]
    Training(String),

    /// Writing to the metrics sink failed
    #[error("Metrics sink error: {0}")]
    Metrics(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Path not found
    #[error("Path not found: {0}")]
    PathNotFound(PathBuf),
}

impl From<serde_json::Error> for CifarError {
    fn from(err: serde_json::Error) -> Self {
        CifarError::Serialization(err.to_string())
    }
}

/// Convenience Result type for CIFAR training operations
pub type Result<T> = std::result::Result<T, CifarError>;
