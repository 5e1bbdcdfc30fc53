//! Run directory naming
//!
//! Each run logs into `<log_dir>/<prefix><n>`, where the prefix encodes the
//! hyperparameters and `n` is the first suffix in `0..1000` whose directory
//! does not exist yet. When every suffix is taken, the `999` path is returned
//! anyway and the new run shares that directory.

use std::path::{Path, PathBuf};

use tracing::warn;

use crate::model::config::RunConfig;

/// Number of suffixes probed before giving up
pub const MAX_RUN_SUFFIX: usize = 1000;

/// Hyperparameters encoded in a run directory name
#[derive(Debug, Clone, PartialEq)]
pub struct RunDirParams {
    pub num_params: usize,
    pub batch_size: usize,
    pub dropout: f64,
    pub learning_rate: f64,
    pub momentum: f64,
    pub brightness: f32,
    pub horizontal_flip: bool,
    pub reflection: u32,
}

impl RunDirParams {
    pub fn from_config(config: &RunConfig, num_params: usize) -> Self {
        Self {
            num_params,
            batch_size: config.batch_size,
            dropout: config.dropout,
            learning_rate: config.learning_rate,
            momentum: config.momentum,
            brightness: config.augmentation.brightness,
            horizontal_flip: config.augmentation.horizontal_flip,
            reflection: config.augmentation.reflection,
        }
    }

    /// Directory name without the numeric suffix
    pub fn prefix(&self) -> String {
        let mut prefix = format!(
            "CNN_parameters={}_bn_bs={}_dropout={}_lr={}_momentum={}_brightness={}",
            self.num_params,
            self.batch_size,
            self.dropout,
            self.learning_rate,
            self.momentum,
            self.brightness
        );
        if self.horizontal_flip {
            prefix.push_str("_hflip");
        }
        if self.reflection > 0 {
            prefix.push_str(&format!("_reflect={}", self.reflection));
        }
        prefix.push_str("_run_");
        prefix
    }
}

/// First unused run directory under `log_dir`
///
/// Does not create the directory.
pub fn unique_run_dir(log_dir: &Path, params: &RunDirParams) -> PathBuf {
    let prefix = params.prefix();
    let candidate = |i: usize| log_dir.join(format!("{}{}", prefix, i));

    match (0..MAX_RUN_SUFFIX).map(candidate).find(|path| !path.exists()) {
        Some(path) => path,
        None => {
            let path = candidate(MAX_RUN_SUFFIX - 1);
            warn!("All {} run directories taken, reusing {:?}", MAX_RUN_SUFFIX, path);
            path
        }
    }
}
