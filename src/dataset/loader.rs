//! Batch iteration over a CIFAR split
//!
//! `CifarLoader` turns an in-memory split into host-side batches. Item
//! preparation (decoding, augmentation, normalization) for a batch runs on a
//! dedicated rayon pool; the caller sees a plain sequential iterator.

use burn::data::dataset::Dataset;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};
use tracing::debug;

use crate::dataset::augmentation::{AugmentationConfig, Augmenter};
use crate::dataset::cifar::{CifarDataset, CifarItem};
use crate::utils::error::{CifarError, Result};

/// A restartable sequence of batches.
///
/// Every call to `batches` starts a fresh pass over the data.
pub trait BatchSource {
    /// Batches per pass
    fn num_batches(&self) -> usize;

    /// Items per pass
    fn num_items(&self) -> usize;

    /// Begin a new pass
    fn batches(&mut self) -> Box<dyn Iterator<Item = Result<Vec<CifarItem>>> + '_>;
}

/// Batches a `CifarDataset`, optionally shuffled and augmented
pub struct CifarLoader {
    dataset: CifarDataset,
    batch_size: usize,
    shuffle: bool,
    augmenter: Option<Augmenter>,
    rng: ChaCha8Rng,
    pool: ThreadPool,
}

impl std::fmt::Debug for CifarLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CifarLoader")
            .field("split", &self.dataset.split())
            .field("items", &self.dataset.len())
            .field("batch_size", &self.batch_size)
            .field("shuffle", &self.shuffle)
            .field("workers", &self.pool.current_num_threads())
            .finish()
    }
}

impl CifarLoader {
    /// Sequential, unaugmented loader with `worker_count` preparation threads
    pub fn new(dataset: CifarDataset, batch_size: usize, worker_count: usize) -> Result<Self> {
        if batch_size == 0 {
            return Err(CifarError::Config("batch_size must be greater than 0".to_string()));
        }
        if worker_count == 0 {
            return Err(CifarError::Config("worker_count must be greater than 0".to_string()));
        }

        let pool = ThreadPoolBuilder::new()
            .num_threads(worker_count)
            .thread_name(|i| format!("cifar-loader-{}", i))
            .build()
            .map_err(|e| CifarError::Dataset(format!("failed to start loader pool: {}", e)))?;

        Ok(Self {
            dataset,
            batch_size,
            shuffle: false,
            augmenter: None,
            rng: ChaCha8Rng::seed_from_u64(0),
            pool,
        })
    }

    /// Reshuffle the item order at the start of every pass
    pub fn with_shuffle(mut self, seed: u64) -> Self {
        self.shuffle = true;
        self.rng = ChaCha8Rng::seed_from_u64(seed);
        self
    }

    /// Augment every item; a config with nothing enabled is ignored
    pub fn with_augmentation(mut self, config: AugmentationConfig) -> Self {
        self.augmenter = config.is_enabled().then(|| Augmenter::new(config));
        self
    }

    pub fn dataset(&self) -> &CifarDataset {
        &self.dataset
    }

    fn prepare(&self, index: usize, seed: u64) -> Result<CifarItem> {
        let image = self
            .dataset
            .get(index)
            .ok_or_else(|| CifarError::Dataset(format!("index {} out of range", index)))?;

        Ok(match &self.augmenter {
            Some(augmenter) => {
                let mut rng = ChaCha8Rng::seed_from_u64(seed);
                let augmented = augmenter.augment(image.to_rgb_image(), &mut rng);
                CifarItem::from_rgb_image(&augmented, image.label)
            }
            None => image.to_item(),
        })
    }
}

impl BatchSource for CifarLoader {
    fn num_batches(&self) -> usize {
        self.dataset.len().div_ceil(self.batch_size)
    }

    fn num_items(&self) -> usize {
        self.dataset.len()
    }

    fn batches(&mut self) -> Box<dyn Iterator<Item = Result<Vec<CifarItem>>> + '_> {
        let mut order: Vec<usize> = (0..self.dataset.len()).collect();
        if self.shuffle {
            order.shuffle(&mut self.rng);
        }
        let pass_seed: u64 = self.rng.gen();
        debug!(
            "Starting {} pass: {} batches",
            self.dataset.split(),
            self.num_batches()
        );

        let this = &*self;
        let batch_size = self.batch_size;
        Box::new((0..this.num_batches()).map(move |b| {
            let start = b * batch_size;
            let end = (start + batch_size).min(order.len());
            this.pool.install(|| {
                order[start..end]
                    .par_iter()
                    .enumerate()
                    .map(|(i, &index)| this.prepare(index, pass_seed.wrapping_add((start + i) as u64)))
                    .collect::<Result<Vec<_>>>()
            })
        }))
    }
}
