//! CIFAR-10 binary dataset and Burn integration
//!
//! The binary distribution stores 10000 records per file, each laid out as
//! `[label (1 byte)][red (1024)][green (1024)][blue (1024)]`. Training data is
//! split over `data_batch_1.bin` to `data_batch_5.bin`; test data is in
//! `test_batch.bin`. All files live under `cifar-10-batches-bin/`.

use std::fs;
use std::path::{Path, PathBuf};

use burn::data::dataloader::batcher::Batcher;
use burn::data::dataset::Dataset;
use burn::prelude::*;
use image::{Rgb, RgbImage};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::model::cnn::{IMAGE_SIZE, IN_CHANNELS};
use crate::utils::error::{CifarError, Result};

/// Directory created by extracting the binary archive
pub const BATCHES_DIR: &str = "cifar-10-batches-bin";

/// Pixels per channel
pub const CHANNEL_LEN: usize = IMAGE_SIZE * IMAGE_SIZE;
/// Bytes of pixel data per record
pub const PIXELS_LEN: usize = IN_CHANNELS * CHANNEL_LEN;
/// Bytes per record including the label byte
pub const RECORD_LEN: usize = 1 + PIXELS_LEN;

/// CIFAR-10 class names
pub const CLASS_NAMES: [&str; 10] = [
    "airplane",
    "automobile",
    "bird",
    "cat",
    "deer",
    "dog",
    "frog",
    "horse",
    "ship",
    "truck",
];

/// Which half of the dataset to load
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CifarSplit {
    Train,
    Test,
}

impl CifarSplit {
    /// Batch files making up this split
    pub fn file_names(&self) -> Vec<String> {
        match self {
            CifarSplit::Train => (1..=5).map(|i| format!("data_batch_{}.bin", i)).collect(),
            CifarSplit::Test => vec!["test_batch.bin".to_string()],
        }
    }
}

impl std::fmt::Display for CifarSplit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CifarSplit::Train => write!(f, "train"),
            CifarSplit::Test => write!(f, "test"),
        }
    }
}

/// A raw CIFAR-10 image as stored on disk
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CifarImage {
    /// Planar pixel data, `[R(1024) | G(1024) | B(1024)]`
    pub pixels: Vec<u8>,
    /// Class label (0-9)
    pub label: usize,
}

impl CifarImage {
    /// Interleave the planar channels into an RGB image
    pub fn to_rgb_image(&self) -> RgbImage {
        let size = IMAGE_SIZE as u32;
        RgbImage::from_fn(size, size, |x, y| {
            let i = y as usize * IMAGE_SIZE + x as usize;
            Rgb([
                self.pixels[i],
                self.pixels[CHANNEL_LEN + i],
                self.pixels[2 * CHANNEL_LEN + i],
            ])
        })
    }

    /// Convert to a normalized item without augmentation
    pub fn to_item(&self) -> CifarItem {
        CifarItem {
            image: self.pixels.iter().map(|&p| p as f32 / 255.0).collect(),
            label: self.label,
        }
    }

    pub fn class_name(&self) -> &'static str {
        CLASS_NAMES[self.label]
    }
}

/// A single CIFAR item ready for Burn
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CifarItem {
    /// Image data as flattened CHW float array [3 * 32 * 32], values in [0, 1]
    pub image: Vec<f32>,
    /// Class label
    pub label: usize,
}

impl CifarItem {
    /// Build an item from an interleaved RGB image
    pub fn from_rgb_image(img: &RgbImage, label: usize) -> Self {
        let (width, height) = (img.width() as usize, img.height() as usize);
        let plane = width * height;
        let mut image = vec![0.0f32; 3 * plane];

        // Convert to CHW format and normalize to [0, 1]
        for (x, y, pixel) in img.enumerate_pixels() {
            let i = y as usize * width + x as usize;
            image[i] = pixel[0] as f32 / 255.0;
            image[plane + i] = pixel[1] as f32 / 255.0;
            image[2 * plane + i] = pixel[2] as f32 / 255.0;
        }

        Self { image, label }
    }
}

/// Parse the records of one batch file
pub fn parse_records(bytes: &[u8], source: &Path) -> Result<Vec<CifarImage>> {
    if bytes.is_empty() || bytes.len() % RECORD_LEN != 0 {
        return Err(CifarError::Dataset(format!(
            "{:?} has {} bytes, expected a non-zero multiple of {}",
            source,
            bytes.len(),
            RECORD_LEN
        )));
    }

    bytes
        .chunks_exact(RECORD_LEN)
        .enumerate()
        .map(|(i, record)| {
            let label = record[0] as usize;
            if label >= CLASS_NAMES.len() {
                return Err(CifarError::Dataset(format!(
                    "record {} in {:?} has label {}",
                    i, source, label
                )));
            }
            Ok(CifarImage {
                pixels: record[1..].to_vec(),
                label,
            })
        })
        .collect()
}

/// CIFAR-10 split held in memory, implementing Burn's Dataset trait
#[derive(Clone, Debug)]
pub struct CifarDataset {
    images: Vec<CifarImage>,
    split: CifarSplit,
}

impl CifarDataset {
    /// Load a split from `<root>/cifar-10-batches-bin`
    pub fn load(root: impl AsRef<Path>, split: CifarSplit) -> Result<Self> {
        let dir = batches_dir(root);
        if !dir.exists() {
            return Err(CifarError::PathNotFound(dir));
        }

        let mut images = Vec::new();
        for name in split.file_names() {
            let path = dir.join(&name);
            if !path.exists() {
                return Err(CifarError::PathNotFound(path));
            }
            let bytes = fs::read(&path)?;
            let records = parse_records(&bytes, &path)?;
            debug!("Read {} records from {}", records.len(), name);
            images.extend(records);
        }

        info!("Loaded {} {} images", images.len(), split);
        Ok(Self { images, split })
    }

    pub fn from_images(images: Vec<CifarImage>, split: CifarSplit) -> Self {
        Self { images, split }
    }

    pub fn split(&self) -> CifarSplit {
        self.split
    }

    /// Images per class, indexed by label
    pub fn class_distribution(&self) -> [usize; 10] {
        let mut counts = [0; 10];
        for img in &self.images {
            counts[img.label] += 1;
        }
        counts
    }
}

impl Dataset<CifarImage> for CifarDataset {
    fn get(&self, index: usize) -> Option<CifarImage> {
        self.images.get(index).cloned()
    }

    fn len(&self) -> usize {
        self.images.len()
    }
}

/// Location of the extracted batch files under `root`
pub fn batches_dir(root: impl AsRef<Path>) -> PathBuf {
    root.as_ref().join(BATCHES_DIR)
}

/// A batch of CIFAR images for training
#[derive(Clone, Debug)]
pub struct CifarBatch<B: Backend> {
    /// Batch of images with shape [batch_size, 3, 32, 32]
    pub images: Tensor<B, 4>,
    /// Batch of labels with shape [batch_size]
    pub targets: Tensor<B, 1, Int>,
}

/// Moves host-side items onto a device
#[derive(Clone, Debug, Default)]
pub struct CifarBatcher;

impl<B: Backend> Batcher<B, CifarItem, CifarBatch<B>> for CifarBatcher {
    fn batch(&self, items: Vec<CifarItem>, device: &B::Device) -> CifarBatch<B> {
        let batch_size = items.len();

        let images_data: Vec<f32> = items.iter().flat_map(|item| item.image.iter().copied()).collect();
        let images = Tensor::<B, 4>::from_floats(
            TensorData::new(images_data, [batch_size, IN_CHANNELS, IMAGE_SIZE, IMAGE_SIZE]),
            device,
        );

        let targets_data: Vec<i64> = items.iter().map(|item| item.label as i64).collect();
        let targets =
            Tensor::<B, 1, Int>::from_data(TensorData::new(targets_data, [batch_size]), device);

        CifarBatch { images, targets }
    }
}
