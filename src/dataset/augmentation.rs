//! Data Augmentation Module for CIFAR-10 Training
//!
//! On-the-fly augmentations applied to training images only. Validation
//! images are never augmented.
//!
//! Order of operations: horizontal flip, brightness jitter, then reflection
//! padding followed by a random crop back to the original size.

use image::{imageops, RgbImage};
use rand::Rng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::utils::error::{CifarError, Result};

/// Configuration for data augmentation
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AugmentationConfig {
    /// Flip horizontally with probability 0.5
    pub horizontal_flip: bool,
    /// Brightness factor is drawn from `[max(0, 1 - b), 1 + b]`
    pub brightness: f32,
    /// Reflection padding in pixels before the random crop (0 = disabled)
    pub reflection: u32,
}

impl AugmentationConfig {
    /// No augmentation
    pub fn none() -> Self {
        Self::default()
    }

    /// Whether any augmentation would change an image
    pub fn is_enabled(&self) -> bool {
        self.horizontal_flip || self.brightness > 0.0 || self.reflection > 0
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.brightness >= 0.0) {
            return Err(CifarError::Config(format!(
                "brightness must be non-negative, got {}",
                self.brightness
            )));
        }
        // Reflection cannot reach past the opposite edge
        if self.reflection as usize >= crate::model::cnn::IMAGE_SIZE {
            return Err(CifarError::Config(format!(
                "reflection padding must be smaller than {}, got {}",
                crate::model::cnn::IMAGE_SIZE,
                self.reflection
            )));
        }
        Ok(())
    }
}

/// Image augmenter
#[derive(Clone, Debug)]
pub struct Augmenter {
    config: AugmentationConfig,
}

impl Augmenter {
    pub fn new(config: AugmentationConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &AugmentationConfig {
        &self.config
    }

    /// Apply the configured augmentations to an image
    ///
    /// # Arguments
    /// * `img` - Input image
    /// * `rng` - Random number generator for reproducibility
    ///
    /// # Returns
    /// * Augmented image with the same dimensions as the input
    pub fn augment(&self, img: RgbImage, rng: &mut ChaCha8Rng) -> RgbImage {
        let mut result = img;

        if self.config.horizontal_flip && rng.gen::<f32>() < 0.5 {
            result = imageops::flip_horizontal(&result);
        }

        if self.config.brightness > 0.0 {
            let b = self.config.brightness;
            let factor = rng.gen_range((1.0 - b).max(0.0)..=1.0 + b);
            result = adjust_brightness(&result, factor);
        }

        if self.config.reflection > 0 {
            let pad = self.config.reflection;
            let padded = reflect_pad(&result, pad);
            let x = rng.gen_range(0..=2 * pad);
            let y = rng.gen_range(0..=2 * pad);
            result = imageops::crop_imm(&padded, x, y, result.width(), result.height()).to_image();
        }

        result
    }
}

/// Scale every channel by `factor`, clamping to the valid range
fn adjust_brightness(img: &RgbImage, factor: f32) -> RgbImage {
    let mut out = img.clone();
    for pixel in out.pixels_mut() {
        for c in pixel.0.iter_mut() {
            *c = (*c as f32 * factor).round().clamp(0.0, 255.0) as u8;
        }
    }
    out
}

/// Mirror index `i` (offset by the padding) back into `0..n` without
/// repeating the edge pixel.
fn reflect_index(i: i64, n: i64) -> u32 {
    let mut i = i;
    if i < 0 {
        i = -i;
    }
    if i >= n {
        i = 2 * (n - 1) - i;
    }
    i as u32
}

/// Pad every side by `pad` pixels, mirroring the border.
pub fn reflect_pad(img: &RgbImage, pad: u32) -> RgbImage {
    let (w, h) = img.dimensions();
    let p = pad as i64;

    RgbImage::from_fn(w + 2 * pad, h + 2 * pad, |x, y| {
        let sx = reflect_index(x as i64 - p, w as i64);
        let sy = reflect_index(y as i64 - p, h as i64);
        *img.get_pixel(sx, sy)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;
    use rand::SeedableRng;

    fn gradient_image() -> RgbImage {
        RgbImage::from_fn(32, 32, |x, y| Rgb([(x * 8) as u8, (y * 8) as u8, 100]))
    }

    #[test]
    fn test_no_augmentation_is_identity() {
        let augmenter = Augmenter::new(AugmentationConfig::none());
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let img = gradient_image();
        assert_eq!(augmenter.augment(img.clone(), &mut rng), img);
        assert!(!augmenter.config().is_enabled());
    }

    #[test]
    fn test_output_keeps_dimensions() {
        let augmenter = Augmenter::new(AugmentationConfig {
            horizontal_flip: true,
            brightness: 0.4,
            reflection: 4,
        });
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        for _ in 0..20 {
            let out = augmenter.augment(gradient_image(), &mut rng);
            assert_eq!(out.dimensions(), (32, 32));
        }
    }

    #[test]
    fn test_flip_happens_sometimes() {
        let augmenter = Augmenter::new(AugmentationConfig {
            horizontal_flip: true,
            ..Default::default()
        });
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let img = gradient_image();
        let flipped = imageops::flip_horizontal(&img);

        let outputs: Vec<_> = (0..64).map(|_| augmenter.augment(img.clone(), &mut rng)).collect();
        assert!(outputs.iter().any(|o| *o == img));
        assert!(outputs.iter().any(|o| *o == flipped));
        assert!(outputs.iter().all(|o| *o == img || *o == flipped));
    }

    #[test]
    fn test_brightness_clamps() {
        let img = RgbImage::from_pixel(2, 2, Rgb([200, 100, 0]));
        let bright = adjust_brightness(&img, 2.0);
        assert_eq!(bright.get_pixel(0, 0).0, [255, 200, 0]);
        let dark = adjust_brightness(&img, 0.0);
        assert_eq!(dark.get_pixel(1, 1).0, [0, 0, 0]);
    }

    #[test]
    fn test_reflect_pad_mirrors_border() {
        let img = RgbImage::from_fn(3, 3, |x, _| Rgb([x as u8, 0, 0]));
        let padded = reflect_pad(&img, 2);
        assert_eq!(padded.dimensions(), (7, 7));

        let row: Vec<u8> = (0..7).map(|x| padded.get_pixel(x, 2).0[0]).collect();
        assert_eq!(row, vec![2, 1, 0, 1, 2, 1, 0]);
    }

    #[test]
    fn test_same_seed_same_output() {
        let augmenter = Augmenter::new(AugmentationConfig {
            horizontal_flip: true,
            brightness: 0.3,
            reflection: 2,
        });
        let a = augmenter.augment(gradient_image(), &mut ChaCha8Rng::seed_from_u64(11));
        let b = augmenter.augment(gradient_image(), &mut ChaCha8Rng::seed_from_u64(11));
        assert_eq!(a, b);
    }

    #[test]
    fn test_validate() {
        assert!(AugmentationConfig::none().validate().is_ok());
        let negative = AugmentationConfig {
            brightness: -0.1,
            ..Default::default()
        };
        assert!(negative.validate().is_err());
        let too_wide = AugmentationConfig {
            reflection: 32,
            ..Default::default()
        };
        assert!(too_wide.validate().is_err());
    }
}
