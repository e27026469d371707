//! DCT perceptual hashing.
//!
//! [`PerceptualHash`] is a 64-bit fingerprint of an image's low-frequency
//! structure. Two frames that look alike have fingerprints a small Hamming
//! distance apart, regardless of JPEG noise or small brightness shifts.
//!
//! The hash follows the classic pHash recipe: luma, resize to 32×32, 2-D
//! DCT-II, keep the top-left 8×8 coefficients and threshold them at their
//! median.

use std::{fmt, path::Path};

use image::{DynamicImage, GrayImage, imageops::FilterType};
use rustdct::{Dct2, DctPlanner};

use crate::{conversion, error::SceneCardError};

/// Side of the low-frequency block that becomes the hash.
const HASH_SIZE: usize = 8;
/// Side of the downsampled raster fed to the DCT.
const SAMPLE_SIZE: usize = HASH_SIZE * 4;

/// A 64-bit DCT perceptual hash.
///
/// Bit 63 corresponds to the DC coefficient; bits follow the 8×8 block in
/// row-major order. Displays as 16 lowercase hex digits.
///
/// # Example
///
/// ```
/// use scenecard::PerceptualHash;
///
/// let a = PerceptualHash::from_bits(0b1011);
/// let b = PerceptualHash::from_bits(0b0001);
/// assert_eq!(a.distance(b), 2);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PerceptualHash(u64);

impl PerceptualHash {
    /// Wrap raw bits.
    pub fn from_bits(bits: u64) -> Self {
        Self(bits)
    }

    /// The raw bits.
    pub fn bits(self) -> u64 {
        self.0
    }

    /// Hamming distance: the number of differing bits.
    pub fn distance(self, other: PerceptualHash) -> u32 {
        (self.0 ^ other.0).count_ones()
    }

    /// Fingerprint a decoded image.
    pub fn from_image(image: &DynamicImage) -> Self {
        Self::from_luma(&conversion::luma_601(&image.to_rgb8()))
    }

    /// Fingerprint an image file.
    ///
    /// # Errors
    ///
    /// - [`SceneCardError::MissingInput`] if `path` does not exist.
    /// - [`SceneCardError::ImageRead`] if it cannot be decoded.
    pub fn from_path(path: &Path) -> Result<Self, SceneCardError> {
        let image = conversion::open_frame(path)?;
        Ok(Self::from_image(&image))
    }

    /// Fingerprint an 8-bit luma raster.
    pub fn from_luma(gray: &GrayImage) -> Self {
        let small = image::imageops::resize(
            gray,
            SAMPLE_SIZE as u32,
            SAMPLE_SIZE as u32,
            FilterType::Lanczos3,
        );
        let mut coefficients: Vec<f32> = small.pixels().map(|pixel| pixel.0[0] as f32).collect();
        dct_2d(&mut coefficients, SAMPLE_SIZE);

        let mut low_frequency = [0f32; HASH_SIZE * HASH_SIZE];
        for row in 0..HASH_SIZE {
            for column in 0..HASH_SIZE {
                low_frequency[row * HASH_SIZE + column] = coefficients[row * SAMPLE_SIZE + column];
            }
        }

        let median = median(&low_frequency);
        let bits = low_frequency
            .iter()
            .enumerate()
            .filter(|(_, value)| **value > median)
            .fold(0u64, |bits, (index, _)| bits | (1 << (63 - index)));

        Self(bits)
    }
}

impl fmt::Display for PerceptualHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

/// In-place separable 2-D DCT-II of a `size`×`size` row-major raster.
fn dct_2d(values: &mut [f32], size: usize) {
    let mut planner = DctPlanner::new();
    let dct = planner.plan_dct2(size);

    for row in values.chunks_exact_mut(size) {
        dct.process_dct2(row);
    }

    let mut column = vec![0f32; size];
    for x in 0..size {
        for y in 0..size {
            column[y] = values[y * size + x];
        }
        dct.process_dct2(&mut column);
        for y in 0..size {
            values[y * size + x] = column[y];
        }
    }
}

fn median(values: &[f32]) -> f32 {
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let middle = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[middle - 1] + sorted[middle]) / 2.0
    } else {
        sorted[middle]
    }
}

#[cfg(test)]
mod tests {
    use image::Luma;

    use super::*;

    fn blocks(offset: u8) -> GrayImage {
        GrayImage::from_fn(320, 240, |x, y| {
            let (bx, by) = (x / 20, y / 20);
            let value = (bx * 73 + by * 151 + bx * by * 37) % 180 + 20;
            Luma([value as u8 + offset])
        })
    }

    #[test]
    fn hamming_distance_counts_bits() {
        let zero = PerceptualHash::from_bits(0);
        assert_eq!(zero.distance(zero), 0);
        assert_eq!(zero.distance(PerceptualHash::from_bits(0b1111)), 4);
        assert_eq!(zero.distance(PerceptualHash::from_bits(u64::MAX)), 64);
    }

    #[test]
    fn identical_images_hash_identically() {
        let image = blocks(0);
        assert_eq!(PerceptualHash::from_luma(&image), PerceptualHash::from_luma(&image));
    }

    #[test]
    fn brightness_shift_barely_moves_the_hash() {
        let base = PerceptualHash::from_luma(&blocks(0));
        let brighter = PerceptualHash::from_luma(&blocks(4));
        assert!(base.distance(brighter) <= 2, "distance {}", base.distance(brighter));
    }

    #[test]
    fn inverted_image_is_far_away() {
        let image = blocks(0);
        let mut inverted = image.clone();
        image::imageops::invert(&mut inverted);

        let distance = PerceptualHash::from_luma(&image).distance(PerceptualHash::from_luma(&inverted));
        assert!(distance > 32, "distance {distance}");
    }

    #[test]
    fn displays_as_hex() {
        assert_eq!(PerceptualHash::from_bits(0xabc).to_string(), "0000000000000abc");
    }

    #[test]
    fn median_of_even_count_averages_middle_pair() {
        assert_eq!(median(&[4.0, 1.0, 3.0, 2.0]), 2.5);
        assert_eq!(median(&[5.0, 1.0, 3.0]), 3.0);
    }
}
