//! 64-bit DCT perceptual hash.
//!
//! The image is reduced to a 32x32 luminance grid, transformed with a
//! 2D DCT-II, and the top-left 8x8 block of low-frequency coefficients
//! is thresholded against its median (DC term excluded from the
//! median). Similar-looking images produce hashes a small Hamming
//! distance apart.

use std::f64::consts::PI;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::codec::RasterCodec;
use crate::downsample::resize_square;
use crate::grayscale::decode_and_grayscale;
use crate::types::ExtractError;

/// Number of bits in a [`PerceptualHash`].
pub const HASH_BITS: u32 = 64;

const GRID: usize = 32;
const BLOCK: usize = 8;

/// A 64-bit perceptual hash.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PerceptualHash(u64);

impl PerceptualHash {
    /// Wrap raw hash bits.
    #[must_use]
    pub const fn from_bits(bits: u64) -> Self {
        Self(bits)
    }

    /// The raw hash bits.
    #[must_use]
    pub const fn bits(self) -> u64 {
        self.0
    }

    /// Hamming distance to another hash (0 = identical, 64 = inverted).
    #[must_use]
    pub const fn distance(self, other: Self) -> u32 {
        (self.0 ^ other.0).count_ones()
    }

    /// Similarity in `[0, 1]`: `1 - distance / 64`.
    #[must_use]
    pub fn similarity(self, other: Self) -> f64 {
        1.0 - f64::from(self.distance(other)) / f64::from(HASH_BITS)
    }
}

impl fmt::Display for PerceptualHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

/// Decode `bytes` and compute its perceptual hash.
///
/// # Errors
///
/// Propagates decode errors from the codec.
pub fn extract_phash(codec: &dyn RasterCodec, bytes: &[u8]) -> Result<PerceptualHash, ExtractError> {
    let (gray, _) = decode_and_grayscale(codec, bytes)?;
    Ok(phash_of(&gray))
}

/// Perceptual hash of an already-decoded grayscale image.
#[must_use]
pub fn phash_of(gray: &image::GrayImage) -> PerceptualHash {
    #[allow(clippy::cast_possible_truncation)]
    let reduced = resize_square(gray, GRID as u32);
    let pixels: Vec<f64> = reduced.pixels().map(|p| f64::from(p.0[0])).collect();

    let coefficients = low_frequency_dct(&pixels);

    let mut ac: Vec<f64> = coefficients[1..].to_vec();
    ac.sort_by(f64::total_cmp);
    let median = (ac[ac.len() / 2 - 1] + ac[ac.len() / 2]) / 2.0;

    let mut bits = 0_u64;
    for (i, &c) in coefficients.iter().enumerate() {
        if c > median {
            bits |= 1 << i;
        }
    }
    PerceptualHash(bits)
}

/// Top-left `BLOCK x BLOCK` coefficients of the 2D DCT-II of a
/// `GRID x GRID` row-major grid.
#[allow(clippy::cast_precision_loss)]
fn low_frequency_dct(pixels: &[f64]) -> [f64; BLOCK * BLOCK] {
    let n = GRID as f64;
    let cos_table: Vec<[f64; GRID]> = (0..BLOCK)
        .map(|u| {
            std::array::from_fn(|x| (PI * (2.0 * x as f64 + 1.0) * u as f64 / (2.0 * n)).cos())
        })
        .collect();

    let mut out = [0.0_f64; BLOCK * BLOCK];
    for v in 0..BLOCK {
        for u in 0..BLOCK {
            let mut sum = 0.0;
            for y in 0..GRID {
                let row = &pixels[y * GRID..(y + 1) * GRID];
                let cy = cos_table[v][y];
                for (x, &p) in row.iter().enumerate() {
                    sum += p * cos_table[u][x] * cy;
                }
            }
            out[v * BLOCK + u] = sum;
        }
    }
    out
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::codec::RasterCodecKind;
    use crate::testutil::{encode_gray_png, gradient_gray, scene_gray};

    #[test]
    fn identical_images_have_zero_distance() {
        let a = phash_of(&gradient_gray(64, 64));
        let b = phash_of(&gradient_gray(64, 64));
        assert_eq!(a.distance(b), 0);
        assert!((a.similarity(b) - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn resized_copy_stays_close() {
        let a = phash_of(&scene_gray(128, 128));
        let b = phash_of(&scene_gray(256, 256));
        assert!(a.distance(b) <= 10, "distance = {}", a.distance(b));
    }

    #[test]
    fn inverted_image_is_far() {
        let scene = scene_gray(64, 64);
        let inverted = image::GrayImage::from_fn(64, 64, |x, y| {
            image::Luma([255 - scene.get_pixel(x, y).0[0]])
        });
        let d = phash_of(&scene).distance(phash_of(&inverted));
        assert!(d > 48, "distance = {d}");
    }

    #[test]
    fn distance_is_symmetric_and_bounded() {
        let a = PerceptualHash::from_bits(0xF0F0);
        let b = PerceptualHash::from_bits(0x0FF0);
        assert_eq!(a.distance(b), b.distance(a));
        assert_eq!(PerceptualHash::from_bits(0).distance(PerceptualHash::from_bits(u64::MAX)), 64);
    }

    #[test]
    fn display_is_sixteen_hex_digits() {
        assert_eq!(PerceptualHash::from_bits(0xAB).to_string(), "00000000000000ab");
    }

    #[test]
    fn extract_from_png() {
        let png = encode_gray_png(&gradient_gray(40, 40));
        let h = extract_phash(&RasterCodecKind::ImageCrate, &png).unwrap();
        assert_eq!(h, phash_of(&gradient_gray(40, 40)));
    }
}
