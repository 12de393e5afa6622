//! Luminance histograms and histogram similarity.
//!
//! A panel's histogram is a 32-bin distribution of 8-bit luminance
//! values (`bin = value / 8`), normalized by pixel count. Two
//! histograms are compared with a blend of the Bhattacharyya
//! coefficient (distribution overlap) and cosine similarity:
//!
//! ```text
//! score = 0.7 * bhattacharyya(h1, h2) + 0.3 * cosine(h1, h2)
//! ```
//!
//! Both terms are symmetric and lie in `[0, 1]` for non-negative
//! inputs, so the blend does too.

use crate::codec::RasterCodec;
use crate::downsample::downsample;
use crate::grayscale::decode_and_grayscale;
use crate::types::{ExtractError, HISTOGRAM_BIN_WIDTH, HISTOGRAM_BINS, Histogram};

/// Longest side, in pixels, of the image the histogram is computed on.
pub const DEFAULT_MAX_SIDE: u32 = 256;

/// Weight of the Bhattacharyya coefficient in [`histogram_similarity`].
pub const BHATTACHARYYA_WEIGHT: f64 = 0.7;

/// Weight of cosine similarity in [`histogram_similarity`].
pub const COSINE_WEIGHT: f64 = 0.3;

/// Decode `bytes` and compute a normalized 32-bin luminance histogram.
///
/// The image is first reduced so its longest side is at most
/// `max_side` pixels.
///
/// # Errors
///
/// Propagates decode errors from the codec. Returns
/// [`ExtractError::EmptyImage`] if the reduced image has no pixels.
pub fn extract_histogram(
    codec: &dyn RasterCodec,
    bytes: &[u8],
    max_side: u32,
) -> Result<Histogram, ExtractError> {
    let (gray, _) = decode_and_grayscale(codec, bytes)?;
    let (reduced, _) = downsample(&gray, max_side);
    histogram_of(&reduced)
}

/// Compute the normalized 32-bin histogram of a grayscale image.
///
/// # Errors
///
/// Returns [`ExtractError::EmptyImage`] for a zero-pixel image.
#[allow(clippy::cast_precision_loss)]
pub fn histogram_of(gray: &image::GrayImage) -> Result<Histogram, ExtractError> {
    let pixel_count = u64::from(gray.width()) * u64::from(gray.height());
    if pixel_count == 0 {
        return Err(ExtractError::EmptyImage);
    }

    let full = imageproc::stats::histogram(gray);
    let mut bins = [0.0_f64; HISTOGRAM_BINS];
    if let Some(channel) = full.channels.first() {
        for (value, &count) in channel.iter().enumerate() {
            bins[value / usize::from(HISTOGRAM_BIN_WIDTH)] += f64::from(count);
        }
    }

    let total = pixel_count as f64;
    for bin in &mut bins {
        *bin /= total;
    }
    Ok(Histogram::from_bins(bins))
}

/// Bhattacharyya coefficient `sum(sqrt(p_i * q_i))`.
///
/// 1.0 for identical normalized distributions, 0.0 for disjoint ones.
#[must_use]
pub fn bhattacharyya(h1: &Histogram, h2: &Histogram) -> f64 {
    h1.bins()
        .iter()
        .zip(h2.bins())
        .map(|(p, q)| (p * q).max(0.0).sqrt())
        .sum()
}

/// Cosine similarity between two histograms treated as vectors.
///
/// Returns 0.0 if either histogram is all zeros.
#[must_use]
pub fn cosine(h1: &Histogram, h2: &Histogram) -> f64 {
    let dot: f64 = h1.bins().iter().zip(h2.bins()).map(|(p, q)| p * q).sum();
    let norm1 = h1.bins().iter().map(|p| p * p).sum::<f64>().sqrt();
    let norm2 = h2.bins().iter().map(|q| q * q).sum::<f64>().sqrt();
    if norm1 <= f64::EPSILON || norm2 <= f64::EPSILON {
        return 0.0;
    }
    dot / (norm1 * norm2)
}

/// Blend of Bhattacharyya and cosine similarity, clamped to `[0, 1]`.
#[must_use]
pub fn histogram_similarity(h1: &Histogram, h2: &Histogram) -> f64 {
    BHATTACHARYYA_WEIGHT
        .mul_add(bhattacharyya(h1, h2), COSINE_WEIGHT * cosine(h1, h2))
        .clamp(0.0, 1.0)
}
