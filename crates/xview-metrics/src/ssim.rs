//! Structural Similarity Index (SSIM).
//!
//! Delegates the windowed luminance/contrast/structure comparison to
//! [`image_compare::gray_similarity_structure`] (MSSIM). Both inputs
//! are first reduced to a common square grid because the kernel
//! requires equal dimensions.

use image::GrayImage;
use image_compare::Algorithm;

use crate::codec::RasterCodec;
use crate::downsample::resize_square;
use crate::grayscale::decode_and_grayscale;
use crate::types::ExtractError;

/// Side of the common grid both images are reduced to.
pub const DEFAULT_SSIM_SIDE: u32 = 256;

/// Errors from the SSIM kernel.
#[derive(Debug, thiserror::Error)]
pub enum SsimError {
    /// One of the inputs could not be decoded.
    #[error(transparent)]
    Extract(#[from] ExtractError),

    /// The kernel rejected the inputs.
    #[error("SSIM computation failed: {0}")]
    Kernel(String),
}

/// SSIM of two grayscale images, clamped to `[0, 1]`.
///
/// SSIM itself ranges over `[-1, 1]`; negative (anti-correlated)
/// structure is treated as no similarity.
///
/// # Errors
///
/// Returns [`SsimError::Kernel`] if the comparison fails.
pub fn ssim_of(a: &GrayImage, b: &GrayImage, side: u32) -> Result<f64, SsimError> {
    let a = resize_square(a, side);
    let b = resize_square(b, side);
    let similarity = image_compare::gray_similarity_structure(&Algorithm::MSSIMSimple, &a, &b)
        .map_err(|e| SsimError::Kernel(format!("{e:?}")))?;
    if similarity.score.is_nan() {
        return Err(SsimError::Kernel("score is NaN".to_string()));
    }
    Ok(similarity.score.clamp(0.0, 1.0))
}

/// Decode both images and compute their SSIM.
///
/// # Errors
///
/// Propagates decode failures and kernel failures.
pub fn ssim_similarity(
    codec: &dyn RasterCodec,
    a: &[u8],
    b: &[u8],
    side: u32,
) -> Result<f64, SsimError> {
    let (a, _) = decode_and_grayscale(codec, a)?;
    let (b, _) = decode_and_grayscale(codec, b)?;
    ssim_of(&a, &b, side)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::codec::RasterCodecKind;
    use crate::testutil::{checkerboard_gray, encode_gray_png, scene_gray};

    #[test]
    fn identical_images_score_one() {
        let img = scene_gray(64, 64);
        let score = ssim_of(&img, &img, 64).unwrap();
        assert!((score - 1.0).abs() < 1e-6, "score = {score}");
    }

    #[test]
    fn unrelated_images_score_lower() {
        let a = scene_gray(64, 64);
        let b = checkerboard_gray(64, 64, 3);
        let score = ssim_of(&a, &b, 64).unwrap();
        assert!(score < 0.5, "score = {score}");
    }

    #[test]
    fn different_sizes_are_reduced_to_common_grid() {
        let a = scene_gray(100, 50);
        let b = scene_gray(300, 150);
        let score = ssim_of(&a, &b, 64).unwrap();
        assert!(score > 0.8, "score = {score}");
    }

    #[test]
    fn unavailable_codec_is_an_extract_error() {
        let png = encode_gray_png(&scene_gray(8, 8));
        let result = ssim_similarity(&RasterCodecKind::Unavailable, &png, &png, 8);
        assert!(matches!(
            result,
            Err(SsimError::Extract(ExtractError::CodecUnavailable))
        ));
    }
}
