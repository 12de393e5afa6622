//! Raw pixel-difference ratio and diff visualization.
//!
//! Both images are resized to a shared working size and compared pixel
//! by pixel. A pixel differs when any RGB channel moves by more than
//! the channel tolerance. The ratio of differing pixels is the metric;
//! the same pass can render a diff image for human review.

use image::{DynamicImage, RgbaImage};

use crate::codec::RasterCodec;
use crate::types::{Dimensions, ExtractError};

/// Longest side of the shared working size.
pub const DEFAULT_DIFF_MAX_SIDE: u32 = 512;

/// Default per-channel tolerance (10% of full scale).
pub const DEFAULT_CHANNEL_TOLERANCE: u8 = 26;

/// Amplification applied to differences in the rendered diff image.
const DIFF_AMPLIFICATION: u8 = 3;

/// Result of a pixel-difference pass.
#[derive(Debug, Clone)]
pub struct PixelDiff {
    /// Fraction of pixels that differ, in `[0, 1]`.
    pub ratio: f64,
    /// Number of differing pixels.
    pub differing: u64,
    /// Total pixels compared.
    pub total: u64,
    /// Working size both images were resized to.
    pub dimensions: Dimensions,
}

/// Compare two decoded images at the reference's working size.
///
/// The working size is the reference's dimensions reduced so the
/// longest side is at most `max_side`.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn pixel_diff(
    reference: &DynamicImage,
    candidate: &DynamicImage,
    max_side: u32,
    tolerance: u8,
) -> (PixelDiff, RgbaImage, RgbaImage) {
    let dimensions = working_size(reference, max_side);
    let a = fit(reference, dimensions);
    let b = fit(candidate, dimensions);

    let differing = a
        .pixels()
        .zip(b.pixels())
        .filter(|(p, q)| channel_delta(p.0, q.0) > tolerance)
        .count() as u64;
    let total = u64::from(dimensions.width) * u64::from(dimensions.height);
    let ratio = if total == 0 {
        0.0
    } else {
        differing as f64 / total as f64
    };

    (
        PixelDiff {
            ratio,
            differing,
            total,
            dimensions,
        },
        a,
        b,
    )
}

/// Decode both images and compute their pixel-difference ratio.
///
/// # Errors
///
/// Propagates decode errors from the codec.
pub fn pixel_diff_ratio(
    codec: &dyn RasterCodec,
    reference: &[u8],
    candidate: &[u8],
    max_side: u32,
    tolerance: u8,
) -> Result<f64, ExtractError> {
    let reference = codec.decode(reference)?;
    let candidate = codec.decode(candidate)?;
    Ok(pixel_diff(&reference, &candidate, max_side, tolerance).0.ratio)
}

/// Render a diff visualization of two equally sized images.
///
/// Pixels within tolerance show the darkened reference for context;
/// differing pixels show the amplified per-channel difference.
#[must_use]
pub fn render_diff(reference: &RgbaImage, candidate: &RgbaImage, tolerance: u8) -> RgbaImage {
    RgbaImage::from_fn(reference.width(), reference.height(), |x, y| {
        let a = reference.get_pixel(x, y).0;
        let b = candidate
            .get_pixel_checked(x, y)
            .map_or([0, 0, 0, 255], |p| p.0);
        if channel_delta(a, b) > tolerance {
            image::Rgba([
                a[0].abs_diff(b[0]).saturating_mul(DIFF_AMPLIFICATION),
                a[1].abs_diff(b[1]).saturating_mul(DIFF_AMPLIFICATION),
                a[2].abs_diff(b[2]).saturating_mul(DIFF_AMPLIFICATION),
                255,
            ])
        } else {
            image::Rgba([a[0] / 4, a[1] / 4, a[2] / 4, 255])
        }
    })
}

/// Encode an RGBA image as PNG bytes.
///
/// # Errors
///
/// Returns [`ExtractError::Encode`] if PNG encoding fails.
pub fn encode_png(image: &RgbaImage) -> Result<Vec<u8>, ExtractError> {
    use image::ImageEncoder;

    let mut buf = Vec::new();
    let encoder = image::codecs::png::PngEncoder::new(&mut buf);
    encoder
        .write_image(
            image.as_raw(),
            image.width(),
            image.height(),
            image::ExtendedColorType::Rgba8,
        )
        .map_err(|e| ExtractError::Encode(e.to_string()))?;
    Ok(buf)
}

fn channel_delta(a: [u8; 4], b: [u8; 4]) -> u8 {
    a[0].abs_diff(b[0])
        .max(a[1].abs_diff(b[1]))
        .max(a[2].abs_diff(b[2]))
}

#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
fn working_size(reference: &DynamicImage, max_side: u32) -> Dimensions {
    let (w, h) = (reference.width(), reference.height());
    let long_axis = w.max(h);
    if long_axis <= max_side || max_side == 0 {
        return Dimensions {
            width: w,
            height: h,
        };
    }
    let scale = f64::from(max_side) / f64::from(long_axis);
    Dimensions {
        width: ((f64::from(w) * scale).round() as u32).max(1),
        height: ((f64::from(h) * scale).round() as u32).max(1),
    }
}

fn fit(image: &DynamicImage, dimensions: Dimensions) -> RgbaImage {
    if image.width() == dimensions.width && image.height() == dimensions.height {
        return image.to_rgba8();
    }
    image
        .resize_exact(
            dimensions.width,
            dimensions.height,
            crate::downsample::REDUCTION_FILTER,
        )
        .to_rgba8()
}
