//! Resolution reduction before metric computation.
//!
//! Generated panels are often several megapixels. Every metric works on
//! a reduced grid instead: histograms on an image whose longest side is
//! at most 256 px, edge maps on a fixed 128x128 grid. This keeps memory
//! bounded no matter what the generator produced.

use image::GrayImage;
use image::imageops::FilterType;

/// Filter used for every reduction. Bilinear is fast and adequate for
/// statistics that are aggregated over the whole image anyway.
pub const REDUCTION_FILTER: FilterType = FilterType::Triangle;

/// Shrink `image` so its longest side is at most `max_dimension`,
/// preserving aspect ratio.
///
/// Returns the (possibly unchanged) image and whether downsampling
/// was actually applied.
#[must_use]
pub fn downsample(image: &GrayImage, max_dimension: u32) -> (GrayImage, bool) {
    let (w, h) = image.dimensions();
    let long_axis = w.max(h);

    if long_axis <= max_dimension || max_dimension == 0 {
        return (image.clone(), false);
    }

    let scale = f64::from(max_dimension) / f64::from(long_axis);
    let new_w = scaled(w, scale);
    let new_h = scaled(h, scale);
    (
        image::imageops::resize(image, new_w, new_h, REDUCTION_FILTER),
        true,
    )
}

/// Resize `image` to exactly `side` x `side`, ignoring aspect ratio.
#[must_use]
pub fn resize_square(image: &GrayImage, side: u32) -> GrayImage {
    if image.width() == side && image.height() == side {
        return image.clone();
    }
    image::imageops::resize(image, side, side, REDUCTION_FILTER)
}

#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
fn scaled(extent: u32, scale: f64) -> u32 {
    ((f64::from(extent) * scale).round() as u32).max(1)
}
