//! xview-metrics: Pure image similarity metrics (sans-IO).
//!
//! Derives comparable features from raw image bytes and scores pairs
//! of panels:
//!
//! - luminance histograms compared by Bhattacharyya + cosine,
//! - Sobel edge maps compared by normalized cross-correlation with
//!   aspect-ratio and edge-density penalties,
//! - a 64-bit DCT perceptual hash,
//! - SSIM,
//! - a raw pixel-difference ratio with a rendered diff image.
//!
//! This crate has **no I/O dependencies** -- it operates on in-memory
//! byte slices and returns structured data. Fetching images and writing
//! artifacts lives in `xview-io`.

pub mod cache;
pub mod codec;
pub mod downsample;
pub mod edge;
pub mod grayscale;
pub mod histogram;
pub mod phash;
pub mod pixel_diff;
pub mod ssim;
pub mod types;

pub use cache::BoundedCache;
pub use codec::{RasterCodec, RasterCodecKind};
pub use edge::{StructuralPenalties, StructuralScore};
pub use phash::PerceptualHash;
pub use pixel_diff::PixelDiff;
pub use types::{
    Dimensions, EdgeMap, ExtractError, GrayImage, Histogram, MetricFailure, MetricOutcome,
    RgbaImage,
};

/// Synthetic test images shared by the unit tests.
#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
pub(crate) mod testutil {
    use image::{GrayImage, ImageEncoder};

    /// Left half black, right half white.
    pub fn sharp_edge_gray(w: u32, h: u32) -> GrayImage {
        GrayImage::from_fn(w, h, |x, _| image::Luma([if x < w / 2 { 0 } else { 255 }]))
    }

    /// Horizontal ramp from 0 to 255.
    pub fn gradient_gray(w: u32, h: u32) -> GrayImage {
        GrayImage::from_fn(w, h, |x, _| {
            image::Luma([(f64::from(x) * 255.0 / f64::from(w.max(2) - 1)) as u8])
        })
    }

    /// Alternating black/white squares of `cell` pixels.
    pub fn checkerboard_gray(w: u32, h: u32, cell: u32) -> GrayImage {
        GrayImage::from_fn(w, h, |x, y| {
            image::Luma([if (x / cell + y / cell) % 2 == 0 { 0 } else { 255 }])
        })
    }

    /// Smooth two-axis pattern, resolution independent.
    pub fn scene_gray(w: u32, h: u32) -> GrayImage {
        GrayImage::from_fn(w, h, |x, y| {
            let u = f64::from(x) / f64::from(w);
            let v = f64::from(y) / f64::from(h);
            let value = 128.0
                + 60.0 * (std::f64::consts::TAU * 1.5 * u).sin()
                + 50.0 * (std::f64::consts::TAU * 2.3 * v + 0.7).cos()
                - 15.0 * (std::f64::consts::TAU * (u + v)).sin();
            image::Luma([value.clamp(0.0, 255.0) as u8])
        })
    }

    /// Encode a grayscale image as PNG bytes.
    pub fn encode_gray_png(img: &GrayImage) -> Vec<u8> {
        let mut buf = Vec::new();
        image::codecs::png::PngEncoder::new(&mut buf)
            .write_image(
                img.as_raw(),
                img.width(),
                img.height(),
                image::ExtendedColorType::L8,
            )
            .unwrap();
        buf
    }

    /// Encode an RGBA image as PNG bytes.
    pub fn encode_png(img: &image::RgbaImage) -> Vec<u8> {
        let mut buf = Vec::new();
        image::codecs::png::PngEncoder::new(&mut buf)
            .write_image(
                img.as_raw(),
                img.width(),
                img.height(),
                image::ExtendedColorType::Rgba8,
            )
            .unwrap();
        buf
    }
}
