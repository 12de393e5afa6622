//! Shared types for the xview metric kernels.

use serde::{Deserialize, Serialize};

/// Re-export `GrayImage` so downstream crates can reference
/// intermediate raster data without depending on `image` directly.
pub use image::GrayImage;

/// Re-export `RgbaImage` for the pixel-diff and artifact paths.
pub use image::RgbaImage;

/// Number of bins in a luminance histogram.
pub const HISTOGRAM_BINS: usize = 32;

/// Width of one histogram bin in 8-bit luminance units (`256 / 32`).
pub const HISTOGRAM_BIN_WIDTH: u8 = 8;

/// A normalized 32-bin luminance histogram.
///
/// Each bin holds `count / pixel_count`, so the bins sum to 1.0
/// (within floating-point tolerance) for any non-empty image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Histogram {
    bins: [f64; HISTOGRAM_BINS],
}

impl Histogram {
    /// Wrap an already-normalized bin array.
    #[must_use]
    pub const fn from_bins(bins: [f64; HISTOGRAM_BINS]) -> Self {
        Self { bins }
    }

    /// The normalized bin values.
    #[must_use]
    pub const fn bins(&self) -> &[f64; HISTOGRAM_BINS] {
        &self.bins
    }

    /// Sum of all bins. 1.0 for a histogram built from a non-empty image.
    #[must_use]
    pub fn total(&self) -> f64 {
        self.bins.iter().sum()
    }
}

/// Image dimensions in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dimensions {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl Dimensions {
    /// Width divided by height. Returns 1.0 for a degenerate zero height.
    #[must_use]
    pub fn aspect_ratio(self) -> f64 {
        if self.height == 0 {
            return 1.0;
        }
        f64::from(self.width) / f64::from(self.height)
    }
}

/// A Sobel edge-magnitude map at a fixed working resolution.
///
/// Magnitudes are normalized by the observed maximum so every value
/// lies in `[0, 1]`. Border pixels are always zero because the 3x3
/// kernels are only applied to interior pixels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeMap {
    /// Side length of the square working grid.
    pub side: u32,
    /// Row-major normalized magnitudes, `side * side` entries.
    pub magnitudes: Vec<f32>,
    /// Fraction of pixels whose normalized magnitude exceeds
    /// [`crate::edge::EDGE_PIXEL_THRESHOLD`].
    pub density: f64,
    /// Aspect ratio (width / height) of the source image before resizing.
    pub aspect_ratio: f64,
}

/// Why a metric could not produce a score.
///
/// Kept separate from the numeric score so that "could not measure"
/// is never confused with "measured zero similarity".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum MetricFailure {
    /// The image bytes could not be obtained.
    #[error("image load failed: {0}")]
    Load(String),

    /// No raster codec is available in this runtime.
    #[error("raster codec unavailable")]
    CodecUnavailable,

    /// The bytes were obtained but could not be decoded.
    #[error("image decode failed: {0}")]
    Decode(String),

    /// The metric itself failed (dimension mismatch, empty image, ...).
    #[error("metric computation failed: {0}")]
    Computation(String),
}

impl MetricFailure {
    /// Whether this failure means the metric is unavailable in this
    /// runtime rather than that the inputs were bad.
    #[must_use]
    pub const fn is_unavailable(&self) -> bool {
        matches!(self, Self::CodecUnavailable)
    }
}

impl From<ExtractError> for MetricFailure {
    fn from(err: ExtractError) -> Self {
        match err {
            ExtractError::CodecUnavailable => Self::CodecUnavailable,
            ExtractError::ImageDecode(e) => Self::Decode(e.to_string()),
            ExtractError::EmptyInput => Self::Decode(err.to_string()),
            ExtractError::EmptyImage | ExtractError::Encode(_) => {
                Self::Computation(err.to_string())
            }
        }
    }
}

/// Tri-state result of one metric over one pair of panels.
///
/// `Skipped` is the sanctioned cross-origin exception; `Failed` is a
/// hard failure that must never be scored as similar. Only `Ok`
/// carries a number, and that number always lies in `[0, 1]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", content = "value", rename_all = "snake_case")]
pub enum MetricOutcome {
    /// The metric was measured.
    Ok(f64),
    /// Pixel access was blocked by a cross-origin restriction.
    Skipped(String),
    /// The metric could not be measured.
    Failed(MetricFailure),
}

impl MetricOutcome {
    /// Build an `Ok` outcome, clamping the score into `[0, 1]`.
    ///
    /// A NaN score is treated as a computation failure.
    #[must_use]
    pub fn scored(score: f64) -> Self {
        if score.is_nan() {
            return Self::Failed(MetricFailure::Computation("score is NaN".to_string()));
        }
        Self::Ok(score.clamp(0.0, 1.0))
    }

    /// The score, if one was measured.
    #[must_use]
    pub const fn score(&self) -> Option<f64> {
        match self {
            Self::Ok(score) => Some(*score),
            Self::Skipped(_) | Self::Failed(_) => None,
        }
    }

    /// Returns `true` for the cross-origin skip.
    #[must_use]
    pub const fn is_skipped(&self) -> bool {
        matches!(self, Self::Skipped(_))
    }

    /// Returns `true` for a hard failure.
    #[must_use]
    pub const fn is_failed(&self) -> bool {
        matches!(self, Self::Failed(_))
    }
}

/// Errors that can occur while extracting features from image bytes.
#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    /// The input image bytes were empty.
    #[error("input image data is empty")]
    EmptyInput,

    /// No raster codec is available to decode the bytes.
    #[error("raster codec unavailable in this runtime")]
    CodecUnavailable,

    /// Failed to decode the input image.
    #[error("failed to decode image: {0}")]
    ImageDecode(#[from] image::ImageError),

    /// The decoded image has no pixels.
    #[error("decoded image has zero pixels")]
    EmptyImage,

    /// Encoding a derived image (diff artifact) failed.
    #[error("failed to encode image: {0}")]
    Encode(String),
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn scored_clamps_into_unit_interval() {
        assert_eq!(MetricOutcome::scored(1.2), MetricOutcome::Ok(1.0));
        assert_eq!(MetricOutcome::scored(-0.3), MetricOutcome::Ok(0.0));
        assert_eq!(MetricOutcome::scored(0.42), MetricOutcome::Ok(0.42));
    }

    #[test]
    fn scored_nan_is_failure() {
        assert!(MetricOutcome::scored(f64::NAN).is_failed());
    }

    #[test]
    fn skipped_and_failed_carry_no_score() {
        assert_eq!(MetricOutcome::Skipped("cors".to_string()).score(), None);
        assert_eq!(
            MetricOutcome::Failed(MetricFailure::CodecUnavailable).score(),
            None
        );
    }

    #[test]
    fn codec_unavailable_maps_distinctly_from_decode() {
        let unavailable = MetricFailure::from(ExtractError::CodecUnavailable);
        assert!(unavailable.is_unavailable());

        let decode = MetricFailure::from(ExtractError::EmptyInput);
        assert!(!decode.is_unavailable());
        assert!(matches!(decode, MetricFailure::Decode(_)));
    }

    #[test]
    fn outcome_serializes_with_tag() {
        let json = serde_json::to_string(&MetricOutcome::Ok(0.5)).unwrap();
        assert_eq!(json, r#"{"outcome":"ok","value":0.5}"#);

        let failed = MetricOutcome::Failed(MetricFailure::CodecUnavailable);
        let json = serde_json::to_string(&failed).unwrap();
        assert!(json.contains("codec_unavailable"), "got {json}");
    }

    #[test]
    fn aspect_ratio_of_landscape() {
        let d = Dimensions {
            width: 200,
            height: 100,
        };
        assert!((d.aspect_ratio() - 2.0).abs() < f64::EPSILON);
    }

    #[test]
    fn aspect_ratio_zero_height_is_one() {
        let d = Dimensions {
            width: 10,
            height: 0,
        };
        assert!((d.aspect_ratio() - 1.0).abs() < f64::EPSILON);
    }
}
