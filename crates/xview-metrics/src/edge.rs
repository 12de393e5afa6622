//! Sobel edge maps and structural similarity.
//!
//! An edge map is computed on a fixed 128x128 grid: 3x3 Sobel-X/Y
//! kernels are applied to interior pixels, magnitude is
//! `sqrt(gx^2 + gy^2)`, and the result is normalized by the observed
//! maximum. Border pixels stay zero.
//!
//! Structural similarity between two maps is their normalized
//! cross-correlation mapped from `[-1, 1]` to `[0, 1]`, minus two
//! capped penalties:
//!
//! - aspect ratio: grows from 0 once the relative aspect difference
//!   exceeds 15%, capped at 0.20;
//! - edge density: grows from 0 once the density difference exceeds
//!   0.30, capped at 0.15.
//!
//! Maps with (near) zero variance have no defined correlation and use
//! fixed fallback scores instead.

use serde::{Deserialize, Serialize};

use crate::codec::RasterCodec;
use crate::downsample::resize_square;
use crate::grayscale::decode_and_grayscale;
use crate::types::{EdgeMap, ExtractError};

/// Side length of the edge-map working grid.
pub const DEFAULT_EDGE_SIDE: u32 = 128;

/// Normalized magnitude above which a pixel counts as an edge pixel.
pub const EDGE_PIXEL_THRESHOLD: f32 = 0.2;

/// Variance below which a map is treated as flat.
pub const FLAT_VARIANCE_EPSILON: f64 = 1e-10;

/// Score when both maps are flat and identical in level.
pub const BOTH_FLAT_SCORE: f64 = 0.9;

/// Score when both maps are flat but at different levels.
pub const AMBIGUOUS_FLAT_SCORE: f64 = 0.5;

/// Score when exactly one map is flat.
pub const ONE_FLAT_SCORE: f64 = 0.3;

const SOBEL_X: [[f32; 3]; 3] = [[-1.0, 0.0, 1.0], [-2.0, 0.0, 2.0], [-1.0, 0.0, 1.0]];
const SOBEL_Y: [[f32; 3]; 3] = [[-1.0, -2.0, -1.0], [0.0, 0.0, 0.0], [1.0, 2.0, 1.0]];

/// Tunables for the structural penalties.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StructuralPenalties {
    /// Relative aspect-ratio difference tolerated without penalty.
    pub aspect_tolerance: f64,
    /// Relative aspect-ratio difference at which the penalty reaches its cap.
    pub aspect_saturation: f64,
    /// Maximum aspect-ratio penalty.
    pub aspect_cap: f64,
    /// Absolute edge-density difference tolerated without penalty.
    pub density_tolerance: f64,
    /// Density difference at which the penalty reaches its cap.
    pub density_saturation: f64,
    /// Maximum edge-density penalty.
    pub density_cap: f64,
}

impl Default for StructuralPenalties {
    fn default() -> Self {
        Self {
            aspect_tolerance: 0.15,
            aspect_saturation: 0.50,
            aspect_cap: 0.20,
            density_tolerance: 0.30,
            density_saturation: 0.60,
            density_cap: 0.15,
        }
    }
}

/// Breakdown of one structural comparison.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StructuralScore {
    /// Correlation term mapped to `[0, 1]` (or a flat-map fallback).
    pub correlation: f64,
    /// Aspect-ratio penalty applied.
    pub aspect_penalty: f64,
    /// Edge-density penalty applied.
    pub density_penalty: f64,
    /// Final score, `max(0, correlation - penalties)`.
    pub score: f64,
}

/// Decode `bytes` and compute its Sobel edge map on a `side` x `side` grid.
///
/// # Errors
///
/// Propagates decode errors from the codec.
pub fn extract_edge_map(
    codec: &dyn RasterCodec,
    bytes: &[u8],
    side: u32,
) -> Result<EdgeMap, ExtractError> {
    let (gray, dimensions) = decode_and_grayscale(codec, bytes)?;
    let mut map = sobel_edge_map(&resize_square(&gray, side));
    map.aspect_ratio = dimensions.aspect_ratio();
    Ok(map)
}

/// Apply 3x3 Sobel kernels to the interior of `gray` and normalize.
///
/// The returned map's `aspect_ratio` is that of `gray` itself; callers
/// working from a resized image overwrite it with the source ratio.
#[must_use]
#[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]
pub fn sobel_edge_map(gray: &image::GrayImage) -> EdgeMap {
    let (w, h) = gray.dimensions();
    let side = w;
    let len = (w as usize) * (h as usize);
    let mut magnitudes = vec![0.0_f32; len];
    let mut max = 0.0_f32;

    for y in 1..h.saturating_sub(1) {
        for x in 1..w.saturating_sub(1) {
            let mut gx = 0.0_f32;
            let mut gy = 0.0_f32;
            for (ky, (row_x, row_y)) in SOBEL_X.iter().zip(SOBEL_Y.iter()).enumerate() {
                for kx in 0..3 {
                    let px = x + kx as u32 - 1;
                    let py = y + ky as u32 - 1;
                    let v = f32::from(gray.get_pixel(px, py).0[0]);
                    gx += row_x[kx] * v;
                    gy += row_y[kx] * v;
                }
            }
            let magnitude = gx.hypot(gy);
            magnitudes[(y as usize) * (w as usize) + x as usize] = magnitude;
            max = max.max(magnitude);
        }
    }

    if max > 0.0 {
        for m in &mut magnitudes {
            *m /= max;
        }
    }

    let edge_pixels = magnitudes
        .iter()
        .filter(|&&m| m > EDGE_PIXEL_THRESHOLD)
        .count();
    let density = if len == 0 {
        0.0
    } else {
        edge_pixels as f64 / len as f64
    };

    EdgeMap {
        side,
        magnitudes,
        density,
        aspect_ratio: if h == 0 { 1.0 } else { f64::from(w) / f64::from(h) },
    }
}

/// Mean and population variance of a magnitude slice.
#[allow(clippy::cast_precision_loss)]
fn mean_variance(values: &[f32]) -> (f64, f64) {
    if values.is_empty() {
        return (0.0, 0.0);
    }
    let n = values.len() as f64;
    let mean = values.iter().map(|&v| f64::from(v)).sum::<f64>() / n;
    let var = values
        .iter()
        .map(|&v| {
            let d = f64::from(v) - mean;
            d * d
        })
        .sum::<f64>()
        / n;
    (mean, var)
}

/// Correlation term in `[0, 1]`, or a flat-map fallback score.
#[allow(clippy::cast_precision_loss)]
fn correlation_term(a: &EdgeMap, b: &EdgeMap) -> f64 {
    let (mean_a, var_a) = mean_variance(&a.magnitudes);
    let (mean_b, var_b) = mean_variance(&b.magnitudes);
    let flat_a = var_a < FLAT_VARIANCE_EPSILON;
    let flat_b = var_b < FLAT_VARIANCE_EPSILON;

    match (flat_a, flat_b) {
        (true, true) if (mean_a - mean_b).abs() < 1e-6 => BOTH_FLAT_SCORE,
        (true, true) => AMBIGUOUS_FLAT_SCORE,
        (true, false) | (false, true) => ONE_FLAT_SCORE,
        (false, false) => {
            let n = a.magnitudes.len().min(b.magnitudes.len()) as f64;
            let cov = a
                .magnitudes
                .iter()
                .zip(&b.magnitudes)
                .map(|(&x, &y)| (f64::from(x) - mean_a) * (f64::from(y) - mean_b))
                .sum::<f64>()
                / n;
            let ncc = (cov / (var_a.sqrt() * var_b.sqrt())).clamp(-1.0, 1.0);
            (ncc + 1.0) / 2.0
        }
    }
}

/// Linear ramp from 0 at `tolerance` to `cap` at `saturation`.
fn ramp(difference: f64, tolerance: f64, saturation: f64, cap: f64) -> f64 {
    if difference <= tolerance {
        return 0.0;
    }
    let span = (saturation - tolerance).max(f64::EPSILON);
    (cap * (difference - tolerance) / span).min(cap)
}

/// Compare two edge maps, returning the full breakdown.
///
/// Maps of different grid sizes are not comparable and fall back to
/// the ambiguous score before penalties.
#[must_use]
pub fn structural_score(a: &EdgeMap, b: &EdgeMap, penalties: &StructuralPenalties) -> StructuralScore {
    let correlation = if a.magnitudes.len() == b.magnitudes.len() {
        correlation_term(a, b)
    } else {
        AMBIGUOUS_FLAT_SCORE
    };

    let larger_aspect = a.aspect_ratio.max(b.aspect_ratio).max(f64::EPSILON);
    let aspect_difference = (a.aspect_ratio - b.aspect_ratio).abs() / larger_aspect;
    let aspect_penalty = ramp(
        aspect_difference,
        penalties.aspect_tolerance,
        penalties.aspect_saturation,
        penalties.aspect_cap,
    );

    let density_penalty = ramp(
        (a.density - b.density).abs(),
        penalties.density_tolerance,
        penalties.density_saturation,
        penalties.density_cap,
    );

    StructuralScore {
        correlation,
        aspect_penalty,
        density_penalty,
        score: (correlation - aspect_penalty - density_penalty).clamp(0.0, 1.0),
    }
}

/// Structural similarity score in `[0, 1]` with default penalties.
#[must_use]
pub fn structural_similarity(a: &EdgeMap, b: &EdgeMap) -> f64 {
    structural_score(a, b, &StructuralPenalties::default()).score
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::codec::RasterCodecKind;
    use crate::testutil::{checkerboard_gray, encode_gray_png, gradient_gray, sharp_edge_gray};
    use image::GrayImage;

    #[test]
    fn uniform_image_has_no_edges() {
        let map = sobel_edge_map(&GrayImage::from_pixel(20, 20, image::Luma([128])));
        assert!(map.magnitudes.iter().all(|&m| m == 0.0));
        assert!(map.density.abs() < f64::EPSILON);
    }

    #[test]
    fn magnitudes_are_normalized_and_borders_zero() {
        let map = sobel_edge_map(&sharp_edge_gray(20, 20));
        let max = map.magnitudes.iter().copied().fold(0.0_f32, f32::max);
        assert!((max - 1.0).abs() < 1e-6);
        for x in 0..20 {
            assert!(map.magnitudes[x].abs() < f32::EPSILON, "top border at {x}");
            assert!(map.magnitudes[19 * 20 + x].abs() < f32::EPSILON, "bottom border at {x}");
        }
    }

    #[test]
    fn sharp_edge_produces_density_near_the_boundary_columns() {
        let map = sobel_edge_map(&sharp_edge_gray(20, 20));
        // Two interior columns (x = 9 and x = 10) light up on 18 interior rows.
        let expected = 2.0 * 18.0 / 400.0;
        assert!((map.density - expected).abs() < 1e-9, "density = {}", map.density);
    }

    #[test]
    fn identical_maps_score_one() {
        let map = sobel_edge_map(&checkerboard_gray(32, 32, 4));
        assert!((structural_similarity(&map, &map) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn structural_similarity_is_symmetric() {
        let a = sobel_edge_map(&checkerboard_gray(32, 32, 4));
        let b = sobel_edge_map(&gradient_gray(32, 32));
        let ab = structural_similarity(&a, &b);
        let ba = structural_similarity(&b, &a);
        assert!((ab - ba).abs() < 1e-12);
        assert!((0.0..=1.0).contains(&ab));
    }

    #[test]
    fn flat_fallbacks() {
        let flat = sobel_edge_map(&GrayImage::from_pixel(16, 16, image::Luma([10])));
        let busy = sobel_edge_map(&checkerboard_gray(16, 16, 2));
        assert!((structural_similarity(&flat, &flat) - BOTH_FLAT_SCORE).abs() < 1e-12);
        // One flat map also differs in density, so only compare the correlation term.
        let s = structural_score(&flat, &busy, &StructuralPenalties::default());
        assert!((s.correlation - ONE_FLAT_SCORE).abs() < 1e-12);
    }

    #[test]
    fn ambiguous_flat_when_levels_differ() {
        let a = EdgeMap {
            side: 2,
            magnitudes: vec![0.0; 4],
            density: 0.0,
            aspect_ratio: 1.0,
        };
        let b = EdgeMap {
            magnitudes: vec![0.5; 4],
            ..a.clone()
        };
        assert!((structural_similarity(&a, &b) - AMBIGUOUS_FLAT_SCORE).abs() < 1e-12);
    }

    #[test]
    fn aspect_penalty_kicks_in_past_fifteen_percent() {
        let base = sobel_edge_map(&checkerboard_gray(32, 32, 4));
        let mut similar = base.clone();
        similar.aspect_ratio = 1.1; // 9% difference
        let s = structural_score(&base, &similar, &StructuralPenalties::default());
        assert!(s.aspect_penalty.abs() < f64::EPSILON);

        let mut wide = base.clone();
        wide.aspect_ratio = 4.0; // 75% difference, past saturation
        let s = structural_score(&base, &wide, &StructuralPenalties::default());
        assert!((s.aspect_penalty - 0.20).abs() < 1e-12);
        assert!((s.score - 0.80).abs() < 1e-9);
    }

    #[test]
    fn density_penalty_is_capped() {
        let mut a = sobel_edge_map(&checkerboard_gray(32, 32, 4));
        let mut b = a.clone();
        a.density = 0.0;
        b.density = 0.9;
        let s = structural_score(&a, &b, &StructuralPenalties::default());
        assert!((s.density_penalty - 0.15).abs() < 1e-12);

        b.density = 0.25;
        let s = structural_score(&a, &b, &StructuralPenalties::default());
        assert!(s.density_penalty.abs() < f64::EPSILON);
    }

    #[test]
    fn extract_keeps_source_aspect_ratio() {
        let png = encode_gray_png(&sharp_edge_gray(300, 100));
        let map = extract_edge_map(&RasterCodecKind::ImageCrate, &png, DEFAULT_EDGE_SIDE).unwrap();
        assert_eq!(map.side, DEFAULT_EDGE_SIDE);
        assert_eq!(map.magnitudes.len(), 128 * 128);
        assert!((map.aspect_ratio - 3.0).abs() < 1e-12);
    }
}
