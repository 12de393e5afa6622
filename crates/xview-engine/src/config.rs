//! Policy configuration.
//!
//! Each validator keeps its own policy table. The hero-anchored, group
//! and dual-metric validators answer the same question with different
//! signals, and their thresholds are tuned independently.
//!
//! Every struct deserializes with `#[serde(default)]`, so a JSON config
//! only needs the fields it overrides.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use xview_io::ImageSourceKind;
use xview_metrics::StructuralPenalties;

use crate::error::EngineError;
use crate::grouping::{PanelGroup, ViewKind};

/// Serde support for `std::time::Duration` as fractional seconds.
mod duration_serde {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        duration.as_secs_f64().serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(|_| {
            serde::de::Error::custom(
                "duration seconds must be finite, non-negative, and representable as a Duration",
            )
        })
    }
}

/// Hero keys tried in order by the hero-anchored and dual-metric validators.
pub const DEFAULT_HERO_KEYS: [&str; 2] = ["hero_3d", "v_exterior"];

fn default_hero_keys() -> Vec<String> {
    DEFAULT_HERO_KEYS.iter().map(ToString::to_string).collect()
}

/// Weights of the combined scorer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CombinedWeights {
    /// Weight of the perceptual-hash similarity.
    pub phash: f64,
    /// Weight of SSIM.
    pub ssim: f64,
    /// Weight of the histogram similarity.
    pub histogram: f64,
    /// Multiplier applied to the histogram score when pHash or SSIM
    /// could not be computed.
    pub histogram_fallback_factor: f64,
}

impl CombinedWeights {
    /// Default pHash weight.
    pub const DEFAULT_PHASH: f64 = 0.5;
    /// Default SSIM weight.
    pub const DEFAULT_SSIM: f64 = 0.3;
    /// Default histogram weight.
    pub const DEFAULT_HISTOGRAM: f64 = 0.2;
    /// Default penalty factor for the histogram-only fallback.
    pub const DEFAULT_HISTOGRAM_FALLBACK_FACTOR: f64 = 0.5;
}

impl Default for CombinedWeights {
    fn default() -> Self {
        Self {
            phash: Self::DEFAULT_PHASH,
            ssim: Self::DEFAULT_SSIM,
            histogram: Self::DEFAULT_HISTOGRAM,
            histogram_fallback_factor: Self::DEFAULT_HISTOGRAM_FALLBACK_FACTOR,
        }
    }
}

/// Feature extraction, caching and loading parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalculatorConfig {
    /// Capacity of the raw image bytes cache.
    pub byte_cache_capacity: usize,
    /// Capacity of the histogram cache.
    pub histogram_cache_capacity: usize,
    /// Capacity of the edge map cache.
    pub edge_cache_capacity: usize,
    /// Longest side images are reduced to before histogramming.
    pub histogram_max_side: u32,
    /// Side of the square edge-map grid.
    pub edge_map_side: u32,
    /// Side of the square grid SSIM is computed on.
    pub ssim_side: u32,
    /// Timeout for a single remote fetch, in seconds.
    #[serde(with = "duration_serde")]
    pub fetch_timeout: Duration,
    /// Largest remote response body accepted, in bytes.
    pub max_response_bytes: u64,
    /// Proxy endpoint for remote images. When unset, the environment
    /// decides (`XVIEW_IMAGE_PROXY`).
    pub proxy_endpoint: Option<String>,
    /// Comparisons run concurrently. 1 runs them sequentially.
    pub workers: usize,
    /// Structural-similarity penalties.
    pub penalties: StructuralPenalties,
    /// Combined scorer weights.
    pub combined: CombinedWeights,
}

impl CalculatorConfig {
    /// Default image bytes cache capacity.
    pub const DEFAULT_BYTE_CACHE_CAPACITY: usize = 20;
    /// Default histogram cache capacity.
    pub const DEFAULT_HISTOGRAM_CACHE_CAPACITY: usize = 50;
    /// Default edge map cache capacity.
    pub const DEFAULT_EDGE_CACHE_CAPACITY: usize = 50;
    /// Default fetch timeout.
    pub const DEFAULT_FETCH_TIMEOUT: Duration = xview_io::source::DEFAULT_FETCH_TIMEOUT;
    /// Default remote response cap (64 MiB).
    pub const DEFAULT_MAX_RESPONSE_BYTES: u64 = xview_io::source::DEFAULT_MAX_RESPONSE_BYTES;
    /// Default worker count (sequential).
    pub const DEFAULT_WORKERS: usize = 1;

    /// The image source strategy: the configured proxy if any,
    /// otherwise whatever the environment selects.
    #[must_use]
    pub fn image_source_kind(&self) -> ImageSourceKind {
        match self.proxy_endpoint.as_deref() {
            Some(endpoint) => ImageSourceKind::from_proxy_setting(Some(endpoint)),
            None => ImageSourceKind::detect(),
        }
    }
}

impl Default for CalculatorConfig {
    fn default() -> Self {
        Self {
            byte_cache_capacity: Self::DEFAULT_BYTE_CACHE_CAPACITY,
            histogram_cache_capacity: Self::DEFAULT_HISTOGRAM_CACHE_CAPACITY,
            edge_cache_capacity: Self::DEFAULT_EDGE_CACHE_CAPACITY,
            histogram_max_side: xview_metrics::histogram::DEFAULT_MAX_SIDE,
            edge_map_side: xview_metrics::edge::DEFAULT_EDGE_SIDE,
            ssim_side: xview_metrics::ssim::DEFAULT_SSIM_SIDE,
            fetch_timeout: Self::DEFAULT_FETCH_TIMEOUT,
            max_response_bytes: Self::DEFAULT_MAX_RESPONSE_BYTES,
            proxy_endpoint: None,
            workers: Self::DEFAULT_WORKERS,
            penalties: StructuralPenalties::default(),
            combined: CombinedWeights::default(),
        }
    }
}

/// Hero-anchored strategy policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HeroPolicy {
    /// Weight of histogram similarity in the panel score.
    pub histogram_weight: f64,
    /// Weight of structural similarity in the panel score.
    pub structural_weight: f64,
    /// Weight of the prompt check (1 when valid, 0 otherwise).
    pub prompt_weight: f64,
    /// Scores below this are rejected.
    pub reject_below: f64,
    /// Scores at or above this are valid; in between is retry.
    pub valid_from: f64,
    /// Minimum overall score for the run to pass.
    pub pass_floor: f64,
    /// Keys tried in order to find the hero.
    pub hero_keys: Vec<String>,
}

impl HeroPolicy {
    /// Default histogram weight.
    pub const DEFAULT_HISTOGRAM_WEIGHT: f64 = 0.5;
    /// Default structural weight.
    pub const DEFAULT_STRUCTURAL_WEIGHT: f64 = 0.3;
    /// Default prompt weight.
    pub const DEFAULT_PROMPT_WEIGHT: f64 = 0.2;
    /// Default rejection threshold.
    pub const DEFAULT_REJECT_BELOW: f64 = 0.70;
    /// Default valid threshold.
    pub const DEFAULT_VALID_FROM: f64 = 0.85;
    /// Default overall pass floor.
    pub const DEFAULT_PASS_FLOOR: f64 = 0.5;
}

impl Default for HeroPolicy {
    fn default() -> Self {
        Self {
            histogram_weight: Self::DEFAULT_HISTOGRAM_WEIGHT,
            structural_weight: Self::DEFAULT_STRUCTURAL_WEIGHT,
            prompt_weight: Self::DEFAULT_PROMPT_WEIGHT,
            reject_below: Self::DEFAULT_REJECT_BELOW,
            valid_from: Self::DEFAULT_VALID_FROM,
            pass_floor: Self::DEFAULT_PASS_FLOOR,
            hero_keys: default_hero_keys(),
        }
    }
}

/// Threshold for one specific pair of view kinds, overriding the
/// group default. Order within the pair does not matter.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PairThreshold {
    /// One side of the pair.
    pub a: ViewKind,
    /// The other side.
    pub b: ViewKind,
    /// Threshold for this pair.
    pub threshold: f64,
}

impl PairThreshold {
    fn matches(&self, x: ViewKind, y: ViewKind) -> bool {
        (self.a == x && self.b == y) || (self.a == y && self.b == x)
    }
}

/// Group-based strategy policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GroupPolicy {
    /// Default threshold inside the EXTERIOR group.
    pub exterior_threshold: f64,
    /// Default threshold inside the LINEWORK group.
    pub linework_threshold: f64,
    /// Per view-kind pair overrides.
    pub pair_overrides: Vec<PairThreshold>,
    /// Below-threshold scores at or above this floor are
    /// retry-recommended; lower scores are rejected.
    pub reject_floor: f64,
    /// Number of worst failing pairs kept for observability.
    pub worst_mismatch_count: usize,
}

impl GroupPolicy {
    /// Default EXTERIOR threshold.
    pub const DEFAULT_EXTERIOR_THRESHOLD: f64 = 0.80;
    /// Default LINEWORK threshold.
    pub const DEFAULT_LINEWORK_THRESHOLD: f64 = 0.75;
    /// Default reject floor.
    pub const DEFAULT_REJECT_FLOOR: f64 = 0.50;
    /// Default number of worst mismatches retained.
    pub const DEFAULT_WORST_MISMATCH_COUNT: usize = 3;

    /// Default threshold of a comparable group. `None` for groups that
    /// are never compared.
    #[must_use]
    pub const fn group_threshold(&self, group: PanelGroup) -> Option<f64> {
        match group {
            PanelGroup::Exterior => Some(self.exterior_threshold),
            PanelGroup::Linework => Some(self.linework_threshold),
            PanelGroup::Metadata | PanelGroup::Unknown => None,
        }
    }

    /// Threshold for comparing an `anchor` view with a `member` view in
    /// `group`: a matching pair override if any, else the group default.
    /// `None` for groups that are never compared.
    #[must_use]
    pub fn pair_threshold(&self, group: PanelGroup, anchor: ViewKind, member: ViewKind) -> Option<f64> {
        let default = self.group_threshold(group)?;
        Some(
            self.pair_overrides
                .iter()
                .find(|o| o.matches(anchor, member))
                .map_or(default, |o| o.threshold),
        )
    }
}

impl Default for GroupPolicy {
    fn default() -> Self {
        Self {
            exterior_threshold: Self::DEFAULT_EXTERIOR_THRESHOLD,
            linework_threshold: Self::DEFAULT_LINEWORK_THRESHOLD,
            pair_overrides: vec![
                // Interior renders share materials, not massing, with the exterior.
                PairThreshold {
                    a: ViewKind::Exterior,
                    b: ViewKind::Interior,
                    threshold: 0.65,
                },
                // Plans and elevations share line weight, not composition.
                PairThreshold {
                    a: ViewKind::FloorPlan,
                    b: ViewKind::Elevation,
                    threshold: 0.70,
                },
                PairThreshold {
                    a: ViewKind::FloorPlan,
                    b: ViewKind::Section,
                    threshold: 0.70,
                },
            ],
            reject_floor: Self::DEFAULT_REJECT_FLOOR,
            worst_mismatch_count: Self::DEFAULT_WORST_MISMATCH_COUNT,
        }
    }
}

/// Hash-distance and pixel-ratio limits for one view class. A
/// comparison passes only when both are within limits.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetricLimits {
    /// Largest allowed perceptual-hash Hamming distance (of 64 bits).
    pub max_hash_distance: u32,
    /// Largest allowed fraction of differing pixels.
    pub max_pixel_ratio: f64,
}

/// Dual-metric validator policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DualMetricPolicy {
    /// Limits for exterior-like views (3D, perspective, axonometric, interior).
    pub exterior: MetricLimits,
    /// Limits for linework views (elevations, sections, plans).
    pub linework: MetricLimits,
    /// Limits for everything else (site diagram).
    pub default: MetricLimits,
    /// Per-channel tolerance before a pixel counts as different.
    pub channel_tolerance: u8,
    /// Longest side of the pixel-diff working size.
    pub diff_max_side: u32,
    /// Keys tried in order to find the hero.
    pub hero_keys: Vec<String>,
    /// Views compared against the hero, in order. Views missing from
    /// the panel map are skipped.
    pub views: Vec<String>,
}

impl DualMetricPolicy {
    /// Default exterior limits.
    pub const DEFAULT_EXTERIOR: MetricLimits = MetricLimits {
        max_hash_distance: 12,
        max_pixel_ratio: 0.20,
    };
    /// Default linework limits.
    pub const DEFAULT_LINEWORK: MetricLimits = MetricLimits {
        max_hash_distance: 15,
        max_pixel_ratio: 0.30,
    };
    /// Default limits for other views.
    pub const DEFAULT_OTHER: MetricLimits = MetricLimits {
        max_hash_distance: 15,
        max_pixel_ratio: 0.25,
    };
    /// Views compared by default.
    pub const DEFAULT_VIEWS: [&str; 10] = [
        "elevation_north",
        "elevation_south",
        "elevation_east",
        "elevation_west",
        "section_AA",
        "section_BB",
        "axonometric",
        "interior_3d",
        "site_diagram",
        "perspective",
    ];
}

impl Default for DualMetricPolicy {
    fn default() -> Self {
        Self {
            exterior: Self::DEFAULT_EXTERIOR,
            linework: Self::DEFAULT_LINEWORK,
            default: Self::DEFAULT_OTHER,
            channel_tolerance: xview_metrics::pixel_diff::DEFAULT_CHANNEL_TOLERANCE,
            diff_max_side: xview_metrics::pixel_diff::DEFAULT_DIFF_MAX_SIDE,
            hero_keys: default_hero_keys(),
            views: Self::DEFAULT_VIEWS.iter().map(ToString::to_string).collect(),
        }
    }
}

/// Rejection service policy.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RejectionPolicy {
    /// Regenerate everything when more than this fraction of judged
    /// panels is rejected.
    pub max_rejected_fraction: f64,
    /// Regenerate everything when the overall score is below this.
    pub min_overall_score: f64,
}

impl RejectionPolicy {
    /// Default rejected fraction limit.
    pub const DEFAULT_MAX_REJECTED_FRACTION: f64 = 0.30;
    /// Default overall score floor.
    pub const DEFAULT_MIN_OVERALL_SCORE: f64 = 0.30;
}

impl Default for RejectionPolicy {
    fn default() -> Self {
        Self {
            max_rejected_fraction: Self::DEFAULT_MAX_REJECTED_FRACTION,
            min_overall_score: Self::DEFAULT_MIN_OVERALL_SCORE,
        }
    }
}

/// All engine configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Feature extraction and loading.
    pub calculator: CalculatorConfig,
    /// Hero-anchored strategy.
    pub hero: HeroPolicy,
    /// Group-based strategy.
    pub group: GroupPolicy,
    /// Dual-metric validator.
    pub dual_metric: DualMetricPolicy,
    /// Rejection service.
    pub rejection: RejectionPolicy,
}

const WEIGHT_SUM_TOLERANCE: f64 = 1e-6;

fn check_unit(name: &str, value: f64) -> Result<(), EngineError> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(EngineError::InvalidConfig(format!(
            "{name} must be within [0, 1], got {value}"
        )))
    }
}

fn check_weights(name: &str, weights: &[f64]) -> Result<(), EngineError> {
    for w in weights {
        check_unit(name, *w)?;
    }
    let sum: f64 = weights.iter().sum();
    if (sum - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
        return Err(EngineError::InvalidConfig(format!(
            "{name} must sum to 1, got {sum}"
        )));
    }
    Ok(())
}

fn check_positive(name: &str, value: usize) -> Result<(), EngineError> {
    if value == 0 {
        return Err(EngineError::InvalidConfig(format!("{name} must be at least 1")));
    }
    Ok(())
}

impl EngineConfig {
    /// Check every value is in range.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidConfig`] naming the first offending
    /// field.
    pub fn validate(&self) -> Result<(), EngineError> {
        let c = &self.calculator;
        check_positive("calculator.byte_cache_capacity", c.byte_cache_capacity)?;
        check_positive("calculator.histogram_cache_capacity", c.histogram_cache_capacity)?;
        check_positive("calculator.edge_cache_capacity", c.edge_cache_capacity)?;
        check_positive("calculator.workers", c.workers)?;
        for (name, side) in [
            ("calculator.histogram_max_side", c.histogram_max_side),
            ("calculator.edge_map_side", c.edge_map_side),
            ("calculator.ssim_side", c.ssim_side),
        ] {
            if side < 8 {
                return Err(EngineError::InvalidConfig(format!(
                    "{name} must be at least 8, got {side}"
                )));
            }
        }
        if c.fetch_timeout.is_zero() {
            return Err(EngineError::InvalidConfig(
                "calculator.fetch_timeout must be positive".to_string(),
            ));
        }
        if c.max_response_bytes == 0 {
            return Err(EngineError::InvalidConfig(
                "calculator.max_response_bytes must be positive".to_string(),
            ));
        }
        check_weights(
            "calculator.combined weights",
            &[c.combined.phash, c.combined.ssim, c.combined.histogram],
        )?;
        check_unit(
            "calculator.combined.histogram_fallback_factor",
            c.combined.histogram_fallback_factor,
        )?;

        let h = &self.hero;
        check_weights(
            "hero weights",
            &[h.histogram_weight, h.structural_weight, h.prompt_weight],
        )?;
        check_unit("hero.reject_below", h.reject_below)?;
        check_unit("hero.valid_from", h.valid_from)?;
        check_unit("hero.pass_floor", h.pass_floor)?;
        if h.reject_below > h.valid_from {
            return Err(EngineError::InvalidConfig(
                "hero.reject_below must not exceed hero.valid_from".to_string(),
            ));
        }
        if h.hero_keys.is_empty() {
            return Err(EngineError::InvalidConfig("hero.hero_keys is empty".to_string()));
        }

        let g = &self.group;
        check_unit("group.exterior_threshold", g.exterior_threshold)?;
        check_unit("group.linework_threshold", g.linework_threshold)?;
        check_unit("group.reject_floor", g.reject_floor)?;
        for o in &g.pair_overrides {
            check_unit("group.pair_overrides threshold", o.threshold)?;
        }

        let d = &self.dual_metric;
        for (name, limits) in [
            ("dual_metric.exterior", d.exterior),
            ("dual_metric.linework", d.linework),
            ("dual_metric.default", d.default),
        ] {
            check_unit(&format!("{name}.max_pixel_ratio"), limits.max_pixel_ratio)?;
            if limits.max_hash_distance > xview_metrics::phash::HASH_BITS {
                return Err(EngineError::InvalidConfig(format!(
                    "{name}.max_hash_distance must be at most 64"
                )));
            }
        }
        if d.hero_keys.is_empty() {
            return Err(EngineError::InvalidConfig(
                "dual_metric.hero_keys is empty".to_string(),
            ));
        }

        check_unit(
            "rejection.max_rejected_fraction",
            self.rejection.max_rejected_fraction,
        )?;
        check_unit("rejection.min_overall_score", self.rejection.min_overall_score)?;
        Ok(())
    }
}
