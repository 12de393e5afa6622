//! Dual-metric validation: perceptual hash and raw pixel difference.
//!
//! Each configured view is compared with the hero on two independent
//! metrics, the pHash Hamming distance and the fraction of differing
//! pixels. Both must be within the limits of the view's class for the
//! view to pass. Failing pairs can have a diff image written for review.
//!
//! This path is strict: a view that cannot be loaded or decoded fails.

use std::path::PathBuf;

use image::DynamicImage;
use serde::{Deserialize, Serialize};
use xview_io::DiffArtifactWriter;
use xview_metrics::PerceptualHash;
use xview_metrics::phash::phash_of;
use xview_metrics::pixel_diff::{pixel_diff, render_diff};

use crate::calculator::SimilarityCalculator;
use crate::config::{DualMetricPolicy, MetricLimits};
use crate::grouping::ViewKind;
use crate::panel::{Panel, PanelMap};
use crate::pool::map_bounded;

/// Error reported when no hero key is present.
pub const NO_HERO_ERROR: &str = "No hero panel available";

/// Which limit table a view is held to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViewClass {
    /// 3D, perspective, axonometric and interior views.
    Exterior,
    /// Elevations, sections and plans.
    Linework,
    /// Everything else.
    Other,
}

impl ViewClass {
    /// Class of a view key.
    #[must_use]
    pub fn of_key(key: &str) -> Self {
        match ViewKind::of_key(key) {
            ViewKind::Exterior
            | ViewKind::Interior
            | ViewKind::Axonometric
            | ViewKind::Perspective => Self::Exterior,
            ViewKind::FloorPlan | ViewKind::Elevation | ViewKind::Section => Self::Linework,
            ViewKind::Site | ViewKind::Other => Self::Other,
        }
    }
}

/// One view compared with the hero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DualMetricComparison {
    /// View key.
    pub view: String,
    /// Limit class.
    pub class: ViewClass,
    /// Limits applied.
    pub limits: MetricLimits,
    /// pHash Hamming distance to the hero.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash_distance: Option<u32>,
    /// Hero fingerprint, hex.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hero_hash: Option<String>,
    /// View fingerprint, hex.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub view_hash: Option<String>,
    /// Fraction of differing pixels.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pixel_ratio: Option<f64>,
    /// Hash distance within limits.
    pub hash_pass: bool,
    /// Pixel ratio within limits.
    pub pixel_pass: bool,
    /// Both metrics within limits.
    pub pass: bool,
    /// Why the comparison could not run.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Diff image written for a failing pair.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diff_artifact: Option<PathBuf>,
    /// Diagnostics.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub notes: Vec<String>,
}

impl DualMetricComparison {
    fn failed(view: &str, class: ViewClass, limits: MetricLimits, error: String) -> Self {
        Self {
            view: view.to_string(),
            class,
            limits,
            hash_distance: None,
            hero_hash: None,
            view_hash: None,
            pixel_ratio: None,
            hash_pass: false,
            pixel_pass: false,
            pass: false,
            error: Some(error),
            diff_artifact: None,
            notes: Vec::new(),
        }
    }
}

/// Aggregate statistics over the compared views.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DualMetricSummary {
    /// Views compared.
    pub checked: usize,
    /// Views that passed.
    pub passed: usize,
    /// Views that failed.
    pub failed: usize,
    /// Mean hash distance over views with a distance.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mean_hash_distance: Option<f64>,
    /// Smallest hash distance.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_hash_distance: Option<u32>,
    /// Largest hash distance.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_hash_distance: Option<u32>,
    /// Keys of failing views.
    pub failed_views: Vec<String>,
}

impl DualMetricSummary {
    fn of(comparisons: &[DualMetricComparison]) -> Self {
        let distances: Vec<u32> = comparisons.iter().filter_map(|c| c.hash_distance).collect();
        let passed = comparisons.iter().filter(|c| c.pass).count();
        #[allow(clippy::cast_precision_loss)]
        let mean = (!distances.is_empty()).then(|| {
            distances.iter().map(|d| f64::from(*d)).sum::<f64>() / distances.len() as f64
        });
        Self {
            checked: comparisons.len(),
            passed,
            failed: comparisons.len() - passed,
            mean_hash_distance: mean,
            min_hash_distance: distances.iter().copied().min(),
            max_hash_distance: distances.iter().copied().max(),
            failed_views: comparisons
                .iter()
                .filter(|c| !c.pass)
                .map(|c| c.view.clone())
                .collect(),
        }
    }
}

/// Result of a dual-metric run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DualMetricReport {
    /// Every compared view passed.
    pub pass: bool,
    /// Why the run could not proceed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Hero key used.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hero: Option<String>,
    /// Per-view comparisons in policy order.
    pub comparisons: Vec<DualMetricComparison>,
    /// Aggregate statistics.
    pub summary: DualMetricSummary,
    /// Warnings.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
    /// RFC 3339 completion time.
    pub timestamp: String,
}

impl DualMetricReport {
    fn aborted(hero: Option<String>, error: String) -> Self {
        Self {
            pass: false,
            error: Some(error),
            hero,
            comparisons: Vec::new(),
            summary: DualMetricSummary::default(),
            warnings: Vec::new(),
            timestamp: now(),
        }
    }
}

fn now() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

struct Hero<'a> {
    key: &'a str,
    image: DynamicImage,
    hash: PerceptualHash,
}

/// Runs the dual-metric comparison.
#[derive(Debug, Clone)]
pub struct DualMetricValidator {
    policy: DualMetricPolicy,
    workers: usize,
    artifacts: Option<DiffArtifactWriter>,
}

impl DualMetricValidator {
    /// Validator with `policy`, comparing up to `workers` views at once.
    #[must_use]
    pub const fn new(policy: DualMetricPolicy, workers: usize) -> Self {
        Self {
            policy,
            workers,
            artifacts: None,
        }
    }

    /// Write diff images for failing views with `writer`.
    #[must_use]
    pub fn with_artifacts(mut self, writer: DiffArtifactWriter) -> Self {
        self.artifacts = Some(writer);
        self
    }

    /// Limits for a class.
    #[must_use]
    pub const fn limits(&self, class: ViewClass) -> MetricLimits {
        match class {
            ViewClass::Exterior => self.policy.exterior,
            ViewClass::Linework => self.policy.linework,
            ViewClass::Other => self.policy.default,
        }
    }

    /// Compare every configured view present in `panels` with the hero.
    /// Images are loaded and decoded through `calculator`.
    #[must_use]
    pub fn validate(
        &self,
        panels: &PanelMap,
        design_id: &str,
        calculator: &SimilarityCalculator,
    ) -> DualMetricReport {
        let Some((hero_key, hero_panel)) = self
            .policy
            .hero_keys
            .iter()
            .find_map(|k| panels.get_key_value(k.as_str()))
        else {
            tracing::warn!(target: "xview::dual_metric", "{NO_HERO_ERROR}");
            return DualMetricReport::aborted(None, NO_HERO_ERROR.to_string());
        };

        let hero_image = match calculator
            .load_bytes(&hero_panel.url)
            .map_err(|e| e.to_string())
            .and_then(|bytes| calculator.codec().decode(&bytes).map_err(|e| e.to_string()))
        {
            Ok(image) => image,
            Err(e) => {
                tracing::warn!(target: "xview::dual_metric", hero = %hero_key, error = %e, "hero unreadable");
                return DualMetricReport::aborted(
                    Some(hero_key.clone()),
                    format!("Hero panel could not be read: {e}"),
                );
            }
        };
        let hero = Hero {
            key: hero_key,
            hash: phash_of(&hero_image.to_luma8()),
            image: hero_image,
        };

        let mut warnings = Vec::new();
        let mut views: Vec<(&str, &Panel)> = Vec::new();
        for view in &self.policy.views {
            match panels
                .iter()
                .find(|(k, _)| k.eq_ignore_ascii_case(view) && k.as_str() != hero.key)
            {
                Some((key, panel)) => views.push((key.as_str(), panel)),
                None => tracing::debug!(target: "xview::dual_metric", view = %view, "view not present"),
            }
        }
        if views.is_empty() {
            warnings.push("none of the configured views are present".to_string());
        }

        let comparisons = map_bounded(&views, self.workers, |(key, panel)| {
            self.compare(&hero, key, panel, design_id, calculator)
        });
        let summary = DualMetricSummary::of(&comparisons);
        let pass = summary.failed == 0;
        tracing::info!(
            target: "xview::dual_metric",
            hero = %hero.key,
            pass,
            checked = summary.checked,
            failed = summary.failed,
            mean_hash_distance = ?summary.mean_hash_distance,
            "dual-metric validation complete"
        );
        DualMetricReport {
            pass,
            error: None,
            hero: Some(hero.key.to_string()),
            comparisons,
            summary,
            warnings,
            timestamp: now(),
        }
    }

    fn compare(
        &self,
        hero: &Hero<'_>,
        view: &str,
        panel: &Panel,
        design_id: &str,
        calculator: &SimilarityCalculator,
    ) -> DualMetricComparison {
        let class = ViewClass::of_key(view);
        let limits = self.limits(class);
        let image = match calculator.load_bytes(&panel.url) {
            Err(e) => {
                return DualMetricComparison::failed(view, class, limits, format!("load failed: {e}"));
            }
            Ok(bytes) => match calculator.codec().decode(&bytes) {
                Ok(image) => image,
                Err(e) => {
                    return DualMetricComparison::failed(
                        view,
                        class,
                        limits,
                        format!("decode failed: {e}"),
                    );
                }
            },
        };

        let hash = phash_of(&image.to_luma8());
        let distance = hero.hash.distance(hash);
        let tolerance = self.policy.channel_tolerance;
        let (diff, a, b) = pixel_diff(&hero.image, &image, self.policy.diff_max_side, tolerance);
        let hash_pass = distance <= limits.max_hash_distance;
        let pixel_pass = diff.ratio <= limits.max_pixel_ratio;

        let mut comparison = DualMetricComparison {
            view: view.to_string(),
            class,
            limits,
            hash_distance: Some(distance),
            hero_hash: Some(hero.hash.to_string()),
            view_hash: Some(hash.to_string()),
            pixel_ratio: Some(diff.ratio),
            hash_pass,
            pixel_pass,
            pass: hash_pass && pixel_pass,
            error: None,
            diff_artifact: None,
            notes: Vec::new(),
        };

        if !comparison.pass
            && let Some(writer) = &self.artifacts
        {
            let rendered = render_diff(&a, &b, tolerance);
            match writer.write_diff(design_id, &format!("{}__{view}", hero.key), &rendered) {
                Ok(path) => comparison.diff_artifact = Some(path),
                Err(e) => {
                    tracing::warn!(target: "xview::dual_metric", view, error = %e, "diff artifact not written");
                    comparison.notes.push(format!("diff artifact not written: {e}"));
                }
            }
        }
        comparison
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use image::ImageEncoder;
    use xview_io::MemorySource;
    use xview_metrics::RasterCodecKind;

    use super::*;
    use crate::config::CalculatorConfig;

    fn png(img: &image::RgbImage) -> Vec<u8> {
        let mut buf = Vec::new();
        image::codecs::png::PngEncoder::new(&mut buf)
            .write_image(img.as_raw(), img.width(), img.height(), image::ExtendedColorType::Rgb8)
            .unwrap();
        buf
    }

    fn house() -> Vec<u8> {
        png(&image::RgbImage::from_fn(64, 48, |x, y| {
            if y > 30 {
                image::Rgb([90, 140, 60])
            } else if (16..48).contains(&x) && y > 12 {
                image::Rgb([200, 180, 150])
            } else {
                image::Rgb([150, 190, 230])
            }
        }))
    }

    fn stripes() -> Vec<u8> {
        png(&image::RgbImage::from_fn(64, 48, |x, _| {
            if (x / 3) % 2 == 0 {
                image::Rgb([0, 0, 0])
            } else {
                image::Rgb([255, 255, 255])
            }
        }))
    }

    fn calculator() -> SimilarityCalculator {
        SimilarityCalculator::new(
            Box::new(
                MemorySource::new()
                    .with("hero", house())
                    .with("same", house())
                    .with("stripes", stripes()),
            ),
            Box::new(RasterCodecKind::ImageCrate),
            CalculatorConfig::default(),
        )
    }

    fn map(entries: &[(&str, &str)]) -> PanelMap {
        entries
            .iter()
            .map(|(k, url)| ((*k).to_string(), Panel::new(*url)))
            .collect()
    }

    #[test]
    fn no_hero_fails_with_message() {
        let panels = map(&[("elevation_north", "same")]);
        let report = DualMetricValidator::new(DualMetricPolicy::default(), 1)
            .validate(&panels, "d1", &calculator());
        assert!(!report.pass);
        assert_eq!(report.error.as_deref(), Some(NO_HERO_ERROR));
        assert!(report.comparisons.is_empty());
    }

    #[test]
    fn identical_view_passes_both_metrics() {
        let panels = map(&[("hero_3d", "hero"), ("section_aa", "same")]);
        let report = DualMetricValidator::new(DualMetricPolicy::default(), 1)
            .validate(&panels, "d1", &calculator());
        assert!(report.pass, "{report:?}");
        let c = &report.comparisons[0];
        // Matched case-insensitively against the configured "section_AA".
        assert_eq!(c.view, "section_aa");
        assert_eq!(c.class, ViewClass::Linework);
        assert_eq!(c.hash_distance, Some(0));
        assert_eq!(c.pixel_ratio, Some(0.0));
        assert_eq!(c.hero_hash, c.view_hash);
        assert_eq!(c.hero_hash.as_ref().unwrap().len(), 16);
    }

    #[test]
    fn failing_view_writes_diff_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let panels = map(&[("hero_3d", "hero"), ("elevation_north", "stripes")]);
        let report = DualMetricValidator::new(DualMetricPolicy::default(), 1)
            .with_artifacts(DiffArtifactWriter::new(dir.path()))
            .validate(&panels, "design-7", &calculator());
        assert!(!report.pass);
        let c = &report.comparisons[0];
        assert!(!c.pixel_pass);
        let path = c.diff_artifact.as_ref().unwrap();
        assert!(path.exists());
        assert!(path.starts_with(dir.path().join("design-7")));
        assert_eq!(report.summary.failed_views, ["elevation_north"]);
    }

    #[test]
    fn unreadable_view_fails() {
        let panels = map(&[("hero_3d", "hero"), ("axonometric", "missing")]);
        let report = DualMetricValidator::new(DualMetricPolicy::default(), 1)
            .validate(&panels, "d1", &calculator());
        assert!(!report.pass);
        let c = &report.comparisons[0];
        assert!(c.error.as_ref().unwrap().starts_with("load failed"));
        assert_eq!(report.summary.checked, 1);
        assert_eq!(report.summary.mean_hash_distance, None);
    }

    #[test]
    fn unreadable_hero_aborts() {
        let panels = map(&[("hero_3d", "missing"), ("section_aa", "same")]);
        let report = DualMetricValidator::new(DualMetricPolicy::default(), 1)
            .validate(&panels, "d1", &calculator());
        assert!(!report.pass);
        assert_eq!(report.hero.as_deref(), Some("hero_3d"));
        assert!(report.error.unwrap().starts_with("Hero panel could not be read"));
    }

    #[test]
    fn view_classes() {
        assert_eq!(ViewClass::of_key("interior_3d"), ViewClass::Exterior);
        assert_eq!(ViewClass::of_key("perspective"), ViewClass::Exterior);
        assert_eq!(ViewClass::of_key("elevation_west"), ViewClass::Linework);
        assert_eq!(ViewClass::of_key("site_diagram"), ViewClass::Other);
    }
}
