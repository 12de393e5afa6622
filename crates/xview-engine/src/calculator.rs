//! Pairwise panel similarity with per-instance caches.
//!
//! [`SimilarityCalculator`] owns an [`ImageSource`], a [`RasterCodec`]
//! and three bounded caches (image bytes, histograms, edge maps) keyed
//! by a SipHash of the image reference. Caches belong to one instance
//! and are cleared explicitly between unrelated runs.
//!
//! Every metric returns a [`MetricOutcome`]. Load failures become
//! `Failed`, except the cross-origin block, which becomes `Skipped`.
//! Identical references short-circuit to 1.0 without loading anything.

use std::hash::Hasher;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};
use siphasher::sip::SipHasher13;
use xview_io::{ImageLoadError, ImageSource, describe_reference};
use xview_metrics::edge::{extract_edge_map, structural_score};
use xview_metrics::histogram::{extract_histogram, histogram_similarity};
use xview_metrics::phash::extract_phash;
use xview_metrics::ssim::{SsimError, ssim_similarity};
use xview_metrics::{
    BoundedCache, EdgeMap, ExtractError, Histogram, MetricFailure, MetricOutcome, RasterCodec,
    RasterCodecKind,
};

use crate::config::{CalculatorConfig, CombinedWeights};
use crate::error::EngineError;

/// Per-metric outcomes behind one comparison. Metrics a strategy did
/// not compute are `None`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricBreakdown {
    /// Perceptual-hash similarity.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phash: Option<MetricOutcome>,
    /// SSIM.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ssim: Option<MetricOutcome>,
    /// Histogram similarity.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub histogram: Option<MetricOutcome>,
    /// Structural (edge) similarity.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub structural: Option<MetricOutcome>,
}

/// Output of one combined comparison.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimilarityResult {
    /// Combined outcome.
    pub outcome: MetricOutcome,
    /// Per-metric outcomes.
    pub breakdown: MetricBreakdown,
    /// Diagnostic notes (fallbacks taken, metrics unavailable).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub notes: Vec<String>,
}

impl SimilarityResult {
    /// Result for two identical references: every metric is 1.0.
    #[must_use]
    pub fn identical() -> Self {
        Self {
            outcome: MetricOutcome::Ok(1.0),
            breakdown: MetricBreakdown {
                phash: Some(MetricOutcome::Ok(1.0)),
                ssim: Some(MetricOutcome::Ok(1.0)),
                histogram: Some(MetricOutcome::Ok(1.0)),
                structural: None,
            },
            notes: vec!["identical image reference".to_string()],
        }
    }
}

/// Blend pHash, SSIM and histogram outcomes into one result.
///
/// - a failed histogram makes the result `Failed`;
/// - otherwise any `Skipped` input makes the result `Skipped`;
/// - a failed pHash or SSIM falls back to `factor * histogram`.
#[must_use]
pub fn combine(
    weights: &CombinedWeights,
    phash: MetricOutcome,
    ssim: MetricOutcome,
    histogram: MetricOutcome,
) -> SimilarityResult {
    let mut notes = Vec::new();
    let outcome = if let MetricOutcome::Failed(failure) = &histogram {
        MetricOutcome::Failed(failure.clone())
    } else if let Some(reason) = [&phash, &ssim, &histogram].iter().find_map(|m| match m {
        MetricOutcome::Skipped(reason) => Some(reason.clone()),
        _ => None,
    }) {
        MetricOutcome::Skipped(reason)
    } else {
        match (&phash, &ssim, &histogram) {
            (_, _, MetricOutcome::Failed(failure)) => MetricOutcome::Failed(failure.clone()),
            (MetricOutcome::Ok(p), MetricOutcome::Ok(s), MetricOutcome::Ok(h)) => {
                MetricOutcome::scored(weights.histogram.mul_add(
                    *h,
                    weights.phash.mul_add(*p, weights.ssim * s),
                ))
            }
            (p, s, MetricOutcome::Ok(h)) => {
                let failed: Vec<String> = [("phash", p), ("ssim", s)]
                    .iter()
                    .filter_map(|(name, m)| match m {
                        MetricOutcome::Failed(f) => Some(format!("{name}: {f}")),
                        _ => None,
                    })
                    .collect();
                notes.push(format!(
                    "perceptual metrics unavailable ({}); histogram-only fallback at {}x",
                    failed.join("; "),
                    weights.histogram_fallback_factor
                ));
                MetricOutcome::scored(weights.histogram_fallback_factor * h)
            }
            (_, _, MetricOutcome::Skipped(reason)) => MetricOutcome::Skipped(reason.clone()),
        }
    };
    SimilarityResult {
        outcome,
        breakdown: MetricBreakdown {
            phash: Some(phash),
            ssim: Some(ssim),
            histogram: Some(histogram),
            structural: None,
        },
        notes,
    }
}

/// Pairwise comparison of two image references.
///
/// Implemented by [`SimilarityCalculator`]; validation strategies take
/// `&dyn PanelComparator` so the scoring backend can be substituted.
pub trait PanelComparator: Send + Sync {
    /// Histogram similarity.
    fn histogram_similarity(&self, reference: &str, candidate: &str) -> MetricOutcome;

    /// Structural (Sobel edge) similarity.
    fn structural_similarity(&self, reference: &str, candidate: &str) -> MetricOutcome;

    /// Combined pHash + SSIM + histogram similarity.
    fn combined_similarity(&self, reference: &str, candidate: &str) -> SimilarityResult;

    /// Whether `reference` can be loaded and decoded: `Ok(1.0)` when it
    /// can, otherwise the same `Failed` or `Skipped` a comparison with
    /// it would report.
    fn check_readable(&self, _reference: &str) -> MetricOutcome {
        MetricOutcome::Ok(1.0)
    }
}

/// Cache occupancy snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    /// Cached image byte buffers.
    pub bytes: usize,
    /// Cached histograms.
    pub histograms: usize,
    /// Cached edge maps.
    pub edge_maps: usize,
    /// Entries evicted across all caches.
    pub evictions: u64,
}

/// Why a feature could not be extracted for one reference.
#[derive(Debug)]
enum FeatureError {
    Load(ImageLoadError),
    Extract(ExtractError),
}

impl FeatureError {
    const fn is_cross_origin(&self) -> bool {
        matches!(self, Self::Load(e) if e.is_cross_origin())
    }

    fn into_outcome(self) -> MetricOutcome {
        match self {
            Self::Load(e) if e.is_cross_origin() => MetricOutcome::Skipped(e.to_string()),
            Self::Load(e) => MetricOutcome::Failed(MetricFailure::Load(e.to_string())),
            Self::Extract(e) => MetricOutcome::Failed(e.into()),
        }
    }
}

/// Pick the outcome for a pair where at least one side failed. A hard
/// failure on either side wins over a cross-origin skip.
fn pair<T>(
    a: Result<T, FeatureError>,
    b: Result<T, FeatureError>,
) -> Result<(T, T), MetricOutcome> {
    match (a, b) {
        (Ok(a), Ok(b)) => Ok((a, b)),
        (Err(e), Ok(_)) | (Ok(_), Err(e)) => Err(e.into_outcome()),
        (Err(x), Err(y)) => Err(if x.is_cross_origin() {
            y.into_outcome()
        } else {
            x.into_outcome()
        }),
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn cache_key(reference: &str) -> u64 {
    let mut hasher = SipHasher13::new();
    hasher.write(reference.trim().as_bytes());
    hasher.finish()
}

fn same_reference(a: &str, b: &str) -> bool {
    let a = a.trim();
    !a.is_empty() && a == b.trim()
}

/// Computes similarity metrics between panel images.
pub struct SimilarityCalculator {
    source: Box<dyn ImageSource>,
    codec: Box<dyn RasterCodec>,
    config: CalculatorConfig,
    bytes: Mutex<BoundedCache<u64, Arc<Vec<u8>>>>,
    histograms: Mutex<BoundedCache<u64, Arc<Histogram>>>,
    edge_maps: Mutex<BoundedCache<u64, Arc<EdgeMap>>>,
}

impl std::fmt::Debug for SimilarityCalculator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimilarityCalculator")
            .field("source", &self.source.name())
            .field("codec_available", &self.codec.is_available())
            .field("cache_stats", &self.cache_stats())
            .finish_non_exhaustive()
    }
}

impl SimilarityCalculator {
    /// Build a calculator from explicit capabilities.
    #[must_use]
    pub fn new(
        source: Box<dyn ImageSource>,
        codec: Box<dyn RasterCodec>,
        config: CalculatorConfig,
    ) -> Self {
        Self {
            bytes: Mutex::new(BoundedCache::new(config.byte_cache_capacity)),
            histograms: Mutex::new(BoundedCache::new(config.histogram_cache_capacity)),
            edge_maps: Mutex::new(BoundedCache::new(config.edge_cache_capacity)),
            source,
            codec,
            config,
        }
    }

    /// Build a calculator whose image source is selected once from the
    /// config and environment, decoding with the `image` crate.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Source`] if the source cannot be built.
    pub fn from_config(config: &CalculatorConfig) -> Result<Self, EngineError> {
        let kind = config.image_source_kind();
        let source = kind.build(config.fetch_timeout, config.max_response_bytes)?;
        tracing::debug!(source = source.name(), "selected image source");
        Ok(Self::new(
            source,
            Box::new(RasterCodecKind::default()),
            config.clone(),
        ))
    }

    /// The calculator's configuration.
    #[must_use]
    pub const fn config(&self) -> &CalculatorConfig {
        &self.config
    }

    /// The raster codec capability.
    #[must_use]
    pub fn codec(&self) -> &dyn RasterCodec {
        self.codec.as_ref()
    }

    /// Name of the active image source.
    #[must_use]
    pub fn source_name(&self) -> &'static str {
        self.source.name()
    }

    /// Load the bytes behind `reference`, through the bytes cache.
    ///
    /// # Errors
    ///
    /// Returns the source's [`ImageLoadError`]. Failures are not cached.
    pub fn load_bytes(&self, reference: &str) -> Result<Arc<Vec<u8>>, ImageLoadError> {
        let key = cache_key(reference);
        if let Some(hit) = lock(&self.bytes).get(&key) {
            return Ok(Arc::clone(hit));
        }
        let bytes = Arc::new(self.source.load(reference).inspect_err(|e| {
            tracing::debug!(
                reference = %describe_reference(reference),
                error = %e,
                "image load failed"
            );
        })?);
        lock(&self.bytes).insert(key, Arc::clone(&bytes));
        Ok(bytes)
    }

    fn histogram(&self, reference: &str) -> Result<Arc<Histogram>, FeatureError> {
        let key = cache_key(reference);
        if let Some(hit) = lock(&self.histograms).get(&key) {
            return Ok(Arc::clone(hit));
        }
        let bytes = self.load_bytes(reference).map_err(FeatureError::Load)?;
        let histogram = Arc::new(
            extract_histogram(self.codec(), &bytes, self.config.histogram_max_side)
                .map_err(FeatureError::Extract)?,
        );
        lock(&self.histograms).insert(key, Arc::clone(&histogram));
        Ok(histogram)
    }

    fn edge_map(&self, reference: &str) -> Result<Arc<EdgeMap>, FeatureError> {
        let key = cache_key(reference);
        if let Some(hit) = lock(&self.edge_maps).get(&key) {
            return Ok(Arc::clone(hit));
        }
        let bytes = self.load_bytes(reference).map_err(FeatureError::Load)?;
        let map = Arc::new(
            extract_edge_map(self.codec(), &bytes, self.config.edge_map_side)
                .map_err(FeatureError::Extract)?,
        );
        lock(&self.edge_maps).insert(key, Arc::clone(&map));
        Ok(map)
    }

    fn bytes_pair(&self, a: &str, b: &str) -> Result<(Arc<Vec<u8>>, Arc<Vec<u8>>), MetricOutcome> {
        pair(
            self.load_bytes(a).map_err(FeatureError::Load),
            self.load_bytes(b).map_err(FeatureError::Load),
        )
    }

    /// Perceptual-hash similarity (`1 - distance / 64`).
    #[must_use]
    pub fn phash_similarity(&self, reference: &str, candidate: &str) -> MetricOutcome {
        if same_reference(reference, candidate) {
            return MetricOutcome::Ok(1.0);
        }
        let (a, b) = match self.bytes_pair(reference, candidate) {
            Ok(bytes) => bytes,
            Err(outcome) => return outcome,
        };
        match (extract_phash(self.codec(), &a), extract_phash(self.codec(), &b)) {
            (Ok(ha), Ok(hb)) => MetricOutcome::scored(ha.similarity(hb)),
            (Err(e), _) | (_, Err(e)) => MetricOutcome::Failed(e.into()),
        }
    }

    /// SSIM on the configured square grid.
    #[must_use]
    pub fn ssim_similarity(&self, reference: &str, candidate: &str) -> MetricOutcome {
        if same_reference(reference, candidate) {
            return MetricOutcome::Ok(1.0);
        }
        let (a, b) = match self.bytes_pair(reference, candidate) {
            Ok(bytes) => bytes,
            Err(outcome) => return outcome,
        };
        match ssim_similarity(self.codec(), &a, &b, self.config.ssim_side) {
            Ok(score) => MetricOutcome::scored(score),
            Err(SsimError::Extract(e)) => MetricOutcome::Failed(e.into()),
            Err(SsimError::Kernel(message)) => {
                MetricOutcome::Failed(MetricFailure::Computation(message))
            }
        }
    }

    /// Drop every cached entry.
    pub fn clear_caches(&self) {
        lock(&self.bytes).clear();
        lock(&self.histograms).clear();
        lock(&self.edge_maps).clear();
    }

    /// Current cache occupancy.
    #[must_use]
    pub fn cache_stats(&self) -> CacheStats {
        let bytes = lock(&self.bytes);
        let histograms = lock(&self.histograms);
        let edge_maps = lock(&self.edge_maps);
        CacheStats {
            bytes: bytes.len(),
            histograms: histograms.len(),
            edge_maps: edge_maps.len(),
            evictions: bytes.evictions() + histograms.evictions() + edge_maps.evictions(),
        }
    }
}

impl PanelComparator for SimilarityCalculator {
    fn histogram_similarity(&self, reference: &str, candidate: &str) -> MetricOutcome {
        if same_reference(reference, candidate) {
            return MetricOutcome::Ok(1.0);
        }
        match pair(self.histogram(reference), self.histogram(candidate)) {
            Ok((a, b)) => MetricOutcome::scored(histogram_similarity(&a, &b)),
            Err(outcome) => outcome,
        }
    }

    fn structural_similarity(&self, reference: &str, candidate: &str) -> MetricOutcome {
        if same_reference(reference, candidate) {
            return MetricOutcome::Ok(1.0);
        }
        match pair(self.edge_map(reference), self.edge_map(candidate)) {
            Ok((a, b)) => {
                MetricOutcome::scored(structural_score(&a, &b, &self.config.penalties).score)
            }
            Err(outcome) => outcome,
        }
    }

    fn combined_similarity(&self, reference: &str, candidate: &str) -> SimilarityResult {
        if same_reference(reference, candidate) {
            return SimilarityResult::identical();
        }
        let histogram = self.histogram_similarity(reference, candidate);
        let phash = self.phash_similarity(reference, candidate);
        let ssim = self.ssim_similarity(reference, candidate);
        let result = combine(&self.config.combined, phash, ssim, histogram);
        tracing::debug!(
            reference = %describe_reference(reference),
            candidate = %describe_reference(candidate),
            outcome = ?result.outcome,
            "combined similarity"
        );
        result
    }

    fn check_readable(&self, reference: &str) -> MetricOutcome {
        match self.histogram(reference) {
            Ok(_) => MetricOutcome::Ok(1.0),
            Err(e) => e.into_outcome(),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use image::ImageEncoder;
    use xview_io::MemorySource;

    use super::*;

    fn png(img: &image::RgbImage) -> Vec<u8> {
        let mut buf = Vec::new();
        image::codecs::png::PngEncoder::new(&mut buf)
            .write_image(img.as_raw(), img.width(), img.height(), image::ExtendedColorType::Rgb8)
            .unwrap();
        buf
    }

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    fn scene(w: u32, h: u32, shift: f64) -> Vec<u8> {
        png(&image::RgbImage::from_fn(w, h, |x, y| {
            let u = f64::from(x) / f64::from(w);
            let v = f64::from(y) / f64::from(h);
            let l = 128.0
                + 60.0 * (std::f64::consts::TAU * (1.5 * u + shift)).sin()
                + 50.0 * (std::f64::consts::TAU * 2.3 * v).cos();
            let l = l.clamp(0.0, 255.0) as u8;
            image::Rgb([l, l, l])
        }))
    }

    fn checkerboard(w: u32, h: u32) -> Vec<u8> {
        png(&image::RgbImage::from_fn(w, h, |x, y| {
            if (x / 4 + y / 4) % 2 == 0 {
                image::Rgb([0, 0, 0])
            } else {
                image::Rgb([255, 255, 255])
            }
        }))
    }

    struct Blocked;

    impl ImageSource for Blocked {
        fn name(&self) -> &'static str {
            "blocked"
        }

        fn load(&self, _reference: &str) -> Result<Vec<u8>, ImageLoadError> {
            Err(ImageLoadError::CrossOriginBlocked)
        }
    }

    fn calculator(source: MemorySource) -> SimilarityCalculator {
        SimilarityCalculator::new(
            Box::new(source),
            Box::new(RasterCodecKind::ImageCrate),
            CalculatorConfig::default(),
        )
    }

    fn fixture() -> SimilarityCalculator {
        calculator(
            MemorySource::new()
                .with("scene", scene(96, 64, 0.0))
                .with("scene_big", scene(192, 128, 0.0))
                .with("checker", checkerboard(96, 64))
                .with("garbage", vec![1, 2, 3, 4]),
        )
    }

    #[test]
    fn identical_references_short_circuit_without_loading() {
        // Empty source: any load would fail.
        let calc = calculator(MemorySource::new());
        assert_eq!(calc.histogram_similarity("x", "x"), MetricOutcome::Ok(1.0));
        assert_eq!(calc.structural_similarity("x", "x"), MetricOutcome::Ok(1.0));
        let combined = calc.combined_similarity("x", "x");
        assert_eq!(combined.outcome, MetricOutcome::Ok(1.0));
        assert_eq!(calc.cache_stats().bytes, 0);
    }

    #[test]
    fn resized_copy_scores_higher_than_unrelated() {
        let calc = fixture();
        let close = calc.combined_similarity("scene", "scene_big").outcome.score().unwrap();
        let far = calc.combined_similarity("scene", "checker").outcome.score().unwrap();
        assert!(close > far, "close = {close}, far = {far}");
        assert!(close > 0.8, "close = {close}");
    }

    #[test]
    fn metrics_are_symmetric() {
        let calc = fixture();
        let ab = calc.histogram_similarity("scene", "checker").score().unwrap();
        let ba = calc.histogram_similarity("checker", "scene").score().unwrap();
        assert!((ab - ba).abs() < 1e-12);
        let ab = calc.structural_similarity("scene", "checker").score().unwrap();
        let ba = calc.structural_similarity("checker", "scene").score().unwrap();
        assert!((ab - ba).abs() < 1e-12);
    }

    #[test]
    fn missing_image_fails_never_scores() {
        let calc = fixture();
        let outcome = calc.histogram_similarity("scene", "missing");
        assert!(matches!(
            outcome,
            MetricOutcome::Failed(MetricFailure::Load(_))
        ));
        assert!(calc.combined_similarity("scene", "missing").outcome.is_failed());
    }

    #[test]
    fn undecodable_bytes_are_decode_failures() {
        let calc = fixture();
        assert!(matches!(
            calc.structural_similarity("scene", "garbage"),
            MetricOutcome::Failed(MetricFailure::Decode(_))
        ));
    }

    #[test]
    fn cross_origin_block_is_skipped() {
        let calc = SimilarityCalculator::new(
            Box::new(Blocked),
            Box::new(RasterCodecKind::ImageCrate),
            CalculatorConfig::default(),
        );
        assert!(calc.histogram_similarity("a", "b").is_skipped());
        assert!(calc.combined_similarity("a", "b").outcome.is_skipped());
    }

    #[test]
    fn unavailable_codec_is_reported_distinctly() {
        let calc = SimilarityCalculator::new(
            Box::new(MemorySource::new().with("a", scene(8, 8, 0.0)).with("b", scene(8, 8, 0.3))),
            Box::new(RasterCodecKind::Unavailable),
            CalculatorConfig::default(),
        );
        assert_eq!(
            calc.histogram_similarity("a", "b"),
            MetricOutcome::Failed(MetricFailure::CodecUnavailable)
        );
    }

    #[test]
    fn caches_fill_and_clear() {
        let calc = fixture();
        let _ = calc.histogram_similarity("scene", "checker");
        let _ = calc.structural_similarity("scene", "checker");
        let stats = calc.cache_stats();
        assert_eq!(stats.bytes, 2);
        assert_eq!(stats.histograms, 2);
        assert_eq!(stats.edge_maps, 2);
        calc.clear_caches();
        assert_eq!(calc.cache_stats().bytes, 0);
    }

    #[test]
    fn combine_uses_fixed_weights() {
        let result = combine(
            &CombinedWeights::default(),
            MetricOutcome::Ok(1.0),
            MetricOutcome::Ok(0.5),
            MetricOutcome::Ok(0.0),
        );
        let score = result.outcome.score().unwrap();
        assert!((score - 0.65).abs() < 1e-12, "score = {score}");
        assert!(result.notes.is_empty());
    }

    #[test]
    fn combine_falls_back_to_penalized_histogram() {
        let result = combine(
            &CombinedWeights::default(),
            MetricOutcome::Failed(MetricFailure::Computation("boom".into())),
            MetricOutcome::Ok(0.9),
            MetricOutcome::Ok(0.8),
        );
        let score = result.outcome.score().unwrap();
        assert!((score - 0.4).abs() < 1e-12, "score = {score}");
        assert_eq!(result.notes.len(), 1);
    }

    #[test]
    fn combine_failed_histogram_fails() {
        let result = combine(
            &CombinedWeights::default(),
            MetricOutcome::Ok(1.0),
            MetricOutcome::Ok(1.0),
            MetricOutcome::Failed(MetricFailure::CodecUnavailable),
        );
        assert_eq!(
            result.outcome,
            MetricOutcome::Failed(MetricFailure::CodecUnavailable)
        );
    }

    #[test]
    fn combine_skip_wins_over_scores() {
        let result = combine(
            &CombinedWeights::default(),
            MetricOutcome::Skipped("cors".into()),
            MetricOutcome::Ok(1.0),
            MetricOutcome::Ok(1.0),
        );
        assert!(result.outcome.is_skipped());
    }

    #[test]
    fn combine_failed_histogram_wins_over_skip() {
        let result = combine(
            &CombinedWeights::default(),
            MetricOutcome::Skipped("cors".into()),
            MetricOutcome::Skipped("cors".into()),
            MetricOutcome::Failed(MetricFailure::Load("evicted".into())),
        );
        assert_eq!(
            result.outcome,
            MetricOutcome::Failed(MetricFailure::Load("evicted".into()))
        );
    }

    #[test]
    fn readability_check_loads_and_decodes() {
        let calc = fixture();
        assert_eq!(calc.check_readable("scene"), MetricOutcome::Ok(1.0));
        assert!(matches!(
            calc.check_readable("missing"),
            MetricOutcome::Failed(MetricFailure::Load(_))
        ));
        assert!(matches!(
            calc.check_readable("garbage"),
            MetricOutcome::Failed(MetricFailure::Decode(_))
        ));
        assert_eq!(calc.cache_stats().histograms, 1);
    }
}
