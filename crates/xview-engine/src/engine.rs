//! The engine façade: one calculator, one config, every validator.

use xview_io::DiffArtifactWriter;

use crate::calculator::SimilarityCalculator;
use crate::config::EngineConfig;
use crate::dual_metric::{DualMetricReport, DualMetricValidator};
use crate::error::EngineError;
use crate::panel::{PanelMap, ValidationInput};
use crate::rejection::{RejectionOutcome, apply_rejections};
use crate::report::ValidationReport;
use crate::strategy::StrategyKind;

/// Runs validations against a shared [`SimilarityCalculator`].
///
/// Caches persist across runs on the same engine; call
/// [`clear_caches`](Self::clear_caches) between unrelated panel sets.
#[derive(Debug)]
pub struct ConsistencyEngine {
    config: EngineConfig,
    calculator: SimilarityCalculator,
    artifacts: Option<DiffArtifactWriter>,
}

impl ConsistencyEngine {
    /// Validate `config` and build an engine whose image source is
    /// selected from the config and environment.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidConfig`] for out-of-range values
    /// and [`EngineError::Source`] if the image source cannot be built.
    pub fn new(config: EngineConfig) -> Result<Self, EngineError> {
        config.validate()?;
        let calculator = SimilarityCalculator::from_config(&config.calculator)?;
        Ok(Self {
            config,
            calculator,
            artifacts: None,
        })
    }

    /// Build an engine around an existing calculator. The calculator's
    /// own config governs feature extraction.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidConfig`] for out-of-range values.
    pub fn with_calculator(
        config: EngineConfig,
        calculator: SimilarityCalculator,
    ) -> Result<Self, EngineError> {
        config.validate()?;
        Ok(Self {
            config,
            calculator,
            artifacts: None,
        })
    }

    /// Write dual-metric diff images with `writer`.
    #[must_use]
    pub fn with_artifacts(mut self, writer: DiffArtifactWriter) -> Self {
        self.artifacts = Some(writer);
        self
    }

    /// The engine's configuration.
    #[must_use]
    pub const fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// The shared calculator.
    #[must_use]
    pub const fn calculator(&self) -> &SimilarityCalculator {
        &self.calculator
    }

    /// Run `strategy` over `input`.
    ///
    /// # Errors
    ///
    /// Returns an [`EngineError`] when the strategy cannot run on this
    /// input at all.
    pub fn validate(
        &self,
        strategy: StrategyKind,
        input: &ValidationInput<'_>,
    ) -> Result<ValidationReport, EngineError> {
        tracing::debug!(
            strategy = strategy.label(),
            panels = input.panels.len(),
            source = self.calculator.source_name(),
            "starting validation"
        );
        strategy.validate(&self.config, input, &self.calculator)
    }

    /// Run the dual-metric check for `design_id`.
    #[must_use]
    pub fn validate_dual_metric(&self, panels: &PanelMap, design_id: &str) -> DualMetricReport {
        let mut validator = DualMetricValidator::new(
            self.config.dual_metric.clone(),
            self.config.calculator.workers,
        );
        if let Some(writer) = &self.artifacts {
            validator = validator.with_artifacts(writer.clone());
        }
        validator.validate(panels, design_id, &self.calculator)
    }

    /// Drop the panels `report` rejected and decide on regeneration.
    #[must_use]
    pub fn apply_rejections(&self, panels: &PanelMap, report: &ValidationReport) -> RejectionOutcome {
        apply_rejections(panels, report, &self.config.rejection)
    }

    /// Drop every cached image and feature.
    pub fn clear_caches(&self) {
        self.calculator.clear_caches();
    }
}
