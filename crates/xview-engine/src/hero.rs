//! Hero-anchored validation: every panel is compared with the hero.
//!
//! Panel score = `w_h * histogram + w_s * structural + w_p * prompt`,
//! where `prompt` is 1 when the prompt passes the building-type check
//! and 0 otherwise. Scores below `reject_below` are rejected, scores at
//! or above `valid_from` are valid, and the band between is
//! retry-recommended.
//!
//! A cross-origin skip counts as a perfect score. A failed metric
//! rejects the panel and keeps it out of the overall average.

use xview_metrics::MetricOutcome;

use crate::calculator::{MetricBreakdown, PanelComparator};
use crate::config::HeroPolicy;
use crate::error::EngineError;
use crate::panel::{Panel, ValidationInput};
use crate::pool::map_bounded;
use crate::prompt_check::{check_prompt, resolve_building_type};
use crate::report::{PanelResult, PanelStatus, ReportBuilder, ValidationReport, round_score};
use crate::strategy::{StrategyKind, ValidationStrategy};

/// The hero-anchored strategy.
#[derive(Debug, Clone)]
pub struct HeroAnchored {
    policy: HeroPolicy,
    workers: usize,
}

struct Judged {
    result: PanelResult,
    warning: Option<String>,
}

impl HeroAnchored {
    /// Strategy with `policy`, comparing up to `workers` panels at once.
    #[must_use]
    pub const fn new(policy: HeroPolicy, workers: usize) -> Self {
        Self { policy, workers }
    }

    /// Status for a computed panel score.
    #[must_use]
    pub fn status_for(&self, score: f64) -> PanelStatus {
        if score < self.policy.reject_below {
            PanelStatus::Rejected
        } else if score >= self.policy.valid_from {
            PanelStatus::Valid
        } else {
            PanelStatus::RetryRecommended
        }
    }

    fn judge(
        &self,
        hero: &Panel,
        key: &str,
        panel: &Panel,
        input: &ValidationInput<'_>,
        comparator: &dyn PanelComparator,
    ) -> Judged {
        let histogram = comparator.histogram_similarity(&hero.url, &panel.url);
        let structural = comparator.structural_similarity(&hero.url, &panel.url);
        let building_type =
            resolve_building_type(input.project.building_type.as_deref(), input.master_dna);
        let prompt = check_prompt(
            panel.prompt.as_deref(),
            building_type,
            input.project.building_program.as_ref(),
        );

        let mut result = PanelResult {
            breakdown: MetricBreakdown {
                histogram: Some(histogram.clone()),
                structural: Some(structural.clone()),
                ..MetricBreakdown::default()
            },
            threshold: Some(self.policy.valid_from),
            ..PanelResult::new(key, PanelStatus::Valid)
        };
        if !prompt.valid {
            result.notes.push(format!(
                "prompt contradicts building type: {}",
                prompt.violations.join(", ")
            ));
        }
        result.prompt = Some(prompt.clone());

        let mut warning = None;
        match (&histogram, &structural) {
            (MetricOutcome::Failed(failure), _) | (_, MetricOutcome::Failed(failure)) => {
                result.status = PanelStatus::ComparisonFailed;
                result.reason = Some(format!("comparison failed: {failure}"));
                if failure.is_unavailable() {
                    warning = Some(format!("{key}: metric unavailable ({failure})"));
                }
            }
            (MetricOutcome::Skipped(reason), _) | (_, MetricOutcome::Skipped(reason)) => {
                result.status = PanelStatus::CorsSkipped;
                result.score = Some(1.0);
                result.notes.push(reason.clone());
                warning = Some(format!(
                    "{key}: image blocked cross-origin, counted as passing"
                ));
            }
            (MetricOutcome::Ok(h), MetricOutcome::Ok(s)) => {
                let p = if prompt.valid { 1.0 } else { 0.0 };
                let raw = self.policy.prompt_weight.mul_add(
                    p,
                    self.policy
                        .histogram_weight
                        .mul_add(*h, self.policy.structural_weight * s),
                );
                let score = round_score(raw.clamp(0.0, 1.0));
                result.score = Some(score);
                result.status = self.status_for(score);
                if result.status == PanelStatus::Rejected {
                    result.reason = Some(format!(
                        "score {score:.3} below {:.2}",
                        self.policy.reject_below
                    ));
                }
            }
        }
        Judged { result, warning }
    }
}

impl ValidationStrategy for HeroAnchored {
    fn kind(&self) -> StrategyKind {
        StrategyKind::HeroAnchored
    }

    fn validate(
        &self,
        input: &ValidationInput<'_>,
        comparator: &dyn PanelComparator,
    ) -> Result<ValidationReport, EngineError> {
        let Some((hero_key, hero)) = self
            .policy
            .hero_keys
            .iter()
            .find_map(|k| input.panels.get_key_value(k.as_str()))
        else {
            return Err(EngineError::NoHeroAnchor(self.policy.hero_keys.clone()));
        };

        let mut builder = ReportBuilder::new(self.kind());
        builder.anchor(hero_key.clone());
        builder.push(PanelResult {
            score: Some(1.0),
            ..PanelResult::new(hero_key.clone(), PanelStatus::HeroAnchor)
        });

        let others: Vec<(&String, &Panel)> =
            input.panels.iter().filter(|(k, _)| *k != hero_key).collect();
        tracing::debug!(hero = %hero_key, panels = others.len(), "hero-anchored validation");

        let judged = map_bounded(&others, self.workers, |(key, panel)| {
            self.judge(hero, key, panel, input, comparator)
        });

        let mut scores = Vec::with_capacity(judged.len());
        let mut any_rejected = false;
        for Judged { result, warning } in judged {
            if let Some(warning) = warning {
                builder.warn(warning);
            }
            if result.status != PanelStatus::ComparisonFailed
                && let Some(score) = result.score
            {
                scores.push(score);
            }
            any_rejected |= matches!(
                result.status,
                PanelStatus::Rejected | PanelStatus::ComparisonFailed
            );
            builder.push(result);
        }

        let overall = if others.is_empty() {
            builder.warn("no panels besides the hero; nothing to compare");
            1.0
        } else if scores.is_empty() {
            0.0
        } else {
            #[allow(clippy::cast_precision_loss)]
            let n = scores.len() as f64;
            round_score(scores.iter().sum::<f64>() / n)
        };
        let passed = !any_rejected && overall >= self.policy.pass_floor;
        Ok(builder.finish(overall, passed))
    }
}
