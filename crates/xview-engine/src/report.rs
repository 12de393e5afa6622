//! Validation report: per-panel verdicts and the run summary.
//!
//! A [`ValidationReport`] is built once by a strategy and is read-only
//! afterwards. Every panel except the hero lands in exactly one of the
//! valid, retry-recommended and rejected lists; [`ReportBuilder`] owns
//! that routing so strategies only decide each panel's [`PanelStatus`].

use serde::{Deserialize, Serialize};
use web_time::Instant;

use crate::calculator::MetricBreakdown;
use crate::grouping::PanelGroup;
use crate::observability::{self, RunRecord};
use crate::prompt_check::PromptCheck;
use crate::strategy::StrategyKind;

/// Verdict for one panel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PanelStatus {
    /// The hero panel other panels were compared against.
    HeroAnchor,
    /// First member of a group, the reference for the rest of it.
    GroupAnchor,
    /// Image could not be read cross-origin; treated as passing.
    CorsSkipped,
    /// A metric could not be computed; treated as rejected.
    ComparisonFailed,
    /// Score at or above the valid threshold.
    Valid,
    /// Score between the reject and valid thresholds.
    RetryRecommended,
    /// Score below the reject threshold.
    Rejected,
    /// Panel was not compared (metadata, unknown or lone group member).
    NotCompared,
}

impl PanelStatus {
    /// The bucket this status lands in. `None` for the hero.
    #[must_use]
    pub const fn disposition(self) -> Option<Disposition> {
        match self {
            Self::HeroAnchor => None,
            Self::GroupAnchor | Self::CorsSkipped | Self::Valid | Self::NotCompared => {
                Some(Disposition::Valid)
            }
            Self::RetryRecommended => Some(Disposition::RetryRecommended),
            Self::ComparisonFailed | Self::Rejected => Some(Disposition::Rejected),
        }
    }
}

/// The three buckets non-hero panels are partitioned into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Disposition {
    /// Kept.
    Valid,
    /// Kept, but regenerating is advised.
    RetryRecommended,
    /// Dropped.
    Rejected,
}

/// Everything known about one panel after validation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PanelResult {
    /// Panel key.
    pub key: String,
    /// Verdict.
    pub status: PanelStatus,
    /// Group, for group-based runs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<PanelGroup>,
    /// Final score, when one was computed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
    /// Threshold the score was judged against.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub threshold: Option<f64>,
    /// Per-metric outcomes.
    #[serde(default)]
    pub breakdown: MetricBreakdown,
    /// Prompt vocabulary check, for hero-anchored runs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt: Option<PromptCheck>,
    /// Why the panel was rejected or not judged.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Diagnostics.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub notes: Vec<String>,
}

impl PanelResult {
    /// A result with only a key and a status.
    #[must_use]
    pub fn new(key: impl Into<String>, status: PanelStatus) -> Self {
        Self {
            key: key.into(),
            status,
            group: None,
            score: None,
            threshold: None,
            breakdown: MetricBreakdown::default(),
            prompt: None,
            reason: None,
            notes: Vec::new(),
        }
    }
}

/// A rejected panel and why.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rejection {
    /// Panel key.
    pub key: String,
    /// Human-readable reason.
    pub reason: String,
}

/// Outcome for one group of a group-based run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupSummary {
    /// The group.
    pub group: PanelGroup,
    /// Member keys in panel-map order.
    pub members: Vec<String>,
    /// Anchor, when the group was compared.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub anchor: Option<String>,
    /// Mean score of the compared pairs. `None` when nothing scored.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub average: Option<f64>,
    /// Pairs compared against the anchor.
    pub compared: usize,
    /// Whether every compared pair cleared its threshold.
    pub passed: bool,
    /// Why the group was not compared.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

/// A failing comparison, kept for diagnosis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mismatch {
    /// Group of the pair.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<PanelGroup>,
    /// Reference panel key.
    pub anchor: String,
    /// Compared panel key.
    pub panel: String,
    /// Score; `None` when the comparison failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
    /// Threshold the pair was held to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub threshold: Option<f64>,
    /// Per-metric outcomes.
    pub breakdown: MetricBreakdown,
}

/// Result of one validation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
    strategy: StrategyKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    anchor: Option<String>,
    passed: bool,
    overall_score: f64,
    valid: Vec<String>,
    retry_recommended: Vec<String>,
    rejected: Vec<Rejection>,
    panels: Vec<PanelResult>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    groups: Vec<GroupSummary>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    worst_mismatches: Vec<Mismatch>,
    warnings: Vec<String>,
    timestamp: String,
    duration_ms: f64,
}

impl ValidationReport {
    /// Strategy that produced the report.
    #[must_use]
    pub const fn strategy(&self) -> StrategyKind {
        self.strategy
    }

    /// Hero key, for hero-anchored runs.
    #[must_use]
    pub fn anchor(&self) -> Option<&str> {
        self.anchor.as_deref()
    }

    /// Whether the run passed.
    #[must_use]
    pub const fn passed(&self) -> bool {
        self.passed
    }

    /// Overall consistency score in [0, 1].
    #[must_use]
    pub const fn overall_score(&self) -> f64 {
        self.overall_score
    }

    /// Keys kept as valid.
    #[must_use]
    pub fn valid(&self) -> &[String] {
        &self.valid
    }

    /// Keys kept but worth regenerating.
    #[must_use]
    pub fn retry_recommended(&self) -> &[String] {
        &self.retry_recommended
    }

    /// Rejected keys with reasons.
    #[must_use]
    pub fn rejected(&self) -> &[Rejection] {
        &self.rejected
    }

    /// Rejected keys only.
    pub fn rejected_keys(&self) -> impl Iterator<Item = &str> {
        self.rejected.iter().map(|r| r.key.as_str())
    }

    /// Number of panels placed in a bucket (every panel but the hero).
    #[must_use]
    pub fn judged_count(&self) -> usize {
        self.valid.len() + self.retry_recommended.len() + self.rejected.len()
    }

    /// Per-panel results in panel-map order.
    #[must_use]
    pub fn panels(&self) -> &[PanelResult] {
        &self.panels
    }

    /// Result for one key.
    #[must_use]
    pub fn panel(&self, key: &str) -> Option<&PanelResult> {
        self.panels.iter().find(|p| p.key == key)
    }

    /// Group summaries, for group-based runs.
    #[must_use]
    pub fn groups(&self) -> &[GroupSummary] {
        &self.groups
    }

    /// Groups that were compared and did not pass.
    pub fn failed_groups(&self) -> impl Iterator<Item = PanelGroup> + '_ {
        self.groups
            .iter()
            .filter(|g| g.compared > 0 && !g.passed)
            .map(|g| g.group)
    }

    /// Worst failing comparisons, worst first.
    #[must_use]
    pub fn worst_mismatches(&self) -> &[Mismatch] {
        &self.worst_mismatches
    }

    /// Warnings raised during the run.
    #[must_use]
    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    /// RFC 3339 completion time.
    #[must_use]
    pub fn timestamp(&self) -> &str {
        &self.timestamp
    }

    /// Wall-clock duration of the run.
    #[must_use]
    pub const fn duration_ms(&self) -> f64 {
        self.duration_ms
    }

    /// Pretty-printed JSON.
    ///
    /// # Errors
    ///
    /// Returns a [`serde_json::Error`] if serialization fails.
    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// The structured run record emitted after each run.
    #[must_use]
    pub fn run_record(&self) -> RunRecord {
        RunRecord::from_report(self)
    }
}

/// Accumulates panel results and routes them into buckets.
#[derive(Debug)]
pub struct ReportBuilder {
    strategy: StrategyKind,
    anchor: Option<String>,
    panels: Vec<PanelResult>,
    valid: Vec<String>,
    retry_recommended: Vec<String>,
    rejected: Vec<Rejection>,
    groups: Vec<GroupSummary>,
    worst_mismatches: Vec<Mismatch>,
    warnings: Vec<String>,
    started: Instant,
}

impl ReportBuilder {
    /// Start a report; the run's clock starts now.
    #[must_use]
    pub fn new(strategy: StrategyKind) -> Self {
        Self {
            strategy,
            anchor: None,
            panels: Vec::new(),
            valid: Vec::new(),
            retry_recommended: Vec::new(),
            rejected: Vec::new(),
            groups: Vec::new(),
            worst_mismatches: Vec::new(),
            warnings: Vec::new(),
            started: Instant::now(),
        }
    }

    /// Record the hero key.
    pub fn anchor(&mut self, key: impl Into<String>) {
        self.anchor = Some(key.into());
    }

    /// Add one panel result, placing its key in the matching bucket.
    pub fn push(&mut self, result: PanelResult) {
        match result.status.disposition() {
            None => {}
            Some(Disposition::Valid) => self.valid.push(result.key.clone()),
            Some(Disposition::RetryRecommended) => {
                self.retry_recommended.push(result.key.clone());
            }
            Some(Disposition::Rejected) => {
                let reason = result.reason.clone().unwrap_or_else(|| match result.score {
                    Some(score) => format!("score {score:.3} below threshold"),
                    None => "rejected".to_string(),
                });
                self.rejected.push(Rejection {
                    key: result.key.clone(),
                    reason,
                });
            }
        }
        self.panels.push(result);
    }

    /// Record a warning.
    pub fn warn(&mut self, message: impl Into<String>) {
        let message = message.into();
        tracing::warn!("{message}");
        self.warnings.push(message);
    }

    /// Add a group summary.
    pub fn group(&mut self, summary: GroupSummary) {
        self.groups.push(summary);
    }

    /// Set the worst mismatches.
    pub fn worst_mismatches(&mut self, mismatches: Vec<Mismatch>) {
        self.worst_mismatches = mismatches;
    }

    /// Freeze the report and emit its run record.
    #[must_use]
    pub fn finish(self, overall_score: f64, passed: bool) -> ValidationReport {
        let report = ValidationReport {
            strategy: self.strategy,
            anchor: self.anchor,
            passed,
            overall_score,
            valid: self.valid,
            retry_recommended: self.retry_recommended,
            rejected: self.rejected,
            panels: self.panels,
            groups: self.groups,
            worst_mismatches: self.worst_mismatches,
            warnings: self.warnings,
            timestamp: chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
            duration_ms: self.started.elapsed().as_secs_f64() * 1000.0,
        };
        observability::emit(&report.run_record());
        report
    }
}

/// Round a score to six decimals so threshold comparisons are not
/// decided by floating-point noise from the weighted sums.
#[must_use]
pub fn round_score(score: f64) -> f64 {
    (score * 1e6).round() / 1e6
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn scored(key: &str, status: PanelStatus, score: f64) -> PanelResult {
        PanelResult {
            score: Some(score),
            ..PanelResult::new(key, status)
        }
    }

    #[test]
    fn every_non_hero_panel_lands_in_one_bucket() {
        let mut b = ReportBuilder::new(StrategyKind::HeroAnchored);
        b.anchor("hero_3d");
        b.push(PanelResult::new("hero_3d", PanelStatus::HeroAnchor));
        b.push(scored("a", PanelStatus::Valid, 0.9));
        b.push(scored("b", PanelStatus::RetryRecommended, 0.75));
        b.push(scored("c", PanelStatus::Rejected, 0.2));
        b.push(PanelResult::new("d", PanelStatus::CorsSkipped));
        b.push(PanelResult {
            reason: Some("comparison failed: load".into()),
            ..PanelResult::new("e", PanelStatus::ComparisonFailed)
        });
        let report = b.finish(0.6, false);

        assert_eq!(report.valid(), ["a", "d"]);
        assert_eq!(report.retry_recommended(), ["b"]);
        let rejected: Vec<&str> = report.rejected_keys().collect();
        assert_eq!(rejected, ["c", "e"]);
        assert_eq!(report.judged_count(), 5);
        assert_eq!(report.panels().len(), 6);
        assert_eq!(report.rejected()[0].reason, "score 0.200 below threshold");
        assert_eq!(report.rejected()[1].reason, "comparison failed: load");
    }

    #[test]
    fn json_uses_snake_case_statuses() {
        let mut b = ReportBuilder::new(StrategyKind::GroupBased);
        b.push(scored("a", PanelStatus::RetryRecommended, 0.6));
        let json = b.finish(0.6, false).to_json_pretty().unwrap();
        assert!(json.contains("\"retry_recommended\""), "{json}");
        assert!(json.contains("\"group_based\""), "{json}");
    }

    #[test]
    fn report_round_trips_through_json() {
        let mut b = ReportBuilder::new(StrategyKind::HeroAnchored);
        b.push(scored("a", PanelStatus::Valid, 0.9));
        b.warn("something odd");
        let report = b.finish(0.9, true);
        let back: ValidationReport =
            serde_json::from_str(&report.to_json_pretty().unwrap()).unwrap();
        assert_eq!(back.valid(), report.valid());
        assert_eq!(back.warnings(), ["something odd"]);
        assert_eq!(back.strategy(), StrategyKind::HeroAnchored);
        assert!(back.passed());
    }

    #[test]
    fn rounding_absorbs_float_noise() {
        let noisy = 0.5f64.mul_add(0.8, 0.3 * 0.0) + 0.2 * 1.5;
        assert!((round_score(noisy) - 0.7).abs() < f64::EPSILON);
        assert!((round_score(0.700_000_000_01) - 0.7).abs() < f64::EPSILON);
    }
}
