//! Structured per-run record.
//!
//! After every validation run one [`RunRecord`] is serialized to JSON
//! and emitted as a `tracing` event on the `xview::run` target. The
//! record names panels by key only; image references never appear in
//! it, so a `data:` URL payload cannot leak into logs.

use serde::{Deserialize, Serialize};

use crate::grouping::PanelGroup;
use crate::report::{Mismatch, ValidationReport};
use crate::strategy::StrategyKind;

/// Per-group slice of a run record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupScore {
    /// The group.
    pub group: PanelGroup,
    /// Members in the group.
    pub panels: usize,
    /// Mean pair score, when anything scored.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub average: Option<f64>,
    /// Whether the group passed.
    pub passed: bool,
}

/// Summary of one run, suitable for log aggregation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    /// Strategy used.
    pub strategy: StrategyKind,
    /// Whether the run passed.
    pub passed: bool,
    /// Overall score.
    pub overall_score: f64,
    /// Hero key, for hero-anchored runs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub anchor: Option<String>,
    /// Panels seen.
    pub panels: usize,
    /// Panels kept as valid.
    pub valid: usize,
    /// Panels recommended for retry.
    pub retry_recommended: usize,
    /// Panels rejected.
    pub rejected: usize,
    /// Warnings raised.
    pub warnings: usize,
    /// Per-group scores.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub groups: Vec<GroupScore>,
    /// Worst failing comparisons.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub worst_mismatches: Vec<Mismatch>,
    /// Run duration.
    pub duration_ms: f64,
    /// Completion time, RFC 3339.
    pub timestamp: String,
}

impl RunRecord {
    /// Summarize a report.
    #[must_use]
    pub fn from_report(report: &ValidationReport) -> Self {
        Self {
            strategy: report.strategy(),
            passed: report.passed(),
            overall_score: report.overall_score(),
            anchor: report.anchor().map(ToString::to_string),
            panels: report.panels().len(),
            valid: report.valid().len(),
            retry_recommended: report.retry_recommended().len(),
            rejected: report.rejected().len(),
            warnings: report.warnings().len(),
            groups: report
                .groups()
                .iter()
                .map(|g| GroupScore {
                    group: g.group,
                    panels: g.members.len(),
                    average: g.average,
                    passed: g.passed,
                })
                .collect(),
            worst_mismatches: report.worst_mismatches().to_vec(),
            duration_ms: report.duration_ms(),
            timestamp: report.timestamp().to_string(),
        }
    }
}

/// Emit `record` on the `xview::run` target.
pub fn emit(record: &RunRecord) {
    match serde_json::to_string(record) {
        Ok(json) => tracing::info!(
            target: "xview::run",
            strategy = record.strategy.label(),
            passed = record.passed,
            overall = record.overall_score,
            record = %json,
            "validation run complete"
        ),
        Err(e) => tracing::warn!(target: "xview::run", error = %e, "run record not serializable"),
    }
}
