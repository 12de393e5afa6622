//! Drop rejected panels and decide whether to regenerate the whole set.

use serde::{Deserialize, Serialize};

use crate::config::RejectionPolicy;
use crate::panel::PanelMap;
use crate::report::ValidationReport;

/// Result of applying a report's rejections to a panel map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RejectionOutcome {
    /// The input map without rejected panels, order preserved.
    pub kept: PanelMap,
    /// Keys removed.
    pub removed: Vec<String>,
    /// Kept keys worth regenerating individually.
    pub retry: Vec<String>,
    /// Rejected panels as a fraction of judged panels.
    pub rejected_fraction: f64,
    /// Whether the whole set should be regenerated.
    pub regenerate: bool,
    /// Why `regenerate` was set.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub reasons: Vec<String>,
}

/// Remove the panels `report` rejected and decide whether the set is
/// worth keeping at all.
///
/// The set should be regenerated when more than
/// `policy.max_rejected_fraction` of judged panels were rejected, or
/// when the overall score is below `policy.min_overall_score`.
#[must_use]
pub fn apply_rejections(
    panels: &PanelMap,
    report: &ValidationReport,
    policy: &RejectionPolicy,
) -> RejectionOutcome {
    let removed: Vec<String> = report
        .rejected_keys()
        .filter(|k| panels.contains_key(*k))
        .map(ToString::to_string)
        .collect();
    let kept: PanelMap = panels
        .iter()
        .filter(|(k, _)| !removed.contains(*k))
        .map(|(k, p)| (k.clone(), p.clone()))
        .collect();

    let judged = report.judged_count();
    #[allow(clippy::cast_precision_loss)]
    let rejected_fraction = if judged == 0 {
        0.0
    } else {
        report.rejected().len() as f64 / judged as f64
    };

    let mut reasons = Vec::new();
    if rejected_fraction > policy.max_rejected_fraction {
        reasons.push(format!(
            "{:.0}% of panels rejected (limit {:.0}%)",
            rejected_fraction * 100.0,
            policy.max_rejected_fraction * 100.0
        ));
    }
    if report.overall_score() < policy.min_overall_score {
        reasons.push(format!(
            "overall score {:.3} below {:.2}",
            report.overall_score(),
            policy.min_overall_score
        ));
    }
    let regenerate = !reasons.is_empty();
    if regenerate {
        tracing::warn!(reasons = %reasons.join("; "), "full regeneration recommended");
    } else if !removed.is_empty() {
        tracing::info!(removed = removed.len(), "rejected panels dropped");
    }

    RejectionOutcome {
        kept,
        removed,
        retry: report.retry_recommended().to_vec(),
        rejected_fraction,
        regenerate,
        reasons,
    }
}
