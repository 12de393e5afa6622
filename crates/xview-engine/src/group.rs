//! Group-based validation: panels are compared only within their group.
//!
//! The first member of each comparable group (panel-map order) whose
//! image can be read is the group's anchor. Unreadable members before
//! it are comparison failures and fail the group. Every later member is
//! scored against the anchor with the combined scorer and held to the
//! pair's threshold. Below the
//! threshold but at or above `reject_floor` is retry-recommended; lower
//! is rejected.
//!
//! METADATA and UNKNOWN panels, and groups with a single member, are not
//! compared. They are kept as valid and reported with a warning.
//!
//! The overall score is the mean of the group averages, weighted by the
//! number of panels in each group.

use indexmap::IndexMap;
use xview_metrics::MetricOutcome;

use crate::calculator::{MetricBreakdown, PanelComparator, SimilarityResult};
use crate::config::GroupPolicy;
use crate::error::EngineError;
use crate::grouping::{PanelGroup, ViewKind, partition};
use crate::panel::{Panel, ValidationInput};
use crate::pool::map_bounded;
use crate::report::{
    GroupSummary, Mismatch, PanelResult, PanelStatus, ReportBuilder, ValidationReport, round_score,
};
use crate::strategy::{StrategyKind, ValidationStrategy};

/// The group-based strategy.
#[derive(Debug, Clone)]
pub struct GroupBased {
    policy: GroupPolicy,
    workers: usize,
}

struct PairJob<'a> {
    group: PanelGroup,
    anchor_key: &'a str,
    anchor: &'a Panel,
    key: &'a str,
    panel: &'a Panel,
    threshold: f64,
}

#[derive(Default)]
struct GroupTally {
    anchor: Option<String>,
    sum: f64,
    scored: usize,
    compared: usize,
    passed: bool,
}

impl GroupBased {
    /// Strategy with `policy`, comparing up to `workers` pairs at once.
    #[must_use]
    pub const fn new(policy: GroupPolicy, workers: usize) -> Self {
        Self { policy, workers }
    }

    /// Status for a pair score held to `threshold`.
    #[must_use]
    pub fn status_for(&self, score: f64, threshold: f64) -> PanelStatus {
        if score >= threshold {
            PanelStatus::Valid
        } else if score >= self.policy.reject_floor {
            PanelStatus::RetryRecommended
        } else {
            PanelStatus::Rejected
        }
    }

    fn not_compared(builder: &mut ReportBuilder, group: PanelGroup, members: &[String], note: &str) {
        for key in members {
            builder.push(PanelResult {
                group: Some(group),
                reason: Some(note.to_string()),
                ..PanelResult::new(key.clone(), PanelStatus::NotCompared)
            });
        }
        builder.warn(format!(
            "{} {group} panel(s) not compared: {note}",
            members.len()
        ));
        builder.group(GroupSummary {
            group,
            members: members.to_vec(),
            anchor: None,
            average: None,
            compared: 0,
            passed: true,
            note: Some(note.to_string()),
        });
    }

    /// Pick the group's anchor and queue a pair job for every later
    /// member. The anchor is the first member whose image can be read;
    /// unreadable members before it are comparison failures.
    #[allow(clippy::too_many_arguments)]
    fn plan_group<'a>(
        &self,
        group: PanelGroup,
        members: &'a [String],
        input: &ValidationInput<'a>,
        comparator: &dyn PanelComparator,
        builder: &mut ReportBuilder,
        mismatches: &mut Vec<Mismatch>,
        jobs: &mut Vec<PairJob<'a>>,
    ) -> GroupTally {
        let mut unreadable = Vec::new();
        let mut anchor = None;
        for (i, key) in members.iter().enumerate() {
            let Some(panel) = input.panels.get(key) else {
                continue;
            };
            match comparator.check_readable(&panel.url) {
                MetricOutcome::Failed(failure) => unreadable.push((key, failure)),
                _ => {
                    anchor = Some((i, key, panel));
                    break;
                }
            }
        }

        let tally = GroupTally {
            passed: unreadable.is_empty(),
            compared: unreadable.len(),
            anchor: anchor.map(|(_, key, _)| key.clone()),
            ..GroupTally::default()
        };
        for (key, failure) in unreadable {
            let reason = format!("image could not be read: {failure}");
            builder.warn(format!("{key}: {reason}"));
            mismatches.push(Mismatch {
                group: Some(group),
                anchor: tally.anchor.clone().unwrap_or_else(|| key.clone()),
                panel: key.clone(),
                score: None,
                threshold: None,
                breakdown: MetricBreakdown::default(),
            });
            builder.push(PanelResult {
                group: Some(group),
                reason: Some(reason),
                ..PanelResult::new(key.clone(), PanelStatus::ComparisonFailed)
            });
        }
        let Some((index, anchor_key, anchor)) = anchor else {
            builder.warn(format!("{group} group has no readable panel to anchor on"));
            return tally;
        };
        if index > 0 {
            builder.warn(format!("{group} group anchored on {anchor_key}"));
        }

        builder.push(PanelResult {
            group: Some(group),
            score: Some(1.0),
            ..PanelResult::new(anchor_key.clone(), PanelStatus::GroupAnchor)
        });
        let anchor_view = ViewKind::of_key(anchor_key);
        for key in &members[index + 1..] {
            let (Some(panel), Some(threshold)) = (
                input.panels.get(key),
                self.policy
                    .pair_threshold(group, anchor_view, ViewKind::of_key(key)),
            ) else {
                continue;
            };
            jobs.push(PairJob {
                group,
                anchor_key,
                anchor,
                key,
                panel,
                threshold,
            });
        }
        tally
    }

    /// Judge one finished pair. Returns the panel result and a warning.
    fn judge(&self, job: &PairJob<'_>, similarity: SimilarityResult) -> (PanelResult, Option<String>) {
        let mut result = PanelResult {
            group: Some(job.group),
            threshold: Some(job.threshold),
            breakdown: similarity.breakdown,
            notes: similarity.notes,
            ..PanelResult::new(job.key, PanelStatus::Valid)
        };
        let mut warning = None;
        match similarity.outcome {
            MetricOutcome::Ok(score) => {
                let score = round_score(score);
                result.score = Some(score);
                result.status = self.status_for(score, job.threshold);
                if result.status == PanelStatus::Rejected {
                    result.reason = Some(format!(
                        "score {score:.3} against {} below {:.2}",
                        job.anchor_key, self.policy.reject_floor
                    ));
                }
            }
            MetricOutcome::Skipped(reason) => {
                result.status = PanelStatus::CorsSkipped;
                result.score = Some(1.0);
                result.notes.push(reason);
                warning = Some(format!(
                    "{}: image blocked cross-origin, counted as passing",
                    job.key
                ));
            }
            MetricOutcome::Failed(failure) => {
                result.status = PanelStatus::ComparisonFailed;
                result.reason = Some(format!(
                    "comparison with {} failed: {failure}",
                    job.anchor_key
                ));
                if failure.is_unavailable() {
                    warning = Some(format!("{}: metric unavailable ({failure})", job.key));
                }
            }
        }
        (result, warning)
    }
}

impl ValidationStrategy for GroupBased {
    fn kind(&self) -> StrategyKind {
        StrategyKind::GroupBased
    }

    fn validate(
        &self,
        input: &ValidationInput<'_>,
        comparator: &dyn PanelComparator,
    ) -> Result<ValidationReport, EngineError> {
        let groups = partition(input.panels.keys());
        if !groups.keys().any(|g| g.is_comparable()) {
            return Err(EngineError::NothingClassifiable);
        }

        let mut builder = ReportBuilder::new(self.kind());
        let mut jobs = Vec::new();
        let mut tallies: IndexMap<PanelGroup, GroupTally> = IndexMap::new();
        let mut mismatches = Vec::new();

        for (&group, members) in &groups {
            if !group.is_comparable() {
                Self::not_compared(&mut builder, group, members, "group is not compared");
                continue;
            }
            if members.len() < 2 {
                Self::not_compared(&mut builder, group, members, "fewer than two panels");
                continue;
            }

            let tally = self.plan_group(
                group,
                members,
                input,
                comparator,
                &mut builder,
                &mut mismatches,
                &mut jobs,
            );
            tallies.insert(group, tally);
        }
        tracing::debug!(groups = groups.len(), pairs = jobs.len(), "group-based validation");

        let similarities = map_bounded(&jobs, self.workers, |job| {
            comparator.combined_similarity(&job.anchor.url, &job.panel.url)
        });

        for (job, similarity) in jobs.iter().zip(similarities) {
            let (result, warning) = self.judge(job, similarity);
            if let Some(warning) = warning {
                builder.warn(warning);
            }
            if let Some(tally) = tallies.get_mut(&job.group) {
                tally.compared += 1;
                if result.status != PanelStatus::ComparisonFailed
                    && let Some(score) = result.score
                {
                    tally.sum += score;
                    tally.scored += 1;
                }
                if !matches!(result.status, PanelStatus::Valid | PanelStatus::CorsSkipped) {
                    tally.passed = false;
                    mismatches.push(Mismatch {
                        group: Some(job.group),
                        anchor: job.anchor_key.to_string(),
                        panel: job.key.to_string(),
                        score: result.score,
                        threshold: Some(job.threshold),
                        breakdown: result.breakdown.clone(),
                    });
                }
            }
            builder.push(result);
        }

        let mut weighted = 0.0;
        let mut weight = 0usize;
        for (group, tally) in &tallies {
            let members = &groups[group];
            #[allow(clippy::cast_precision_loss)]
            let average = (tally.scored > 0).then(|| round_score(tally.sum / tally.scored as f64));
            if let Some(average) = average {
                #[allow(clippy::cast_precision_loss)]
                let n = members.len() as f64;
                weighted += average * n;
                weight += members.len();
            }
            if !tally.passed {
                builder.warn(format!("{group} group failed consistency checks"));
            }
            builder.group(GroupSummary {
                group: *group,
                members: members.clone(),
                anchor: tally.anchor.clone(),
                average,
                compared: tally.compared,
                passed: tally.passed,
                note: None,
            });
        }

        // Failed comparisons (no score) first, then lowest score.
        mismatches.sort_by(|a, b| {
            a.score
                .unwrap_or(f64::NEG_INFINITY)
                .total_cmp(&b.score.unwrap_or(f64::NEG_INFINITY))
        });
        mismatches.truncate(self.policy.worst_mismatch_count);
        for m in &mismatches {
            tracing::info!(
                group = %m.group.map_or("-", PanelGroup::label),
                anchor = %m.anchor,
                panel = %m.panel,
                score = ?m.score,
                "worst mismatch"
            );
        }
        builder.worst_mismatches(mismatches);

        let overall = if weight > 0 {
            #[allow(clippy::cast_precision_loss)]
            let total = weight as f64;
            round_score(weighted / total)
        } else if tallies.values().all(|t| t.compared == 0) {
            builder.warn("no group had two or more panels; nothing compared");
            1.0
        } else {
            0.0
        };
        let passed = tallies.values().all(|t| t.passed);
        Ok(builder.finish(overall, passed))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::{HashMap, HashSet};

    use xview_metrics::MetricFailure;

    use super::*;
    use crate::panel::PanelMap;

    /// Scores each candidate reference with a fixed outcome.
    #[derive(Default)]
    struct Stub {
        outcomes: HashMap<String, MetricOutcome>,
        unreadable: HashSet<String>,
    }

    impl Stub {
        fn score(mut self, url: &str, score: f64) -> Self {
            self.outcomes.insert(url.to_string(), MetricOutcome::Ok(score));
            self
        }

        fn outcome(mut self, url: &str, outcome: MetricOutcome) -> Self {
            self.outcomes.insert(url.to_string(), outcome);
            self
        }

        fn unreadable(mut self, url: &str) -> Self {
            self.unreadable.insert(url.to_string());
            self
        }
    }

    impl PanelComparator for Stub {
        fn histogram_similarity(&self, _reference: &str, candidate: &str) -> MetricOutcome {
            self.outcomes[candidate].clone()
        }

        fn structural_similarity(&self, _reference: &str, candidate: &str) -> MetricOutcome {
            self.outcomes[candidate].clone()
        }

        fn combined_similarity(&self, _reference: &str, candidate: &str) -> SimilarityResult {
            SimilarityResult {
                outcome: self.outcomes[candidate].clone(),
                breakdown: MetricBreakdown::default(),
                notes: Vec::new(),
            }
        }

        fn check_readable(&self, reference: &str) -> MetricOutcome {
            if self.unreadable.contains(reference) {
                MetricOutcome::Failed(MetricFailure::Load("not found".into()))
            } else {
                MetricOutcome::Ok(1.0)
            }
        }
    }

    fn panels(keys: &[&str]) -> PanelMap {
        keys.iter()
            .map(|k| ((*k).to_string(), Panel::new(*k)))
            .collect()
    }

    fn strategy() -> GroupBased {
        GroupBased::new(GroupPolicy::default(), 1)
    }

    #[test]
    fn unrelated_linework_panel_fails_the_group() {
        let map = panels(&["elevation_north", "elevation_south", "elevation_east"]);
        let stub = Stub::default()
            .score("elevation_south", 0.95)
            .score("elevation_east", 0.40);
        let report = strategy()
            .validate(&ValidationInput::panels_only(&map), &stub)
            .unwrap();

        assert!(!report.passed());
        let failed: Vec<PanelGroup> = report.failed_groups().collect();
        assert_eq!(failed, [PanelGroup::Linework]);
        assert_eq!(report.worst_mismatches()[0].panel, "elevation_east");
        assert_eq!(report.panel("elevation_south").unwrap().status, PanelStatus::Valid);
        assert_eq!(report.panel("elevation_east").unwrap().status, PanelStatus::Rejected);
        assert!((report.overall_score() - 0.675).abs() < 1e-9);
    }

    #[test]
    fn between_floor_and_threshold_is_retry() {
        let map = panels(&["hero_3d", "perspective"]);
        let report = strategy()
            .validate(
                &ValidationInput::panels_only(&map),
                &Stub::default().score("perspective", 0.6),
            )
            .unwrap();
        assert_eq!(report.retry_recommended(), ["perspective"]);
        assert!(!report.passed());
    }

    #[test]
    fn pair_override_applies() {
        // FloorPlan vs Elevation is held to 0.70, not the LINEWORK 0.75.
        let map = panels(&["floor_plan_ground", "elevation_north"]);
        let report = strategy()
            .validate(
                &ValidationInput::panels_only(&map),
                &Stub::default().score("elevation_north", 0.72),
            )
            .unwrap();
        let panel = report.panel("elevation_north").unwrap();
        assert_eq!(panel.status, PanelStatus::Valid);
        assert_eq!(panel.threshold, Some(0.70));
        assert!(report.passed());
    }

    #[test]
    fn metadata_unknown_and_lone_panels_are_kept_with_warnings() {
        let map = panels(&["hero_3d", "title_block", "mood_board", "section_aa"]);
        let report = strategy()
            .validate(&ValidationInput::panels_only(&map), &Stub::default())
            .unwrap();
        for key in ["hero_3d", "title_block", "mood_board", "section_aa"] {
            assert_eq!(report.panel(key).unwrap().status, PanelStatus::NotCompared, "{key}");
        }
        assert_eq!(report.valid().len(), 4);
        assert!(report.warnings().len() >= 4);
        assert!(report.passed());
    }

    #[test]
    fn nothing_comparable_is_an_error() {
        let map = panels(&["title_block", "mystery"]);
        let err = strategy()
            .validate(&ValidationInput::panels_only(&map), &Stub::default())
            .unwrap_err();
        assert!(matches!(err, EngineError::NothingClassifiable));
    }

    #[test]
    fn overall_is_weighted_by_group_size() {
        let map = panels(&[
            "hero_3d",
            "interior_3d",
            "elevation_north",
            "elevation_south",
            "elevation_east",
        ]);
        let stub = Stub::default()
            .score("interior_3d", 1.0)
            .score("elevation_south", 0.5)
            .score("elevation_east", 0.5);
        let report = strategy()
            .validate(&ValidationInput::panels_only(&map), &stub)
            .unwrap();
        // EXTERIOR: 2 panels at 1.0; LINEWORK: 3 panels at 0.5.
        assert!((report.overall_score() - 0.7).abs() < 1e-9);
    }

    #[test]
    fn failed_comparison_is_rejected_and_ranked_worst() {
        let map = panels(&[
            "elevation_north",
            "elevation_south",
            "elevation_east",
            "elevation_west",
            "section_aa",
        ]);
        let stub = Stub::default()
            .score("elevation_south", 0.6)
            .score("elevation_east", 0.3)
            .outcome(
                "elevation_west",
                MetricOutcome::Failed(MetricFailure::Decode("bad png".into())),
            )
            .score("section_aa", 0.55);
        let report = strategy()
            .validate(&ValidationInput::panels_only(&map), &stub)
            .unwrap();
        let worst: Vec<&str> = report
            .worst_mismatches()
            .iter()
            .map(|m| m.panel.as_str())
            .collect();
        assert_eq!(worst, ["elevation_west", "elevation_east", "section_aa"]);
        assert_eq!(
            report.panel("elevation_west").unwrap().status,
            PanelStatus::ComparisonFailed
        );
        // (0.6 + 0.3 + 0.55) / 3, failed pair excluded.
        let group = &report.groups()[0];
        assert!((group.average.unwrap() - 0.483_333).abs() < 1e-6);
        assert_eq!(group.compared, 4);
    }

    #[test]
    fn cross_origin_pair_passes() {
        let map = panels(&["hero_3d", "perspective"]);
        let report = strategy()
            .validate(
                &ValidationInput::panels_only(&map),
                &Stub::default().outcome("perspective", MetricOutcome::Skipped("cors".into())),
            )
            .unwrap();
        assert_eq!(report.panel("perspective").unwrap().status, PanelStatus::CorsSkipped);
        assert!(report.passed());
    }

    #[test]
    fn unreadable_first_member_does_not_anchor_the_group() {
        let map = panels(&["elevation_north", "elevation_south", "elevation_east"]);
        let stub = Stub::default()
            .unreadable("elevation_north")
            .score("elevation_east", 0.95);
        let report = strategy()
            .validate(&ValidationInput::panels_only(&map), &stub)
            .unwrap();

        assert_eq!(
            report.panel("elevation_north").unwrap().status,
            PanelStatus::ComparisonFailed
        );
        assert_eq!(
            report.panel("elevation_south").unwrap().status,
            PanelStatus::GroupAnchor
        );
        assert_eq!(report.panel("elevation_east").unwrap().status, PanelStatus::Valid);
        let rejected: Vec<&str> = report.rejected_keys().collect();
        assert_eq!(rejected, ["elevation_north"]);
        assert_eq!(report.groups()[0].anchor.as_deref(), Some("elevation_south"));
        assert_eq!(report.worst_mismatches()[0].panel, "elevation_north");
        assert!(!report.passed());
    }

    #[test]
    fn group_with_no_readable_panel_rejects_every_member() {
        let map = panels(&["hero_3d", "perspective"]);
        let stub = Stub::default().unreadable("hero_3d").unreadable("perspective");
        let report = strategy()
            .validate(&ValidationInput::panels_only(&map), &stub)
            .unwrap();

        assert_eq!(report.rejected_keys().count(), 2);
        assert!(report.valid().is_empty());
        assert_eq!(report.groups()[0].anchor, None);
        assert!(report.overall_score().abs() < 1e-9);
        assert!(!report.passed());
    }
}
