//! Panel grouping: which panels are visually comparable.
//!
//! Each key is classified by, in order:
//!
//! 1. exact match against a group's known-panel list,
//! 2. prefix match against the linework stems (`floor_plan_`,
//!    `elevation_`, `section_`),
//! 3. keyword inference (`3d`, `perspective`, `axonometric`, `site` for
//!    exterior; `floor_plan`, `elevation`, `section` for linework).
//!
//! Anything else is [`PanelGroup::Unknown`]: reported, never compared.
//! Matching is case-insensitive.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Static partition of panel keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PanelGroup {
    /// Rendered 3D views: hero, perspectives, axonometric, interior, site.
    Exterior,
    /// Orthographic drawings: floor plans, elevations, sections.
    Linework,
    /// Title blocks, schedules, legends and other non-pictorial panels.
    Metadata,
    /// Keys no rule recognized.
    Unknown,
}

impl PanelGroup {
    /// Every group, in report order.
    pub const ALL: [Self; 4] = [Self::Exterior, Self::Linework, Self::Metadata, Self::Unknown];

    /// Whether members of this group are compared pairwise.
    #[must_use]
    pub const fn is_comparable(self) -> bool {
        matches!(self, Self::Exterior | Self::Linework)
    }

    /// Upper-case label used in reports and logs.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Exterior => "EXTERIOR",
            Self::Linework => "LINEWORK",
            Self::Metadata => "METADATA",
            Self::Unknown => "UNKNOWN",
        }
    }
}

impl std::fmt::Display for PanelGroup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Finer view category, used for per-pair thresholds and dual-metric
/// limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViewKind {
    /// Hero or generic exterior render.
    Exterior,
    /// Interior render.
    Interior,
    /// Axonometric view.
    Axonometric,
    /// Street-level perspective.
    Perspective,
    /// Site plan or site diagram.
    Site,
    /// Floor plan.
    FloorPlan,
    /// Elevation.
    Elevation,
    /// Section.
    Section,
    /// Anything else.
    Other,
}

impl ViewKind {
    /// Infer the view kind from a panel key.
    #[must_use]
    pub fn of_key(key: &str) -> Self {
        let key = key.trim().to_ascii_lowercase();
        if key.contains("interior") {
            Self::Interior
        } else if key.contains("axonometric") || key.starts_with("axo") {
            Self::Axonometric
        } else if key.contains("perspective") {
            Self::Perspective
        } else if key.contains("site") {
            Self::Site
        } else if key.contains("floor_plan") {
            Self::FloorPlan
        } else if key.contains("elevation") {
            Self::Elevation
        } else if key.contains("section") {
            Self::Section
        } else if key.contains("hero") || key.contains("exterior") || key.contains("3d") {
            Self::Exterior
        } else {
            Self::Other
        }
    }
}

/// Which rule placed a key in its group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchRule {
    /// Listed as a known panel of the group.
    Exact,
    /// Starts with a known stem.
    Prefix,
    /// Contains a group keyword.
    Keyword,
    /// Nothing matched.
    Unmatched,
}

/// Result of classifying one key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Classification {
    /// Assigned group.
    pub group: PanelGroup,
    /// Finer view category.
    pub view: ViewKind,
    /// Rule that decided the group.
    pub rule: MatchRule,
}

const EXTERIOR_PANELS: &[&str] = &[
    "hero_3d",
    "v_exterior",
    "exterior_3d",
    "interior_3d",
    "axonometric",
    "axonometric_3d",
    "perspective",
    "perspective_3d",
    "site_3d",
];

const LINEWORK_PANELS: &[&str] = &[
    "floor_plan",
    "floor_plan_ground",
    "floor_plan_first",
    "floor_plan_upper",
    "elevation_north",
    "elevation_south",
    "elevation_east",
    "elevation_west",
    "section_aa",
    "section_bb",
];

const METADATA_PANELS: &[&str] = &[
    "title_block",
    "project_info",
    "material_palette",
    "schedules",
    "legend",
    "notes",
    "climate_card",
    "site_diagram",
];

const LINEWORK_STEMS: &[&str] = &["floor_plan_", "elevation_", "section_"];

const EXTERIOR_KEYWORDS: &[&str] = &["3d", "perspective", "axonometric", "site"];

const LINEWORK_KEYWORDS: &[&str] = &["floor_plan", "elevation", "section"];

/// Classify one panel key.
#[must_use]
pub fn classify(key: &str) -> Classification {
    let lowered = key.trim().to_ascii_lowercase();
    let view = ViewKind::of_key(&lowered);
    let (group, rule) = group_of(&lowered);
    Classification { group, view, rule }
}

fn group_of(key: &str) -> (PanelGroup, MatchRule) {
    for (group, known) in [
        (PanelGroup::Exterior, EXTERIOR_PANELS),
        (PanelGroup::Linework, LINEWORK_PANELS),
        (PanelGroup::Metadata, METADATA_PANELS),
    ] {
        if known.contains(&key) {
            return (group, MatchRule::Exact);
        }
    }
    if LINEWORK_STEMS.iter().any(|stem| key.starts_with(stem)) {
        return (PanelGroup::Linework, MatchRule::Prefix);
    }
    // Linework keywords first: "section_3d_cut" is still a section.
    if LINEWORK_KEYWORDS.iter().any(|kw| key.contains(kw)) {
        return (PanelGroup::Linework, MatchRule::Keyword);
    }
    if EXTERIOR_KEYWORDS.iter().any(|kw| key.contains(kw)) {
        return (PanelGroup::Exterior, MatchRule::Keyword);
    }
    (PanelGroup::Unknown, MatchRule::Unmatched)
}

/// Partition keys into groups, preserving input order within each
/// group. Groups appear in [`PanelGroup::ALL`] order; empty groups are
/// omitted.
#[must_use]
pub fn partition<'a, I>(keys: I) -> IndexMap<PanelGroup, Vec<String>>
where
    I: IntoIterator<Item = &'a String>,
{
    let mut buckets: IndexMap<PanelGroup, Vec<String>> =
        PanelGroup::ALL.iter().map(|g| (*g, Vec::new())).collect();
    for key in keys {
        let group = classify(key).group;
        if let Some(members) = buckets.get_mut(&group) {
            members.push(key.clone());
        }
    }
    buckets.retain(|_, members| !members.is_empty());
    buckets
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_matches_win() {
        let c = classify("hero_3d");
        assert_eq!(c.group, PanelGroup::Exterior);
        assert_eq!(c.rule, MatchRule::Exact);
        assert_eq!(c.view, ViewKind::Exterior);

        let c = classify("site_diagram");
        assert_eq!(c.group, PanelGroup::Metadata);
        assert_eq!(c.view, ViewKind::Site);
    }

    #[test]
    fn prefix_matches_linework_stems() {
        let c = classify("floor_plan_mezzanine");
        assert_eq!(c.group, PanelGroup::Linework);
        assert_eq!(c.rule, MatchRule::Prefix);
        assert_eq!(c.view, ViewKind::FloorPlan);

        assert_eq!(classify("section_cc").rule, MatchRule::Prefix);
    }

    #[test]
    fn keyword_inference() {
        let c = classify("rear_perspective");
        assert_eq!(c.group, PanelGroup::Exterior);
        assert_eq!(c.rule, MatchRule::Keyword);

        let c = classify("north_elevation");
        assert_eq!(c.group, PanelGroup::Linework);
        assert_eq!(c.rule, MatchRule::Keyword);

        assert_eq!(classify("site_context").group, PanelGroup::Exterior);
    }

    #[test]
    fn matching_is_case_insensitive() {
        assert_eq!(classify("Section_AA").rule, MatchRule::Exact);
        assert_eq!(classify("HERO_3D").group, PanelGroup::Exterior);
    }

    #[test]
    fn unmatched_keys_are_unknown() {
        let c = classify("mood_board");
        assert_eq!(c.group, PanelGroup::Unknown);
        assert_eq!(c.rule, MatchRule::Unmatched);
        assert!(!c.group.is_comparable());
    }

    #[test]
    fn partition_keeps_order_and_omits_empty_groups() {
        let keys: Vec<String> = ["elevation_north", "hero_3d", "floor_plan_ground", "interior_3d"]
            .iter()
            .map(ToString::to_string)
            .collect();
        let groups = partition(&keys);
        let order: Vec<PanelGroup> = groups.keys().copied().collect();
        assert_eq!(order, [PanelGroup::Exterior, PanelGroup::Linework]);
        assert_eq!(groups[&PanelGroup::Exterior], ["hero_3d", "interior_3d"]);
        assert_eq!(
            groups[&PanelGroup::Linework],
            ["elevation_north", "floor_plan_ground"]
        );
    }

    #[test]
    fn every_key_lands_in_exactly_one_group() {
        let keys: Vec<String> = ["hero_3d", "title_block", "mystery", "section_bb", "axo_cut"]
            .iter()
            .map(ToString::to_string)
            .collect();
        let groups = partition(&keys);
        let total: usize = groups.values().map(Vec::len).sum();
        assert_eq!(total, keys.len());
    }
}
