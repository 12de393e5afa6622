//! Building-type prompt checker.
//!
//! Scans a panel's generation prompt for vocabulary that contradicts
//! the declared building category (a "warehouse loading dock" in a
//! prompt for a detached house). Each category has a deny list; a deny
//! term is waived when the building program mentions one of its
//! waiver words, so a mixed-use program can legitimately ask for a
//! storefront.
//!
//! The category comes from the project context, falling back to the
//! master DNA's `buildingType` when the context does not declare one.

use serde::{Deserialize, Serialize};

/// Broad building category the vocabulary tables are keyed by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BuildingCategory {
    /// Houses, apartments, cottages.
    Residential,
    /// Offices, retail, hospitality.
    Commercial,
    /// Warehouses, factories, workshops.
    Industrial,
    /// Schools, colleges, libraries.
    Educational,
    /// Clinics, hospitals, care homes.
    Healthcare,
    /// No rules apply.
    Unclassified,
}

impl BuildingCategory {
    /// Infer the category from a free-text building type.
    #[must_use]
    pub fn from_building_type(building_type: &str) -> Self {
        let text = normalize(building_type);
        let has = |words: &[&str]| words.iter().any(|w| contains_phrase(&text, w));
        if has(&["clinic", "hospital", "healthcare", "medical", "surgery", "care home"]) {
            Self::Healthcare
        } else if has(&["school", "college", "university", "library", "nursery school"]) {
            Self::Educational
        } else if has(&["warehouse", "factory", "industrial", "workshop", "plant"]) {
            Self::Industrial
        } else if has(&["office", "retail", "shop", "commercial", "hotel", "restaurant"]) {
            Self::Commercial
        } else if has(&[
            "house",
            "home",
            "residential",
            "residence",
            "apartment",
            "apartments",
            "flat",
            "flats",
            "dwelling",
            "villa",
            "cottage",
            "bungalow",
        ]) {
            Self::Residential
        } else {
            Self::Unclassified
        }
    }
}

struct DenyRule {
    term: &'static str,
    waived_by: &'static [&'static str],
}

const MIXED_USE: &[&str] = &["mixed use", "mixed-use", "mixeduse"];

const RESIDENTIAL_DENY: &[DenyRule] = &[
    DenyRule { term: "office tower", waived_by: &[] },
    DenyRule { term: "skyscraper", waived_by: &[] },
    DenyRule { term: "warehouse", waived_by: &["storage", "warehouse"] },
    DenyRule { term: "factory", waived_by: &[] },
    DenyRule { term: "loading dock", waived_by: &[] },
    DenyRule { term: "shopping mall", waived_by: &[] },
    DenyRule { term: "storefront", waived_by: &["retail", "shop"] },
    DenyRule { term: "hospital", waived_by: &[] },
    DenyRule { term: "stadium", waived_by: &[] },
    DenyRule { term: "parking garage", waived_by: &["parking", "garage"] },
];

const COMMERCIAL_DENY: &[DenyRule] = &[
    DenyRule { term: "bedroom", waived_by: &["residential", "apartment", "apartments", "hotel"] },
    DenyRule { term: "nursery", waived_by: &["childcare", "creche"] },
    DenyRule { term: "family home", waived_by: &[] },
    DenyRule { term: "cottage", waived_by: &[] },
    DenyRule { term: "farmhouse", waived_by: &[] },
    DenyRule { term: "backyard", waived_by: &[] },
];

const INDUSTRIAL_DENY: &[DenyRule] = &[
    DenyRule { term: "bedroom", waived_by: &["residential", "caretaker"] },
    DenyRule { term: "living room", waived_by: &["residential", "caretaker"] },
    DenyRule { term: "cottage", waived_by: &[] },
    DenyRule { term: "villa", waived_by: &[] },
    DenyRule { term: "classroom", waived_by: &["training"] },
    DenyRule { term: "storefront", waived_by: &["retail", "showroom", "trade counter"] },
];

const EDUCATIONAL_DENY: &[DenyRule] = &[
    DenyRule { term: "bedroom", waived_by: &["boarding", "residence", "dormitory"] },
    DenyRule { term: "warehouse", waived_by: &[] },
    DenyRule { term: "factory", waived_by: &[] },
    DenyRule { term: "skyscraper", waived_by: &[] },
    DenyRule { term: "nightclub", waived_by: &[] },
];

const HEALTHCARE_DENY: &[DenyRule] = &[
    DenyRule { term: "warehouse", waived_by: &[] },
    DenyRule { term: "factory", waived_by: &[] },
    DenyRule { term: "nightclub", waived_by: &[] },
    DenyRule { term: "shopping mall", waived_by: &["retail"] },
    DenyRule { term: "stadium", waived_by: &[] },
];

const fn deny_rules(category: BuildingCategory) -> &'static [DenyRule] {
    match category {
        BuildingCategory::Residential => RESIDENTIAL_DENY,
        BuildingCategory::Commercial => COMMERCIAL_DENY,
        BuildingCategory::Industrial => INDUSTRIAL_DENY,
        BuildingCategory::Educational => EDUCATIONAL_DENY,
        BuildingCategory::Healthcare => HEALTHCARE_DENY,
        BuildingCategory::Unclassified => &[],
    }
}

/// Result of checking one prompt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptCheck {
    /// `false` if any unwaived deny term appeared.
    pub valid: bool,
    /// Category the prompt was checked against.
    pub category: BuildingCategory,
    /// Deny terms found in the prompt.
    pub violations: Vec<String>,
}

impl PromptCheck {
    const fn passed(category: BuildingCategory) -> Self {
        Self {
            valid: true,
            category,
            violations: Vec::new(),
        }
    }
}

/// Resolve the building type from the context, falling back to the
/// master DNA (`buildingType`, `building_type`, or the same keys under
/// `project`).
#[must_use]
pub fn resolve_building_type<'a>(
    declared: Option<&'a str>,
    master_dna: Option<&'a serde_json::Value>,
) -> Option<&'a str> {
    if let Some(declared) = declared.map(str::trim)
        && !declared.is_empty()
    {
        return Some(declared);
    }
    let dna = master_dna?;
    [dna, dna.get("project").unwrap_or(&serde_json::Value::Null)]
        .into_iter()
        .flat_map(|v| [v.get("buildingType"), v.get("building_type")])
        .flatten()
        .find_map(serde_json::Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

/// Check `prompt` against the building category.
///
/// A missing prompt or an unclassified building type always passes.
#[must_use]
pub fn check_prompt(
    prompt: Option<&str>,
    building_type: Option<&str>,
    building_program: Option<&serde_json::Value>,
) -> PromptCheck {
    let category = building_type.map_or(
        BuildingCategory::Unclassified,
        BuildingCategory::from_building_type,
    );
    let Some(prompt) = prompt else {
        return PromptCheck::passed(category);
    };

    let text = normalize(prompt);
    let program = building_program.map(program_text).unwrap_or_default();
    let declared = building_type.map(normalize).unwrap_or_default();
    let mixed_use = MIXED_USE.iter().any(|w| contains_phrase(&program, w));

    let violations: Vec<String> = deny_rules(category)
        .iter()
        .filter(|rule| contains_phrase(&text, rule.term))
        .filter(|rule| {
            let waived = contains_phrase(&program, rule.term)
                || rule
                    .waived_by
                    .iter()
                    .any(|w| contains_phrase(&program, w) || contains_phrase(&declared, w))
                || (mixed_use && !rule.waived_by.is_empty());
            !waived
        })
        .map(|rule| rule.term.to_string())
        .collect();

    PromptCheck {
        valid: violations.is_empty(),
        category,
        violations,
    }
}

/// Lower-case, replace non-alphanumerics with single spaces, and pad
/// with a space on each side for whole-phrase matching.
fn normalize(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 2);
    out.push(' ');
    for word in text
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
    {
        out.push_str(&word.to_lowercase());
        out.push(' ');
    }
    out
}

fn contains_phrase(normalized: &str, phrase: &str) -> bool {
    let needle = normalize(phrase);
    !needle.trim().is_empty() && normalized.contains(&needle)
}

/// Flatten every string (keys included) in the building program into
/// one normalized text.
fn program_text(program: &serde_json::Value) -> String {
    fn collect(value: &serde_json::Value, out: &mut String) {
        match value {
            serde_json::Value::String(s) => {
                out.push_str(s);
                out.push(' ');
            }
            serde_json::Value::Array(items) => items.iter().for_each(|v| collect(v, out)),
            serde_json::Value::Object(map) => {
                for (k, v) in map {
                    out.push_str(k);
                    out.push(' ');
                    collect(v, out);
                }
            }
            _ => {}
        }
    }
    let mut raw = String::new();
    collect(program, &mut raw);
    normalize(&raw)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn infers_categories() {
        assert_eq!(
            BuildingCategory::from_building_type("Detached House"),
            BuildingCategory::Residential
        );
        assert_eq!(
            BuildingCategory::from_building_type("office block"),
            BuildingCategory::Commercial
        );
        assert_eq!(
            BuildingCategory::from_building_type("primary school"),
            BuildingCategory::Educational
        );
        assert_eq!(
            BuildingCategory::from_building_type("folly"),
            BuildingCategory::Unclassified
        );
    }

    #[test]
    fn house_prompt_with_warehouse_is_invalid() {
        let check = check_prompt(
            Some("A two-storey house next to a Warehouse, loading-dock at rear"),
            Some("detached house"),
            None,
        );
        assert!(!check.valid);
        assert_eq!(check.violations, ["warehouse", "loading dock"]);
    }

    #[test]
    fn matching_is_whole_phrase() {
        // "factory" must not match "factoryless".
        let check = check_prompt(Some("a factoryless estate"), Some("house"), None);
        assert!(check.valid);
    }

    #[test]
    fn program_waives_terms() {
        let program = json!({"ground_floor": "retail unit", "upper": "apartments"});
        let check = check_prompt(Some("house with a storefront"), Some("house"), Some(&program));
        assert!(check.valid, "{check:?}");
    }

    #[test]
    fn declared_type_waives_terms() {
        let check = check_prompt(Some("luxury hotel bedroom interior"), Some("hotel"), None);
        assert_eq!(check.category, BuildingCategory::Commercial);
        assert!(check.valid, "{check:?}");

        let check = check_prompt(Some("open-plan office with a bedroom"), Some("office"), None);
        assert_eq!(check.violations, ["bedroom"]);
    }

    #[test]
    fn mixed_use_program_waives_waivable_terms_only() {
        let program = json!(["mixed-use"]);
        let check = check_prompt(
            Some("storefront under a skyscraper"),
            Some("apartment"),
            Some(&program),
        );
        assert_eq!(check.violations, ["skyscraper"]);
    }

    #[test]
    fn missing_prompt_or_category_passes() {
        assert!(check_prompt(None, Some("house"), None).valid);
        assert!(check_prompt(Some("a warehouse"), None, None).valid);
    }

    #[test]
    fn building_type_falls_back_to_dna() {
        let dna = json!({"project": {"buildingType": "clinic"}});
        assert_eq!(resolve_building_type(None, Some(&dna)), Some("clinic"));
        assert_eq!(resolve_building_type(Some("  "), Some(&dna)), Some("clinic"));
        assert_eq!(resolve_building_type(Some("school"), Some(&dna)), Some("school"));

        let flat = json!({"building_type": "warehouse"});
        assert_eq!(resolve_building_type(None, Some(&flat)), Some("warehouse"));
        assert_eq!(resolve_building_type(None, None), None);
    }
}
