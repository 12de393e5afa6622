//! Input model: panels, the panel map, and the project context.
//!
//! All of these are produced upstream and read-only here. The panel map
//! keeps insertion order, which decides the anchor of each group.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// One generated image for one view of a design.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Panel {
    /// Image reference: http(s) URL, `data:` URL, `file://` URL or path.
    pub url: String,

    /// Prompt the image was generated from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,

    /// Generation seed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<i64>,

    /// Opaque upstream metadata, passed through unexamined.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<serde_json::Value>,
}

impl Panel {
    /// A panel with only an image reference.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            prompt: None,
            seed: None,
            meta: None,
        }
    }

    /// Attach a generation prompt.
    #[must_use]
    pub fn with_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.prompt = Some(prompt.into());
        self
    }
}

/// Panels keyed by stable view key (`hero_3d`, `floor_plan_ground`, ...),
/// in generation order.
pub type PanelMap = IndexMap<String, Panel>;

/// Declared facts about the building the panels depict.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectContext {
    /// Free-text building category (`"detached house"`, `"office"`, ...).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub building_type: Option<String>,

    /// Optional building program; any text it contains can waive a
    /// prompt-vocabulary rule (a mixed-use program may mention retail).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub building_program: Option<serde_json::Value>,
}

impl ProjectContext {
    /// A context declaring only a building type.
    #[must_use]
    pub fn with_building_type(building_type: impl Into<String>) -> Self {
        Self {
            building_type: Some(building_type.into()),
            building_program: None,
        }
    }
}

/// Everything a validation strategy reads.
#[derive(Debug, Clone, Copy)]
pub struct ValidationInput<'a> {
    /// The panels to validate.
    pub panels: &'a PanelMap,
    /// Declared project facts.
    pub project: &'a ProjectContext,
    /// Opaque design description, consulted only by the prompt checker.
    pub master_dna: Option<&'a serde_json::Value>,
}

impl<'a> ValidationInput<'a> {
    /// Input with an empty project context and no master DNA.
    #[must_use]
    pub fn panels_only(panels: &'a PanelMap) -> Self {
        static EMPTY: ProjectContext = ProjectContext {
            building_type: None,
            building_program: None,
        };
        Self {
            panels,
            project: &EMPTY,
            master_dna: None,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn panel_map_parses_and_keeps_order() {
        let json = r#"{
            "hero_3d": {"url": "https://cdn/hero.png", "prompt": "a house", "seed": 7},
            "floor_plan_ground": {"url": "data:image/png;base64,AAAA"},
            "elevation_north": {"url": "/tmp/n.png", "meta": {"model": "x"}}
        }"#;
        let map: PanelMap = serde_json::from_str(json).unwrap();
        let keys: Vec<&str> = map.keys().map(String::as_str).collect();
        assert_eq!(keys, ["hero_3d", "floor_plan_ground", "elevation_north"]);
        assert_eq!(map["hero_3d"].seed, Some(7));
        assert_eq!(map["hero_3d"].prompt.as_deref(), Some("a house"));
        assert!(map["elevation_north"].meta.is_some());
    }

    #[test]
    fn project_context_uses_camel_case() {
        let ctx: ProjectContext = serde_json::from_str(
            r#"{"buildingType": "office", "buildingProgram": {"uses": ["retail"]}}"#,
        )
        .unwrap();
        assert_eq!(ctx.building_type.as_deref(), Some("office"));
        assert!(ctx.building_program.is_some());
    }

    #[test]
    fn optional_fields_are_omitted_when_serializing() {
        let json = serde_json::to_string(&Panel::new("x")).unwrap();
        assert_eq!(json, r#"{"url":"x"}"#);
    }
}
