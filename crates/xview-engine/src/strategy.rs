//! Validation strategy selection.

use serde::{Deserialize, Serialize};

use crate::calculator::PanelComparator;
use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::group::GroupBased;
use crate::hero::HeroAnchored;
use crate::panel::ValidationInput;
use crate::report::ValidationReport;

/// A way of judging a panel set for cross-view consistency.
pub trait ValidationStrategy {
    /// Which strategy this is.
    fn kind(&self) -> StrategyKind;

    /// Judge every panel in `input`, scoring pairs with `comparator`.
    ///
    /// # Errors
    ///
    /// Returns an [`EngineError`] when the strategy cannot run at all on
    /// this input (no hero, nothing classifiable). Per-panel failures are
    /// verdicts in the report, not errors.
    fn validate(
        &self,
        input: &ValidationInput<'_>,
        comparator: &dyn PanelComparator,
    ) -> Result<ValidationReport, EngineError>;
}

/// Available strategies.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    /// Compare every panel with the hero render.
    #[default]
    HeroAnchored,
    /// Compare panels only within their group.
    GroupBased,
}

impl StrategyKind {
    /// Every strategy.
    pub const ALL: [Self; 2] = [Self::HeroAnchored, Self::GroupBased];

    /// Stable name, as used in JSON and on the command line.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::HeroAnchored => "hero_anchored",
            Self::GroupBased => "group_based",
        }
    }

    /// Parse a label. Accepts `-` in place of `_`.
    #[must_use]
    pub fn from_label(label: &str) -> Option<Self> {
        let label = label.trim().replace('-', "_");
        Self::ALL.into_iter().find(|k| k.label() == label)
    }

    /// Run this strategy with the policies from `config`.
    ///
    /// # Errors
    ///
    /// See [`ValidationStrategy::validate`].
    pub fn validate(
        self,
        config: &EngineConfig,
        input: &ValidationInput<'_>,
        comparator: &dyn PanelComparator,
    ) -> Result<ValidationReport, EngineError> {
        let workers = config.calculator.workers;
        match self {
            Self::HeroAnchored => {
                HeroAnchored::new(config.hero.clone(), workers).validate(input, comparator)
            }
            Self::GroupBased => {
                GroupBased::new(config.group.clone(), workers).validate(input, comparator)
            }
        }
    }
}

impl std::fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn labels_round_trip() {
        for kind in StrategyKind::ALL {
            assert_eq!(StrategyKind::from_label(kind.label()), Some(kind));
        }
        assert_eq!(
            StrategyKind::from_label("group-based"),
            Some(StrategyKind::GroupBased)
        );
        assert_eq!(StrategyKind::from_label("nope"), None);
    }
}
