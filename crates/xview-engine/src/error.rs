//! Whole-run errors.
//!
//! Per-panel problems never surface here; they become entries in the
//! [`ValidationReport`](crate::report::ValidationReport). Only
//! preconditions that make a whole run meaningless abort early.

use xview_io::ImageLoadError;

/// Errors that abort a validation run.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// The hero-anchored strategy found none of its hero keys.
    #[error("no hero panel available (looked for: {})", .0.join(", "))]
    NoHeroAnchor(Vec<String>),

    /// No panel could be placed in a comparable group.
    #[error("no panel could be classified into a comparable group")]
    NothingClassifiable,

    /// A configuration value is out of range.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// The image source could not be constructed.
    #[error("failed to construct image source: {0}")]
    Source(#[from] ImageLoadError),
}
