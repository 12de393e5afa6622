//! Cross-view consistency validation for generated architectural panels.
//!
//! A design is a set of independently generated panels (hero render,
//! plans, elevations, sections, interiors) keyed by view. This crate
//! judges whether they plausibly depict the same building:
//!
//! - [`HeroAnchored`] compares every panel with the hero render using
//!   histogram and edge similarity plus a building-type prompt check;
//! - [`GroupBased`] compares panels only within their visual group
//!   (EXTERIOR, LINEWORK) using pHash, SSIM and histogram similarity;
//! - [`DualMetricValidator`] holds each view to independent pHash and
//!   pixel-difference limits and can write diff images.
//!
//! Per-panel verdicts land in a [`ValidationReport`];
//! [`apply_rejections`] turns a report into a filtered panel map and a
//! regeneration decision. [`ConsistencyEngine`] wires these together.

pub mod calculator;
pub mod config;
pub mod dual_metric;
pub mod engine;
pub mod error;
pub mod group;
pub mod grouping;
pub mod hero;
pub mod observability;
pub mod panel;
mod pool;
pub mod prompt_check;
pub mod rejection;
pub mod report;
pub mod strategy;

pub use calculator::{
    CacheStats, MetricBreakdown, PanelComparator, SimilarityCalculator, SimilarityResult,
};
pub use config::{
    CalculatorConfig, CombinedWeights, DualMetricPolicy, EngineConfig, GroupPolicy, HeroPolicy,
    MetricLimits, PairThreshold, RejectionPolicy,
};
pub use dual_metric::{
    DualMetricComparison, DualMetricReport, DualMetricSummary, DualMetricValidator, ViewClass,
};
pub use engine::ConsistencyEngine;
pub use error::EngineError;
pub use group::GroupBased;
pub use grouping::{Classification, MatchRule, PanelGroup, ViewKind, classify, partition};
pub use hero::HeroAnchored;
pub use observability::RunRecord;
pub use panel::{Panel, PanelMap, ProjectContext, ValidationInput};
pub use prompt_check::{BuildingCategory, PromptCheck, check_prompt};
pub use rejection::{RejectionOutcome, apply_rejections};
pub use report::{
    Disposition, GroupSummary, Mismatch, PanelResult, PanelStatus, Rejection, ValidationReport,
};
pub use strategy::{StrategyKind, ValidationStrategy};
pub use xview_metrics::{MetricFailure, MetricOutcome};
