//! xview-bench: run cross-view consistency validation on a panel map.
//!
//! Loads a JSON panel map, runs one validator over it and prints the
//! report. Useful for:
//!
//! - Comparing the hero-anchored, group-based and dual-metric validators
//!   on the same panel set
//! - Tuning thresholds and weights via `--config-json`
//! - Measuring run time with warm and cold caches (`--runs`)
//! - Writing diff images for failing dual-metric views
//!
//! Logging goes to stderr and is controlled by `RUST_LOG`
//! (default `xview=info,warn`).
//!
//! # Usage
//!
//! ```text
//! cargo run --release --bin xview-bench -- [OPTIONS] <PANELS_JSON>
//! ```
//!
//! Exits 0 when validation passes, 2 when it fails, 1 on error.

#![allow(clippy::print_stdout, clippy::print_stderr)]

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Instant;

use clap::{Parser, ValueEnum};
use tracing_subscriber::EnvFilter;
use xview_engine::{
    ConsistencyEngine, DualMetricReport, EngineConfig, PanelMap, ProjectContext, StrategyKind,
    ValidationInput, ValidationReport,
};
use xview_io::DiffArtifactWriter;

const DEFAULT_LOG_FILTER: &str = "xview=info,warn";

/// Cross-view consistency validation for a set of generated panels.
///
/// Reads a panel map (`{"hero_3d": {"url": "..."}, ...}`), validates
/// it, and prints per-panel verdicts.
#[derive(Parser)]
#[command(name = "xview-bench", version)]
struct Cli {
    /// Path to the panel map JSON.
    panels: PathBuf,

    /// Validator to run.
    #[arg(long, value_enum, default_value_t = Strategy::HeroAnchored)]
    strategy: Strategy,

    /// Declared building type, for the prompt check.
    #[arg(long)]
    building_type: Option<String>,

    /// Project context as a JSON string. Overrides `--building-type`.
    #[arg(long)]
    project_json: Option<String>,

    /// Path to a master DNA JSON file, consulted for the building type.
    #[arg(long)]
    master_dna: Option<PathBuf>,

    /// Comparisons run concurrently.
    #[arg(long, value_parser = clap::builder::RangedU64ValueParser::<usize>::new().range(1..))]
    workers: Option<usize>,

    /// Proxy endpoint for remote images.
    #[arg(long)]
    proxy: Option<String>,

    /// Directory for dual-metric diff images.
    #[arg(long)]
    artifacts_dir: Option<PathBuf>,

    /// Design identifier used in artifact paths.
    #[arg(long, default_value = "design")]
    design_id: String,

    /// Number of runs. Caches stay warm between runs.
    #[arg(long, default_value_t = 1, value_parser = clap::builder::RangedU64ValueParser::<usize>::new().range(1..))]
    runs: usize,

    /// Print which panels to drop and whether to regenerate the set.
    #[arg(long)]
    apply_rejections: bool,

    /// Output reports as JSON instead of human-readable text.
    #[arg(long)]
    json: bool,

    /// Full engine config as a JSON string.
    ///
    /// Fields not present keep their defaults. `--workers` and `--proxy`
    /// are applied on top when given.
    #[arg(long)]
    config_json: Option<String>,
}

/// Validator selection.
#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Strategy {
    /// Compare every panel with the hero render.
    HeroAnchored,
    /// Compare panels within their visual group.
    GroupBased,
    /// Hold each view to pHash and pixel-difference limits.
    DualMetric,
}

/// Build an [`EngineConfig`] from CLI arguments.
fn config_from_cli(cli: &Cli) -> Result<EngineConfig, String> {
    let mut config = match cli.config_json {
        Some(ref json) => serde_json::from_str(json)
            .map_err(|e| format!("Error parsing --config-json: {e}"))?,
        None => EngineConfig::default(),
    };
    if let Some(workers) = cli.workers {
        config.calculator.workers = workers;
    }
    if let Some(ref proxy) = cli.proxy {
        config.calculator.proxy_endpoint = Some(proxy.clone());
    }
    Ok(config)
}

fn project_from_cli(cli: &Cli) -> Result<ProjectContext, String> {
    if let Some(ref json) = cli.project_json {
        return serde_json::from_str(json).map_err(|e| format!("Error parsing --project-json: {e}"));
    }
    Ok(cli
        .building_type
        .as_ref()
        .map_or_else(ProjectContext::default, ProjectContext::with_building_type))
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path, what: &str) -> Result<T, String> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| format!("Error reading {what} {}: {e}", path.display()))?;
    serde_json::from_str(&text).map_err(|e| format!("Error parsing {what} {}: {e}", path.display()))
}

fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    if let Err(e) = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
    {
        eprintln!("Logging unavailable: {e}");
    }
}

fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();
    match run(&cli) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(2),
        Err(msg) => {
            eprintln!("{msg}");
            ExitCode::FAILURE
        }
    }
}

/// Run the requested validation; `Ok(passed)` of the last run.
fn run(cli: &Cli) -> Result<bool, String> {
    let config = config_from_cli(cli)?;
    let project = project_from_cli(cli)?;
    let panels: PanelMap = read_json(&cli.panels, "panel map")?;
    let master_dna: Option<serde_json::Value> = cli
        .master_dna
        .as_ref()
        .map(|path| read_json(path, "master DNA"))
        .transpose()?;

    let mut engine = ConsistencyEngine::new(config).map_err(|e| format!("Engine error: {e}"))?;
    if let Some(ref dir) = cli.artifacts_dir {
        engine = engine.with_artifacts(DiffArtifactWriter::new(dir));
    }

    eprintln!("Panels: {} ({} entries)", cli.panels.display(), panels.len());
    eprintln!("Image source: {}", engine.calculator().source_name());
    eprintln!("Runs: {}", cli.runs);
    eprintln!();

    let input = ValidationInput {
        panels: &panels,
        project: &project,
        master_dna: master_dna.as_ref(),
    };

    let mut durations = Vec::with_capacity(cli.runs);
    let mut passed = false;
    for run in 0..cli.runs {
        if cli.runs > 1 {
            eprintln!("--- Run {}/{} ---", run + 1, cli.runs);
        }
        let start = Instant::now();
        passed = if cli.strategy == Strategy::DualMetric {
            let report = engine.validate_dual_metric(&panels, &cli.design_id);
            durations.push(start.elapsed().as_secs_f64() * 1000.0);
            emit(cli.json, &report, print_dual_metric)?;
            report.pass
        } else {
            let kind = match cli.strategy {
                Strategy::GroupBased => StrategyKind::GroupBased,
                Strategy::HeroAnchored | Strategy::DualMetric => StrategyKind::HeroAnchored,
            };
            let report = engine
                .validate(kind, &input)
                .map_err(|e| format!("Validation error: {e}"))?;
            durations.push(start.elapsed().as_secs_f64() * 1000.0);
            emit(cli.json, &report, print_report)?;
            if cli.apply_rejections && run == 0 {
                let outcome = engine.apply_rejections(&panels, &report);
                emit(cli.json, &outcome, |o| {
                    println!();
                    println!("Removed: {}", o.removed.join(", "));
                    println!("Retry: {}", o.retry.join(", "));
                    println!(
                        "Rejected fraction: {:.2}  Regenerate: {}",
                        o.rejected_fraction, o.regenerate
                    );
                    for reason in &o.reasons {
                        println!("  {reason}");
                    }
                })?;
            }
            report.passed()
        };
        if cli.runs > 1 {
            eprintln!();
        }
    }

    if cli.runs > 1 {
        print_multi_run_summary(&durations, &engine);
    }
    Ok(passed)
}

fn emit<T: serde::Serialize>(json: bool, value: &T, human: impl Fn(&T)) -> Result<(), String> {
    if json {
        let text = serde_json::to_string_pretty(value)
            .map_err(|e| format!("Error serializing report: {e}"))?;
        println!("{text}");
    } else {
        human(value);
    }
    Ok(())
}

fn fmt_score(score: Option<f64>) -> String {
    score.map_or_else(|| "-".to_string(), |s| format!("{s:.3}"))
}

fn print_report(report: &ValidationReport) {
    println!(
        "Strategy: {}{}",
        report.strategy(),
        report
            .anchor()
            .map(|a| format!("  (hero: {a})"))
            .unwrap_or_default()
    );
    println!(
        "Overall: {:.3}  {}",
        report.overall_score(),
        if report.passed() { "PASSED" } else { "FAILED" }
    );
    println!();
    println!("{:<24} {:<20} {:>8} {:>10}", "Panel", "Status", "Score", "Threshold");
    println!("{}", "-".repeat(65));
    for panel in report.panels() {
        let status = serde_json::to_value(panel.status)
            .ok()
            .and_then(|v| v.as_str().map(ToString::to_string))
            .unwrap_or_default();
        println!(
            "{:<24} {:<20} {:>8} {:>10}",
            panel.key,
            status,
            fmt_score(panel.score),
            fmt_score(panel.threshold)
        );
    }

    for group in report.groups() {
        println!(
            "Group {:<10} members={} compared={} average={} {}",
            group.group,
            group.members.len(),
            group.compared,
            fmt_score(group.average),
            if group.passed { "ok" } else { "FAILED" }
        );
    }
    if !report.rejected().is_empty() {
        println!();
        println!("Rejected:");
        for r in report.rejected() {
            println!("  {}: {}", r.key, r.reason);
        }
    }
    if !report.worst_mismatches().is_empty() {
        println!();
        println!("Worst mismatches:");
        for m in report.worst_mismatches() {
            println!("  {} vs {}: {}", m.panel, m.anchor, fmt_score(m.score));
        }
    }
    if !report.warnings().is_empty() {
        println!();
        println!("Warnings:");
        for w in report.warnings() {
            println!("  {w}");
        }
    }
    println!();
    println!("Duration: {:.3}ms", report.duration_ms());
}

fn print_dual_metric(report: &DualMetricReport) {
    println!(
        "Dual metric: {}{}",
        if report.pass { "PASSED" } else { "FAILED" },
        report
            .hero
            .as_ref()
            .map(|h| format!("  (hero: {h})"))
            .unwrap_or_default()
    );
    if let Some(ref error) = report.error {
        println!("Error: {error}");
        return;
    }
    println!();
    println!(
        "{:<20} {:<10} {:>6} {:>8} {:>8}  {}",
        "View", "Class", "Hash", "Pixels", "Result", "Artifact"
    );
    println!("{}", "-".repeat(72));
    for c in &report.comparisons {
        let class = serde_json::to_value(c.class)
            .ok()
            .and_then(|v| v.as_str().map(ToString::to_string))
            .unwrap_or_default();
        println!(
            "{:<20} {:<10} {:>6} {:>8} {:>8}  {}",
            c.view,
            class,
            c.hash_distance.map_or_else(|| "-".to_string(), |d| d.to_string()),
            fmt_score(c.pixel_ratio),
            if c.pass { "pass" } else { "FAIL" },
            c.diff_artifact
                .as_ref()
                .map(|p| p.display().to_string())
                .or_else(|| c.error.clone())
                .unwrap_or_default()
        );
    }
    let s = &report.summary;
    println!();
    println!(
        "Checked {}  passed {}  failed {}  hash distance mean={} min={} max={}",
        s.checked,
        s.passed,
        s.failed,
        fmt_score(s.mean_hash_distance),
        s.min_hash_distance.map_or_else(|| "-".to_string(), |d| d.to_string()),
        s.max_hash_distance.map_or_else(|| "-".to_string(), |d| d.to_string()),
    );
    for w in &report.warnings {
        println!("Warning: {w}");
    }
}

/// Print timing across runs and the final cache state.
#[allow(clippy::cast_precision_loss)]
fn print_multi_run_summary(durations: &[f64], engine: &ConsistencyEngine) {
    println!();
    println!("Summary ({} runs)\n{}", durations.len(), "=".repeat(60));
    if durations.is_empty() {
        println!("Warning: no runs to summarize");
        return;
    }
    let min = durations.iter().copied().reduce(f64::min).unwrap_or(0.0);
    let max = durations.iter().copied().reduce(f64::max).unwrap_or(0.0);
    let mean = durations.iter().sum::<f64>() / durations.len() as f64;
    println!("Duration: min={min:.3}ms  mean={mean:.3}ms  max={max:.3}ms");
    if let Some(first) = durations.first() {
        println!("First (cold cache): {first:.3}ms");
    }
    let stats = engine.calculator().cache_stats();
    println!(
        "Cache: bytes={} histograms={} edge_maps={} evictions={}",
        stats.bytes, stats.histograms, stats.edge_maps, stats.evictions
    );
}
