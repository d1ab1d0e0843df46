//! pipestat: compare image-preprocessing pipelines on quality metrics.
//!
//! Reads a wide CSV table (`image_name`, `pipeline`, one column per
//! metric), runs the Friedman test and Holm-corrected pairwise Wilcoxon
//! signed-rank tests for every metric, writes the result tables, and
//! prints a report.
//!
//! # Usage
//!
//! ```text
//! cargo run --release --bin pipestat -- [OPTIONS] <INPUT>
//! ```

#![allow(clippy::print_stdout, clippy::print_stderr)]

mod logging;
mod output;

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use pipestat_core::{AnalysisConfig, Clock, DerivedMetric, PipelineId, SignedRankMethod};
use pipestat_format::{FormatError, ReportStyle};

/// Exit status when the input table is structurally invalid.
const EXIT_MALFORMED_INPUT: u8 = 2;

/// Nonparametric comparison of image-preprocessing pipelines.
///
/// Runs a Friedman test per metric, followed by pairwise Wilcoxon
/// signed-rank tests with Holm correction, and reports which pipelines
/// differ.
#[derive(Parser)]
#[command(name = "pipestat", version)]
struct Cli {
    /// Wide CSV input with `image_name`, `pipeline`, and metric columns.
    input: PathBuf,

    /// Directory for `summary.csv`, `posthoc_<metric>.csv`, and
    /// `skipped.csv`. Nothing is written when omitted.
    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// Family-wise significance level.
    #[arg(long, default_value_t = AnalysisConfig::DEFAULT_ALPHA)]
    alpha: f64,

    /// Preferred pipeline column order (comma-separated).
    #[arg(long, value_delimiter = ',')]
    order: Vec<String>,

    /// Pipeline identifier prefix; rows not matching `<prefix><digits>`
    /// are excluded.
    #[arg(long, default_value = AnalysisConfig::DEFAULT_PIPELINE_PREFIX)]
    prefix: String,

    /// Metrics to leave out (comma-separated).
    #[arg(long, value_delimiter = ',')]
    exclude: Vec<String>,

    /// Add `rel_sharpness` (sharpness per pixel) and drop raw `sharpness`.
    #[arg(long)]
    relative_sharpness: bool,

    /// Signed-rank p-value method.
    #[arg(long, value_enum, default_value_t = Method::Auto)]
    signed_rank: Method,

    /// Largest effective sample size for which `auto` uses the exact test
    /// (at most 500).
    #[arg(long, default_value_t = AnalysisConfig::DEFAULT_EXACT_THRESHOLD)]
    exact_threshold: usize,

    /// Disable the continuity correction of the normal approximation.
    #[arg(long)]
    no_continuity_correction: bool,

    /// Full analysis config as a JSON file.
    ///
    /// When provided, all other analysis flags are ignored.
    #[arg(long, conflicts_with = "config_json")]
    config: Option<PathBuf>,

    /// Full analysis config as a JSON string.
    ///
    /// When provided, all other analysis flags are ignored.
    /// The JSON must be a valid `AnalysisConfig` serialization; missing
    /// fields take their defaults.
    #[arg(long)]
    config_json: Option<String>,

    /// Print the full report as JSON instead of text.
    #[arg(long)]
    json: bool,

    /// Print run diagnostics to stderr.
    #[arg(long)]
    diagnostics: bool,

    /// Decimal places in the text report.
    #[arg(long, default_value_t = ReportStyle::DEFAULT_PRECISION)]
    precision: usize,

    /// Marker appended to significant rows in the text report.
    #[arg(long, default_value = ReportStyle::DEFAULT_MARKER)]
    marker: String,

    /// Default log level when `RUST_LOG` is unset.
    #[arg(long, default_value = "warn")]
    log_level: String,
}

/// Signed-rank method selection.
#[derive(Clone, Copy, ValueEnum)]
enum Method {
    /// Exact for small samples without ties, normal otherwise.
    Auto,
    /// Always exact.
    Exact,
    /// Always the normal approximation.
    Normal,
}

/// Build an [`AnalysisConfig`] from CLI arguments.
///
/// If `--config` or `--config-json` is provided, the JSON is parsed
/// directly and all individual analysis flags are ignored.
fn config_from_cli(cli: &Cli) -> Result<AnalysisConfig> {
    if let Some(ref json) = cli.config_json {
        return serde_json::from_str(json).context("error parsing --config-json");
    }
    if let Some(ref path) = cli.config {
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("error reading {}", path.display()))?;
        return serde_json::from_str(&json)
            .with_context(|| format!("error parsing {}", path.display()));
    }

    let mut config = AnalysisConfig {
        alpha: cli.alpha,
        pipeline_prefix: cli.prefix.clone(),
        signed_rank: match cli.signed_rank {
            Method::Auto => SignedRankMethod::Auto,
            Method::Exact => SignedRankMethod::Exact,
            Method::Normal => SignedRankMethod::Normal,
        },
        exact_threshold: cli.exact_threshold,
        continuity_correction: !cli.no_continuity_correction,
        excluded_metrics: cli.exclude.clone(),
        ..AnalysisConfig::default()
    };
    if !cli.order.is_empty() {
        config.pipeline_order = cli.order.iter().map(PipelineId::new).collect();
    }
    if cli.relative_sharpness {
        let derived = DerivedMetric::relative_sharpness();
        if !config.excluded_metrics.contains(&derived.source) {
            config.excluded_metrics.push(derived.source.clone());
        }
        config.derived_metrics.push(derived);
    }
    Ok(config)
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = logging::init(&cli.log_level) {
        eprintln!("{e:#}");
        return ExitCode::FAILURE;
    }

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) if is_malformed_input(&e) => {
            tracing::error!(path = %cli.input.display(), "malformed input: {e:#}");
            eprintln!("Error: malformed input: {e:#}");
            ExitCode::from(EXIT_MALFORMED_INPUT)
        }
        Err(e) => {
            tracing::error!("{e:#}");
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

/// Whether `err` wraps a [`FormatError`] describing a bad input table.
fn is_malformed_input(err: &anyhow::Error) -> bool {
    err.downcast_ref::<FormatError>()
        .is_some_and(FormatError::is_malformed_input)
}

fn run(cli: &Cli) -> Result<()> {
    let config = config_from_cli(cli)?;
    config.validate().context("invalid analysis configuration")?;

    let bytes = std::fs::read(&cli.input)
        .with_context(|| format!("error reading {}", cli.input.display()))?;
    tracing::info!(path = %cli.input.display(), bytes = bytes.len(), "loaded input");

    let table = pipestat_format::read_observations(bytes.as_slice())
        .with_context(|| format!("error parsing {}", cli.input.display()))?;
    tracing::info!(
        observations = table.len(),
        metrics = table.metrics().len(),
        "parsed observation table"
    );

    let report = pipestat_core::analyze_with_clock(&table, &config, &StdClock)
        .context("analysis failed")?;

    if let Some(ref dir) = cli.output_dir {
        output::write_tables(dir, &report)?;
    }

    if cli.diagnostics {
        eprintln!("{}", report.diagnostics.report());
        eprintln!();
    }

    if cli.json {
        let json = serde_json::to_string_pretty(&report).context("error serializing report")?;
        println!("{json}");
    } else {
        let style = ReportStyle {
            precision: cli.precision,
            significance_marker: cli.marker.clone(),
            ..ReportStyle::default()
        };
        print!("{}", pipestat_format::render_report(&report, &style));
    }

    Ok(())
}

/// [`Clock`] implementation backed by [`std::time::Instant`].
struct StdClock;

impl Clock for StdClock {
    type Instant = Instant;

    fn now(&self) -> Instant {
        Instant::now()
    }

    fn elapsed(&self, since: &Instant) -> Duration {
        since.elapsed()
    }
}
