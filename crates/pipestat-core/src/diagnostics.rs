//! Run diagnostics: timing, row counts, and outcomes for each metric.
//!
//! Every call to [`analyze_with_clock`](crate::analyze_with_clock)
//! collects diagnostics alongside the statistical results. Timestamps come
//! from an injected [`Clock`] so this crate never touches a platform
//! timer; [`analyze`](crate::analyze) uses [`NoClock`] and reports zero
//! durations.
//!
//! Durations are serialized as fractional seconds (`f64`) for JSON
//! compatibility, since `std::time::Duration` does not implement serde
//! traits.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Source of timestamps for diagnostics.
///
/// Shared across worker threads while metrics are analysed in parallel.
pub trait Clock: Sync {
    /// Opaque point in time.
    type Instant;

    /// Capture the current time.
    fn now(&self) -> Self::Instant;

    /// Time elapsed since `since`.
    fn elapsed(&self, since: &Self::Instant) -> Duration;
}

/// [`Clock`] that never advances.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoClock;

impl Clock for NoClock {
    type Instant = ();

    fn now(&self) {}

    fn elapsed(&self, _since: &()) -> Duration {
        Duration::ZERO
    }
}

/// Serde support for `std::time::Duration` as fractional seconds.
mod duration_serde {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    /// Serialize a `Duration` as fractional seconds (`f64`).
    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        duration.as_secs_f64().serialize(serializer)
    }

    /// Deserialize a `Duration` from fractional seconds (`f64`).
    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(|_| {
            serde::de::Error::custom(
                "duration seconds must be finite, non-negative, and representable as a Duration",
            )
        })
    }
}

/// Diagnostics collected from one analysis run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalysisDiagnostics {
    /// Observations in the table handed to the analysis.
    pub observations: usize,
    /// Observations dropped because their pipeline did not match the
    /// variant pattern.
    pub excluded_observations: usize,
    /// Observations added by derived metrics.
    pub derived_observations: usize,
    /// One entry per metric, in analysis order.
    pub metrics: Vec<MetricDiagnostics>,
    /// Total wall-clock duration of the run (seconds).
    #[serde(with = "duration_serde")]
    pub total_duration: Duration,
}

/// Diagnostics for a single metric.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricDiagnostics {
    /// Metric name.
    pub metric_name: String,
    /// What happened to the metric.
    pub outcome: MetricOutcome,
    /// Distinct images with at least one observation of the metric.
    pub rows_observed: usize,
    /// Images with a value for every pipeline column.
    pub rows_complete: usize,
    /// Pipeline columns in the design matrix (0 when it was not built).
    pub k_pipelines: usize,
    /// Pairwise comparisons run.
    pub comparisons: usize,
    /// Comparisons with no non-zero differences.
    pub degenerate_pairs: usize,
    /// Wall-clock duration of this metric's analysis (seconds).
    #[serde(with = "duration_serde")]
    pub duration: Duration,
}

/// Final state of one metric.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MetricOutcome {
    /// Friedman and post-hoc results were produced.
    Analyzed,
    /// Not enough pipelines or complete images.
    Skipped,
    /// A numerical or structural error stopped this metric.
    Failed,
}

impl MetricOutcome {
    /// Lower-case label used in reports.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Analyzed => "analyzed",
            Self::Skipped => "skipped",
            Self::Failed => "failed",
        }
    }
}

impl AnalysisDiagnostics {
    /// Number of metrics with the given outcome.
    #[must_use]
    pub fn count(&self, outcome: MetricOutcome) -> usize {
        self.metrics.iter().filter(|m| m.outcome == outcome).count()
    }

    /// Format diagnostics as a human-readable report.
    #[must_use]
    pub fn report(&self) -> String {
        let mut lines = Vec::new();

        lines.push(format!("Analysis Diagnostics Report\n{}", "=".repeat(60)));
        lines.push(format!(
            "Observations: {} ({} excluded by pipeline pattern, {} derived)",
            self.observations, self.excluded_observations, self.derived_observations,
        ));
        lines.push(format!(
            "Metrics: {} analyzed, {} skipped, {} failed",
            self.count(MetricOutcome::Analyzed),
            self.count(MetricOutcome::Skipped),
            self.count(MetricOutcome::Failed),
        ));
        lines.push(format!(
            "Total duration: {:.3}ms",
            duration_ms(self.total_duration),
        ));
        lines.push(String::new());

        lines.push(format!(
            "{:<24} {:>9} {:>10} {:>10}  {}",
            "Metric", "Outcome", "Duration", "% Total", "Details"
        ));
        lines.push("-".repeat(80));

        let total_ms = duration_ms(self.total_duration);
        for metric in &self.metrics {
            let ms = duration_ms(metric.duration);
            let pct = if total_ms > 0.0 {
                ms / total_ms * 100.0
            } else {
                0.0
            };
            lines.push(format!(
                "{:<24} {:>9} {ms:>8.3}ms {pct:>9.1}%  {}",
                metric.metric_name,
                metric.outcome.as_str(),
                format_details(metric),
            ));
        }

        lines.join("\n")
    }
}

/// Convert a `Duration` to milliseconds as `f64`.
fn duration_ms(d: Duration) -> f64 {
    d.as_secs_f64() * 1000.0
}

fn format_details(metric: &MetricDiagnostics) -> String {
    let mut details = format!(
        "rows {}/{} k={}",
        metric.rows_complete, metric.rows_observed, metric.k_pipelines
    );
    if metric.comparisons > 0 {
        details.push_str(&format!(" pairs={}", metric.comparisons));
    }
    if metric.degenerate_pairs > 0 {
        details.push_str(&format!(" degenerate={}", metric.degenerate_pairs));
    }
    details
}
