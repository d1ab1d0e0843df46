//! CSV encoders for the result tables.
//!
//! Floats are written with Rust's shortest round-trip formatting so the
//! files carry full precision. Missing p-values are empty cells.

use std::collections::HashSet;

use pipestat_core::{AnalysisReport, CorrectedComparisonSet, FriedmanResult};

use crate::error::FormatError;

/// Header of the cross-metric summary table.
pub const SUMMARY_HEADER: [&str; 7] = [
    "metric",
    "friedman_chi2",
    "df",
    "p_value",
    "kendalls_w",
    "n_images",
    "k_pipelines",
];

/// Header of a per-metric post-hoc table.
pub const POSTHOC_HEADER: [&str; 7] = [
    "comparison",
    "statistic",
    "n_effective",
    "method",
    "p_raw",
    "p_holm",
    "significant",
];

/// Header of the skipped-metrics table.
pub const SKIPPED_HEADER: [&str; 2] = ["metric", "reason"];

/// One row per analysed metric, in the order given.
///
/// # Errors
///
/// Returns [`FormatError`] if the CSV writer fails.
pub fn summary_csv(results: &[FriedmanResult]) -> Result<String, FormatError> {
    let mut wtr = csv::Writer::from_writer(Vec::new());
    wtr.write_record(SUMMARY_HEADER)?;
    for r in results {
        wtr.write_record([
            r.metric_name.clone(),
            r.statistic.to_string(),
            r.degrees_of_freedom.to_string(),
            r.p_value.to_string(),
            r.effect_size.to_string(),
            r.n_images.to_string(),
            r.k_pipelines.to_string(),
        ])?;
    }
    finish(wtr)
}

/// One row per pipeline pair, sorted by adjusted p-value ascending.
///
/// Degenerate pairs have empty `statistic`, `n_effective`, `method`, and
/// p-value cells.
///
/// # Errors
///
/// Returns [`FormatError`] if the CSV writer fails.
pub fn posthoc_csv(set: &CorrectedComparisonSet) -> Result<String, FormatError> {
    let opt = |v: Option<f64>| v.map_or_else(String::new, |x| x.to_string());

    let mut wtr = csv::Writer::from_writer(Vec::new());
    wtr.write_record(POSTHOC_HEADER)?;
    for c in &set.comparisons {
        let test = c.test.as_ref();
        wtr.write_record([
            c.label(),
            opt(test.map(|t| t.statistic)),
            test.map_or_else(String::new, |t| t.n_effective.to_string()),
            test.map_or_else(String::new, |t| t.method.as_str().to_string()),
            opt(c.raw_p_value),
            opt(c.adjusted_p_value),
            c.is_significant.to_string(),
        ])?;
    }
    finish(wtr)
}

/// Skipped and failed metrics with their reasons.
///
/// # Errors
///
/// Returns [`FormatError`] if the CSV writer fails.
pub fn skipped_csv(report: &AnalysisReport) -> Result<String, FormatError> {
    let mut wtr = csv::Writer::from_writer(Vec::new());
    wtr.write_record(SKIPPED_HEADER)?;
    for skipped in report.skipped.iter().chain(&report.failed) {
        wtr.write_record([skipped.metric_name.clone(), skipped.reason.to_string()])?;
    }
    finish(wtr)
}

/// File name for a metric's post-hoc table: `posthoc_<metric>.csv` with
/// characters outside `[A-Za-z0-9_-]` replaced by `_`.
///
/// Distinct metrics can map to the same name; use [`posthoc_file_names`]
/// when writing several tables side by side.
#[must_use]
pub fn posthoc_file_name(metric: &str) -> String {
    format!("posthoc_{}.csv", sanitize(metric))
}

/// File names for several metrics' post-hoc tables, one per metric and in
/// the same order, all distinct.
///
/// A metric whose [`posthoc_file_name`] is already taken gets the first
/// free `posthoc_<metric>_<n>.csv` with `n >= 2`. Names are compared
/// ignoring ASCII case so they stay distinct on case-insensitive file
/// systems.
#[must_use]
pub fn posthoc_file_names<S: AsRef<str>>(metrics: &[S]) -> Vec<String> {
    let mut taken: HashSet<String> = HashSet::with_capacity(metrics.len());
    metrics
        .iter()
        .map(|metric| {
            let safe = sanitize(metric.as_ref());
            let mut name = format!("posthoc_{safe}.csv");
            let mut n = 2_usize;
            while !taken.insert(name.to_ascii_lowercase()) {
                name = format!("posthoc_{safe}_{n}.csv");
                n += 1;
            }
            name
        })
        .collect()
}

fn sanitize(metric: &str) -> String {
    metric
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

fn finish(wtr: csv::Writer<Vec<u8>>) -> Result<String, FormatError> {
    let bytes = wtr
        .into_inner()
        .map_err(|e| FormatError::Output(e.error().to_string()))?;
    String::from_utf8(bytes).map_err(|e| FormatError::Output(e.to_string()))
}
