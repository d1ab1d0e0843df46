//! Result aggregation across metrics.
//!
//! For each metric: build the design matrix, run the Friedman test, run
//! every pairwise signed-rank test, and Holm-correct the pairwise family.
//! Metrics are analysed in parallel; pairs within a metric fan out in
//! parallel and join before the correction.

use std::collections::{BTreeMap, HashSet};

use rayon::prelude::*;
use serde::Serialize;

use crate::config::AnalysisConfig;
use crate::design::{DesignMatrix, build_design_matrix};
use crate::diagnostics::{AnalysisDiagnostics, Clock, MetricDiagnostics, MetricOutcome, NoClock};
use crate::friedman::friedman;
use crate::holm::holm;
use crate::observations::ObservationTable;
use crate::signed_rank::{SignedRankOptions, compare_columns};
use crate::types::{
    AnalysisError, CorrectedComparisonSet, FriedmanResult, PairwiseComparison, SignedRankResult,
};

/// A metric left out of the summary because it could not be analysed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SkippedMetric {
    /// Metric name.
    pub metric_name: String,
    /// Why it was skipped or failed.
    pub reason: AnalysisError,
}

/// Friedman and post-hoc results for one metric.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricAnalysis {
    /// Omnibus test.
    pub friedman: FriedmanResult,
    /// Holm-corrected pairwise comparisons.
    pub posthoc: CorrectedComparisonSet,
}

/// Everything produced by one analysis run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalysisReport {
    /// Configuration the run used.
    pub config: AnalysisConfig,
    /// One Friedman result per analysed metric, in metric order.
    pub summary: Vec<FriedmanResult>,
    /// Post-hoc table per analysed metric.
    pub posthoc: BTreeMap<String, CorrectedComparisonSet>,
    /// Metrics skipped for too few pipelines or complete images.
    pub skipped: Vec<SkippedMetric>,
    /// Metrics that failed for any other reason.
    pub failed: Vec<SkippedMetric>,
    /// Timing and counts.
    pub diagnostics: AnalysisDiagnostics,
}

impl AnalysisReport {
    /// Post-hoc table for `metric`, if it was analysed.
    #[must_use]
    pub fn posthoc_for(&self, metric: &str) -> Option<&CorrectedComparisonSet> {
        self.posthoc.get(metric)
    }

    /// Summary row for `metric`, if it was analysed.
    #[must_use]
    pub fn summary_for(&self, metric: &str) -> Option<&FriedmanResult> {
        self.summary.iter().find(|r| r.metric_name == metric)
    }

    /// Analysed metrics paired with their post-hoc tables, in metric order.
    pub fn analyzed(&self) -> impl Iterator<Item = (&FriedmanResult, &CorrectedComparisonSet)> {
        self.summary
            .iter()
            .filter_map(|r| self.posthoc.get(&r.metric_name).map(|p| (r, p)))
    }
}

/// Analyse every metric of `table` without timing.
///
/// # Errors
///
/// See [`analyze_with_clock`].
pub fn analyze(
    table: &ObservationTable,
    config: &AnalysisConfig,
) -> Result<AnalysisReport, AnalysisError> {
    analyze_with_clock(table, config, &NoClock)
}

/// Analyse every metric of `table`, timing each one with `clock`.
///
/// Observations whose pipeline does not match the variant pattern are
/// dropped, derived metrics are appended, and excluded metrics removed
/// before analysis. Per-metric problems never abort the run: metrics with
/// too few pipelines or complete images land in
/// [`skipped`](AnalysisReport::skipped), any other per-metric error in
/// [`failed`](AnalysisReport::failed).
///
/// # Errors
///
/// Returns [`AnalysisError::InvalidConfig`] if `config` fails validation
/// or a derived metric collides with an existing one.
pub fn analyze_with_clock<C: Clock>(
    table: &ObservationTable,
    config: &AnalysisConfig,
    clock: &C,
) -> Result<AnalysisReport, AnalysisError> {
    let start = clock.now();
    config.validate()?;

    let (mut working, excluded_observations) = table.retain_variants(&config.pipeline_prefix);
    if excluded_observations > 0 {
        tracing::warn!(
            excluded = excluded_observations,
            prefix = %config.pipeline_prefix,
            "dropped observations whose pipeline does not match the variant pattern"
        );
    }

    let before_derived = working.len();
    for derived in &config.derived_metrics {
        working = working.with_derived(derived)?;
    }
    let derived_observations = working.len() - before_derived;
    let working = working.without_metrics(&config.excluded_metrics);

    let outcomes: Vec<(Result<MetricAnalysis, AnalysisError>, MetricDiagnostics)> = working
        .metrics()
        .par_iter()
        .map(|metric| timed_metric(&working, metric, config, clock))
        .collect();

    let mut report = AnalysisReport {
        config: config.clone(),
        summary: Vec::new(),
        posthoc: BTreeMap::new(),
        skipped: Vec::new(),
        failed: Vec::new(),
        diagnostics: AnalysisDiagnostics {
            observations: table.len(),
            excluded_observations,
            derived_observations,
            metrics: Vec::with_capacity(outcomes.len()),
            total_duration: std::time::Duration::ZERO,
        },
    };

    for (outcome, diagnostics) in outcomes {
        let metric_name = diagnostics.metric_name.clone();
        match outcome {
            Ok(analysis) => {
                report.summary.push(analysis.friedman);
                report.posthoc.insert(metric_name, analysis.posthoc);
            }
            Err(reason) if reason.is_skip() => {
                tracing::warn!(metric = %metric_name, %reason, "skipping metric");
                report.skipped.push(SkippedMetric {
                    metric_name,
                    reason,
                });
            }
            Err(reason) => {
                tracing::warn!(metric = %metric_name, %reason, "metric analysis failed");
                report.failed.push(SkippedMetric {
                    metric_name,
                    reason,
                });
            }
        }
        report.diagnostics.metrics.push(diagnostics);
    }

    report.diagnostics.total_duration = clock.elapsed(&start);
    Ok(report)
}

fn timed_metric<C: Clock>(
    table: &ObservationTable,
    metric: &str,
    config: &AnalysisConfig,
    clock: &C,
) -> (Result<MetricAnalysis, AnalysisError>, MetricDiagnostics) {
    let start = clock.now();
    let rows_observed = table
        .for_metric(metric)
        .map(|obs| obs.image_id.as_str())
        .collect::<HashSet<_>>()
        .len();

    let matrix = build_design_matrix(table, metric, &config.pipeline_order, config.min_conditions);
    let (rows_complete, k_pipelines) = matrix
        .as_ref()
        .map_or((0, 0), |m| (m.n_rows(), m.n_cols()));
    let result = matrix.and_then(|m| analyze_matrix(&m, config));

    let (comparisons, degenerate_pairs) = result.as_ref().map_or((0, 0), |analysis| {
        (
            analysis.posthoc.comparisons.len(),
            analysis.posthoc.degenerate().count(),
        )
    });
    let outcome = match &result {
        Ok(_) => MetricOutcome::Analyzed,
        Err(e) if e.is_skip() => MetricOutcome::Skipped,
        Err(_) => MetricOutcome::Failed,
    };

    let diagnostics = MetricDiagnostics {
        metric_name: metric.to_string(),
        outcome,
        rows_observed,
        rows_complete,
        k_pipelines,
        comparisons,
        degenerate_pairs,
        duration: clock.elapsed(&start),
    };
    (result, diagnostics)
}

/// Run the Friedman test and Holm-corrected post-hoc comparisons on one
/// design matrix.
///
/// # Errors
///
/// Propagates errors from [`friedman`] and [`posthoc`].
pub fn analyze_matrix(
    matrix: &DesignMatrix,
    config: &AnalysisConfig,
) -> Result<MetricAnalysis, AnalysisError> {
    tracing::debug!(
        metric = matrix.metric_name(),
        n = matrix.n_rows(),
        k = matrix.n_cols(),
        dropped = matrix.dropped_rows(),
        "analysing metric"
    );
    let friedman = friedman(matrix)?;
    let posthoc = posthoc(matrix, config)?;
    Ok(MetricAnalysis { friedman, posthoc })
}

/// Every pairwise signed-rank comparison of `matrix`, Holm-corrected.
///
/// Pairs are the column combinations `(i, j)` with `i < j` in column
/// order. A pair with no non-zero differences is kept in the family (so
/// the family size stays `k (k - 1) / 2`) but reported with no p-values
/// and never significant.
///
/// # Errors
///
/// Returns [`AnalysisError::Numerical`] if a signed-rank p-value cannot be
/// evaluated, or [`AnalysisError::InvalidConfig`] for an invalid `alpha`.
pub fn posthoc(
    matrix: &DesignMatrix,
    config: &AnalysisConfig,
) -> Result<CorrectedComparisonSet, AnalysisError> {
    let k = matrix.n_cols();
    let pairs: Vec<(usize, usize)> = (0..k)
        .flat_map(|a| ((a + 1)..k).map(move |b| (a, b)))
        .collect();
    let options = SignedRankOptions::from(config);

    let tests: Vec<Option<SignedRankResult>> = pairs
        .par_iter()
        .map(|&(a, b)| match compare_columns(matrix, a, b, &options) {
            Ok(result) => Ok(Some(result)),
            Err(AnalysisError::DegenerateComparison {
                pipeline_a,
                pipeline_b,
            }) => {
                tracing::warn!(
                    metric = matrix.metric_name(),
                    %pipeline_a,
                    %pipeline_b,
                    "no non-zero differences; comparison left undefined"
                );
                Ok(None)
            }
            Err(e) => Err(e),
        })
        .collect::<Result<_, _>>()?;

    // Degenerate pairs enter the family with p = 1, which never lowers
    // another pair's adjusted value.
    let raw: Vec<f64> = tests
        .iter()
        .map(|t| t.as_ref().map_or(1.0, |t| t.p_value))
        .collect();
    let adjustment = holm(&raw, config.alpha)?;

    let pipelines = matrix.pipelines();
    let mut comparisons: Vec<PairwiseComparison> = pairs
        .iter()
        .zip(tests)
        .enumerate()
        .map(|(pair_index, (&(a, b), test))| {
            let defined = test.is_some();
            PairwiseComparison {
                metric_name: matrix.metric_name().to_string(),
                pipeline_a: pipelines[a].clone(),
                pipeline_b: pipelines[b].clone(),
                pair_index,
                raw_p_value: test.as_ref().map(|t| t.p_value),
                adjusted_p_value: defined.then(|| adjustment.adjusted[pair_index]),
                is_significant: defined && adjustment.reject[pair_index],
                test,
            }
        })
        .collect();

    comparisons.sort_by(|x, y| {
        let key = |c: &PairwiseComparison| {
            (
                c.adjusted_p_value.unwrap_or(f64::INFINITY),
                c.raw_p_value.unwrap_or(f64::INFINITY),
            )
        };
        let (xa, xr) = key(x);
        let (ya, yr) = key(y);
        xa.total_cmp(&ya)
            .then(xr.total_cmp(&yr))
            .then(x.pair_index.cmp(&y.pair_index))
    });

    Ok(CorrectedComparisonSet {
        metric_name: matrix.metric_name().to_string(),
        alpha: config.alpha,
        family_size: pairs.len(),
        comparisons,
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::pipeline_id::PipelineId;
    use crate::types::Observation;

    fn matrix(pipelines: &[&str], rows: &[Vec<f64>]) -> DesignMatrix {
        DesignMatrix::new(
            "m",
            (0..rows.len()).map(|i| format!("img{i:02}")).collect(),
            pipelines.iter().map(|p| PipelineId::from(*p)).collect(),
            rows,
        )
        .unwrap()
    }

    #[test]
    fn posthoc_covers_every_pair() {
        let rows: Vec<Vec<f64>> = (0..8)
            .map(|i| {
                let x = f64::from(i);
                vec![x, x + 1.0 + x * 0.1, x + 3.0 - x * 0.05, x * 2.0]
            })
            .collect();
        let set = posthoc(&matrix(&["p0", "p2", "p5", "p7"], &rows), &AnalysisConfig::default())
            .unwrap();
        assert_eq!(set.family_size, 6);
        assert_eq!(set.comparisons.len(), 6);
        let mut indices: Vec<usize> = set.comparisons.iter().map(|c| c.pair_index).collect();
        indices.sort_unstable();
        assert_eq!(indices, vec![0, 1, 2, 3, 4, 5]);

        let ordered = set.in_pair_order();
        assert_eq!(ordered[0].label(), "p0 vs p2");
        assert_eq!(ordered[5].label(), "p5 vs p7");
    }

    #[test]
    fn posthoc_sorted_by_adjusted_p() {
        let rows: Vec<Vec<f64>> = (0..10)
            .map(|i| {
                let x = f64::from(i);
                let wobble = if i % 2 == 0 { 0.5 } else { -0.5 };
                vec![x, x + wobble, x + 10.0]
            })
            .collect();
        let set = posthoc(&matrix(&["p0", "p2", "p5"], &rows), &AnalysisConfig::default())
            .unwrap();
        let adjusted: Vec<f64> = set
            .comparisons
            .iter()
            .map(|c| c.adjusted_p_value.unwrap())
            .collect();
        assert!(adjusted.windows(2).all(|w| w[0] <= w[1]));
        for c in &set.comparisons {
            assert!(c.adjusted_p_value.unwrap() >= c.raw_p_value.unwrap());
            assert_eq!(c.is_significant, c.adjusted_p_value.unwrap() <= set.alpha);
        }
    }

    #[test]
    fn degenerate_pair_stays_in_family() {
        // p0 and p2 identical on every image; p5 gaps all distinct.
        let rows: Vec<Vec<f64>> = (1..=8)
            .map(|i| {
                let x = f64::from(i);
                vec![x, x, x.mul_add(x, 100.0)]
            })
            .collect();
        let set = posthoc(&matrix(&["p0", "p2", "p5"], &rows), &AnalysisConfig::default())
            .unwrap();
        assert_eq!(set.family_size, 3);
        let degenerate = set.find("p0", "p2").unwrap();
        assert!(degenerate.is_degenerate());
        assert_eq!(degenerate.raw_p_value, None);
        assert_eq!(degenerate.adjusted_p_value, None);
        assert!(!degenerate.is_significant);
        assert_eq!(set.comparisons.last().unwrap().pair_index, 0);

        // Exact p for 8 all-positive differences is 2 / 256; family of 3.
        let other = set.find("p0", "p5").unwrap();
        assert!((other.raw_p_value.unwrap() - 2.0 / 256.0).abs() < 1e-15);
        assert!((other.adjusted_p_value.unwrap() - 3.0 * 2.0 / 256.0).abs() < 1e-15);
        assert!(other.is_significant);
    }

    fn observations(metric: &str, pipelines: &[&str], images: usize) -> Vec<Observation> {
        let mut out = Vec::new();
        for image in 0..images {
            for (j, pipeline) in pipelines.iter().enumerate() {
                #[allow(clippy::cast_precision_loss)]
                let value = (image * 3 + j * j) as f64;
                out.push(Observation::new(
                    format!("img{image:02}"),
                    *pipeline,
                    metric,
                    Some(value),
                ));
            }
        }
        out
    }

    #[test]
    fn skips_metric_with_two_pipelines() {
        let mut obs = observations("entropy", &["p0", "p2", "p5"], 6);
        obs.extend(observations("ratio", &["p0", "p2"], 6));
        let table = ObservationTable::new(obs).unwrap();

        let report = analyze(&table, &AnalysisConfig::default()).unwrap();
        assert_eq!(report.summary.len(), 1);
        assert_eq!(report.summary[0].metric_name, "entropy");
        assert!(report.posthoc_for("entropy").is_some());
        assert!(report.posthoc_for("ratio").is_none());
        assert_eq!(report.skipped.len(), 1);
        assert_eq!(report.skipped[0].metric_name, "ratio");
        assert!(matches!(
            report.skipped[0].reason,
            AnalysisError::InsufficientConditions { found: 2, .. }
        ));
        assert!(report.failed.is_empty());
        assert_eq!(report.diagnostics.count(MetricOutcome::Skipped), 1);
    }

    #[test]
    fn pipeline_without_values_skips_metric() {
        let mut obs = observations("contrast", &["p0", "p2", "p5"], 10);
        for image in 0..10 {
            obs.push(Observation::new(format!("img{image:02}"), "p7", "contrast", None));
        }
        let table = ObservationTable::new(obs).unwrap();

        let report = analyze(&table, &AnalysisConfig::default()).unwrap();
        assert!(report.summary.is_empty());
        assert_eq!(report.skipped.len(), 1);
        assert_eq!(
            report.skipped[0].reason,
            AnalysisError::InsufficientObservations {
                metric: "contrast".to_string()
            }
        );
    }

    #[test]
    fn non_variant_pipelines_are_excluded() {
        let table = ObservationTable::new(observations(
            "entropy",
            &["p0", "p2", "p5", "baseline"],
            6,
        ))
        .unwrap();
        let report = analyze(&table, &AnalysisConfig::default()).unwrap();
        assert_eq!(report.summary[0].k_pipelines, 3);
        assert_eq!(report.diagnostics.excluded_observations, 6);
        assert_eq!(report.diagnostics.observations, 24);
    }

    #[test]
    fn excluded_metrics_are_not_analysed() {
        let mut obs = observations("entropy", &["p0", "p2", "p5"], 6);
        obs.extend(observations("sharpness", &["p0", "p2", "p5"], 6));
        let table = ObservationTable::new(obs).unwrap();
        let config = AnalysisConfig {
            excluded_metrics: vec!["sharpness".to_string()],
            ..AnalysisConfig::default()
        };
        let report = analyze(&table, &config).unwrap();
        assert_eq!(report.summary.len(), 1);
        assert_eq!(report.diagnostics.metrics.len(), 1);
    }

    #[test]
    fn invalid_config_is_fatal() {
        let table = ObservationTable::new(observations("entropy", &["p0", "p2", "p5"], 4)).unwrap();
        let config = AnalysisConfig {
            alpha: 1.5,
            ..AnalysisConfig::default()
        };
        assert!(matches!(
            analyze(&table, &config),
            Err(AnalysisError::InvalidConfig(_))
        ));
    }
}
