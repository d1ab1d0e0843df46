//! Shared types for the pipestat comparison engine.

use serde::{Deserialize, Serialize};

use crate::pipeline_id::PipelineId;

/// One measured metric value for one image processed by one pipeline.
///
/// `value` is `None` when the metric could not be computed for that
/// image (the cell was empty in the source table).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    /// Source image identifier (typically its file name).
    pub image_id: String,
    /// Pipeline that produced the measured image.
    pub pipeline_id: PipelineId,
    /// Name of the quality metric.
    pub metric_name: String,
    /// Measured value, or `None` when missing.
    pub value: Option<f64>,
}

impl Observation {
    /// Create an observation.
    #[must_use]
    pub fn new(
        image_id: impl Into<String>,
        pipeline_id: impl Into<PipelineId>,
        metric_name: impl Into<String>,
        value: Option<f64>,
    ) -> Self {
        Self {
            image_id: image_id.into(),
            pipeline_id: pipeline_id.into(),
            metric_name: metric_name.into(),
            value,
        }
    }
}

/// Mean Friedman rank of one pipeline across all images.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeanRank {
    /// Pipeline the rank belongs to.
    pub pipeline: PipelineId,
    /// Rank sum divided by the number of images.
    pub mean_rank: f64,
}

/// Outcome of the Friedman test for one metric.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FriedmanResult {
    /// Metric the design matrix was built for.
    pub metric_name: String,
    /// Friedman chi-square statistic `Q` (non-negative).
    pub statistic: f64,
    /// `k - 1`.
    pub degrees_of_freedom: usize,
    /// Upper-tail chi-square probability of `statistic`.
    pub p_value: f64,
    /// Kendall's coefficient of concordance, `W = Q / (n (k - 1))`.
    pub effect_size: f64,
    /// Number of complete images (rows).
    pub n_images: usize,
    /// Number of pipelines (columns).
    pub k_pipelines: usize,
    /// Mean rank per pipeline, in design-matrix column order.
    pub mean_ranks: Vec<MeanRank>,
}

/// How a signed-rank p-value was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TestMethod {
    /// Exact permutation distribution of the rank sum.
    Exact,
    /// Normal approximation with tie correction.
    Normal,
}

impl TestMethod {
    /// Lowercase name used in output tables.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Exact => "exact",
            Self::Normal => "normal",
        }
    }
}

/// Wilcoxon signed-rank test result for one ordered pair `(a, b)`.
///
/// Differences are taken as `a - b`. Swapping the pair swaps `w_plus`
/// and `w_minus` and flips the sign of `z`; `statistic` and `p_value`
/// are unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignedRankResult {
    /// `min(W+, W-)`.
    pub statistic: f64,
    /// Rank sum of positive differences.
    pub w_plus: f64,
    /// Rank sum of negative differences.
    pub w_minus: f64,
    /// Number of non-zero differences that were ranked.
    pub n_effective: usize,
    /// Exact or normal-approximation p-value.
    pub method: TestMethod,
    /// Standardized `W+` (signed), present for the normal approximation.
    pub z: Option<f64>,
    /// Two-sided p-value.
    pub p_value: f64,
}

/// One post-hoc comparison between two pipelines for one metric.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PairwiseComparison {
    /// Metric the comparison belongs to.
    pub metric_name: String,
    /// First pipeline (earlier in column order).
    pub pipeline_a: PipelineId,
    /// Second pipeline.
    pub pipeline_b: PipelineId,
    /// Position of this pair in column-combination order.
    pub pair_index: usize,
    /// Signed-rank outcome, `None` for a degenerate pair (no non-zero
    /// differences).
    pub test: Option<SignedRankResult>,
    /// Uncorrected two-sided p-value, `None` for a degenerate pair.
    pub raw_p_value: Option<f64>,
    /// Holm-adjusted p-value, `None` for a degenerate pair.
    pub adjusted_p_value: Option<f64>,
    /// `adjusted_p_value <= alpha`; always `false` for a degenerate pair.
    pub is_significant: bool,
}

impl PairwiseComparison {
    /// Comparison label in `"A vs B"` form.
    #[must_use]
    pub fn label(&self) -> String {
        format!("{} vs {}", self.pipeline_a, self.pipeline_b)
    }

    /// Whether the pair had no usable differences.
    #[must_use]
    pub const fn is_degenerate(&self) -> bool {
        self.test.is_none()
    }
}

/// Holm-corrected post-hoc table for one metric.
///
/// `comparisons` is sorted by adjusted p-value ascending (degenerate
/// pairs last, ties broken by raw p-value then pair order).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrectedComparisonSet {
    /// Metric the comparisons belong to.
    pub metric_name: String,
    /// Significance threshold the decisions were taken at.
    pub alpha: f64,
    /// Number of comparisons in the Holm family (`k (k - 1) / 2`).
    pub family_size: usize,
    /// Comparisons, sorted by adjusted p-value ascending.
    pub comparisons: Vec<PairwiseComparison>,
}

impl CorrectedComparisonSet {
    /// Comparisons re-expressed in column-combination order.
    #[must_use]
    pub fn in_pair_order(&self) -> Vec<&PairwiseComparison> {
        let mut ordered: Vec<&PairwiseComparison> = self.comparisons.iter().collect();
        ordered.sort_by_key(|c| c.pair_index);
        ordered
    }

    /// Comparisons whose adjusted p-value is at or below `alpha`.
    pub fn significant(&self) -> impl Iterator<Item = &PairwiseComparison> {
        self.comparisons.iter().filter(|c| c.is_significant)
    }

    /// Comparisons with no usable signed differences.
    pub fn degenerate(&self) -> impl Iterator<Item = &PairwiseComparison> {
        self.comparisons.iter().filter(|c| c.is_degenerate())
    }

    /// Look up the comparison for an unordered pipeline pair.
    #[must_use]
    pub fn find(&self, a: &str, b: &str) -> Option<&PairwiseComparison> {
        self.comparisons.iter().find(|c| {
            let (x, y) = (c.pipeline_a.as_str(), c.pipeline_b.as_str());
            (x == a && y == b) || (x == b && y == a)
        })
    }
}

/// Errors that can occur while building or analysing a design matrix.
///
/// Serializable so skip reasons can travel inside a JSON report.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize, Deserialize)]
pub enum AnalysisError {
    /// Fewer pipeline columns than the Friedman test needs.
    #[error("metric {metric:?} has {found} pipeline(s), at least {required} required")]
    InsufficientConditions {
        /// Metric name.
        metric: String,
        /// Columns observed.
        found: usize,
        /// Columns required.
        required: usize,
    },

    /// No image has a value for every pipeline.
    #[error("metric {metric:?} has no image with values for every pipeline")]
    InsufficientObservations {
        /// Metric name.
        metric: String,
    },

    /// Every paired difference between two pipelines is zero.
    #[error("{pipeline_a} vs {pipeline_b}: no non-zero differences to rank")]
    DegenerateComparison {
        /// First pipeline.
        pipeline_a: PipelineId,
        /// Second pipeline.
        pipeline_b: PipelineId,
    },

    /// Structural problem with the observation table.
    #[error("malformed input: {0}")]
    MalformedInput(String),

    /// Analysis configuration is invalid.
    #[error("invalid analysis configuration: {0}")]
    InvalidConfig(String),

    /// A numerical routine failed to produce a finite result.
    #[error("numerical failure: {0}")]
    Numerical(String),
}

impl AnalysisError {
    /// Whether this error means the metric should be skipped rather than
    /// reported as a failure.
    #[must_use]
    pub const fn is_skip(&self) -> bool {
        matches!(
            self,
            Self::InsufficientConditions { .. } | Self::InsufficientObservations { .. }
        )
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn comparison(a: &str, b: &str, pair_index: usize, p: Option<f64>) -> PairwiseComparison {
        PairwiseComparison {
            metric_name: "contrast".to_string(),
            pipeline_a: a.into(),
            pipeline_b: b.into(),
            pair_index,
            test: p.map(|p_value| SignedRankResult {
                statistic: 0.0,
                w_plus: 0.0,
                w_minus: 10.0,
                n_effective: 4,
                method: TestMethod::Exact,
                z: None,
                p_value,
            }),
            raw_p_value: p,
            adjusted_p_value: p,
            is_significant: p.is_some_and(|p| p <= 0.05),
        }
    }

    #[test]
    fn label_uses_vs() {
        assert_eq!(comparison("p0", "p2", 0, Some(0.1)).label(), "p0 vs p2");
    }

    #[test]
    fn set_queries() {
        let set = CorrectedComparisonSet {
            metric_name: "contrast".to_string(),
            alpha: 0.05,
            family_size: 3,
            comparisons: vec![
                comparison("p2", "p5", 2, Some(0.01)),
                comparison("p0", "p2", 0, Some(0.2)),
                comparison("p0", "p5", 1, None),
            ],
        };

        let order: Vec<usize> = set.in_pair_order().iter().map(|c| c.pair_index).collect();
        assert_eq!(order, vec![0, 1, 2]);
        assert_eq!(set.significant().count(), 1);
        assert_eq!(set.degenerate().count(), 1);
        assert_eq!(set.find("p5", "p2").unwrap().pair_index, 2);
        assert!(set.find("p0", "p13").is_none());
    }

    #[test]
    fn skip_classification() {
        let skip = AnalysisError::InsufficientConditions {
            metric: "m".to_string(),
            found: 2,
            required: 3,
        };
        assert!(skip.is_skip());
        assert!(AnalysisError::InsufficientObservations { metric: "m".into() }.is_skip());
        assert!(!AnalysisError::Numerical("x".into()).is_skip());
    }

    #[test]
    fn error_round_trips_through_json() {
        let err = AnalysisError::DegenerateComparison {
            pipeline_a: "p0".into(),
            pipeline_b: "p2".into(),
        };
        let json = serde_json::to_string(&err).unwrap();
        let back: AnalysisError = serde_json::from_str(&json).unwrap();
        assert_eq!(err, back);
        assert_eq!(back.to_string(), "p0 vs p2: no non-zero differences to rank");
    }
}
