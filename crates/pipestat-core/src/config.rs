//! Analysis configuration.
//!
//! Everything the engine needs beyond the observation table is carried in
//! an explicit [`AnalysisConfig`] value. There are no process-wide
//! defaults: callers build a config (or take [`AnalysisConfig::default`])
//! and pass it in.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::pipeline_id::PipelineId;
use crate::types::AnalysisError;

/// Selects how signed-rank p-values are computed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SignedRankMethod {
    /// Exact distribution when the effective sample is at most
    /// `exact_threshold` and contains no tied magnitudes, normal
    /// approximation otherwise.
    #[default]
    Auto,
    /// Use the exact (tie-aware) permutation distribution up to
    /// [`AnalysisConfig::MAX_EXACT_SIZE`] non-zero differences, normal
    /// approximation beyond.
    Exact,
    /// Always use the normal approximation.
    Normal,
}

/// How zero paired differences are treated by the signed-rank test.
///
/// Only [`Exclude`](Self::Exclude) ships. Other conventions (e.g. Pratt's
/// rank-with-zeros) can be added without changing [`AnalysisConfig`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ZeroPolicy {
    /// Drop zero differences before ranking, reducing the effective
    /// sample size for that pair.
    #[default]
    Exclude,
}

/// A metric derived by dividing a source metric by a per-pipeline divisor.
///
/// Used to put pipelines with different output resolutions on a common
/// scale, e.g. relative sharpness = sharpness / pixel count.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DerivedMetric {
    /// Name of the new metric.
    pub name: String,
    /// Metric whose values are scaled.
    pub source: String,
    /// Divisor for specific pipelines.
    #[serde(default)]
    pub divisors: BTreeMap<PipelineId, f64>,
    /// Divisor for pipelines not listed in `divisors`.
    pub default_divisor: f64,
}

impl DerivedMetric {
    /// Divisor applied to values from `pipeline`.
    #[must_use]
    pub fn divisor_for(&self, pipeline: &PipelineId) -> f64 {
        self.divisors
            .get(pipeline)
            .copied()
            .unwrap_or(self.default_divisor)
    }

    /// Relative sharpness: raw pipeline `p0` images are 2400x4600 pixels,
    /// every cropped pipeline produces 600x600.
    #[must_use]
    pub fn relative_sharpness() -> Self {
        Self {
            name: "rel_sharpness".to_string(),
            source: "sharpness".to_string(),
            divisors: BTreeMap::from([(PipelineId::new("p0"), 2400.0 * 4600.0)]),
            default_divisor: 600.0 * 600.0,
        }
    }
}

/// Configuration for a comparison run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Family-wise significance level for the Holm decisions.
    pub alpha: f64,

    /// Preferred column order. Pipelines absent from the data are
    /// skipped; pipelines not listed follow in numeric-index order.
    pub pipeline_order: Vec<PipelineId>,

    /// Observations whose pipeline is not `<prefix><digits>` are excluded
    /// before analysis.
    pub pipeline_prefix: String,

    /// Minimum number of pipeline columns for a metric to be analysed.
    /// Never below 3.
    pub min_conditions: usize,

    /// Exact vs. normal-approximation signed-rank p-values.
    pub signed_rank: SignedRankMethod,

    /// Largest effective sample size for which [`SignedRankMethod::Auto`]
    /// uses the exact distribution. At most [`Self::MAX_EXACT_SIZE`].
    pub exact_threshold: usize,

    /// Zero-difference handling in the signed-rank test.
    pub zero_policy: ZeroPolicy,

    /// Apply a 0.5 continuity correction in the normal approximation.
    pub continuity_correction: bool,

    /// Metrics to leave out of the analysis.
    pub excluded_metrics: Vec<String>,

    /// Scaled metrics appended to the table before analysis.
    pub derived_metrics: Vec<DerivedMetric>,
}

impl AnalysisConfig {
    /// Default family-wise significance level.
    pub const DEFAULT_ALPHA: f64 = 0.05;

    /// Default pipeline identifier prefix.
    pub const DEFAULT_PIPELINE_PREFIX: &'static str = "p";

    /// Fewest pipelines the Friedman test is run on.
    pub const MIN_CONDITIONS: usize = 3;

    /// Default exact/normal cut-over for [`SignedRankMethod::Auto`].
    pub const DEFAULT_EXACT_THRESHOLD: usize = 50;

    /// Largest effective sample the exact signed-rank distribution is
    /// computed for. Its table grows as `m^2` and its cost as `m^3`.
    pub const MAX_EXACT_SIZE: usize = 500;

    /// Canonical order of the study's pipelines.
    pub const DEFAULT_PIPELINE_ORDER: [&'static str; 7] =
        ["p0", "p2", "p5", "p7", "p8", "p12", "p13"];

    /// Check invariants that the engine relies on.
    ///
    /// # Errors
    ///
    /// Returns [`AnalysisError::InvalidConfig`] if `alpha` is not in
    /// `(0, 1)`, `min_conditions` is below [`Self::MIN_CONDITIONS`],
    /// `exact_threshold` exceeds [`Self::MAX_EXACT_SIZE`], the pipeline
    /// prefix is empty, or a derived metric has an empty name, a
    /// name equal to its source, or a non-positive or non-finite divisor.
    pub fn validate(&self) -> Result<(), AnalysisError> {
        if self.alpha.is_nan() || self.alpha <= 0.0 || self.alpha >= 1.0 {
            return Err(AnalysisError::InvalidConfig(format!(
                "alpha must be in (0, 1), got {}",
                self.alpha
            )));
        }
        if self.min_conditions < Self::MIN_CONDITIONS {
            return Err(AnalysisError::InvalidConfig(format!(
                "min_conditions must be at least {}, got {}",
                Self::MIN_CONDITIONS,
                self.min_conditions
            )));
        }
        if self.exact_threshold > Self::MAX_EXACT_SIZE {
            return Err(AnalysisError::InvalidConfig(format!(
                "exact_threshold must be at most {}, got {}",
                Self::MAX_EXACT_SIZE,
                self.exact_threshold
            )));
        }
        if self.pipeline_prefix.is_empty() {
            return Err(AnalysisError::InvalidConfig(
                "pipeline_prefix must not be empty".to_string(),
            ));
        }
        for derived in &self.derived_metrics {
            if derived.name.is_empty() || derived.name == derived.source {
                return Err(AnalysisError::InvalidConfig(format!(
                    "derived metric name {:?} must be non-empty and differ from its source",
                    derived.name
                )));
            }
            let divisors = derived
                .divisors
                .values()
                .chain(std::iter::once(&derived.default_divisor));
            for &divisor in divisors {
                if !divisor.is_finite() || divisor <= 0.0 {
                    return Err(AnalysisError::InvalidConfig(format!(
                        "derived metric {:?} has invalid divisor {divisor}",
                        derived.name
                    )));
                }
            }
        }
        Ok(())
    }
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            alpha: Self::DEFAULT_ALPHA,
            pipeline_order: Self::DEFAULT_PIPELINE_ORDER
                .iter()
                .copied()
                .map(PipelineId::from)
                .collect(),
            pipeline_prefix: Self::DEFAULT_PIPELINE_PREFIX.to_string(),
            min_conditions: Self::MIN_CONDITIONS,
            signed_rank: SignedRankMethod::default(),
            exact_threshold: Self::DEFAULT_EXACT_THRESHOLD,
            zero_policy: ZeroPolicy::default(),
            continuity_correction: true,
            excluded_metrics: Vec::new(),
            derived_metrics: Vec::new(),
        }
    }
}
