//! pipestat-core: Nonparametric comparison of image-preprocessing
//! pipelines (sans-IO).
//!
//! Given quality-metric observations for a fixed set of images processed
//! by several pipelines, decides per metric whether the pipelines differ:
//!
//! observations -> design matrix -> Friedman test ->
//! pairwise Wilcoxon signed-rank tests -> Holm correction.
//!
//! This crate has **no I/O dependencies** -- it operates on in-memory
//! observation tables and returns structured data. Parsing input tables
//! and rendering results lives in `pipestat-format`.

pub mod analysis;
pub mod config;
pub mod design;
pub mod diagnostics;
pub mod distribution;
pub mod friedman;
pub mod holm;
pub mod observations;
pub mod pipeline_id;
pub mod rank;
pub mod signed_rank;
pub mod types;

pub use analysis::{
    AnalysisReport, MetricAnalysis, SkippedMetric, analyze, analyze_matrix, analyze_with_clock,
    posthoc,
};
pub use config::{AnalysisConfig, DerivedMetric, SignedRankMethod, ZeroPolicy};
pub use design::{DesignMatrix, build_design_matrix};
pub use diagnostics::{AnalysisDiagnostics, Clock, MetricDiagnostics, MetricOutcome, NoClock};
pub use friedman::friedman;
pub use holm::{HolmAdjustment, holm};
pub use observations::ObservationTable;
pub use pipeline_id::{PipelineId, canonical_order};
pub use signed_rank::{SignedRankOptions, compare_columns, signed_rank};
pub use types::{
    AnalysisError, CorrectedComparisonSet, FriedmanResult, MeanRank, Observation,
    PairwiseComparison, SignedRankResult, TestMethod,
};
