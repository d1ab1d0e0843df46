//! The validated long-format observation table.
//!
//! One [`Observation`] per (image, pipeline, metric). The table is built
//! once at the input boundary and never mutated afterwards; filtering and
//! derived metrics produce new tables.

use std::collections::HashSet;

use serde::Serialize;

use crate::config::DerivedMetric;
use crate::pipeline_id::PipelineId;
use crate::types::{AnalysisError, Observation};

/// Immutable, duplicate-free set of observations.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ObservationTable {
    observations: Vec<Observation>,
    metrics: Vec<String>,
}

impl ObservationTable {
    /// Validate and wrap a set of observations.
    ///
    /// Non-finite values are stored as missing.
    ///
    /// # Errors
    ///
    /// Returns [`AnalysisError::MalformedInput`] if an image, pipeline, or
    /// metric identifier is empty, or if the same (image, pipeline, metric)
    /// key appears twice.
    pub fn new(observations: Vec<Observation>) -> Result<Self, AnalysisError> {
        let mut seen: HashSet<(&str, &str, &str)> = HashSet::with_capacity(observations.len());
        let mut metrics: Vec<String> = Vec::new();

        for obs in &observations {
            if obs.image_id.is_empty() || obs.pipeline_id.as_str().is_empty() {
                return Err(AnalysisError::MalformedInput(
                    "observation with empty image or pipeline identifier".to_string(),
                ));
            }
            if obs.metric_name.is_empty() {
                return Err(AnalysisError::MalformedInput(format!(
                    "observation for image {:?} has an empty metric name",
                    obs.image_id
                )));
            }
            let key = (
                obs.image_id.as_str(),
                obs.pipeline_id.as_str(),
                obs.metric_name.as_str(),
            );
            if !seen.insert(key) {
                return Err(AnalysisError::MalformedInput(format!(
                    "duplicate observation for image {:?}, pipeline {}, metric {:?}",
                    obs.image_id, obs.pipeline_id, obs.metric_name
                )));
            }
            if !metrics.contains(&obs.metric_name) {
                metrics.push(obs.metric_name.clone());
            }
        }

        let observations = observations
            .into_iter()
            .map(|mut obs| {
                obs.value = obs.value.filter(|v| v.is_finite());
                obs
            })
            .collect();

        Ok(Self {
            observations,
            metrics,
        })
    }

    /// All observations, in input order.
    #[must_use]
    pub fn observations(&self) -> &[Observation] {
        &self.observations
    }

    /// Metric names in order of first appearance.
    #[must_use]
    pub fn metrics(&self) -> &[String] {
        &self.metrics
    }

    /// Number of observations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.observations.len()
    }

    /// Whether the table holds no observations.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.observations.is_empty()
    }

    /// Observations of one metric.
    pub fn for_metric<'a>(&'a self, metric: &'a str) -> impl Iterator<Item = &'a Observation> {
        self.observations
            .iter()
            .filter(move |obs| obs.metric_name == metric)
    }

    /// Distinct pipelines, in order of first appearance.
    #[must_use]
    pub fn pipelines(&self) -> Vec<PipelineId> {
        let mut pipelines: Vec<PipelineId> = Vec::new();
        for obs in &self.observations {
            if !pipelines.contains(&obs.pipeline_id) {
                pipelines.push(obs.pipeline_id.clone());
            }
        }
        pipelines
    }

    /// Keep only observations whose pipeline matches the
    /// `<prefix><digits>` variant pattern.
    ///
    /// Returns the filtered table and the number of observations removed.
    #[must_use]
    pub fn retain_variants(&self, prefix: &str) -> (Self, usize) {
        let observations: Vec<Observation> = self
            .observations
            .iter()
            .filter(|obs| obs.pipeline_id.matches_variant(prefix))
            .cloned()
            .collect();
        let excluded = self.observations.len() - observations.len();
        (Self::from_valid(observations), excluded)
    }

    /// Drop every observation of the named metrics.
    #[must_use]
    pub fn without_metrics(&self, excluded: &[String]) -> Self {
        let observations = self
            .observations
            .iter()
            .filter(|obs| !excluded.contains(&obs.metric_name))
            .cloned()
            .collect();
        Self::from_valid(observations)
    }

    /// Append a derived metric computed from `derived.source`.
    ///
    /// Missing source values stay missing. A table without the source
    /// metric is returned unchanged.
    ///
    /// # Errors
    ///
    /// Returns [`AnalysisError::InvalidConfig`] if the derived name is
    /// already a metric of this table.
    pub fn with_derived(&self, derived: &DerivedMetric) -> Result<Self, AnalysisError> {
        if self.metrics.contains(&derived.name) {
            return Err(AnalysisError::InvalidConfig(format!(
                "derived metric {:?} collides with an existing metric",
                derived.name
            )));
        }

        let scaled: Vec<Observation> = self
            .for_metric(&derived.source)
            .map(|obs| Observation {
                image_id: obs.image_id.clone(),
                pipeline_id: obs.pipeline_id.clone(),
                metric_name: derived.name.clone(),
                value: obs
                    .value
                    .map(|v| v / derived.divisor_for(&obs.pipeline_id)),
            })
            .collect();

        let mut observations = self.observations.clone();
        observations.extend(scaled);
        Ok(Self::from_valid(observations))
    }

    /// Rebuild from observations already known to satisfy the invariants.
    fn from_valid(observations: Vec<Observation>) -> Self {
        let mut metrics: Vec<String> = Vec::new();
        for obs in &observations {
            if !metrics.contains(&obs.metric_name) {
                metrics.push(obs.metric_name.clone());
            }
        }
        Self {
            observations,
            metrics,
        }
    }
}
