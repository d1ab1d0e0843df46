//! Design matrix: one metric pivoted to images x pipelines.
//!
//! Rows are images (sorted by identifier), columns are pipelines in
//! canonical order. Every cell is a finite value; images missing any
//! pipeline's value are dropped while pivoting.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::hash::Hash;

use serde::Serialize;

use crate::observations::ObservationTable;
use crate::pipeline_id::{PipelineId, canonical_order};
use crate::types::AnalysisError;

/// Complete rows-by-conditions table for one metric.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DesignMatrix {
    metric_name: String,
    images: Vec<String>,
    pipelines: Vec<PipelineId>,
    /// Row-major, `images.len() * pipelines.len()` cells.
    values: Vec<f64>,
    dropped_rows: usize,
}

impl DesignMatrix {
    /// Build a matrix from explicit rows.
    ///
    /// # Errors
    ///
    /// Returns [`AnalysisError::MalformedInput`] if the row count differs
    /// from `images.len()`, a row's length differs from `pipelines.len()`,
    /// a value is not finite, or an image or pipeline appears twice.
    pub fn new(
        metric_name: impl Into<String>,
        images: Vec<String>,
        pipelines: Vec<PipelineId>,
        rows: &[Vec<f64>],
    ) -> Result<Self, AnalysisError> {
        let metric_name = metric_name.into();
        if rows.len() != images.len() {
            return Err(AnalysisError::MalformedInput(format!(
                "{metric_name}: {} rows for {} images",
                rows.len(),
                images.len()
            )));
        }
        if has_duplicates(&images) || has_duplicates(&pipelines) {
            return Err(AnalysisError::MalformedInput(format!(
                "{metric_name}: duplicate image or pipeline label"
            )));
        }

        let mut values = Vec::with_capacity(rows.len() * pipelines.len());
        for (image, row) in images.iter().zip(rows) {
            if row.len() != pipelines.len() {
                return Err(AnalysisError::MalformedInput(format!(
                    "{metric_name}: row {image:?} has {} values for {} pipelines",
                    row.len(),
                    pipelines.len()
                )));
            }
            if row.iter().any(|v| !v.is_finite()) {
                return Err(AnalysisError::MalformedInput(format!(
                    "{metric_name}: row {image:?} contains a non-finite value"
                )));
            }
            values.extend_from_slice(row);
        }

        Ok(Self {
            metric_name,
            images,
            pipelines,
            values,
            dropped_rows: 0,
        })
    }

    /// Metric the matrix holds.
    #[must_use]
    pub fn metric_name(&self) -> &str {
        &self.metric_name
    }

    /// Row labels.
    #[must_use]
    pub fn images(&self) -> &[String] {
        &self.images
    }

    /// Column labels, in canonical order.
    #[must_use]
    pub fn pipelines(&self) -> &[PipelineId] {
        &self.pipelines
    }

    /// Number of rows `n`.
    #[must_use]
    pub fn n_rows(&self) -> usize {
        self.images.len()
    }

    /// Number of columns `k`.
    #[must_use]
    pub fn n_cols(&self) -> usize {
        self.pipelines.len()
    }

    /// Images removed while pivoting because a pipeline value was missing.
    #[must_use]
    pub const fn dropped_rows(&self) -> usize {
        self.dropped_rows
    }

    /// Values of one image across all pipelines.
    ///
    /// # Panics
    ///
    /// Panics if `row >= self.n_rows()`.
    #[must_use]
    pub fn row(&self, row: usize) -> &[f64] {
        let k = self.n_cols();
        &self.values[row * k..(row + 1) * k]
    }

    /// Iterate over rows.
    pub fn rows(&self) -> impl Iterator<Item = &[f64]> {
        // chunks_exact(0) panics
        self.values.chunks_exact(self.n_cols().max(1))
    }

    /// Values of one pipeline across all images.
    ///
    /// # Panics
    ///
    /// Panics if `col >= self.n_cols()`.
    #[must_use]
    pub fn column(&self, col: usize) -> Vec<f64> {
        self.rows().map(|row| row[col]).collect()
    }
}

fn has_duplicates<T: Eq + Hash>(items: &[T]) -> bool {
    let mut seen = HashSet::with_capacity(items.len());
    items.iter().any(|item| !seen.insert(item))
}

/// Pivot one metric of `table` into a complete design matrix.
///
/// Columns are the distinct pipelines observed for `metric`, including
/// pipelines whose values are all missing, ordered by [`canonical_order`]
/// with `order_hint`. Rows are images sorted by identifier; an image
/// lacking a value for any column is dropped.
///
/// # Errors
///
/// Returns [`AnalysisError::InsufficientConditions`] when fewer than
/// `min_conditions` pipelines are observed, and
/// [`AnalysisError::InsufficientObservations`] when no image is complete
/// (for instance when one pipeline has no values at all).
pub fn build_design_matrix(
    table: &ObservationTable,
    metric: &str,
    order_hint: &[PipelineId],
    min_conditions: usize,
) -> Result<DesignMatrix, AnalysisError> {
    let mut present: Vec<PipelineId> = Vec::new();
    for obs in table.for_metric(metric) {
        if !present.contains(&obs.pipeline_id) {
            present.push(obs.pipeline_id.clone());
        }
    }

    if present.len() < min_conditions {
        return Err(AnalysisError::InsufficientConditions {
            metric: metric.to_string(),
            found: present.len(),
            required: min_conditions,
        });
    }

    let pipelines = canonical_order(&present, order_hint);
    let column_of: HashMap<&PipelineId, usize> = pipelines
        .iter()
        .enumerate()
        .map(|(index, id)| (id, index))
        .collect();

    let k = pipelines.len();
    let mut cells: BTreeMap<&str, Vec<Option<f64>>> = BTreeMap::new();
    for obs in table.for_metric(metric) {
        let Some(&col) = column_of.get(&obs.pipeline_id) else {
            continue;
        };
        let row = cells
            .entry(obs.image_id.as_str())
            .or_insert_with(|| vec![None; k]);
        row[col] = obs.value;
    }

    let total_rows = cells.len();
    let mut images = Vec::with_capacity(total_rows);
    let mut values = Vec::with_capacity(total_rows * k);
    for (image, row) in cells {
        let complete: Option<Vec<f64>> = row.into_iter().collect();
        if let Some(complete) = complete {
            images.push(image.to_string());
            values.extend(complete);
        }
    }

    if images.is_empty() {
        return Err(AnalysisError::InsufficientObservations {
            metric: metric.to_string(),
        });
    }

    Ok(DesignMatrix {
        metric_name: metric.to_string(),
        dropped_rows: total_rows - images.len(),
        images,
        pipelines,
        values,
    })
}
