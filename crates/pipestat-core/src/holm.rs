//! Holm step-down family-wise error correction.
//!
//! With `m` raw p-values sorted ascending `p_(1) <= ... <= p_(m)`, the
//! adjusted value at step `i` is
//!
//! ```text
//! adj_(i) = min(1, max(adj_(i-1), (m - i + 1) * p_(i)))
//! ```
//!
//! The running maximum keeps adjusted values monotone in the sorted order.
//! A hypothesis is rejected when its adjusted value is at most `alpha`;
//! monotonicity makes this identical to stopping at the first failure.

use serde::{Deserialize, Serialize};

use crate::types::AnalysisError;

/// Adjusted p-values and rejection decisions, in input order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HolmAdjustment {
    /// Holm-adjusted p-value per hypothesis.
    pub adjusted: Vec<f64>,
    /// Whether each hypothesis is rejected at the family-wise level.
    pub reject: Vec<bool>,
}

/// Apply Holm's correction to `raw_p_values` at level `alpha`.
///
/// Ties in raw p-value keep their input order, which does not affect the
/// adjusted values. An empty family yields empty vectors.
///
/// # Errors
///
/// Returns [`AnalysisError::InvalidConfig`] if `alpha` is outside `(0, 1)`,
/// and [`AnalysisError::Numerical`] if a p-value is NaN or outside `[0, 1]`.
#[allow(clippy::cast_precision_loss)]
pub fn holm(raw_p_values: &[f64], alpha: f64) -> Result<HolmAdjustment, AnalysisError> {
    if alpha.is_nan() || alpha <= 0.0 || alpha >= 1.0 {
        return Err(AnalysisError::InvalidConfig(format!(
            "alpha must lie in (0, 1), got {alpha}"
        )));
    }
    if let Some(bad) = raw_p_values
        .iter()
        .find(|p| p.is_nan() || **p < 0.0 || **p > 1.0)
    {
        return Err(AnalysisError::Numerical(format!(
            "p-value {bad} is outside [0, 1]"
        )));
    }

    let m = raw_p_values.len();
    let mut order: Vec<usize> = (0..m).collect();
    // sort_by is stable, so equal p-values keep input order.
    order.sort_by(|&a, &b| raw_p_values[a].total_cmp(&raw_p_values[b]));

    let mut adjusted = vec![0.0; m];
    let mut running = 0.0_f64;
    for (step, &index) in order.iter().enumerate() {
        let multiplier = (m - step) as f64;
        running = running.max(multiplier * raw_p_values[index]).min(1.0);
        adjusted[index] = running;
    }

    let reject = adjusted.iter().map(|adj| *adj <= alpha).collect();
    Ok(HolmAdjustment { adjusted, reject })
}
