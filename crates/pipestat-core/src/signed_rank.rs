//! Wilcoxon signed-rank test for two paired pipeline columns.
//!
//! For differences `d_i = a_i - b_i`, zeros are dropped (see
//! [`ZeroPolicy::Exclude`]), the remaining `|d_i|` are ranked with ties
//! averaged, and the ranks are summed separately for positive (`W+`) and
//! negative (`W-`) differences. The statistic is `T = min(W+, W-)`.
//!
//! # p-values
//!
//! - **Exact**: the null distribution of `W+` is the distribution of a sum
//!   of the ranks each included with probability 1/2. Ranks are doubled so
//!   that averaged ties stay integral, which makes the exact distribution
//!   available even with tied magnitudes. Two-sided `p = min(1, 2 P(W+ <= T))`.
//! - **Normal**: `z = (T - m(m+1)/4 [+ 0.5]) / sigma` with the tie-corrected
//!   variance `m(m+1)(2m+1)/24 - sum(t^3 - t)/48`; two-sided
//!   `p = 2 P(Z > |z|)`.
//!
//! The exact distribution is only built for up to
//! [`AnalysisConfig::MAX_EXACT_SIZE`] non-zero differences; larger samples
//! use the normal approximation whatever method is requested.

use crate::config::{AnalysisConfig, SignedRankMethod, ZeroPolicy};
use crate::design::DesignMatrix;
use crate::distribution::normal_sf;
use crate::rank::{Ranking, average_ranks};
use crate::types::{AnalysisError, SignedRankResult, TestMethod};

/// Settings for one signed-rank evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SignedRankOptions {
    /// Exact vs. normal approximation.
    pub method: SignedRankMethod,
    /// Largest effective sample for which `Auto` goes exact.
    pub exact_threshold: usize,
    /// Zero-difference handling.
    pub zero_policy: ZeroPolicy,
    /// Continuity correction for the normal approximation.
    pub continuity_correction: bool,
}

impl From<&AnalysisConfig> for SignedRankOptions {
    fn from(config: &AnalysisConfig) -> Self {
        Self {
            method: config.signed_rank,
            exact_threshold: config.exact_threshold,
            zero_policy: config.zero_policy,
            continuity_correction: config.continuity_correction,
        }
    }
}

impl Default for SignedRankOptions {
    fn default() -> Self {
        Self::from(&AnalysisConfig::default())
    }
}

/// Compare columns `a` and `b` of `matrix` (differences `a - b`).
///
/// # Errors
///
/// Returns [`AnalysisError::DegenerateComparison`] when every difference
/// is zero, and [`AnalysisError::Numerical`] if the normal tail cannot be
/// evaluated.
///
/// # Panics
///
/// Panics if `a` or `b` is not a column index of `matrix`.
pub fn compare_columns(
    matrix: &DesignMatrix,
    a: usize,
    b: usize,
    options: &SignedRankOptions,
) -> Result<SignedRankResult, AnalysisError> {
    let differences: Vec<f64> = matrix.rows().map(|row| row[a] - row[b]).collect();
    signed_rank(&differences, options)?.ok_or_else(|| AnalysisError::DegenerateComparison {
        pipeline_a: matrix.pipelines()[a].clone(),
        pipeline_b: matrix.pipelines()[b].clone(),
    })
}

/// Signed-rank test on precomputed paired differences.
///
/// Returns `Ok(None)` when no non-zero difference remains.
///
/// # Errors
///
/// Returns [`AnalysisError::Numerical`] if the normal tail cannot be
/// evaluated.
#[allow(clippy::float_cmp)]
pub fn signed_rank(
    differences: &[f64],
    options: &SignedRankOptions,
) -> Result<Option<SignedRankResult>, AnalysisError> {
    let nonzero: Vec<f64> = match options.zero_policy {
        ZeroPolicy::Exclude => differences.iter().copied().filter(|d| *d != 0.0).collect(),
    };
    let m = nonzero.len();
    if m == 0 {
        return Ok(None);
    }

    let magnitudes: Vec<f64> = nonzero.iter().map(|d| d.abs()).collect();
    let ranking = average_ranks(&magnitudes);

    let mut w_plus = 0.0;
    let mut w_minus = 0.0;
    for (d, rank) in nonzero.iter().zip(&ranking.ranks) {
        if *d > 0.0 {
            w_plus += rank;
        } else {
            w_minus += rank;
        }
    }
    let statistic = w_plus.min(w_minus);

    let exact_limit = AnalysisConfig::MAX_EXACT_SIZE;
    let method = match options.method {
        SignedRankMethod::Exact if m <= exact_limit => TestMethod::Exact,
        SignedRankMethod::Exact => {
            tracing::warn!(
                n_effective = m,
                limit = exact_limit,
                "too many differences for the exact signed-rank test, using normal approximation"
            );
            TestMethod::Normal
        }
        SignedRankMethod::Normal => TestMethod::Normal,
        SignedRankMethod::Auto
            if m <= options.exact_threshold.min(exact_limit) && !ranking.has_ties() =>
        {
            TestMethod::Exact
        }
        SignedRankMethod::Auto => TestMethod::Normal,
    };

    let (z, p_value) = match method {
        TestMethod::Exact => (None, exact_p_value(&ranking, statistic)),
        TestMethod::Normal => {
            let (z, p) = normal_p_value(&ranking, w_plus, statistic, options.continuity_correction)?;
            (Some(z), p)
        }
    };

    Ok(Some(SignedRankResult {
        statistic,
        w_plus,
        w_minus,
        n_effective: m,
        method,
        z,
        p_value,
    }))
}

/// Two-sided exact p-value from the permutation distribution of `W+`.
///
/// Works on doubled ranks so averaged ties remain integers. The
/// distribution is built as probabilities (each rank in or out with
/// probability 1/2) rather than counts, so it cannot overflow.
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
fn exact_p_value(ranking: &Ranking, statistic: f64) -> f64 {
    let doubled: Vec<usize> = ranking
        .ranks
        .iter()
        .map(|r| (r * 2.0).round() as usize)
        .collect();
    let total: usize = doubled.iter().sum();
    let threshold = (statistic * 2.0).round() as usize;

    let mut dist = vec![0.0_f64; total + 1];
    dist[0] = 1.0;
    let mut reach = 0;
    for &rank in &doubled {
        reach += rank;
        for s in (0..=reach).rev() {
            let without = dist[s];
            let with = if s >= rank { dist[s - rank] } else { 0.0 };
            dist[s] = 0.5 * (without + with);
        }
    }

    let lower_tail: f64 = dist[..=threshold.min(total)].iter().sum();
    (2.0 * lower_tail).min(1.0)
}

/// Two-sided normal-approximation p-value and the signed z-score of `W+`.
#[allow(clippy::cast_precision_loss)]
fn normal_p_value(
    ranking: &Ranking,
    w_plus: f64,
    statistic: f64,
    continuity_correction: bool,
) -> Result<(f64, f64), AnalysisError> {
    let m = ranking.ranks.len() as f64;
    let mean = m * (m + 1.0) / 4.0;
    let variance = m * (m + 1.0) * 2.0f64.mul_add(m, 1.0) / 24.0 - ranking.tie_term() / 48.0;
    if variance <= 0.0 {
        return Err(AnalysisError::Numerical(format!(
            "signed-rank variance is {variance} for {m} differences"
        )));
    }
    let sd = variance.sqrt();

    // statistic <= mean always; shrink the gap by 0.5 toward the mean.
    let mut gap = statistic - mean;
    if continuity_correction && gap < 0.0 {
        gap = (gap + 0.5).min(0.0);
    }
    let p_value = (2.0 * normal_sf(gap.abs() / sd)?).min(1.0);

    // Report z with the sign of W+ relative to its mean.
    let z = if w_plus < mean { gap / sd } else { -gap / sd };
    Ok((z, p_value))
}
