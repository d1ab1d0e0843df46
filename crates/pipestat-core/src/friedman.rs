//! Friedman rank test across `k` related pipelines.
//!
//! Each image ranks the pipelines ascending (ties averaged), ranks are
//! summed per pipeline into `R_j`, and
//!
//! ```text
//! Q = 12 / (n k (k + 1)) * sum(R_j^2) - 3 n (k + 1)
//! ```
//!
//! is referred to a chi-square distribution with `k - 1` degrees of
//! freedom. The effect size is Kendall's `W = Q / (n (k - 1))`, which lies
//! in `[0, 1]`: 0 when rankings are unrelated, 1 when every image ranks
//! the pipelines identically.

use crate::config::AnalysisConfig;
use crate::design::DesignMatrix;
use crate::distribution::chi_squared_sf;
use crate::rank::average_ranks;
use crate::types::{AnalysisError, FriedmanResult, MeanRank};

/// Run the Friedman test on a design matrix.
///
/// # Errors
///
/// Returns [`AnalysisError::InsufficientConditions`] if the matrix has
/// fewer than three columns, [`AnalysisError::InsufficientObservations`]
/// if it has no rows, and [`AnalysisError::Numerical`] if the p-value
/// cannot be evaluated.
#[allow(clippy::cast_precision_loss)]
pub fn friedman(matrix: &DesignMatrix) -> Result<FriedmanResult, AnalysisError> {
    let n = matrix.n_rows();
    let k = matrix.n_cols();
    if k < AnalysisConfig::MIN_CONDITIONS {
        return Err(AnalysisError::InsufficientConditions {
            metric: matrix.metric_name().to_string(),
            found: k,
            required: AnalysisConfig::MIN_CONDITIONS,
        });
    }
    if n == 0 {
        return Err(AnalysisError::InsufficientObservations {
            metric: matrix.metric_name().to_string(),
        });
    }

    let mut rank_sums = vec![0.0; k];
    for row in matrix.rows() {
        let ranking = average_ranks(row);
        for (sum, rank) in rank_sums.iter_mut().zip(&ranking.ranks) {
            *sum += rank;
        }
    }

    let (n_f, k_f) = (n as f64, k as f64);
    let sum_sq: f64 = rank_sums.iter().map(|r| r * r).sum();
    let q = (12.0 / (n_f * k_f * (k_f + 1.0))).mul_add(sum_sq, -3.0 * n_f * (k_f + 1.0));
    // Identical rows give Q = 0 up to rounding; keep it non-negative.
    let statistic = q.max(0.0);
    let degrees_of_freedom = k - 1;
    let p_value = chi_squared_sf(statistic, degrees_of_freedom)?;
    let effect_size = (statistic / (n_f * (k_f - 1.0))).clamp(0.0, 1.0);

    let mean_ranks = matrix
        .pipelines()
        .iter()
        .zip(&rank_sums)
        .map(|(pipeline, sum)| MeanRank {
            pipeline: pipeline.clone(),
            mean_rank: sum / n_f,
        })
        .collect();

    Ok(FriedmanResult {
        metric_name: matrix.metric_name().to_string(),
        statistic,
        degrees_of_freedom,
        p_value,
        effect_size,
        n_images: n,
        k_pipelines: k,
        mean_ranks,
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::pipeline_id::PipelineId;

    fn matrix(rows: &[Vec<f64>]) -> DesignMatrix {
        let k = rows.first().map_or(0, Vec::len);
        let images = (0..rows.len()).map(|i| format!("img{i}")).collect();
        let pipelines = (0..k).map(|j| PipelineId::new(format!("p{j}"))).collect();
        DesignMatrix::new("m", images, pipelines, rows).unwrap()
    }

    fn close(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() < 1e-9,
            "expected {expected}, got {actual}"
        );
    }

    #[test]
    fn identical_columns_give_zero() {
        let rows = vec![vec![5.0, 5.0, 5.0, 5.0], vec![2.0, 2.0, 2.0, 2.0]];
        let result = friedman(&matrix(&rows)).unwrap();
        close(result.statistic, 0.0);
        close(result.effect_size, 0.0);
        close(result.p_value, 1.0);
        assert_eq!(result.degrees_of_freedom, 3);
    }

    #[test]
    fn consistent_ordering_reaches_maximum() {
        // Column 3 is always largest, and every row orders columns the same
        // way, so Q = n (k - 1) and W = 1.
        let rows: Vec<Vec<f64>> = (0..5)
            .map(|i| {
                let base = f64::from(i) * 10.0;
                vec![base, base + 1.0, base + 2.0, base + 3.0]
            })
            .collect();
        let result = friedman(&matrix(&rows)).unwrap();
        close(result.statistic, 15.0);
        close(result.effect_size, 1.0);
        assert_eq!(result.n_images, 5);
        assert_eq!(result.k_pipelines, 4);
        // Largest column's rank sum is n * k = 20.
        close(result.mean_ranks[3].mean_rank * 5.0, 20.0);
    }

    #[test]
    fn single_row_with_one_tie() {
        // Ranks: [1, 2.5, 2.5] -> R = [1, 2.5, 2.5]
        // Q = 12 / (1 * 3 * 4) * (1 + 6.25 + 6.25) - 3 * 1 * 4 = 1.5
        let result = friedman(&matrix(&[vec![1.0, 7.0, 7.0]])).unwrap();
        close(result.mean_ranks[0].mean_rank, 1.0);
        close(result.mean_ranks[1].mean_rank, 2.5);
        close(result.mean_ranks[2].mean_rank, 2.5);
        close(result.statistic, 1.5);
        close(result.effect_size, 0.75);
    }

    #[test]
    fn two_rows_three_pipelines_p_value() {
        // R = [2, 4, 6], Q = 4, df = 2, p = exp(-2)
        let rows = vec![vec![1.0, 2.0, 3.0], vec![4.0, 5.0, 6.0]];
        let result = friedman(&matrix(&rows)).unwrap();
        close(result.statistic, 4.0);
        close(result.p_value, (-2.0_f64).exp());
        close(result.effect_size, 1.0);
    }

    #[test]
    fn too_few_columns() {
        let err = friedman(&matrix(&[vec![1.0, 2.0]])).unwrap_err();
        assert!(matches!(err, AnalysisError::InsufficientConditions { found: 2, .. }));
    }

    #[test]
    fn empty_matrix() {
        let pipelines = vec!["p0".into(), "p1".into(), "p2".into()];
        let empty = DesignMatrix::new("m", Vec::new(), pipelines, &[]).unwrap();
        let err = friedman(&empty).unwrap_err();
        assert!(matches!(err, AnalysisError::InsufficientObservations { .. }));
    }
}
