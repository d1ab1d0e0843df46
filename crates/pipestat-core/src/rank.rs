//! Average ranking with tie groups.
//!
//! Both the Friedman and signed-rank procedures rank a small sample
//! ascending (rank 1 = smallest). Tied values share the mean of the ranks
//! they jointly occupy, so `[3, 1, 3, 2]` ranks as `[3.5, 1, 3.5, 2]`.

/// Ranks of a sample plus the sizes of its tie groups.
#[derive(Debug, Clone, PartialEq)]
pub struct Ranking {
    /// Average rank of each input value, in input order.
    pub ranks: Vec<f64>,
    /// Size of every tie group with more than one member.
    pub tie_sizes: Vec<usize>,
}

impl Ranking {
    /// Whether any two values were equal.
    #[must_use]
    pub fn has_ties(&self) -> bool {
        !self.tie_sizes.is_empty()
    }

    /// `sum(t^3 - t)` over tie groups, the usual tie-correction term.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn tie_term(&self) -> f64 {
        self.tie_sizes
            .iter()
            .map(|&t| {
                let t = t as f64;
                t.mul_add(t * t, -t)
            })
            .sum()
    }
}

/// Rank `values` ascending, averaging the ranks of tied values.
///
/// Values are compared with [`f64::total_cmp`]; callers are expected to
/// pass finite values only.
#[must_use]
#[allow(clippy::cast_precision_loss, clippy::float_cmp)]
pub fn average_ranks(values: &[f64]) -> Ranking {
    let mut order: Vec<usize> = (0..values.len()).collect();
    order.sort_by(|&a, &b| values[a].total_cmp(&values[b]));

    let mut ranks = vec![0.0; values.len()];
    let mut tie_sizes = Vec::new();

    let mut start = 0;
    while start < order.len() {
        let value = values[order[start]];
        let mut end = start + 1;
        while end < order.len() && values[order[end]] == value {
            end += 1;
        }
        // Positions start..end hold ranks start+1..=end; their mean:
        let rank = (start + end + 1) as f64 / 2.0;
        for &index in &order[start..end] {
            ranks[index] = rank;
        }
        if end - start > 1 {
            tie_sizes.push(end - start);
        }
        start = end;
    }

    Ranking { ranks, tie_sizes }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn distinct_values() {
        let ranking = average_ranks(&[30.0, 10.0, 20.0]);
        assert_eq!(ranking.ranks, vec![3.0, 1.0, 2.0]);
        assert!(!ranking.has_ties());
    }

    #[test]
    fn single_tie_averages() {
        let ranking = average_ranks(&[3.0, 1.0, 3.0, 2.0]);
        assert_eq!(ranking.ranks, vec![3.5, 1.0, 3.5, 2.0]);
        assert_eq!(ranking.tie_sizes, vec![2]);
        assert!((ranking.tie_term() - 6.0).abs() < f64::EPSILON);
    }

    #[test]
    fn all_equal() {
        let ranking = average_ranks(&[5.0; 4]);
        assert_eq!(ranking.ranks, vec![2.5; 4]);
        assert_eq!(ranking.tie_sizes, vec![4]);
        assert!((ranking.tie_term() - 60.0).abs() < f64::EPSILON);
    }

    #[test]
    fn rank_sum_is_triangular() {
        let values = [0.4, -1.0, 0.4, 7.0, 0.4, 2.0, -1.0];
        let ranking = average_ranks(&values);
        let sum: f64 = ranking.ranks.iter().sum();
        assert!((sum - 28.0).abs() < 1e-12);
        assert_eq!(ranking.tie_sizes, vec![2, 3]);
    }

    #[test]
    fn empty_input() {
        let ranking = average_ranks(&[]);
        assert!(ranking.ranks.is_empty());
        assert!(!ranking.has_ties());
    }
}
