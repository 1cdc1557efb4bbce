//! Statistics primitives shared by the annotation stage: medians, a
//! one-sided Fisher exact test and Benjamini-Hochberg adjustment.

use anyhow::{bail, Result};
use num_traits::FromPrimitive;
use std::ops::{Add, Div};

/// Return the median. Sorts its argument in place.
pub fn median_mut<T>(xs: &mut [T]) -> Option<T>
where
    T: Copy + Ord + FromPrimitive + Add<Output = T> + Div<Output = T>,
{
    if xs.is_empty() {
        return None;
    }
    xs.sort_unstable();
    Some(if xs.len() % 2 == 0 {
        (xs[xs.len() / 2] + xs[xs.len() / 2 - 1]) / T::from_u64(2).unwrap()
    } else {
        xs[xs.len() / 2]
    })
}

/// Table of ln(n!) values, built once and shared across the many
/// hypergeometric evaluations of an annotation run.
pub struct LnFactorial(Vec<f64>);

impl LnFactorial {
    /// Table covering 0..=max_n.
    pub fn new(max_n: usize) -> LnFactorial {
        let mut table = Vec::with_capacity(max_n + 1);
        let mut acc = 0.0f64;
        table.push(0.0);
        for n in 1..=max_n {
            acc += (n as f64).ln();
            table.push(acc);
        }
        LnFactorial(table)
    }

    /// ln(n!)
    pub fn get(&self, n: usize) -> f64 {
        self.0[n]
    }

    /// ln(C(n, k))
    pub fn ln_choose(&self, n: usize, k: usize) -> f64 {
        debug_assert!(k <= n);
        self.get(n) - self.get(k) - self.get(n - k)
    }
}

/// Hypergeometric PMF: probability of exactly `k` successes when drawing
/// `row1` items from a population of `n` containing `col1` successes.
fn hypergeometric_pmf(k: usize, row1: usize, col1: usize, n: usize, lnf: &LnFactorial) -> f64 {
    (lnf.ln_choose(col1, k) + lnf.ln_choose(n - col1, row1 - k) - lnf.ln_choose(n, row1)).exp()
}

/// One-sided Fisher exact test (alternative: greater) on the 2×2 table
///
/// ```text
///   [ a  b ]
///   [ c  d ]
/// ```
///
/// Returns P(X ≥ a) for the hypergeometric distribution of the top-left
/// entry given the table margins. `lnf` must cover `a + b + c + d`.
pub fn fisher_exact_greater(a: usize, b: usize, c: usize, d: usize, lnf: &LnFactorial) -> Result<f64> {
    let n = a + b + c + d;
    if n == 0 {
        bail!("fisher exact test: empty contingency table");
    }
    let row1 = a + b;
    let col1 = a + c;

    let upper = row1.min(col1);
    let mut p = 0.0;
    for k in a..=upper {
        p += hypergeometric_pmf(k, row1, col1, n, lnf);
    }
    Ok(p.min(1.0))
}

/// Benjamini-Hochberg adjustment. With p-values sorted ascending at
/// ranks r = 1..=m, `adjusted[r] = min over r' >= r of p[r'] * m / r'`,
/// clamped to [0, 1]. Returned in the input order.
pub fn benjamini_hochberg(p_values: &[f64]) -> Vec<f64> {
    let m = p_values.len();
    if m == 0 {
        return Vec::new();
    }

    let mut order: Vec<usize> = (0..m).collect();
    order.sort_by(|&a, &b| p_values[a].total_cmp(&p_values[b]));

    let mut adjusted = vec![0.0; m];
    let mut running_min = f64::INFINITY;
    for rank in (1..=m).rev() {
        let idx = order[rank - 1];
        let adj = (p_values[idx] * m as f64 / rank as f64).min(1.0);
        running_min = running_min.min(adj);
        adjusted[idx] = running_min;
    }
    adjusted
}

#[cfg(test)]
mod test {
    use super::*;
    use assert_approx_eq::assert_approx_eq;
    use noisy_float::prelude::*;

    #[test]
    fn test_median_mut() {
        assert_eq!(median_mut::<N64>(&mut []), None);
        assert_eq!(median_mut(&mut [n64(1.0)]), Some(n64(1.0)));
        assert_eq!(median_mut(&mut [n64(1.0), n64(10.0)]), Some(n64(5.5)));
        assert_eq!(median_mut(&mut [n64(100.0), n64(1.0), n64(10.0)]), Some(n64(10.0)));
        assert_eq!(
            median_mut(&mut [n64(1.0), n64(10.0), n64(100.0), n64(1000.0)]),
            Some(n64(55.0))
        );
    }

    #[test]
    fn test_fisher_balanced() {
        // P(X >= 3) with margins 4/4 of 8: (16 + 1) / 70
        let lnf = LnFactorial::new(8);
        let p = fisher_exact_greater(3, 1, 1, 3, &lnf).unwrap();
        assert_approx_eq!(p, 17.0 / 70.0, 1e-12);
    }

    #[test]
    fn test_fisher_extreme() {
        // perfectly concentrated table: p = 1 / C(20, 10)
        let lnf = LnFactorial::new(20);
        let p = fisher_exact_greater(10, 0, 0, 10, &lnf).unwrap();
        assert_approx_eq!(p, 1.0 / 184_756.0, 1e-15);
    }

    #[test]
    fn test_fisher_zero_observed() {
        // a = 0 puts the entire support in the tail
        let lnf = LnFactorial::new(12);
        let p = fisher_exact_greater(0, 4, 4, 4, &lnf).unwrap();
        assert_approx_eq!(p, 1.0, 1e-12);
    }

    #[test]
    fn test_fisher_empty_table() {
        let lnf = LnFactorial::new(0);
        assert!(fisher_exact_greater(0, 0, 0, 0, &lnf).is_err());
    }

    #[test]
    fn test_bh_reference_vector() {
        let adj = benjamini_hochberg(&[0.01, 0.02, 0.03, 0.04, 0.50]);
        for v in &adj[..4] {
            assert_approx_eq!(*v, 0.05, 1e-12);
        }
        assert_approx_eq!(adj[4], 0.50, 1e-12);
    }

    #[test]
    fn test_bh_monotone_in_p_order() {
        let p = [0.1, 0.001, 0.05, 0.01, 0.5];
        let adj = benjamini_hochberg(&p);

        let mut pairs: Vec<(f64, f64)> = p.iter().copied().zip(adj.iter().copied()).collect();
        pairs.sort_by(|a, b| a.0.total_cmp(&b.0));
        for w in pairs.windows(2) {
            assert!(w[1].1 >= w[0].1);
        }
    }

    #[test]
    fn test_bh_clamps_to_one() {
        let adj = benjamini_hochberg(&[0.9, 0.95]);
        assert!(adj.iter().all(|&v| v <= 1.0));
    }

    #[test]
    fn test_bh_empty() {
        assert!(benjamini_hochberg(&[]).is_empty());
    }
}
