//! Exact truncated SVD for small inputs.

use super::{effective_rank, Pca, SvdResult};
use anyhow::{bail, Result};
use ndarray::{Array1, Array2, ArrayView2};

/// Full dense SVD with per-cell mean centering, truncated to the
/// requested rank. Quadratic in the smaller dimension, so only suitable
/// for modest matrices; the approximate strategy is the default.
pub struct ExactSvd;

impl Pca for ExactSvd {
    fn run_svd(&self, matrix: &ArrayView2<f64>, k: usize) -> Result<SvdResult> {
        let (m, n) = matrix.dim();
        if m < 2 || n < 2 {
            bail!("exact svd: input matrix must be at least 2x2, got {m}x{n}");
        }
        if k == 0 || k > m.min(n) {
            bail!("exact svd: {k} singular values requested from a {m}x{n} matrix");
        }

        // center each cell column
        let mut centered = matrix.to_owned();
        for mut col in centered.columns_mut() {
            let mean = col.sum() / m as f64;
            col.mapv_inplace(|x| x - mean);
        }

        let a = nalgebra::DMatrix::from_fn(m, n, |r, c| centered[(r, c)]);
        let svd = a.svd(true, true);
        let (Some(u_full), Some(v_t_full)) = (svd.u, svd.v_t) else {
            bail!("exact svd: decomposition failed to produce factors");
        };

        let u = Array2::from_shape_fn((m, k), |(r, c)| u_full[(r, c)]);
        let v = Array2::from_shape_fn((n, k), |(r, c)| v_t_full[(c, r)]);
        let sigma = Array1::from_iter(svd.singular_values.iter().take(k).copied());

        if effective_rank(&sigma) < k {
            bail!(
                "exact svd: matrix rank is below the {k} requested components (data insufficient for PCA)"
            );
        }

        Ok((u, sigma, v))
    }
}
