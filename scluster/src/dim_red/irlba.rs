#![allow(non_snake_case)]

//! Implicitly restarted Lanczos bidiagonalization (IRLBA) for a partial
//! SVD of a dense matrix, after Baglama & Reichel. A Lanczos process
//! builds a small projected bidiagonal system whose dense SVD yields
//! Ritz approximations of the leading singular triplets; the process is
//! restarted with the current Ritz vectors until the requested triplets
//! converge or the iteration cap is reached.

use super::{effective_rank, Pca, SvdResult};
use crate::config::AnalysisConfig;
use anyhow::{bail, Result};
use log::{debug, warn};
use ndarray::prelude::*;
use ndarray_rand::RandomExt;
use rand::SeedableRng;
use rand_distr::Normal;
use std::cmp::{max, min};

fn norm(x: &ArrayView1<f64>) -> f64 {
    x.fold(0.0, |sum, v| sum + v * v).sqrt()
}

/// Orthogonalize a vector Y against the columns of the matrix X.
fn orthog(y: &ArrayView1<f64>, x: &ArrayView2<f64>) -> Array1<f64> {
    let dot_y = &x.t().dot(y);
    y - &x.dot(dot_y)
}

/// Guarded reciprocal used to check linear dependence during the
/// Lanczos process: near-zero norms invert to zero instead of blowing up.
fn invcheck(x: f64) -> f64 {
    let eps2 = 2.0 * f64::EPSILON;
    if x > eps2 {
        1.0 / x
    } else {
        0.0
    }
}

/// Dense SVD of the small projected matrix.
fn small_svd(b: &Array2<f64>) -> Result<(Array2<f64>, Array1<f64>, Array2<f64>)> {
    let (rows, cols) = b.dim();
    let b_na = nalgebra::DMatrix::from_fn(rows, cols, |r, c| b[(r, c)]);
    let svd = b_na.svd(true, true);
    let (Some(u), Some(v_t)) = (svd.u, svd.v_t) else {
        bail!("irlba: projected SVD failed to produce factors");
    };

    let u = Array2::from_shape_fn((u.nrows(), u.ncols()), |(r, c)| u[(r, c)]);
    let vt = Array2::from_shape_fn((v_t.nrows(), v_t.ncols()), |(r, c)| v_t[(r, c)]);
    let sigma = Array1::from_iter(svd.singular_values.iter().copied());
    Ok((u, sigma, vt))
}

/// IRLBA parameters.
pub struct Irlba {
    /// Convergence tolerance on singular-vector residuals.
    pub tol: f64,
    /// Maximum number of restart iterations.
    pub max_iter: usize,
    /// Seed for the random starting vector.
    pub seed: u64,
}

impl Default for Irlba {
    fn default() -> Self {
        Irlba {
            tol: 0.0001,
            max_iter: 1000,
            seed: 0,
        }
    }
}

impl Irlba {
    /// IRLBA configured from a run configuration.
    pub fn from_config(config: &AnalysisConfig) -> Irlba {
        Irlba {
            max_iter: config.pca_max_iter,
            seed: config.seed,
            ..Irlba::default()
        }
    }
}

impl Pca for Irlba {
    fn run_svd(&self, matrix: &ArrayView2<f64>, k: usize) -> Result<SvdResult> {
        irlba(matrix, k, self.tol, self.max_iter, self.seed)
    }
}

/// Compute a rank-`nu` partial SVD of `A`, stopping at tolerance `tol`
/// or after `maxit` restarts, whichever comes first. Hitting the cap
/// returns the current Ritz approximation with a warning.
pub fn irlba(A: &ArrayView2<f64>, nu: usize, tol: f64, maxit: usize, seed: u64) -> Result<SvdResult> {
    let m = A.nrows();
    let n = A.ncols();

    if m < 2 || n < 2 {
        bail!("irlba: input matrix must be at least 2x2, got {m}x{n}");
    }
    if nu == 0 || nu > min(m, n) {
        bail!(
            "irlba: {nu} singular values requested from a {m}x{n} matrix"
        );
    }

    let m_b = min(nu + 20, min(3 * nu, n));
    let mut mprod = 0;
    let mut it = 0;
    let mut j = 0;
    let mut k = nu;
    let mut smax = f64::MIN;
    let mut converged = false;

    let mut V: Array2<f64> = Array2::zeros((n, m_b));
    let mut W: Array2<f64> = Array2::zeros((m, m_b));
    let mut F: Array1<f64> = Array1::zeros(n);
    let mut B: Array2<f64> = Array2::zeros((m_b, m_b));
    let mut u: Array2<f64> = Array2::zeros((1, 1));
    let mut sigma: Array1<f64> = Array1::zeros(nu);
    let mut vt: Array2<f64> = Array2::zeros((1, 1));

    // random unit starting vector
    {
        let mut rng = rand_pcg::Pcg64Mcg::seed_from_u64(seed);
        let rnorm = Normal::new(0.0f64, 1.0f64).unwrap();
        let mut rand = Array1::random_using(n, rnorm, &mut rng);
        rand *= 1.0f64 / norm(&rand.view());
        V.slice_mut(s![.., 0]).assign(&rand);
    }

    while it < maxit {
        if it > 0 {
            j = k;
        }

        W.column_mut(j).assign(&A.dot(&V.column(j)));
        mprod += 1;

        if it > 0 {
            let nc = orthog(&W.column(j), &W.slice(s![.., 0..j]));
            W.column_mut(k).assign(&nc);
        }

        let mut s = norm(&W.column(j));
        let mut sinv = invcheck(s);
        W.column_mut(j).mapv_inplace(|x| x * sinv);

        let mut fnorm = 0.0;

        // Lanczos process
        while j < m_b {
            F = W.column(j).dot(A);
            mprod += 1;

            F -= &(&V.column(j) * s);
            F = orthog(&F.view(), &V.slice(s![.., 0..j + 1]));
            fnorm = norm(&F.view());
            let finv = invcheck(fnorm);
            F *= finv;

            if j == m_b - 1 {
                B[(j, j)] = s;
            } else {
                V.column_mut(j + 1).assign(&F);
                B[(j, j)] = s;
                B[(j, j + 1)] = fnorm;

                let mut new_w_col = A.dot(&V.column(j + 1));
                mprod += 1;
                new_w_col -= &(&W.column(j) * fnorm);
                new_w_col = orthog(&new_w_col.view(), &W.slice(s![.., 0..j + 1]));
                s = norm(&new_w_col.view());
                sinv = invcheck(s);

                W.column_mut(j + 1).assign(&(&new_w_col * sinv));
            }

            j += 1;
        }

        let svd = small_svd(&B)?;
        u = svd.0;
        sigma = svd.1;
        vt = svd.2;

        let resid = fnorm * &u.slice(s![m_b - 1, ..]);
        smax = if sigma[0] > smax { sigma[0] } else { smax };

        let num_converged = (0..nu).filter(|&i| resid[i] < tol * smax).count();

        if num_converged >= nu {
            converged = true;
            break;
        }

        k = max(num_converged + nu, k);
        k = min(k, m_b.saturating_sub(3).max(1));

        // restart from the current Ritz vectors
        let v_update = V.slice(s![.., 0..m_b]).dot(&vt.t().slice(s![.., 0..k]));
        V.slice_mut(s![.., 0..k]).assign(&v_update);
        V.column_mut(k).assign(&F);

        B = Array2::zeros((m_b, m_b));
        for l in 0..k {
            B[(l, l)] = sigma[l];
        }
        B.slice_mut(s![0..k, k]).assign(&resid.slice(s![0..k]));

        let w_update = W.slice(s![.., 0..m_b]).dot(&u.slice(s![.., 0..k]));
        W.slice_mut(s![.., 0..k]).assign(&w_update);

        it += 1;
    }

    if !converged {
        warn!("irlba: iteration cap {maxit} reached, returning current approximation");
    }
    debug!("irlba: {mprod} matrix products over {it} restarts");

    let U = W.slice(s![.., 0..m_b]).dot(&u.slice(s![.., 0..nu]));
    let V_out = V.slice(s![.., 0..m_b]).dot(&vt.t().slice(s![.., 0..nu]));
    let sigma_out = sigma.slice(s![0..nu]).to_owned();

    if effective_rank(&sigma_out) < nu {
        bail!(
            "irlba: matrix rank is below the {nu} requested components (data insufficient for PCA)"
        );
    }

    Ok((U, sigma_out, V_out))
}
