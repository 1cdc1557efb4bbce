//! Exact t-SNE on PCA coordinates.
//!
//! The quadratic pairwise formulation is used rather than a
//! Barnes-Hut approximation; for the cell counts this stage sees after
//! PCA it is fast enough and keeps the code free of spatial-tree
//! machinery. Standard schedule: early exaggeration for the first 250
//! iterations, momentum switch at the same point, adaptive per-axis
//! gains.

use anyhow::{bail, Result};
use log::warn;
use ndarray::{Array2, ArrayView2};
use ndarray_rand::RandomExt;
use rand::SeedableRng;
use rand_distr::Normal;
use rand_pcg::Pcg64Mcg;

const MAX_ITER: usize = 1000;
const EARLY_EXAGGERATION: f64 = 12.0;
const EXAGGERATION_END: usize = 250;
const MOMENTUM_SWITCH: usize = 250;
const ETA: f64 = 200.0;
const MIN_GAIN: f64 = 0.01;
const P_FLOOR: f64 = 1e-12;

fn squared_distances(coords: &ArrayView2<f64>) -> Array2<f64> {
    let n = coords.nrows();
    let mut d = Array2::zeros((n, n));
    for i in 0..n {
        for j in (i + 1)..n {
            let dist = coords
                .row(i)
                .iter()
                .zip(coords.row(j).iter())
                .map(|(a, b)| (a - b) * (a - b))
                .sum::<f64>();
            d[(i, j)] = dist;
            d[(j, i)] = dist;
        }
    }
    d
}

/// Binary search the Gaussian precision for row `i` so the conditional
/// distribution hits the target entropy log(perplexity).
fn conditional_probabilities(d_row: ndarray::ArrayView1<f64>, i: usize, perplexity: f64) -> Vec<f64> {
    let n = d_row.len();
    let target_entropy = perplexity.ln();
    let mut beta = 1.0f64;
    let mut beta_min = f64::NEG_INFINITY;
    let mut beta_max = f64::INFINITY;
    let mut p = vec![0.0; n];

    for _ in 0..50 {
        let mut sum = 0.0;
        for j in 0..n {
            p[j] = if j == i { 0.0 } else { (-beta * d_row[j]).exp() };
            sum += p[j];
        }
        if sum == 0.0 {
            sum = f64::MIN_POSITIVE;
        }

        let mut entropy = 0.0;
        for v in p.iter_mut() {
            *v /= sum;
            if *v > 0.0 {
                entropy -= *v * v.ln();
            }
        }

        let diff = entropy - target_entropy;
        if diff.abs() < 1e-5 {
            break;
        }
        if diff > 0.0 {
            beta_min = beta;
            beta = if beta_max.is_infinite() {
                beta * 2.0
            } else {
                (beta + beta_max) / 2.0
            };
        } else {
            beta_max = beta;
            beta = if beta_min.is_infinite() {
                beta / 2.0
            } else {
                (beta + beta_min) / 2.0
            };
        }
    }
    p
}

fn joint_probabilities(coords: &ArrayView2<f64>, perplexity: f64) -> Array2<f64> {
    let n = coords.nrows();
    let d = squared_distances(coords);

    let mut p = Array2::zeros((n, n));
    for i in 0..n {
        let row = conditional_probabilities(d.row(i), i, perplexity);
        for j in 0..n {
            p[(i, j)] = row[j];
        }
    }

    // symmetrize and normalize to a joint distribution
    let mut joint = Array2::zeros((n, n));
    let total = 2.0 * n as f64;
    for i in 0..n {
        for j in 0..n {
            joint[(i, j)] = ((p[(i, j)] + p[(j, i)]) / total).max(P_FLOOR);
        }
    }
    for i in 0..n {
        joint[(i, i)] = P_FLOOR;
    }
    joint
}

/// 2D t-SNE embedding of the given per-cell coordinates.
pub fn run(coords: &ArrayView2<f64>, perplexity: f64, seed: u64) -> Result<Array2<f64>> {
    let n = coords.nrows();
    if n < 4 {
        bail!("tsne: need at least 4 cells, got {n}");
    }

    let max_perplexity = (n as f64 - 1.0) / 3.0;
    let perplexity = if perplexity > max_perplexity {
        warn!(
            "tsne: perplexity {perplexity} too large for {n} cells, clamping to {max_perplexity:.1}"
        );
        max_perplexity
    } else {
        perplexity
    };

    let mut p = joint_probabilities(coords, perplexity);
    p *= EARLY_EXAGGERATION;

    let mut rng = Pcg64Mcg::seed_from_u64(seed);
    let init = Normal::new(0.0, 1e-4).map_err(|e| anyhow::anyhow!("tsne init: {e}"))?;
    let mut y = Array2::<f64>::random_using((n, 2), init, &mut rng);
    let mut velocity = Array2::<f64>::zeros((n, 2));
    let mut gains = Array2::<f64>::from_elem((n, 2), 1.0);

    for iter in 0..MAX_ITER {
        if iter == EXAGGERATION_END {
            p /= EARLY_EXAGGERATION;
        }
        let momentum = if iter < MOMENTUM_SWITCH { 0.5 } else { 0.8 };

        // student-t affinities in the embedding
        let mut num = Array2::<f64>::zeros((n, n));
        let mut z = 0.0;
        for i in 0..n {
            for j in (i + 1)..n {
                let dx = y[(i, 0)] - y[(j, 0)];
                let dy = y[(i, 1)] - y[(j, 1)];
                let q = 1.0 / (1.0 + dx * dx + dy * dy);
                num[(i, j)] = q;
                num[(j, i)] = q;
                z += 2.0 * q;
            }
        }
        let z = z.max(f64::MIN_POSITIVE);

        let mut grad = Array2::<f64>::zeros((n, 2));
        for i in 0..n {
            for j in 0..n {
                if i == j {
                    continue;
                }
                let mult = (p[(i, j)] - num[(i, j)] / z) * num[(i, j)];
                grad[(i, 0)] += 4.0 * mult * (y[(i, 0)] - y[(j, 0)]);
                grad[(i, 1)] += 4.0 * mult * (y[(i, 1)] - y[(j, 1)]);
            }
        }

        for i in 0..n {
            for a in 0..2 {
                let same_sign = grad[(i, a)].signum() == velocity[(i, a)].signum();
                gains[(i, a)] = if same_sign {
                    (gains[(i, a)] * 0.8).max(MIN_GAIN)
                } else {
                    gains[(i, a)] + 0.2
                };
                velocity[(i, a)] =
                    momentum * velocity[(i, a)] - ETA * gains[(i, a)] * grad[(i, a)];
                y[(i, a)] += velocity[(i, a)];
            }
        }

        // re-center
        for a in 0..2 {
            let mean = y.column(a).sum() / n as f64;
            y.column_mut(a).mapv_inplace(|v| v - mean);
        }
    }

    Ok(y)
}
