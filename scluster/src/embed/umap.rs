//! UMAP embedding of PCA coordinates.
//!
//! Fuzzy simplicial set construction over a KNN graph followed by
//! stochastic gradient optimization of a 2D layout, with the usual
//! negative-sampling schedule. Curve parameters correspond to the
//! common min_dist = 0.1 / spread = 1.0 setting.

use crate::nn;
use anyhow::{bail, Result};
use fxhash::FxHashMap;
use log::warn;
use ndarray::{Array2, ArrayView2};
use ndarray_rand::RandomExt;
use rand::{Rng, SeedableRng};
use rand_distr::Uniform;
use rand_pcg::Pcg64Mcg;

const N_NEIGHBORS: usize = 15;
const N_EPOCHS: usize = 200;
const NEGATIVE_SAMPLES: usize = 5;
const INITIAL_ALPHA: f64 = 1.0;
const CURVE_A: f64 = 1.577;
const CURVE_B: f64 = 0.8951;
const REPULSION: f64 = 1.0;
const CLIP: f64 = 4.0;
const SIGMA_TOL: f64 = 1e-5;

/// Per-point smoothed-distance calibration: `rho` is the distance to
/// the nearest neighbor, `sigma` scales the remaining distances so the
/// fuzzy neighborhood has effective size log2(k).
fn smooth_knn_dist(dists: &[f64]) -> (f64, f64) {
    let rho = dists
        .iter()
        .copied()
        .find(|&d| d > 0.0)
        .unwrap_or(0.0);
    let target = (dists.len() as f64).log2();

    let mut lo = 0.0f64;
    let mut hi = f64::INFINITY;
    let mut sigma = 1.0f64;
    for _ in 0..64 {
        let sum: f64 = dists
            .iter()
            .map(|&d| (-(d - rho).max(0.0) / sigma).exp())
            .sum();
        if (sum - target).abs() < SIGMA_TOL {
            break;
        }
        if sum > target {
            hi = sigma;
            sigma = (lo + hi) / 2.0;
        } else {
            lo = sigma;
            sigma = if hi.is_infinite() { sigma * 2.0 } else { (lo + hi) / 2.0 };
        }
    }
    (rho, sigma)
}

/// Symmetrized fuzzy graph as (i, j, weight) with i < j.
fn fuzzy_graph(knn: &Array2<u32>, dists: &Array2<f64>) -> Vec<(u32, u32, f64)> {
    let n = knn.nrows();
    let mut directed: FxHashMap<(u32, u32), f64> = FxHashMap::default();
    for i in 0..n {
        let row: Vec<f64> = dists.row(i).to_vec();
        let (rho, sigma) = smooth_knn_dist(&row);
        for (col, &j) in knn.row(i).iter().enumerate() {
            let w = (-(row[col] - rho).max(0.0) / sigma).exp();
            directed.insert((i as u32, j), w);
        }
    }

    // fuzzy set union: w = w_ij + w_ji - w_ij * w_ji
    let mut edges = Vec::new();
    for (&(i, j), &w_ij) in &directed {
        if i > j {
            continue;
        }
        let w_ji = directed.get(&(j, i)).copied().unwrap_or(0.0);
        let w = w_ij + w_ji - w_ij * w_ji;
        if w > 0.0 {
            edges.push((i.min(j), i.max(j), w));
        }
    }
    // the map may hold (j, i) without (i, j); pick those up too
    for (&(i, j), &w_ij) in &directed {
        if i <= j || directed.contains_key(&(j, i)) {
            continue;
        }
        edges.push((j, i, w_ij));
    }
    edges.sort_unstable_by(|a, b| (a.0, a.1).cmp(&(b.0, b.1)));
    edges
}

fn clip(v: f64) -> f64 {
    v.clamp(-CLIP, CLIP)
}

/// 2D UMAP embedding of the given per-cell coordinates.
pub fn run(coords: &ArrayView2<f64>, seed: u64) -> Result<Array2<f64>> {
    let n = coords.nrows();
    if n <= N_NEIGHBORS {
        bail!("umap: need more than {N_NEIGHBORS} cells, got {n}");
    }

    let (knn, dists) = nn::knn_with_distances(coords, N_NEIGHBORS)?;
    let edges = fuzzy_graph(&knn, &dists);
    if edges.is_empty() {
        bail!("umap: fuzzy graph has no edges");
    }

    let max_w = edges.iter().map(|e| e.2).fold(0.0f64, f64::max);
    if max_w == 0.0 {
        bail!("umap: degenerate fuzzy graph weights");
    }
    // low-weight edges sampled rarely; extremely low ones never
    let epochs_per_sample: Vec<f64> = edges
        .iter()
        .map(|e| {
            let per = max_w / e.2;
            if per > N_EPOCHS as f64 {
                f64::INFINITY
            } else {
                per
            }
        })
        .collect();
    if epochs_per_sample.iter().all(|p| p.is_infinite()) {
        warn!("umap: all edges below the sampling floor, layout will be random");
    }

    let mut rng = Pcg64Mcg::seed_from_u64(seed);
    let mut y = Array2::<f64>::random_using((n, 2), Uniform::new(-10.0, 10.0), &mut rng);

    let mut next_sample: Vec<f64> = epochs_per_sample.clone();
    let mut next_negative: Vec<f64> = epochs_per_sample
        .iter()
        .map(|p| p / NEGATIVE_SAMPLES as f64)
        .collect();

    for epoch in 0..N_EPOCHS {
        let alpha = INITIAL_ALPHA * (1.0 - epoch as f64 / N_EPOCHS as f64);
        let epoch = epoch as f64 + 1.0;

        for (e, &(i, j, _)) in edges.iter().enumerate() {
            if next_sample[e] > epoch {
                continue;
            }
            next_sample[e] += epochs_per_sample[e];

            let (i, j) = (i as usize, j as usize);
            let dx = y[(i, 0)] - y[(j, 0)];
            let dy = y[(i, 1)] - y[(j, 1)];
            let d2 = dx * dx + dy * dy;

            if d2 > 0.0 {
                let coeff = (-2.0 * CURVE_A * CURVE_B * d2.powf(CURVE_B - 1.0))
                    / (CURVE_A * d2.powf(CURVE_B) + 1.0);
                let gx = clip(coeff * dx) * alpha;
                let gy = clip(coeff * dy) * alpha;
                y[(i, 0)] += gx;
                y[(i, 1)] += gy;
                y[(j, 0)] -= gx;
                y[(j, 1)] -= gy;
            }

            // negative samples for endpoint i
            while next_negative[e] <= epoch {
                next_negative[e] += epochs_per_sample[e] / NEGATIVE_SAMPLES as f64;

                let t = rng.gen_range(0..n);
                if t == i {
                    continue;
                }
                let dx = y[(i, 0)] - y[(t, 0)];
                let dy = y[(i, 1)] - y[(t, 1)];
                let d2 = dx * dx + dy * dy;
                let coeff = if d2 > 0.0 {
                    2.0 * REPULSION * CURVE_B
                        / ((0.001 + d2) * (CURVE_A * d2.powf(CURVE_B) + 1.0))
                } else {
                    0.0
                };
                y[(i, 0)] += clip(coeff * dx) * alpha;
                y[(i, 1)] += clip(coeff * dy) * alpha;
            }
        }
    }

    Ok(y)
}

#[cfg(test)]
mod test {
    use super::*;
    use ndarray::Array2;
    use rand_distr::Normal;

    fn two_blobs(n_per: usize) -> Array2<f64> {
        let mut rng = Pcg64Mcg::seed_from_u64(31);
        let noise = Normal::new(0.0, 0.1).unwrap();
        let blob_a = Array2::random_using((n_per, 5), noise, &mut rng);
        let blob_b = Array2::random_using((n_per, 5), noise, &mut rng) + 10.0;
        ndarray::concatenate(ndarray::Axis(0), &[blob_a.view(), blob_b.view()]).unwrap()
    }

    #[test]
    fn test_separates_blobs() {
        let coords = two_blobs(40);
        let y = run(&coords.view(), 0).unwrap();
        assert_eq!(y.dim(), (80, 2));

        let ca = y.slice(ndarray::s![..40, ..]).mean_axis(ndarray::Axis(0)).unwrap();
        let cb = y.slice(ndarray::s![40.., ..]).mean_axis(ndarray::Axis(0)).unwrap();
        let sep = ((ca[0] - cb[0]).powi(2) + (ca[1] - cb[1]).powi(2)).sqrt();

        let mean_spread = y
            .slice(ndarray::s![..40, ..])
            .rows()
            .into_iter()
            .map(|r| ((r[0] - ca[0]).powi(2) + (r[1] - ca[1]).powi(2)).sqrt())
            .sum::<f64>()
            / 40.0;
        assert!(sep > mean_spread, "separation {sep} vs mean spread {mean_spread}");
    }

    #[test]
    fn test_deterministic() {
        let coords = two_blobs(20);
        let a = run(&coords.view(), 5).unwrap();
        let b = run(&coords.view(), 5).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_smooth_knn_dist_hits_target() {
        let dists = vec![0.5, 0.8, 1.0, 1.2, 1.5, 2.0, 2.5, 3.0];
        let (rho, sigma) = smooth_knn_dist(&dists);
        assert_eq!(rho, 0.5);
        let sum: f64 = dists
            .iter()
            .map(|&d| (-(d - rho).max(0.0) / sigma).exp())
            .sum();
        assert!((sum - 8.0f64.log2()).abs() < 1e-3);
    }

    #[test]
    fn test_too_few_cells() {
        let coords = Array2::<f64>::zeros((10, 3));
        assert!(run(&coords.view(), 0).is_err());
    }
}
