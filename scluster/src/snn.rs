//! Shared-nearest-neighbor graph construction.
//!
//! Each cell's neighborhood is its KNN list plus itself. Two cells are
//! connected when their neighborhoods overlap, with edge strength
//! `v / (k + (k - v))` for an overlap of `v`, clamped to 1. Weak edges
//! below the prune threshold are dropped.

use anyhow::{bail, Result};
use log::{info, warn};
use ndarray::ArrayView2;
use sprs::{CsMat, TriMat};

fn edge_strength(v: f64, k: usize) -> f64 {
    (v / (k as f64 + (k as f64 - v))).min(1.0)
}

/// An undirected SNN graph over cells `0..n_cells`. Edges are stored
/// once with `source < target`.
#[derive(Clone, Debug)]
pub struct SnnGraph {
    /// Number of cells the graph was built over.
    pub n_cells: usize,
    /// Neighborhood size the graph was built from.
    pub k: usize,
    /// (source, target, strength) with source < target.
    pub edges: Vec<(u32, u32, f64)>,
}

impl SnnGraph {
    /// Build the graph from a (cells, k) KNN index matrix, keeping
    /// edges with strength of at least `prune`.
    pub fn build(knn: &ArrayView2<u32>, prune: f64) -> Result<SnnGraph> {
        let (n, k) = knn.dim();
        if n == 0 || k == 0 {
            bail!("snn: empty neighbor matrix");
        }

        // incidence matrix: one row per cell marking itself and its k
        // neighbors, so that B * B^T counts shared neighborhood members
        let mut tri = TriMat::new((n, n));
        for (i, row) in knn.rows().into_iter().enumerate() {
            tri.add_triplet(i, i, 1.0f64);
            for &j in row {
                if j as usize >= n {
                    bail!("snn: neighbor index {j} out of range for {n} cells");
                }
                tri.add_triplet(i, j as usize, 1.0);
            }
        }
        let b: CsMat<f64> = tri.to_csr();
        let bt = b.transpose_view().to_csr();
        let counts = &b * &bt;

        let mut edges = Vec::new();
        let mut total = 0usize;
        for (value, (i, j)) in counts.iter() {
            if i >= j {
                continue;
            }
            total += 1;
            let strength = edge_strength(*value, k);
            if strength >= prune {
                edges.push((i as u32, j as u32, strength));
            }
        }
        edges.sort_unstable_by(|a, b| (a.0, a.1).cmp(&(b.0, b.1)));

        let pruned = total - edges.len();
        info!(
            "snn graph: {} edges kept, {} pruned (threshold {:.4})",
            edges.len(),
            pruned,
            prune
        );
        if total > 0 && pruned as f64 / total as f64 > 0.8 {
            warn!(
                "snn graph: {:.0}% of candidate edges fell below the prune threshold; \
                 clustering may fragment",
                100.0 * pruned as f64 / total as f64
            );
        }

        Ok(SnnGraph {
            n_cells: n,
            k,
            edges,
        })
    }

    /// Edge endpoints without strengths, as community detection consumes
    /// them.
    pub fn edge_pairs(&self) -> impl Iterator<Item = (u32, u32)> + '_ {
        self.edges.iter().map(|&(s, t, _)| (s, t))
    }
}
