//! K-nearest-neighbor queries over per-cell PCA coordinates, backed by
//! a ball tree in Euclidean space.

use anyhow::{bail, Result};
use ball_tree::BallTree;
use ndarray::{Array2, ArrayView2};

#[derive(Clone, Debug, PartialEq)]
struct Pt(Vec<f64>);

impl ball_tree::Point for Pt {
    fn distance(&self, other: &Self) -> f64 {
        self.0
            .iter()
            .zip(other.0.iter())
            .map(|(a, b)| (a - b) * (a - b))
            .sum::<f64>()
            .sqrt()
    }

    fn move_towards(&self, other: &Self, d: f64) -> Self {
        let dist = self.distance(other);
        if dist == 0.0 {
            return self.clone();
        }
        let scale = d / dist;
        Pt(self
            .0
            .iter()
            .zip(other.0.iter())
            .map(|(a, b)| a + scale * (b - a))
            .collect())
    }
}

fn build_tree(coords: &ArrayView2<f64>) -> BallTree<Pt, u32> {
    let points: Vec<Pt> = coords.rows().into_iter().map(|r| Pt(r.to_vec())).collect();
    let idx: Vec<u32> = (0..points.len() as u32).collect();
    BallTree::new(points, idx)
}

/// For each cell (row of `coords`) find its `k` nearest other cells.
/// Returns a (cells, k) matrix of cell indices; a cell is never its own
/// neighbor. Ties at equal distance resolve by tree order, which is
/// deterministic for fixed input.
pub fn knn(coords: &ArrayView2<f64>, k: usize) -> Result<Array2<u32>> {
    Ok(knn_with_distances(coords, k)?.0)
}

/// As [`knn`], additionally returning the neighbor distances.
pub fn knn_with_distances(coords: &ArrayView2<f64>, k: usize) -> Result<(Array2<u32>, Array2<f64>)> {
    let n = coords.nrows();
    if k == 0 || k >= n {
        bail!("knn: k = {k} is out of range for {n} cells");
    }

    let tree = build_tree(coords);
    let mut query = tree.query();

    let mut indices = Array2::<u32>::zeros((n, k));
    let mut distances = Array2::<f64>::zeros((n, k));

    for (i, row) in coords.rows().into_iter().enumerate() {
        let pt = Pt(row.to_vec());
        let mut col = 0;
        // k + 1 results so the self-match can be dropped
        for (_, d, &j) in query.nn(&pt).take(k + 1) {
            if j == i as u32 {
                continue;
            }
            if col == k {
                break;
            }
            indices[(i, col)] = j;
            distances[(i, col)] = d;
            col += 1;
        }
        if col != k {
            bail!("knn: query for cell {i} returned {col} of {k} neighbors");
        }
    }

    Ok((indices, distances))
}
