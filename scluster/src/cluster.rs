//! Community detection over the SNN graph and the small-cluster policy.

use crate::config::AnalysisConfig;
use crate::matrix::{ExpressionMatrix, PrecomputedClusters};
use crate::snn::SnnGraph;
use anyhow::Result;
use log::info;
use louvain::{Clustering, Louvain};

/// Cluster labels per cell, plus the subset of clusters large enough to
/// feed downstream per-cluster statistics. Small clusters keep their
/// labels but are dropped from the target set.
#[derive(Clone, Debug)]
pub struct ClusterAssignment {
    /// Cluster id per cell, in cell order.
    pub labels: Vec<usize>,
    /// Cluster ids retained for downstream analysis, ascending.
    pub targets: Vec<usize>,
}

impl ClusterAssignment {
    /// Number of distinct clusters in the assignment.
    pub fn num_clusters(&self) -> usize {
        self.labels.iter().copied().max().map_or(0, |m| m + 1)
    }

    /// Whether a cluster survived the small-cluster threshold.
    pub fn is_target(&self, cluster: usize) -> bool {
        self.targets.binary_search(&cluster).is_ok()
    }

    fn from_labels(labels: Vec<usize>, min_size: usize) -> ClusterAssignment {
        let num = labels.iter().copied().max().map_or(0, |m| m + 1);
        let mut sizes = vec![0usize; num];
        for &l in &labels {
            sizes[l] += 1;
        }
        for (cluster, &size) in sizes.iter().enumerate() {
            info!("cluster {cluster}: {size} cells");
        }
        let targets: Vec<usize> = sizes
            .iter()
            .enumerate()
            .filter(|&(_, &size)| size > min_size)
            .map(|(cluster, _)| cluster)
            .collect();
        ClusterAssignment { labels, targets }
    }
}

/// Partition cells into communities of the SNN graph. Every cell is a
/// vertex whether or not any of its edges survived pruning, so isolated
/// cells come back as singleton clusters rather than disappearing.
pub fn cluster_cells(snn: &SnnGraph, config: &AnalysisConfig) -> Result<ClusterAssignment> {
    let network = Louvain::build_network(snn.n_cells, snn.edge_pairs());
    let mut louvain = Louvain::new(config.resolution, Some(config.seed));
    let mut clustering = Clustering::singletons(snn.n_cells);

    for iteration in 0..config.cluster_iterations {
        let improved = louvain.iterate(&network, &mut clustering);
        if !improved {
            info!("community detection converged after {} iterations", iteration + 1);
            break;
        }
    }

    info!(
        "community detection found {} clusters over {} cells",
        clustering.num_clusters(),
        snn.n_cells
    );
    Ok(ClusterAssignment::from_labels(
        clustering.labels().to_vec(),
        config.ignore_small_clusters,
    ))
}

/// Wrap a user-supplied clustering, applying the same small-cluster
/// policy as the detected one.
pub fn from_precomputed(
    pre: &PrecomputedClusters,
    matrix: &ExpressionMatrix,
    config: &AnalysisConfig,
) -> Result<ClusterAssignment> {
    let labels = pre.to_labels(matrix)?;
    Ok(ClusterAssignment::from_labels(
        labels,
        config.ignore_small_clusters,
    ))
}
