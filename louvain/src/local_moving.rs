use crate::{Clustering, Network, ZeroVec};
use rand::seq::SliceRandom;
use rand::Rng;

/// Standard local-moving heuristic: repeatedly move single nodes to the
/// neighboring cluster with the largest modularity gain until no node
/// wants to move.
#[derive(Default)]
pub(crate) struct LocalMoving {
    resolution: f64,
    cluster_weights: Vec<f64>,
    nodes_per_cluster: Vec<usize>,
    unused_clusters: Vec<usize>,
    node_order: Vec<usize>,
    edge_weight_per_cluster: Vec<f64>,
    neighboring_clusters: Vec<usize>,
}

impl LocalMoving {
    pub fn new(resolution: f64) -> Self {
        LocalMoving {
            resolution,
            ..LocalMoving::default()
        }
    }

    pub fn iterate(&mut self, n: &Network, c: &mut Clustering, rng: &mut impl Rng) -> bool {
        let mut update = false;

        if n.nodes() == 0 {
            return update;
        }

        let total_edge_weight = n.total_edge_weight();

        self.cluster_weights.zero_len(n.nodes());
        self.nodes_per_cluster.zero_len(n.nodes());
        for i in 0..n.nodes() {
            self.cluster_weights[c.get(i)] += n.weight(i);
            self.nodes_per_cluster[c.get(i)] += 1;
        }

        let mut num_unused_clusters = 0;
        self.unused_clusters.zero_len(n.nodes());
        for i in (0..n.nodes()).rev() {
            if self.nodes_per_cluster[i] == 0 {
                self.unused_clusters[num_unused_clusters] = i;
                num_unused_clusters += 1;
            }
        }

        self.node_order.clear();
        self.node_order.extend(0..n.nodes());
        self.node_order.shuffle(rng);

        // Visit nodes cyclically until every node in the queue is stable.
        self.edge_weight_per_cluster.zero_len(n.nodes());
        self.neighboring_clusters.zero_len(n.nodes());

        let mut num_unstable_nodes = n.nodes();
        let mut i = 0;

        loop {
            let j = self.node_order[i];
            let current_cluster = c.get(j);

            // Take the node out of its cluster.
            self.cluster_weights[current_cluster] -= n.weight(j);
            self.nodes_per_cluster[current_cluster] -= 1;
            if self.nodes_per_cluster[current_cluster] == 0 {
                self.unused_clusters[num_unused_clusters] = current_cluster;
                num_unused_clusters += 1;
            }

            // Candidate destinations: every cluster adjacent to the node,
            // plus one empty cluster so a node can always split away.
            self.neighboring_clusters[0] = self.unused_clusters[num_unused_clusters - 1];
            let mut num_neighboring_clusters = 1;
            for (target, edge_weight) in n.neighbors(j) {
                let neighbor_cluster = c.get(target);
                if self.edge_weight_per_cluster[neighbor_cluster] == 0.0 {
                    self.neighboring_clusters[num_neighboring_clusters] = neighbor_cluster;
                    num_neighboring_clusters += 1;
                }
                self.edge_weight_per_cluster[neighbor_cluster] += edge_weight;
            }

            // Pick the destination with the largest quality gain; equal
            // gains break toward the lowest cluster id for determinism.
            let mut best_cluster = current_cluster;
            let mut max_qv_increment = self.edge_weight_per_cluster[current_cluster]
                - n.weight(j) * self.cluster_weights[current_cluster] * self.resolution
                    / (2.0 * total_edge_weight);

            for &l in &self.neighboring_clusters[..num_neighboring_clusters] {
                let qv_increment = self.edge_weight_per_cluster[l]
                    - n.weight(j) * self.cluster_weights[l] * self.resolution / (2.0 * total_edge_weight);
                if qv_increment > max_qv_increment
                    || (qv_increment == max_qv_increment && l < best_cluster)
                {
                    best_cluster = l;
                    max_qv_increment = qv_increment;
                }
                self.edge_weight_per_cluster[l] = 0.0;
            }
            self.edge_weight_per_cluster[current_cluster] = 0.0;

            self.cluster_weights[best_cluster] += n.weight(j);
            self.nodes_per_cluster[best_cluster] += 1;
            if best_cluster == self.unused_clusters[num_unused_clusters - 1] {
                num_unused_clusters -= 1;
            }

            num_unstable_nodes -= 1;

            if best_cluster != current_cluster {
                c.set(j, best_cluster);
                update = true;
            }

            i = (i + 1) % n.nodes();
            if num_unstable_nodes == 0 {
                break;
            }
        }

        if update {
            c.remove_empty_clusters();
        }

        update
    }
}
