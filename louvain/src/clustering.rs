/// Assignment of a cluster label to every node of a network.
///
/// Labels are kept dense: after `remove_empty_clusters` the label space
/// is exactly `0..num_clusters` with every label occupied.
#[derive(Debug, Clone, Default)]
pub struct Clustering {
    labels: Vec<usize>,
    num_clusters: usize,
}

impl Clustering {
    /// Fresh clustering with each node in its own cluster.
    pub fn singletons(num_nodes: usize) -> Clustering {
        Clustering {
            labels: (0..num_nodes).collect(),
            num_clusters: num_nodes,
        }
    }

    /// Build a clustering from an existing label vector.
    pub fn from_labels(input_labels: &[usize]) -> Clustering {
        let num_clusters = input_labels.iter().max().map_or(0, |m| m + 1);

        let mut c = Clustering {
            labels: input_labels.to_vec(),
            num_clusters,
        };
        c.remove_empty_clusters();
        c
    }

    /// Label of node `node`.
    pub fn get(&self, node: usize) -> usize {
        self.labels[node]
    }

    /// Assign node `node` to `label`, growing the label space if needed.
    pub fn set(&mut self, node: usize, label: usize) {
        self.labels[node] = label;
        if label >= self.num_clusters {
            self.num_clusters = label + 1;
        }
    }

    /// Total number of nodes.
    pub fn nodes(&self) -> usize {
        self.labels.len()
    }

    /// Number of labels in use (after compaction).
    pub fn num_clusters(&self) -> usize {
        self.num_clusters
    }

    /// View of the full label vector, in node order.
    pub fn labels(&self) -> &[usize] {
        &self.labels
    }

    /// Node count of every cluster.
    pub fn cluster_sizes(&self) -> Vec<usize> {
        let mut sizes = vec![0; self.num_clusters];
        for &l in &self.labels {
            sizes[l] += 1;
        }
        sizes
    }

    /// The nodes belonging to each cluster.
    pub fn nodes_per_cluster(&self) -> Vec<Vec<usize>> {
        let mut lists = vec![Vec::new(); self.num_clusters];
        for (node, &label) in self.labels.iter().enumerate() {
            lists[label].push(node);
        }
        lists
    }

    /// Relabel so that the used labels are contiguous from zero.
    pub fn remove_empty_clusters(&mut self) {
        let mut counts = vec![0usize; self.num_clusters];
        for &l in &self.labels {
            counts[l] += 1;
        }

        let mut remap = vec![usize::MAX; self.num_clusters];
        let mut next = 0;
        for (old, &count) in counts.iter().enumerate() {
            if count > 0 {
                remap[old] = next;
                next += 1;
            }
        }

        for l in self.labels.iter_mut() {
            debug_assert!(remap[*l] != usize::MAX);
            *l = remap[*l];
        }
        self.num_clusters = next;
    }

    /// Apply a clustering of the cluster labels themselves, so that this
    /// clustering reflects the higher-order grouping.
    pub fn merge(&mut self, cluster_clustering: &Clustering) {
        for node in 0..self.nodes() {
            let l = cluster_clustering.get(self.labels[node]);
            self.labels[node] = l;
            if l >= self.num_clusters {
                self.num_clusters = l + 1;
            }
        }
        self.remove_empty_clusters();
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_from_labels_compacts() {
        let mut c = Clustering::from_labels(&[1, 2, 3, 4, 5]);
        assert_eq!(c.num_clusters(), 5);

        c.remove_empty_clusters();
        assert_eq!(c.num_clusters(), 5);
        assert_eq!(c.labels(), &[0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_set_and_compact() {
        let mut c = Clustering::singletons(10);
        assert_eq!(c.num_clusters(), 10);

        c.set(8, 0);
        c.set(7, 0);
        c.remove_empty_clusters();

        assert_eq!(c.num_clusters(), 8);
        assert_eq!(c.get(9), 7);
    }

    #[test]
    fn test_merge() {
        // nodes 0,1 -> cluster 0; nodes 2,3 -> cluster 1; node 4 -> cluster 2
        let mut c = Clustering::from_labels(&[0, 0, 1, 1, 2]);
        // merge clusters 0 and 1
        let higher = Clustering::from_labels(&[0, 0, 1]);
        c.merge(&higher);

        assert_eq!(c.num_clusters(), 2);
        assert_eq!(c.labels(), &[0, 0, 0, 0, 1]);
    }

    #[test]
    fn test_sizes() {
        let c = Clustering::from_labels(&[0, 1, 1, 1, 0]);
        assert_eq!(c.cluster_sizes(), vec![2, 3]);
        assert_eq!(c.nodes_per_cluster(), vec![vec![0, 4], vec![1, 2, 3]]);
    }
}
