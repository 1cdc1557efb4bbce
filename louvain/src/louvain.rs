use crate::local_moving::LocalMoving;
use crate::{Clustering, Graph, Network};
use fxhash::FxHashSet;
use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;

/// Default resolution parameter (plain modularity).
pub const DEFAULT_RESOLUTION: f64 = 1.0;

/// Multi-level Louvain clustering.
pub struct Louvain {
    rng: ChaCha20Rng,
    local_moving: LocalMoving,
}

impl Louvain {
    /// Initialize with a resolution parameter and an optional random
    /// seed; an absent seed means seed 0.
    pub fn new(resolution: f64, seed: Option<u64>) -> Louvain {
        Louvain {
            rng: ChaCha20Rng::seed_from_u64(seed.unwrap_or_default()),
            local_moving: LocalMoving::new(resolution),
        }
    }

    /// Run one full multi-level pass: local moving, then recursion on the
    /// aggregate network, then label merge. Returns true if any cluster
    /// label changed.
    pub fn iterate(&mut self, n: &Network, c: &mut Clustering) -> bool {
        let mut update = self.local_moving.iterate(n, c, &mut self.rng);

        if c.num_clusters() == n.nodes() {
            return update;
        }

        let reduced_n = n.create_reduced_network(c);
        let mut reduced_c = Clustering::singletons(reduced_n.nodes());

        update |= self.iterate(&reduced_n, &mut reduced_c);

        c.merge(&reduced_c);

        update
    }

    /// Build a network from an adjacency pair list over `n_nodes` nodes.
    /// Duplicate pairs (in either orientation) and self-pairs are
    /// dropped; edges get unit weight and nodes are weighted by degree.
    pub fn build_network<I: Iterator<Item = (u32, u32)>>(n_nodes: usize, adjacency: I) -> Network {
        let mut graph = Graph::with_capacity(n_nodes);
        for _ in 0..n_nodes {
            graph.add_node(0.0);
        }

        let mut seen = vec![FxHashSet::<u32>::default(); n_nodes];
        let mut degrees = vec![0.0f32; n_nodes];
        for (i, j) in adjacency {
            if i == j {
                continue;
            }
            let (i, j) = if i < j { (i, j) } else { (j, i) };
            if seen[i as usize].insert(j) {
                graph.add_edge(i, j, 1.0);
                degrees[i as usize] += 1.0;
                degrees[j as usize] += 1.0;
            }
        }

        for (node, &degree) in degrees.iter().enumerate() {
            *graph.node_weight_mut(node as u32) = degree;
        }

        Network::new_from_graph(graph)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    // Two 5-cliques joined by a single bridge edge.
    fn two_cliques() -> Network {
        let mut edges = Vec::new();
        for base in [0u32, 5] {
            for i in 0..5 {
                for j in (i + 1)..5 {
                    edges.push((base + i, base + j));
                }
            }
        }
        edges.push((4, 5));
        Louvain::build_network(10, edges.into_iter())
    }

    #[test]
    fn test_two_cliques_split() {
        let n = two_cliques();
        let mut c = Clustering::singletons(n.nodes());
        let mut louvain = Louvain::new(DEFAULT_RESOLUTION, Some(0));

        let mut updated = true;
        for _ in 0..10 {
            if !updated {
                break;
            }
            updated = louvain.iterate(&n, &mut c);
        }

        assert_eq!(c.num_clusters(), 2);
        for i in 0..5 {
            assert_eq!(c.get(i), c.get(0));
            assert_eq!(c.get(5 + i), c.get(5));
        }
        assert_ne!(c.get(0), c.get(5));
    }

    #[test]
    fn test_seed_determinism() {
        let n = two_cliques();

        let run = |seed| {
            let mut c = Clustering::singletons(n.nodes());
            let mut louvain = Louvain::new(DEFAULT_RESOLUTION, Some(seed));
            for _ in 0..10 {
                louvain.iterate(&n, &mut c);
            }
            c.labels().to_vec()
        };

        assert_eq!(run(7), run(7));
    }

    #[test]
    fn test_build_network_dedupes() {
        let edges = vec![(0u32, 1u32), (1, 0), (0, 1), (2, 2)];
        let n = Louvain::build_network(3, edges.into_iter());
        assert_eq!(n.total_edge_weight(), 1.0);
        assert_eq!(n.weight(0), 1.0);
        assert_eq!(n.weight(2), 0.0);
    }
}
