use crate::Clustering;
use fxhash::FxHashMap;

/// Undirected graph stored as per-node adjacency lists.
///
/// Every edge is recorded in both endpoint lists; self-loops are not
/// supported. Node ids are dense `u32` values assigned by `add_node`.
#[derive(Debug, Clone, Default)]
pub struct Graph {
    adjacency: Vec<Vec<(u32, f32)>>,
    node_weights: Vec<f32>,
    total_edges: usize,
}

impl Graph {
    /// Empty graph with room for `nodes` nodes.
    pub fn with_capacity(nodes: usize) -> Graph {
        Graph {
            adjacency: Vec::with_capacity(nodes),
            node_weights: Vec::with_capacity(nodes),
            total_edges: 0,
        }
    }

    /// Add a node with the given weight, returning its id.
    pub fn add_node(&mut self, weight: f32) -> u32 {
        let id = self.node_weights.len() as u32;
        self.adjacency.push(Vec::new());
        self.node_weights.push(weight);
        id
    }

    /// Add an undirected edge between `a` and `b`.
    pub fn add_edge(&mut self, a: u32, b: u32, weight: f32) {
        assert!(a != b, "self-loops are not representable");
        self.adjacency[a as usize].push((b, weight));
        self.adjacency[b as usize].push((a, weight));
        self.total_edges += 1;
    }

    /// Number of nodes.
    pub fn node_count(&self) -> usize {
        self.node_weights.len()
    }

    /// Number of undirected edges.
    pub fn edge_count(&self) -> usize {
        self.total_edges
    }

    /// Weight of node `node`.
    pub fn node_weight(&self, node: u32) -> f32 {
        self.node_weights[node as usize]
    }

    /// Mutable weight of node `node`.
    pub fn node_weight_mut(&mut self, node: u32) -> &mut f32 {
        &mut self.node_weights[node as usize]
    }

    /// Iterate over `(neighbor, edge_weight)` pairs of `node`.
    pub fn neighbors(&self, node: u32) -> impl Iterator<Item = (u32, f32)> + '_ {
        self.adjacency[node as usize].iter().copied()
    }
}

/// The network being clustered: a [`Graph`] plus the aggregate-network
/// operations the multi-level optimization needs.
#[derive(Debug, Clone, Default)]
pub struct Network {
    pub(crate) graph: Graph,
}

impl Network {
    /// Wrap a graph as a network.
    pub fn new_from_graph(graph: Graph) -> Network {
        Network { graph }
    }

    /// Number of nodes.
    pub fn nodes(&self) -> usize {
        self.graph.node_count()
    }

    /// Node weight of `node`.
    pub fn weight(&self, node: usize) -> f64 {
        self.graph.node_weight(node as u32) as f64
    }

    /// Iterate over `(neighbor, edge_weight)` pairs of `node`.
    pub fn neighbors(&self, node: usize) -> impl Iterator<Item = (usize, f64)> + '_ {
        self.graph
            .neighbors(node as u32)
            .map(|(n, w)| (n as usize, w as f64))
    }

    /// Sum of all node weights.
    pub fn total_node_weight(&self) -> f64 {
        (0..self.nodes()).map(|i| self.weight(i)).sum()
    }

    /// Sum of all edge weights.
    pub fn total_edge_weight(&self) -> f64 {
        // every edge appears in two adjacency lists
        let twice: f64 = self
            .graph
            .adjacency
            .iter()
            .map(|adj| adj.iter().map(|&(_, w)| w as f64).sum::<f64>())
            .sum();
        twice / 2.0
    }

    /// Aggregate network induced by a clustering: one node per cluster
    /// whose weight is the summed node weight of its members, and one
    /// edge per connected cluster pair whose weight is the summed weight
    /// of the edges between the two clusters. Intra-cluster edges vanish.
    pub fn create_reduced_network(&self, clustering: &Clustering) -> Network {
        let mut reduced = Graph::with_capacity(clustering.num_clusters());
        for _ in 0..clustering.num_clusters() {
            reduced.add_node(0.0);
        }

        for node in 0..self.nodes() {
            let cluster = clustering.get(node) as u32;
            *reduced.node_weight_mut(cluster) += self.graph.node_weight(node as u32);
        }

        let mut edge_weights: FxHashMap<(u32, u32), f32> = FxHashMap::default();
        for node in 0..self.nodes() {
            let c1 = clustering.get(node) as u32;
            for (neighbor, weight) in self.graph.neighbors(node as u32) {
                // visit each edge once, from its lower endpoint
                if neighbor as usize <= node {
                    continue;
                }
                let c2 = clustering.get(neighbor as usize) as u32;
                if c1 == c2 {
                    continue;
                }
                let key = if c1 < c2 { (c1, c2) } else { (c2, c1) };
                *edge_weights.entry(key).or_insert(0.0) += weight;
            }
        }

        // stable edge order keeps reduced networks bit-reproducible
        let mut edges: Vec<((u32, u32), f32)> = edge_weights.into_iter().collect();
        edges.sort_by_key(|&(key, _)| key);
        for ((c1, c2), weight) in edges {
            reduced.add_edge(c1, c2, weight);
        }

        Network { graph: reduced }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn path_graph(n: u32) -> Network {
        let mut g = Graph::with_capacity(n as usize);
        for _ in 0..n {
            g.add_node(1.0);
        }
        for i in 0..n - 1 {
            g.add_edge(i, i + 1, 1.0);
        }
        Network::new_from_graph(g)
    }

    #[test]
    fn test_totals() {
        let n = path_graph(4);
        assert_eq!(n.nodes(), 4);
        assert_eq!(n.total_node_weight(), 4.0);
        assert_eq!(n.total_edge_weight(), 3.0);
    }

    #[test]
    fn test_neighbors() {
        let n = path_graph(3);
        let mut nbrs: Vec<usize> = n.neighbors(1).map(|(i, _)| i).collect();
        nbrs.sort_unstable();
        assert_eq!(nbrs, vec![0, 2]);
    }

    #[test]
    fn test_reduced_network() {
        // path 0-1-2-3 clustered {0,1} {2,3}: one inter-cluster edge
        let n = path_graph(4);
        let c = Clustering::from_labels(&[0, 0, 1, 1]);
        let reduced = n.create_reduced_network(&c);

        assert_eq!(reduced.nodes(), 2);
        assert_eq!(reduced.weight(0), 2.0);
        assert_eq!(reduced.weight(1), 2.0);
        assert_eq!(reduced.total_edge_weight(), 1.0);
    }

    #[test]
    fn test_reduced_network_aggregates_weights() {
        // triangle with one node split off; two parallel inter-cluster edges
        let mut g = Graph::with_capacity(3);
        for _ in 0..3 {
            g.add_node(1.0);
        }
        g.add_edge(0, 1, 1.0);
        g.add_edge(0, 2, 2.0);
        g.add_edge(1, 2, 3.0);
        let n = Network::new_from_graph(g);

        let c = Clustering::from_labels(&[0, 0, 1]);
        let reduced = n.create_reduced_network(&c);
        assert_eq!(reduced.nodes(), 2);
        // edges 0-2 and 1-2 both collapse onto the cluster pair (0,1)
        assert_eq!(reduced.total_edge_weight(), 5.0);
    }
}
