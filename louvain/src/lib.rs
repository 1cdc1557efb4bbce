//! Louvain community detection over undirected weighted graphs.
//!
//! The optimization is the standard local-moving heuristic applied
//! recursively to reduced (aggregate) networks, with a resolution
//! parameter scaling the null-model term of the modularity gain. All
//! randomness comes from a caller-supplied seed, so a fixed seed and a
//! fixed input graph give a fixed clustering.
#![deny(missing_docs)]
#![deny(warnings)]

/// Cluster label container
pub mod clustering;

/// Undirected graph and aggregate-network construction
pub mod network;

/// Multi-level Louvain driver
pub mod louvain;

mod local_moving;

pub use clustering::Clustering;
pub use louvain::{Louvain, DEFAULT_RESOLUTION};
pub use network::{Graph, Network};

trait ZeroVec {
    fn zero_len(&mut self, len: usize);
}

impl<T: Default> ZeroVec for Vec<T> {
    fn zero_len(&mut self, len: usize) {
        for i in self.iter_mut() {
            *i = T::default();
        }
        self.resize_with(len, T::default)
    }
}
