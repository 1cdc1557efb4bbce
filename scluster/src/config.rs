//! Immutable run configuration.
//!
//! One [`AnalysisConfig`] is built before the pipeline starts and passed
//! by reference into every stage. Method choices are tagged variants
//! resolved here, not string names dispatched at call sites.

/// Species of the input data; controls marker-reference filtering and
/// gene-symbol mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Species {
    /// Homo sapiens
    Human,
    /// Mus musculus
    Mouse,
    /// Anything else; cell-type annotation is skipped.
    Other,
}

impl Species {
    /// Tag used in the marker reference's species column, if any.
    pub fn marker_tag(&self) -> Option<&'static str> {
        match self {
            Species::Human => Some("Hs"),
            Species::Mouse => Some("Mm"),
            Species::Other => None,
        }
    }
}

/// Ranking strategy for highly-variable-gene selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HvgMethod {
    /// Bin genes by mean expression, z-score dispersion within each bin.
    BinnedDispersion,
    /// Rank by raw dispersion (variance / mean) without binning.
    Dispersion,
}

/// Dimensionality-reduction strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PcaMethod {
    /// Truncated SVD via implicitly restarted Lanczos bidiagonalization.
    Approximate,
    /// Mean-center cells, full SVD, keep the leading components.
    Exact,
}

/// 2D embedding strategy for the visualization projection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbeddingMethod {
    /// Exact t-SNE
    Tsne,
    /// UMAP with a fuzzy nearest-neighbor graph
    Umap,
}

/// Configuration for a pipeline run. Constructed once, never mutated.
#[derive(Debug, Clone)]
pub struct AnalysisConfig {
    /// Input species.
    pub species: Species,
    /// HVG ranking strategy.
    pub hvg_method: HvgMethod,
    /// Number of highly variable genes to keep.
    pub hvg_n: usize,
    /// Number of mean-expression bins for `HvgMethod::BinnedDispersion`.
    pub hvg_bins: usize,
    /// Number of principal components.
    pub pca_n: usize,
    /// Dimensionality-reduction strategy.
    pub pca: PcaMethod,
    /// Iteration cap for the iterative SVD solver.
    pub pca_max_iter: usize,
    /// Neighbors per cell for the KNN table.
    pub nn_k: usize,
    /// SNN edges with strength below this threshold are dropped.
    pub prune_snn: f64,
    /// Resolution parameter for community detection.
    pub resolution: f64,
    /// Number of community-detection iterations.
    pub cluster_iterations: usize,
    /// Seed for every randomized stage.
    pub seed: u64,
    /// Clusters with at most this many cells are kept in the assignment
    /// but excluded from per-cluster statistics.
    pub ignore_small_clusters: usize,
    /// 2D embedding strategy.
    pub embedding: EmbeddingMethod,
    /// t-SNE perplexity.
    pub perplexity: f64,
    /// Recompute the SNN graph even when a cached copy exists.
    pub force_snn_recompute: bool,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        AnalysisConfig {
            species: Species::Human,
            hvg_method: HvgMethod::BinnedDispersion,
            hvg_n: 1000,
            hvg_bins: 20,
            pca_n: 75,
            pca: PcaMethod::Approximate,
            pca_max_iter: 1000,
            nn_k: 20,
            prune_snn: 1.0 / 15.0,
            resolution: louvain::DEFAULT_RESOLUTION,
            cluster_iterations: 10,
            seed: 0,
            ignore_small_clusters: 10,
            embedding: EmbeddingMethod::Tsne,
            perplexity: 30.0,
            force_snn_recompute: false,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = AnalysisConfig::default();
        assert_eq!(cfg.hvg_n, 1000);
        assert_eq!(cfg.pca_n, 75);
        assert_eq!(cfg.cluster_iterations, 10);
        assert!((cfg.prune_snn - 1.0 / 15.0).abs() < 1e-12);
    }

    #[test]
    fn test_marker_tags() {
        assert_eq!(Species::Human.marker_tag(), Some("Hs"));
        assert_eq!(Species::Mouse.marker_tag(), Some("Mm"));
        assert_eq!(Species::Other.marker_tag(), None);
    }
}
