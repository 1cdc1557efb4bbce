//! 2D embedding of PCA coordinates for visualization.

use crate::config::{AnalysisConfig, EmbeddingMethod};
use anyhow::Result;
use ndarray::{Array2, ArrayView2};

/// t-SNE
pub mod tsne;

/// UMAP
pub mod umap;

/// Project per-cell PCA coordinates to two dimensions with the
/// configured method. Rows stay in cell order; the output feeds plots
/// only, nothing downstream reads it.
pub fn embed_cells(coords: &ArrayView2<f64>, config: &AnalysisConfig) -> Result<Array2<f64>> {
    match config.embedding {
        EmbeddingMethod::Tsne => tsne::run(coords, config.perplexity, config.seed),
        EmbeddingMethod::Umap => umap::run(coords, config.seed),
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::config::EmbeddingMethod;
    use ndarray::Array2;
    use ndarray_rand::RandomExt;
    use rand::SeedableRng;
    use rand_distr::Normal;
    use rand_pcg::Pcg64Mcg;

    #[test]
    fn test_dispatch_shapes() {
        let mut rng = Pcg64Mcg::seed_from_u64(41);
        let coords = Array2::random_using((40, 6), Normal::new(0.0, 1.0).unwrap(), &mut rng);

        for method in [EmbeddingMethod::Tsne, EmbeddingMethod::Umap] {
            let config = AnalysisConfig {
                embedding: method,
                perplexity: 10.0,
                ..AnalysisConfig::default()
            };
            let y = embed_cells(&coords.view(), &config).unwrap();
            assert_eq!(y.dim(), (40, 2));
        }
    }
}
