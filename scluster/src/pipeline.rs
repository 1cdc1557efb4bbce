//! Sequential pipeline driver: each stage fully consumes its
//! predecessor's output, and every stage result is persisted to the
//! working directory as a flat file.

use crate::annotate::{annotate_clusters, AnnotationResult, MarkerRecord, SymbolMap};
use crate::cache::SnnCache;
use crate::cluster::{self, ClusterAssignment};
use crate::config::AnalysisConfig;
use crate::dim_red::cell_coordinates;
use crate::embed::embed_cells;
use crate::hvg::select_hvg;
use crate::matrix::{ExpressionMatrix, PrecomputedClusters};
use crate::nn::knn;
use crate::output;
use crate::snn::SnnGraph;
use anyhow::{Context, Result};
use log::info;
use ndarray::Array2;
use std::path::Path;

/// Reference resources consumed by the annotation stage.
pub struct AnnotationRefs {
    /// (Ensembl-style identifier, gene symbol) pairs.
    pub symbol_pairs: Vec<(String, String)>,
    /// Marker reference rows.
    pub markers: Vec<MarkerRecord>,
}

/// Everything a pipeline run produces, also persisted to the working
/// directory.
pub struct PipelineResult {
    /// Selected highly variable genes, rank order.
    pub hvg: Vec<String>,
    /// Per-cell PCA coordinates, cells x components.
    pub pca: Array2<f64>,
    /// Per-cell 2D embedding.
    pub embedding: Array2<f64>,
    /// KNN table; absent when a precomputed clustering bypassed it.
    pub knn: Option<Array2<u32>>,
    /// SNN graph; absent when a precomputed clustering bypassed it.
    pub snn: Option<SnnGraph>,
    /// Cluster assignment.
    pub clusters: ClusterAssignment,
    /// Annotation tables; absent for species without a marker reference.
    pub annotation: Option<AnnotationResult>,
}

/// Run the full analysis over an expression matrix. A supplied
/// precomputed clustering replaces the KNN, SNN and community-detection
/// stages; everything else runs unchanged.
pub fn run(
    matrix: &ExpressionMatrix,
    refs: &AnnotationRefs,
    precomputed: Option<&PrecomputedClusters>,
    config: &AnalysisConfig,
    workdir: &Path,
) -> Result<PipelineResult> {
    info!(
        "pipeline start: {} genes x {} cells",
        matrix.n_genes(),
        matrix.n_cells()
    );

    let hvg = select_hvg(matrix, config).context("hvg selection")?;
    output::write_hvg(workdir, &hvg)?;

    let hvg_rows = matrix.gene_rows(&hvg);
    let hvg_matrix = matrix.select_genes(&hvg_rows);
    let pca = cell_coordinates(&hvg_matrix.view(), config).context("pca")?;
    output::write_pca(workdir, &matrix.cell_ids, &pca.view())?;

    let embedding = embed_cells(&pca.view(), config).context("embedding")?;
    output::write_embedding(workdir, &matrix.cell_ids, &embedding.view())?;

    let (knn_table, snn_graph, clusters) = match precomputed {
        Some(pre) => {
            info!("using supplied precomputed clustering");
            let clusters = cluster::from_precomputed(pre, matrix, config)
                .context("precomputed clustering")?;
            (None, None, clusters)
        }
        None => {
            let knn_table = knn(&pca.view(), config.nn_k).context("nearest neighbors")?;
            let snn_graph = SnnCache::new(workdir)
                .load_or_build(&knn_table.view(), config.prune_snn, config.force_snn_recompute)
                .context("snn graph")?;
            output::write_snn_edges(workdir, &snn_graph)?;
            let clusters = cluster::cluster_cells(&snn_graph, config).context("community detection")?;
            (Some(knn_table), Some(snn_graph), clusters)
        }
    };
    output::write_clusters(workdir, &matrix.cell_ids, &clusters)?;

    let symbols = SymbolMap::from_pairs(&refs.symbol_pairs);
    let annotation = annotate_clusters(matrix, &symbols, &refs.markers, &clusters, config)
        .context("annotation")?;
    if let Some(result) = &annotation {
        output::write_annotation(workdir, result)?;
    }

    info!("pipeline done: {} clusters", clusters.num_clusters());
    Ok(PipelineResult {
        hvg,
        pca,
        embedding,
        knn: knn_table,
        snn: snn_graph,
        clusters,
        annotation,
    })
}
