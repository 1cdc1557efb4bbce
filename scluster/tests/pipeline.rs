//! End-to-end pipeline run over a synthetic two-population matrix.

use ndarray::Array2;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};
use rand_pcg::Pcg64Mcg;
use scluster::annotate::MarkerRecord;
use scluster::config::AnalysisConfig;
use scluster::matrix::ExpressionMatrix;
use scluster::output::filenames;
use scluster::pipeline::{run, AnnotationRefs};

const GENES: usize = 50;
const CELLS: usize = 200;

/// Two well-separated populations: genes 0..25 active in cells 0..100,
/// genes 25..50 active in cells 100..200, zero elsewhere.
fn synthetic_matrix() -> ExpressionMatrix {
    let mut rng = Pcg64Mcg::seed_from_u64(99);
    let noise: Normal<f64> = Normal::new(0.0, 0.5).unwrap();

    let mut data = Array2::<f64>::zeros((GENES, CELLS));
    for gene in 0..GENES {
        let (lo, hi) = if gene < 25 { (0, 100) } else { (100, 200) };
        for cell in lo..hi {
            data[(gene, cell)] = (5.0 + noise.sample(&mut rng)).max(0.1);
        }
    }

    let gene_ids = (0..GENES)
        .map(|g| {
            if g < 25 {
                format!("MARKA{g:02}")
            } else {
                format!("MARKB{:02}", g - 25)
            }
        })
        .collect();
    let cell_ids = (0..CELLS).map(|c| format!("cell{c}")).collect();
    ExpressionMatrix::new(gene_ids, cell_ids, data).unwrap()
}

fn annotation_refs() -> AnnotationRefs {
    let mut markers = Vec::new();
    for g in 0..10 {
        markers.push(MarkerRecord {
            gene_symbol: format!("MARKA{g:02}"),
            cell_type: "Alpha cells".to_string(),
            species: "Hs Mm".to_string(),
            ubiquitousness: 0.01,
        });
        markers.push(MarkerRecord {
            gene_symbol: format!("MARKB{g:02}"),
            cell_type: "Beta cells".to_string(),
            species: "Hs".to_string(),
            ubiquitousness: 0.01,
        });
    }
    AnnotationRefs {
        symbol_pairs: Vec::new(),
        markers,
    }
}

fn test_config() -> AnalysisConfig {
    AnalysisConfig {
        hvg_n: 50,
        pca_n: 10,
        ..AnalysisConfig::default()
    }
}

fn brute_force_knn(coords: &Array2<f64>, k: usize) -> Vec<Vec<u32>> {
    let n = coords.nrows();
    (0..n)
        .map(|i| {
            let mut ds: Vec<(f64, u32)> = (0..n)
                .filter(|&j| j != i)
                .map(|j| {
                    let d = coords
                        .row(i)
                        .iter()
                        .zip(coords.row(j).iter())
                        .map(|(a, b)| (a - b) * (a - b))
                        .sum::<f64>();
                    (d, j as u32)
                })
                .collect();
            ds.sort_by(|a, b| a.0.total_cmp(&b.0));
            let mut nearest: Vec<u32> = ds.into_iter().take(k).map(|(_, j)| j).collect();
            nearest.sort_unstable();
            nearest
        })
        .collect()
}

#[test]
fn test_two_populations_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let matrix = synthetic_matrix();
    let config = test_config();

    let result = run(&matrix, &annotation_refs(), None, &config, dir.path()).unwrap();

    // exactly two clusters, sizes 100/100 within 20%
    assert_eq!(result.clusters.num_clusters(), 2);
    let first = result.clusters.labels[0];
    let size_first = result
        .clusters
        .labels
        .iter()
        .filter(|&&l| l == first)
        .count();
    assert!((80..=120).contains(&size_first), "size {size_first}");

    // populations do not mix
    let second = result.clusters.labels[150];
    assert_ne!(first, second);
    assert!(result.clusters.labels[..100].iter().all(|&l| l == first));
    assert!(result.clusters.labels[100..].iter().all(|&l| l == second));

    // the engine's KNN agrees with brute force over the PCA coordinates
    let knn = result.knn.as_ref().unwrap();
    let brute = brute_force_knn(&result.pca, config.nn_k);
    for (i, want) in brute.iter().enumerate() {
        let mut got: Vec<u32> = knn.row(i).to_vec();
        got.sort_unstable();
        assert_eq!(&got, want, "cell {i}");
    }

    // annotation calls the right type for each population
    let annotation = result.annotation.as_ref().unwrap();
    let call = |cluster: usize| {
        annotation
            .best
            .iter()
            .find(|b| b.cluster == cluster)
            .unwrap()
            .cell_type
            .clone()
    };
    assert_eq!(call(first), "Alpha cells");
    assert_eq!(call(second), "Beta cells");
    assert!(annotation
        .best
        .iter()
        .all(|b| b.adjusted_p < 0.05));

    // artifacts on disk
    for name in [
        filenames::HVG,
        filenames::PCA,
        filenames::EMBEDDING,
        filenames::SNN_EDGES,
        filenames::CLUSTERS,
        filenames::MEDIAN_EXPRESSION,
        filenames::ANNOTATION_FULL,
        filenames::ANNOTATION_BEST,
    ] {
        assert!(dir.path().join(name).exists(), "{name} missing");
    }
}

#[test]
fn test_rerun_reuses_cache_and_reproduces() {
    let dir = tempfile::tempdir().unwrap();
    let matrix = synthetic_matrix();
    let config = test_config();
    let refs = annotation_refs();

    let a = run(&matrix, &refs, None, &config, dir.path()).unwrap();
    let b = run(&matrix, &refs, None, &config, dir.path()).unwrap();
    assert_eq!(a.clusters.labels, b.clusters.labels);

    let forced = AnalysisConfig {
        force_snn_recompute: true,
        ..config
    };
    let c = run(&matrix, &refs, None, &forced, dir.path()).unwrap();
    assert_eq!(a.clusters.labels, c.clusters.labels);
}

#[test]
fn test_precomputed_clustering_bypasses_graph_stages() {
    let dir = tempfile::tempdir().unwrap();
    let matrix = synthetic_matrix();
    let config = test_config();

    let pre = scluster::matrix::PrecomputedClusters {
        assignments: (0..CELLS)
            .map(|c| (format!("cell{c}"), usize::from(c >= 100)))
            .collect(),
    };

    let result = run(&matrix, &annotation_refs(), Some(&pre), &config, dir.path()).unwrap();
    assert!(result.knn.is_none());
    assert!(result.snn.is_none());
    assert_eq!(result.clusters.num_clusters(), 2);

    let annotation = result.annotation.as_ref().unwrap();
    let call = |cluster: usize| {
        annotation
            .best
            .iter()
            .find(|b| b.cluster == cluster)
            .unwrap()
            .cell_type
            .clone()
    };
    assert_eq!(call(0), "Alpha cells");
    assert_eq!(call(1), "Beta cells");
}
