//! Marker-based cell-type annotation of clusters.
//!
//! Per retained cluster, median expression per gene is summarized and
//! z-scored across clusters. Each candidate cell type gets an activity
//! score from the z-scores of its marker genes, weighted against
//! markers shared by many types, and a one-sided Fisher exact test for
//! enrichment of its markers among the cluster's expressed genes.
//! P-values are Benjamini-Hochberg adjusted across the entire ranked
//! table; a cluster whose top candidate stays above the significance
//! threshold is labeled "Unknown".

use crate::cluster::ClusterAssignment;
use crate::config::{AnalysisConfig, Species};
use crate::matrix::ExpressionMatrix;
use crate::stats::{benjamini_hochberg, fisher_exact_greater, median_mut, LnFactorial};
use anyhow::Result;
use fxhash::FxHashMap;
use itertools::Itertools;
use log::{info, warn};
use ndarray::Array2;
use noisy_float::prelude::*;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

/// Adjusted p-value above which a cluster's best candidate is rejected.
const SIGNIFICANCE: f64 = 0.10;

/// Ubiquitousness index at or above which a marker is discarded.
const UBIQUITOUSNESS_CUTOFF: f64 = 0.05;

/// One row of the marker reference resource.
#[derive(Clone, Debug)]
pub struct MarkerRecord {
    /// Marker gene symbol.
    pub gene_symbol: String,
    /// Cell type the gene marks.
    pub cell_type: String,
    /// Species tags, e.g. "Hs", "Mm" or a combined "Hs Mm".
    pub species: String,
    /// Fraction of cell types this gene marks.
    pub ubiquitousness: f64,
}

/// Marker sets per cell type with inverse-frequency gene weights,
/// filtered to one species.
pub struct MarkerTable {
    sets: BTreeMap<String, BTreeSet<String>>,
    weights: FxHashMap<String, f64>,
}

impl MarkerTable {
    /// Filter records to the species tag and the ubiquitousness cutoff,
    /// then derive per-gene weights. Genes marking many cell types are
    /// down-weighted: weight = 1 + sqrt((max_f - f) / (max_f - min_f)).
    pub fn from_records(records: &[MarkerRecord], species: Species) -> Option<MarkerTable> {
        let tag = species.marker_tag()?;

        let mut sets: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        for rec in records {
            if !rec.species.contains(tag) || rec.ubiquitousness >= UBIQUITOUSNESS_CUTOFF {
                continue;
            }
            sets.entry(rec.cell_type.clone())
                .or_default()
                .insert(rec.gene_symbol.to_uppercase());
        }

        let mut freq: FxHashMap<String, usize> = FxHashMap::default();
        for genes in sets.values() {
            for gene in genes {
                *freq.entry(gene.clone()).or_insert(0) += 1;
            }
        }
        let max_f = freq.values().copied().max().unwrap_or(0) as f64;
        let min_f = freq.values().copied().min().unwrap_or(0) as f64;

        let weights = freq
            .iter()
            .map(|(gene, &f)| {
                let w = if max_f > min_f {
                    1.0 + ((max_f - f as f64) / (max_f - min_f)).sqrt()
                } else {
                    1.0
                };
                (gene.clone(), w)
            })
            .collect();

        Some(MarkerTable { sets, weights })
    }

    /// Cell types in alphabetical order with their marker sets.
    pub fn cell_types(&self) -> impl Iterator<Item = (&String, &BTreeSet<String>)> {
        self.sets.iter()
    }

    /// Inverse-frequency weight for a marker gene.
    pub fn weight(&self, gene: &str) -> f64 {
        self.weights.get(gene).copied().unwrap_or(1.0)
    }
}

/// Ensembl-identifier to canonical symbol mapping, ambiguous symbols
/// removed.
pub struct SymbolMap {
    map: FxHashMap<String, String>,
}

impl SymbolMap {
    /// Build from (identifier, symbol) pairs. Symbols are upper-cased;
    /// a symbol claimed by more than one identifier is dropped entirely.
    pub fn from_pairs(pairs: &[(String, String)]) -> SymbolMap {
        let mut owner: HashMap<String, HashSet<String>> = HashMap::new();
        for (id, symbol) in pairs {
            owner
                .entry(symbol.to_uppercase())
                .or_default()
                .insert(id.clone());
        }
        let ambiguous: HashSet<&String> = owner
            .iter()
            .filter(|(_, ids)| ids.len() > 1)
            .map(|(symbol, _)| symbol)
            .collect();

        let map = pairs
            .iter()
            .filter(|(_, symbol)| !ambiguous.contains(&symbol.to_uppercase()))
            .map(|(id, symbol)| (id.clone(), symbol.to_uppercase()))
            .collect();
        SymbolMap { map }
    }

    /// Canonical symbol for an identifier, if unambiguous.
    pub fn get(&self, id: &str) -> Option<&str> {
        self.map.get(id).map(String::as_str)
    }
}

fn looks_like_ensembl(id: &str) -> bool {
    for prefix in ["ENSG", "ENSMUSG"] {
        if let Some(rest) = id.strip_prefix(prefix) {
            if !rest.is_empty() && rest.chars().all(|c| c.is_ascii_digit()) {
                return true;
            }
        }
    }
    false
}

/// One candidate row of the full ranked table.
#[derive(Clone, Debug)]
pub struct AnnotationRow {
    /// Cluster id.
    pub cluster: usize,
    /// Weighted marker activity score.
    pub activity_score: f64,
    /// Candidate cell type.
    pub cell_type: String,
    /// Raw one-sided Fisher p-value.
    pub p_value: f64,
    /// Expressed marker genes backing the candidate, comma separated,
    /// or "NA" when none are expressed.
    pub markers: String,
    /// Benjamini-Hochberg adjusted p-value.
    pub adjusted_p: f64,
}

/// Final call per cluster.
#[derive(Clone, Debug)]
pub struct BestRow {
    /// Cluster id.
    pub cluster: usize,
    /// Best-supported cell type, or "Unknown".
    pub cell_type: String,
    /// Activity score of the winning candidate (NaN when none existed).
    pub activity_score: f64,
    /// Adjusted p-value of the winning candidate (NaN when none
    /// existed).
    pub adjusted_p: f64,
}

/// Annotation output: the ranked candidate table, the per-cluster calls
/// and the median-expression summary they were derived from.
pub struct AnnotationResult {
    /// All (cluster, candidate) rows, ranked per cluster.
    pub rows: Vec<AnnotationRow>,
    /// One call per retained cluster, in cluster order.
    pub best: Vec<BestRow>,
    /// Gene symbols of the summary matrix rows.
    pub summary_genes: Vec<String>,
    /// Retained cluster ids of the summary matrix columns.
    pub summary_clusters: Vec<usize>,
    /// Median expression, genes x retained clusters.
    pub median_expression: Array2<f64>,
}

/// Map matrix gene identifiers to upper-case symbols. Ensembl-style
/// identifiers go through the symbol map (unmapped ones are dropped);
/// anything else is taken as a symbol directly. The first row claiming
/// a symbol wins.
fn symbol_rows(matrix: &ExpressionMatrix, symbols: &SymbolMap) -> Vec<(String, usize)> {
    let mut seen: HashSet<String> = HashSet::new();
    let mut out = Vec::new();
    for (row, id) in matrix.gene_ids.iter().enumerate() {
        let symbol = if looks_like_ensembl(id) {
            match symbols.get(id) {
                Some(s) => s.to_string(),
                None => continue,
            }
        } else {
            id.to_uppercase()
        };
        if seen.insert(symbol.clone()) {
            out.push((symbol, row));
        }
    }
    out
}

/// Annotate every retained cluster. Returns `None` when the configured
/// species has no marker reference (annotation is skipped, not failed).
pub fn annotate_clusters(
    matrix: &ExpressionMatrix,
    symbols: &SymbolMap,
    records: &[MarkerRecord],
    assignment: &ClusterAssignment,
    config: &AnalysisConfig,
) -> Result<Option<AnnotationResult>> {
    let Some(markers) = MarkerTable::from_records(records, config.species) else {
        info!("no marker reference for the configured species, skipping annotation");
        return Ok(None);
    };

    let genes = symbol_rows(matrix, symbols);
    let clusters = assignment.targets.clone();

    // member cell columns per retained cluster
    let members: Vec<Vec<usize>> = clusters
        .iter()
        .map(|&cl| {
            assignment
                .labels
                .iter()
                .enumerate()
                .filter(|&(_, &l)| l == cl)
                .map(|(cell, _)| cell)
                .collect()
        })
        .collect();

    // median expression per gene and cluster
    let mut medians = Array2::<f64>::zeros((genes.len(), clusters.len()));
    for (g, &(_, row)) in genes.iter().enumerate() {
        for (c, cells) in members.iter().enumerate() {
            let mut values: Vec<N64> = cells.iter().map(|&cell| n64(matrix.data[(row, cell)])).collect();
            if let Some(m) = median_mut(&mut values) {
                medians[(g, c)] = m.raw();
            }
        }
    }

    // z-score each gene across clusters
    let mut zscores = medians.clone();
    for mut row in zscores.rows_mut() {
        let n = row.len() as f64;
        let mean = row.sum() / n;
        let sd = (row.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / n).sqrt();
        if sd > 0.0 {
            row.mapv_inplace(|v| (v - mean) / sd);
        } else {
            row.fill(0.0);
        }
    }

    let gene_universe: HashSet<&str> = genes.iter().map(|(s, _)| s.as_str()).collect();
    let gene_index: FxHashMap<&str, usize> = genes
        .iter()
        .enumerate()
        .map(|(g, (s, _))| (s.as_str(), g))
        .collect();
    let lnf = LnFactorial::new(genes.len());

    let mut rows: Vec<AnnotationRow> = Vec::new();
    let mut candidate_counts: Vec<usize> = Vec::with_capacity(clusters.len());

    for (c, &cluster) in clusters.iter().enumerate() {
        let expressed: Vec<bool> = (0..genes.len()).map(|g| medians[(g, c)] > 0.0).collect();
        let n_expressed = expressed.iter().filter(|&&e| e).count();

        let mut cluster_rows: Vec<AnnotationRow> = Vec::new();
        for (cell_type, marker_set) in markers.cell_types() {
            let present: Vec<&str> = marker_set
                .iter()
                .map(String::as_str)
                .filter(|s| gene_universe.contains(s))
                .collect();
            if present.is_empty() {
                continue;
            }

            let mut activity = 0.0;
            let mut expressed_markers: Vec<&str> = Vec::new();
            for &symbol in &present {
                let g = gene_index[symbol];
                activity += zscores[(g, c)] * markers.weight(symbol);
                if expressed[g] {
                    expressed_markers.push(symbol);
                }
            }
            activity /= (present.len() as f64).powf(0.3);

            let a = expressed_markers.len();
            let b = present.len() - a;
            let c2 = n_expressed - a;
            let d = genes.len() - present.len() - c2;
            let p_value = fisher_exact_greater(a, b, c2, d, &lnf)?;

            let markers_found = if expressed_markers.is_empty() {
                "NA".to_string()
            } else {
                expressed_markers.iter().join(",")
            };

            cluster_rows.push(AnnotationRow {
                cluster,
                activity_score: activity,
                cell_type: cell_type.clone(),
                p_value,
                markers: markers_found,
                adjusted_p: f64::NAN,
            });
        }

        cluster_rows.sort_by(|x, y| {
            y.activity_score
                .total_cmp(&x.activity_score)
                .then_with(|| x.cell_type.cmp(&y.cell_type))
        });
        candidate_counts.push(cluster_rows.len());
        rows.extend(cluster_rows);
    }

    // one combined adjustment across every candidate of every cluster
    let p_values: Vec<f64> = rows.iter().map(|r| r.p_value).collect();
    for (row, adj) in rows.iter_mut().zip(benjamini_hochberg(&p_values)) {
        row.adjusted_p = adj;
    }

    let mut best = Vec::with_capacity(clusters.len());
    let mut offset = 0;
    for (c, &cluster) in clusters.iter().enumerate() {
        let count = candidate_counts[c];
        let call = if count == 0 {
            BestRow {
                cluster,
                cell_type: "Unknown".to_string(),
                activity_score: f64::NAN,
                adjusted_p: f64::NAN,
            }
        } else {
            let top = &rows[offset];
            let cell_type = if top.adjusted_p > SIGNIFICANCE {
                warn!(
                    "cluster {cluster}: top candidate '{}' not significant (adjusted p = {:.3})",
                    top.cell_type, top.adjusted_p
                );
                "Unknown".to_string()
            } else {
                top.cell_type.clone()
            };
            BestRow {
                cluster,
                cell_type,
                activity_score: top.activity_score,
                adjusted_p: top.adjusted_p,
            }
        };
        best.push(call);
        offset += count;
    }

    Ok(Some(AnnotationResult {
        rows,
        best,
        summary_genes: genes.into_iter().map(|(s, _)| s).collect(),
        summary_clusters: clusters,
        median_expression: medians,
    }))
}
