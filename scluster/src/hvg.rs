//! Highly-variable-gene selection.
//!
//! Genes are binned by mean expression (equal-width bins over the range
//! of means) and dispersion (variance / mean) is z-scored within each
//! bin, so that variability is judged against genes of comparable
//! abundance. The top-ranked genes feed dimensionality reduction.

use crate::config::{AnalysisConfig, HvgMethod};
use crate::matrix::ExpressionMatrix;
use anyhow::{bail, Result};
use log::debug;

/// Per-gene mean and dispersion (sample variance / mean) across cells.
/// Genes with zero mean get no dispersion.
fn gene_dispersions(matrix: &ExpressionMatrix) -> (Vec<f64>, Vec<Option<f64>>) {
    let cells = matrix.n_cells() as f64;
    let mut means = Vec::with_capacity(matrix.n_genes());
    let mut dispersions = Vec::with_capacity(matrix.n_genes());

    for row in matrix.data.rows() {
        let mean = row.sum() / cells;
        means.push(mean);
        if mean <= 0.0 || cells < 2.0 {
            dispersions.push(None);
            continue;
        }
        let var = row.iter().map(|&v| (v - mean) * (v - mean)).sum::<f64>() / (cells - 1.0);
        dispersions.push(Some(var / mean));
    }
    (means, dispersions)
}

/// Rank genes by within-bin dispersion z-score and return the top
/// `config.hvg_n` gene identifiers, best first.
///
/// Bins with fewer than two scored genes (or zero dispersion spread)
/// cannot produce a z-score; their genes are excluded from the ranking
/// rather than carrying invalid values forward.
pub fn select_hvg(matrix: &ExpressionMatrix, config: &AnalysisConfig) -> Result<Vec<String>> {
    if matrix.n_genes() < 2 {
        bail!(
            "hvg selection: need at least 2 genes, got {}",
            matrix.n_genes()
        );
    }
    if matrix.n_cells() < 2 {
        bail!(
            "hvg selection: need at least 2 cells, got {}",
            matrix.n_cells()
        );
    }
    if config.hvg_method == HvgMethod::BinnedDispersion && config.hvg_bins == 0 {
        bail!("hvg selection: number of mean-expression bins must be at least 1");
    }

    let (means, dispersions) = gene_dispersions(matrix);

    let mut scored: Vec<(usize, f64)> = match config.hvg_method {
        HvgMethod::BinnedDispersion => binned_zscores(&means, &dispersions, config.hvg_bins),
        HvgMethod::Dispersion => dispersions
            .iter()
            .enumerate()
            .filter_map(|(gene, d)| d.map(|d| (gene, d)))
            .collect(),
    };

    // descending score, gene id as the deterministic tie-break
    scored.sort_by(|a, b| {
        b.1.total_cmp(&a.1)
            .then_with(|| matrix.gene_ids[a.0].cmp(&matrix.gene_ids[b.0]))
    });
    scored.truncate(config.hvg_n);

    debug!("selected {} highly variable genes", scored.len());

    Ok(scored
        .into_iter()
        .map(|(gene, _)| matrix.gene_ids[gene].clone())
        .collect())
}

/// Z-score dispersions within equal-width mean-expression bins.
fn binned_zscores(means: &[f64], dispersions: &[Option<f64>], num_bins: usize) -> Vec<(usize, f64)> {
    let lo = means.iter().copied().fold(f64::INFINITY, f64::min);
    let hi = means.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let width = (hi - lo) / num_bins as f64;

    let mut bins: Vec<Vec<(usize, f64)>> = vec![Vec::new(); num_bins];
    for (gene, dispersion) in dispersions.iter().enumerate() {
        let Some(dispersion) = *dispersion else { continue };
        let bin = if width > 0.0 {
            (((means[gene] - lo) / width) as usize).min(num_bins - 1)
        } else {
            0
        };
        bins[bin].push((gene, dispersion));
    }

    let mut scored = Vec::new();
    for members in &bins {
        if members.len() < 2 {
            continue;
        }
        let n = members.len() as f64;
        let mean_d = members.iter().map(|&(_, d)| d).sum::<f64>() / n;
        let var_d = members
            .iter()
            .map(|&(_, d)| (d - mean_d) * (d - mean_d))
            .sum::<f64>()
            / (n - 1.0);
        let sd = var_d.sqrt();
        if sd == 0.0 {
            continue;
        }
        for &(gene, d) in members {
            scored.push((gene, (d - mean_d) / sd));
        }
    }
    scored
}
