//! Expression matrix and precomputed-clustering input types.

use anyhow::{bail, Result};
use fxhash::FxHashMap;
use ndarray::Array2;
use std::collections::HashSet;

/// A normalized gene-expression matrix: genes on rows, cells on columns.
/// Immutable input to the pipeline; identifiers are unique in both
/// dimensions and values are assumed non-negative.
#[derive(Clone, Debug)]
pub struct ExpressionMatrix {
    /// Gene identifiers, one per row.
    pub gene_ids: Vec<String>,
    /// Cell identifiers, one per column.
    pub cell_ids: Vec<String>,
    /// Expression values, shape (genes, cells).
    pub data: Array2<f64>,
}

impl ExpressionMatrix {
    /// Build a matrix, validating that identifier counts match the data
    /// shape and that identifiers are unique.
    pub fn new(gene_ids: Vec<String>, cell_ids: Vec<String>, data: Array2<f64>) -> Result<ExpressionMatrix> {
        let (rows, cols) = data.dim();
        if gene_ids.len() != rows {
            bail!(
                "expression matrix: {} gene ids for {} rows",
                gene_ids.len(),
                rows
            );
        }
        if cell_ids.len() != cols {
            bail!(
                "expression matrix: {} cell ids for {} columns",
                cell_ids.len(),
                cols
            );
        }

        let unique_genes: HashSet<&str> = gene_ids.iter().map(String::as_str).collect();
        if unique_genes.len() != gene_ids.len() {
            bail!("expression matrix: gene identifiers are not unique");
        }
        let unique_cells: HashSet<&str> = cell_ids.iter().map(String::as_str).collect();
        if unique_cells.len() != cell_ids.len() {
            bail!("expression matrix: cell identifiers are not unique");
        }

        Ok(ExpressionMatrix {
            gene_ids,
            cell_ids,
            data,
        })
    }

    /// Number of genes (rows).
    pub fn n_genes(&self) -> usize {
        self.data.nrows()
    }

    /// Number of cells (columns).
    pub fn n_cells(&self) -> usize {
        self.data.ncols()
    }

    /// Row indices of the given gene identifiers, in their given order.
    /// Identifiers absent from the matrix are skipped.
    pub fn gene_rows(&self, ids: &[String]) -> Vec<usize> {
        let index: FxHashMap<&str, usize> = self
            .gene_ids
            .iter()
            .enumerate()
            .map(|(i, g)| (g.as_str(), i))
            .collect();
        ids.iter().filter_map(|g| index.get(g.as_str()).copied()).collect()
    }

    /// Copy of the sub-matrix restricted to the given gene rows.
    pub fn select_genes(&self, rows: &[usize]) -> Array2<f64> {
        let mut out = Array2::zeros((rows.len(), self.n_cells()));
        for (out_row, &row) in rows.iter().enumerate() {
            out.row_mut(out_row).assign(&self.data.row(row));
        }
        out
    }
}

/// A user-supplied clustering keyed by cell identifier. When present it
/// bypasses the KNN/SNN/community-detection stages entirely.
#[derive(Clone, Debug)]
pub struct PrecomputedClusters {
    /// (cell identifier, cluster id) pairs.
    pub assignments: Vec<(String, usize)>,
}

impl PrecomputedClusters {
    /// Reorder the assignment into matrix column order. The cell set
    /// must match the matrix exactly; a mismatch is a fatal
    /// configuration error.
    pub fn to_labels(&self, matrix: &ExpressionMatrix) -> Result<Vec<usize>> {
        let supplied: FxHashMap<&str, usize> = self
            .assignments
            .iter()
            .map(|(cell, cl)| (cell.as_str(), *cl))
            .collect();

        if supplied.len() != self.assignments.len() {
            bail!("precomputed clustering: duplicate cell identifiers");
        }
        if supplied.len() != matrix.n_cells() {
            bail!(
                "precomputed clustering: cell sets differ between expression matrix ({} cells) and supplied cluster file ({} cells)",
                matrix.n_cells(),
                supplied.len()
            );
        }

        let mut labels = Vec::with_capacity(matrix.n_cells());
        for cell in &matrix.cell_ids {
            match supplied.get(cell.as_str()) {
                Some(&cl) => labels.push(cl),
                None => bail!(
                    "precomputed clustering: cell sets differ between expression matrix and supplied cluster file (cell '{cell}' missing)"
                ),
            }
        }
        Ok(labels)
    }
}
