//! Flat-file artifacts written into the working directory.

use crate::annotate::AnnotationResult;
use crate::cluster::ClusterAssignment;
use crate::snn::SnnGraph;
use anyhow::{Context, Result};
use ndarray::ArrayView2;
use std::io::Write;
use std::path::Path;

/// Artifact file names within the working directory.
pub mod filenames {
    /// Highly variable genes, one per line.
    pub const HVG: &str = "hvg.txt";
    /// PCA coordinates per cell.
    pub const PCA: &str = "pca.csv";
    /// 2D embedding coordinates per cell.
    pub const EMBEDDING: &str = "embedding.csv";
    /// Surviving SNN edges.
    pub const SNN_EDGES: &str = "snn_edges.csv";
    /// Cluster id per cell.
    pub const CLUSTERS: &str = "clusters.csv";
    /// Median expression per gene and retained cluster.
    pub const MEDIAN_EXPRESSION: &str = "median_expression.tsv";
    /// Full ranked annotation table.
    pub const ANNOTATION_FULL: &str = "annotation_full.tsv";
    /// Best cell-type call per cluster.
    pub const ANNOTATION_BEST: &str = "annotation_best.tsv";
}

fn fmt_float(v: f64) -> String {
    if v.is_nan() {
        "NA".to_string()
    } else {
        format!("{v}")
    }
}

fn create(dir: &Path, name: &str) -> Result<std::fs::File> {
    std::fs::File::create(dir.join(name))
        .with_context(|| format!("creating {} in {}", name, dir.display()))
}

/// One gene identifier per line, rank order.
pub fn write_hvg(dir: &Path, genes: &[String]) -> Result<()> {
    let mut f = create(dir, filenames::HVG)?;
    for gene in genes {
        writeln!(f, "{gene}")?;
    }
    Ok(())
}

/// Cell identifier plus one column per principal component.
pub fn write_pca(dir: &Path, cell_ids: &[String], coords: &ArrayView2<f64>) -> Result<()> {
    write_coordinates(dir, filenames::PCA, cell_ids, coords)
}

/// Cell identifier plus the two embedding columns.
pub fn write_embedding(dir: &Path, cell_ids: &[String], coords: &ArrayView2<f64>) -> Result<()> {
    write_coordinates(dir, filenames::EMBEDDING, cell_ids, coords)
}

fn write_coordinates(
    dir: &Path,
    name: &str,
    cell_ids: &[String],
    coords: &ArrayView2<f64>,
) -> Result<()> {
    let mut writer = csv::Writer::from_writer(create(dir, name)?);
    let mut header = vec!["cell".to_string()];
    header.extend((0..coords.ncols()).map(|c| format!("dim{}", c + 1)));
    writer.write_record(&header)?;
    for (cell, row) in cell_ids.iter().zip(coords.rows()) {
        let mut record = vec![cell.clone()];
        record.extend(row.iter().map(|v| fmt_float(*v)));
        writer.write_record(&record)?;
    }
    writer.flush()?;
    Ok(())
}

/// Surviving SNN edge endpoints.
pub fn write_snn_edges(dir: &Path, graph: &SnnGraph) -> Result<()> {
    let mut writer = csv::Writer::from_writer(create(dir, filenames::SNN_EDGES)?);
    writer.write_record(["source", "target"])?;
    for (source, target) in graph.edge_pairs() {
        writer.write_record([source.to_string(), target.to_string()])?;
    }
    writer.flush()?;
    Ok(())
}

/// Cluster id per cell, in cell order.
pub fn write_clusters(dir: &Path, cell_ids: &[String], assignment: &ClusterAssignment) -> Result<()> {
    let mut writer = csv::Writer::from_writer(create(dir, filenames::CLUSTERS)?);
    writer.write_record(["cell", "cluster"])?;
    for (cell, &label) in cell_ids.iter().zip(&assignment.labels) {
        writer.write_record([cell.clone(), label.to_string()])?;
    }
    writer.flush()?;
    Ok(())
}

/// Annotation tables and the median-expression summary they came from.
pub fn write_annotation(dir: &Path, result: &AnnotationResult) -> Result<()> {
    let mut writer = csv::WriterBuilder::new()
        .delimiter(b'\t')
        .from_writer(create(dir, filenames::MEDIAN_EXPRESSION)?);
    let mut header = vec!["gene".to_string()];
    header.extend(result.summary_clusters.iter().map(|c| c.to_string()));
    writer.write_record(&header)?;
    for (gene, row) in result
        .summary_genes
        .iter()
        .zip(result.median_expression.rows())
    {
        let mut record = vec![gene.clone()];
        record.extend(row.iter().map(|v| fmt_float(*v)));
        writer.write_record(&record)?;
    }
    writer.flush()?;

    let mut writer = csv::WriterBuilder::new()
        .delimiter(b'\t')
        .from_writer(create(dir, filenames::ANNOTATION_FULL)?);
    writer.write_record(["cluster", "activity", "cell_type", "p_value", "markers", "adjusted_p"])?;
    for row in &result.rows {
        writer.write_record([
            row.cluster.to_string(),
            fmt_float(row.activity_score),
            row.cell_type.clone(),
            fmt_float(row.p_value),
            row.markers.clone(),
            fmt_float(row.adjusted_p),
        ])?;
    }
    writer.flush()?;

    let mut writer = csv::WriterBuilder::new()
        .delimiter(b'\t')
        .from_writer(create(dir, filenames::ANNOTATION_BEST)?);
    writer.write_record(["cluster", "cell_type", "activity", "adjusted_p"])?;
    for call in &result.best {
        writer.write_record([
            call.cluster.to_string(),
            call.cell_type.clone(),
            fmt_float(call.activity_score),
            fmt_float(call.adjusted_p),
        ])?;
    }
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::annotate::{AnnotationRow, BestRow};
    use ndarray::arr2;

    #[test]
    fn test_coordinate_table_layout() {
        let dir = tempfile::tempdir().unwrap();
        let coords = arr2(&[[1.0, 2.0], [3.0, 4.0]]);
        write_pca(
            dir.path(),
            &["c1".to_string(), "c2".to_string()],
            &coords.view(),
        )
        .unwrap();

        let text = std::fs::read_to_string(dir.path().join(filenames::PCA)).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "cell,dim1,dim2");
        assert_eq!(lines[1], "c1,1,2");
        assert_eq!(lines.len(), 3);
    }

    #[test]
    fn test_nan_becomes_na() {
        let dir = tempfile::tempdir().unwrap();
        let result = AnnotationResult {
            rows: vec![AnnotationRow {
                cluster: 0,
                activity_score: 1.5,
                cell_type: "T cells".into(),
                p_value: 0.01,
                markers: "CD3D".into(),
                adjusted_p: 0.02,
            }],
            best: vec![BestRow {
                cluster: 1,
                cell_type: "Unknown".into(),
                activity_score: f64::NAN,
                adjusted_p: f64::NAN,
            }],
            summary_genes: vec!["CD3D".into()],
            summary_clusters: vec![0],
            median_expression: arr2(&[[2.0]]),
        };
        write_annotation(dir.path(), &result).unwrap();

        let best = std::fs::read_to_string(dir.path().join(filenames::ANNOTATION_BEST)).unwrap();
        assert!(best.contains("1\tUnknown\tNA\tNA"));
    }
}
