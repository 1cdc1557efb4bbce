//! # scluster: single-cell clustering and cell-type annotation
//!
//! Takes a normalized gene-expression matrix (genes × cells) through
//! highly-variable-gene selection, truncated PCA, nearest-neighbor
//! search, shared-nearest-neighbor graph construction, Louvain community
//! detection and marker-based cell-type annotation. Every stage consumes
//! the completed output of the previous one; artifacts are persisted as
//! flat delimited files in a per-run working directory.

#![deny(missing_docs)]
#![deny(warnings)]

/// Marker-based cell-type annotation
pub mod annotate;

/// Shared-nearest-neighbor graph caching
pub mod cache;

/// Community detection over the SNN graph
pub mod cluster;

/// Run configuration
pub mod config;

/// Dimensionality reduction methods
pub mod dim_red;

/// 2D embedding projection for visualization
pub mod embed;

/// Highly-variable-gene selection
pub mod hvg;

/// Expression matrix types
pub mod matrix;

/// Nearest-neighbor search
pub mod nn;

/// Flat-file artifact writers
pub mod output;

/// End-to-end pipeline driver
pub mod pipeline;

/// Shared-nearest-neighbor graph construction
pub mod snn;

/// Statistics primitives
pub mod stats;
