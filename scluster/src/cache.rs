//! Persistent cache for the SNN graph.
//!
//! A cache entry is keyed by the KNN table contents, the neighborhood
//! size and the prune threshold, so a stale file from a different run
//! configuration can never be reused. Recomputation can also be forced
//! outright.

use crate::snn::SnnGraph;
use anyhow::{Context, Result};
use fxhash::FxHasher64;
use log::info;
use ndarray::ArrayView2;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};

/// File-backed SNN graph cache rooted at a working directory.
pub struct SnnCache {
    dir: PathBuf,
}

#[derive(serde::Serialize, serde::Deserialize)]
struct EdgeRecord {
    source: u32,
    target: u32,
    strength: f64,
}

fn cache_key(knn: &ArrayView2<u32>, prune: f64) -> u64 {
    let mut hasher = FxHasher64::default();
    knn.dim().hash(&mut hasher);
    for &v in knn.iter() {
        v.hash(&mut hasher);
    }
    prune.to_bits().hash(&mut hasher);
    hasher.finish()
}

impl SnnCache {
    /// Cache rooted at `dir`, which must already exist.
    pub fn new(dir: &Path) -> SnnCache {
        SnnCache {
            dir: dir.to_path_buf(),
        }
    }

    fn entry_path(&self, key: u64) -> PathBuf {
        self.dir.join(format!("snn-{key:016x}.csv"))
    }

    /// Return the cached graph for this KNN table and prune threshold,
    /// building and persisting it on a miss. `force` rebuilds even when
    /// a matching entry exists.
    pub fn load_or_build(&self, knn: &ArrayView2<u32>, prune: f64, force: bool) -> Result<SnnGraph> {
        let key = cache_key(knn, prune);
        let path = self.entry_path(key);

        if !force && path.exists() {
            info!("snn cache: reusing {}", path.display());
            return self.load(&path, knn.dim());
        }

        let graph = SnnGraph::build(knn, prune)?;
        self.store(&path, &graph)?;
        Ok(graph)
    }

    fn load(&self, path: &Path, (n_cells, k): (usize, usize)) -> Result<SnnGraph> {
        let mut reader = csv::Reader::from_path(path)
            .with_context(|| format!("snn cache: opening {}", path.display()))?;
        let mut edges = Vec::new();
        for record in reader.deserialize() {
            let rec: EdgeRecord =
                record.with_context(|| format!("snn cache: parsing {}", path.display()))?;
            edges.push((rec.source, rec.target, rec.strength));
        }
        Ok(SnnGraph { n_cells, k, edges })
    }

    fn store(&self, path: &Path, graph: &SnnGraph) -> Result<()> {
        let mut writer = csv::Writer::from_path(path)
            .with_context(|| format!("snn cache: writing {}", path.display()))?;
        for &(source, target, strength) in &graph.edges {
            writer.serialize(EdgeRecord {
                source,
                target,
                strength,
            })?;
        }
        writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use ndarray::arr2;

    fn sample_knn() -> ndarray::Array2<u32> {
        arr2(&[[1u32, 2], [0, 2], [0, 1], [4, 2], [3, 2]])
    }

    #[test]
    fn test_roundtrip_and_reuse() {
        let dir = tempfile::tempdir().unwrap();
        let cache = SnnCache::new(dir.path());
        let knn = sample_knn();

        let built = cache.load_or_build(&knn.view(), 0.0, false).unwrap();
        let reused = cache.load_or_build(&knn.view(), 0.0, false).unwrap();
        assert_eq!(built.edges, reused.edges);
        assert_eq!(reused.n_cells, 5);
        assert_eq!(reused.k, 2);
    }

    #[test]
    fn test_distinct_parameters_distinct_entries() {
        let dir = tempfile::tempdir().unwrap();
        let cache = SnnCache::new(dir.path());
        let knn = sample_knn();

        cache.load_or_build(&knn.view(), 0.0, false).unwrap();
        cache.load_or_build(&knn.view(), 0.5, false).unwrap();

        let entries = std::fs::read_dir(dir.path()).unwrap().count();
        assert_eq!(entries, 2);
    }

    #[test]
    fn test_force_rebuilds() {
        let dir = tempfile::tempdir().unwrap();
        let cache = SnnCache::new(dir.path());
        let knn = sample_knn();

        let built = cache.load_or_build(&knn.view(), 0.0, false).unwrap();
        let key_path = std::fs::read_dir(dir.path())
            .unwrap()
            .next()
            .unwrap()
            .unwrap()
            .path();

        // corrupt the entry, then force: result must come from a rebuild
        std::fs::write(&key_path, "source,target,strength\n").unwrap();
        let forced = cache.load_or_build(&knn.view(), 0.0, true).unwrap();
        assert_eq!(forced.edges, built.edges);
    }
}
