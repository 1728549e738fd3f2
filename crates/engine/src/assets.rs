//! Stores of labelled vector assets (training collections, AOI)

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{EngineError, Result};
use lulc_core::io::read_feature_collection;
use lulc_core::FeatureCollection;

/// Resolves opaque asset paths to feature collections
pub trait AssetStore: Send + Sync {
    fn load(&self, path: &str) -> Result<FeatureCollection>;
}

/// Assets as GeoJSON files: `a/b/c` resolves to `<root>/a/b/c.geojson`
#[derive(Debug, Clone)]
pub struct DirectoryAssetStore {
    root: PathBuf,
}

impl DirectoryAssetStore {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn resolve(&self, path: &str) -> PathBuf {
        let rel = path.trim_start_matches('/');
        let mut file = self.root.join(rel).into_os_string();
        file.push(".geojson");
        PathBuf::from(file)
    }
}

impl AssetStore for DirectoryAssetStore {
    fn load(&self, path: &str) -> Result<FeatureCollection> {
        let file = self.resolve(path);
        if !file.is_file() {
            return Err(EngineError::AssetNotFound(path.to_string()));
        }
        let fc = read_feature_collection(&file)?;
        debug!("Loaded asset {} ({} features)", path, fc.len());
        Ok(fc)
    }
}

#[derive(Debug, Clone, Default)]
pub struct MemoryAssetStore {
    assets: HashMap<String, FeatureCollection>,
}

impl MemoryAssetStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, path: &str, fc: FeatureCollection) {
        self.assets.insert(path.to_string(), fc);
    }
}

impl AssetStore for MemoryAssetStore {
    fn load(&self, path: &str) -> Result<FeatureCollection> {
        self.assets
            .get(path)
            .cloned()
            .ok_or_else(|| EngineError::AssetNotFound(path.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn directory_store_resolves_nested_paths() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("projects/demo")).unwrap();
        std::fs::write(
            dir.path().join("projects/demo/water.geojson"),
            r#"{"type":"FeatureCollection","features":[
                {"type":"Feature","properties":{"class":3},
                 "geometry":{"type":"Point","coordinates":[1.0,2.0]}}]}"#,
        )
        .unwrap();

        let store = DirectoryAssetStore::new(dir.path());
        let fc = store.load("projects/demo/water").unwrap();
        assert_eq!(fc.len(), 1);
        assert!(matches!(store.load("projects/demo/sand"), Err(EngineError::AssetNotFound(_))));
    }

    #[test]
    fn memory_store_missing_asset() {
        let mut store = MemoryAssetStore::new();
        store.insert("aoi", FeatureCollection::new());
        assert!(store.load("aoi").is_ok());
        assert!(matches!(store.load("nope"), Err(EngineError::AssetNotFound(p)) if p == "nope"));
    }
}
