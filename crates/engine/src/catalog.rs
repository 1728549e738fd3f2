//! Imagery catalogs
//!
//! A catalog lists the scenes of a collection and loads their bands. Scene
//! selection (bounds, date range, cloud property) happens here; pixel work
//! happens in the algorithms crate.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{EngineError, Result};
use lulc_core::io::read_geotiff;
use lulc_core::{Aoi, Band, Image, Raster, CRS};

/// Parse an ISO `YYYY-MM-DD` date
pub fn parse_date(value: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d").map_err(|e| EngineError::InvalidDate {
        value: value.to_string(),
        reason: e.to_string(),
    })
}

/// Catalog entry for one acquisition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scene {
    pub id: String,
    pub date: NaiveDate,
    /// Numeric scene metadata such as `CLOUDY_PIXEL_PERCENTAGE`
    #[serde(default)]
    pub properties: BTreeMap<String, f64>,
    /// Footprint `(min_x, min_y, max_x, max_y)`; unknown footprints always
    /// pass the bounds filter
    #[serde(default)]
    pub bounds: Option<(f64, f64, f64, f64)>,
}

/// Scene selection: date range `[start, end)`, a strict upper bound on a
/// numeric property, and intersection with a region
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneFilter {
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub cloud_property: String,
    pub max_cloud: f64,
}

impl SceneFilter {
    pub fn new(start: NaiveDate, end: NaiveDate, cloud_property: &str, max_cloud: f64) -> Self {
        Self {
            start,
            end,
            cloud_property: cloud_property.to_string(),
            max_cloud,
        }
    }

    /// Whether a scene passes. Scenes without the cloud property fail.
    pub fn matches(&self, scene: &Scene, region: Option<&Aoi>) -> bool {
        if scene.date < self.start || scene.date >= self.end {
            return false;
        }
        match scene.properties.get(&self.cloud_property) {
            Some(&v) if v < self.max_cloud => {}
            _ => return false,
        }
        match (region, scene.bounds) {
            (Some(aoi), Some(b)) => aoi.intersects_bounds(b),
            _ => true,
        }
    }
}

impl std::fmt::Display for SceneFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} <= date < {}, {} < {}",
            self.start, self.end, self.cloud_property, self.max_cloud
        )
    }
}

/// Source of scenes for compositing
pub trait Catalog: Send + Sync {
    /// All scenes of a collection
    fn scenes(&self, collection: &str) -> Result<Vec<Scene>>;

    /// Load the named bands of a scene (all bands when `bands` is empty).
    /// Nodata must come back as NaN.
    fn load(&self, collection: &str, scene: &Scene, bands: &[String]) -> Result<Image>;

    /// Scenes passing `filter`, ordered by date then id
    fn query(&self, collection: &str, filter: &SceneFilter, region: Option<&Aoi>) -> Result<Vec<Scene>> {
        let mut scenes: Vec<Scene> = self
            .scenes(collection)?
            .into_iter()
            .filter(|s| filter.matches(s, region))
            .collect();
        scenes.sort_by(|a, b| a.date.cmp(&b.date).then_with(|| a.id.cmp(&b.id)));
        debug!("{}: {} scenes match {}", collection, scenes.len(), filter);
        Ok(scenes)
    }
}

/// In-memory catalog, mostly for tests and synthetic runs
#[derive(Debug, Clone, Default)]
pub struct MemoryCatalog {
    collections: HashMap<String, Vec<(Scene, Image)>>,
}

impl MemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a scene; its footprint is taken from the image grid
    pub fn insert(&mut self, collection: &str, id: &str, date: NaiveDate, properties: &[(&str, f64)], image: Image) {
        let scene = Scene {
            id: id.to_string(),
            date,
            properties: properties.iter().map(|(k, v)| (k.to_string(), *v)).collect(),
            bounds: Some(image.grid().bounds()),
        };
        self.collections
            .entry(collection.to_string())
            .or_default()
            .push((scene, image));
    }
}

impl Catalog for MemoryCatalog {
    fn scenes(&self, collection: &str) -> Result<Vec<Scene>> {
        self.collections
            .get(collection)
            .map(|v| v.iter().map(|(s, _)| s.clone()).collect())
            .ok_or_else(|| EngineError::CollectionNotFound(collection.to_string()))
    }

    fn load(&self, collection: &str, scene: &Scene, bands: &[String]) -> Result<Image> {
        let (_, image) = self
            .collections
            .get(collection)
            .and_then(|v| v.iter().find(|(s, _)| s.id == scene.id))
            .ok_or_else(|| EngineError::AssetNotFound(format!("{collection}/{}", scene.id)))?;
        if bands.is_empty() {
            Ok(image.clone())
        } else {
            Ok(image.select(bands)?)
        }
    }
}

#[derive(Debug, Deserialize)]
struct Manifest {
    scenes: Vec<ManifestScene>,
}

#[derive(Debug, Deserialize)]
struct ManifestScene {
    id: String,
    date: String,
    #[serde(default)]
    properties: BTreeMap<String, f64>,
    bands: BTreeMap<String, String>,
    #[serde(default)]
    epsg: Option<u32>,
    #[serde(default)]
    bounds: Option<[f64; 4]>,
}

/// Catalog on disk.
///
/// Collection `A/B` lives in `<root>/A_B/catalog.json`:
///
/// ```json
/// { "scenes": [ { "id": "s1", "date": "2020-03-01",
///                 "properties": { "CLOUDY_PIXEL_PERCENTAGE": 4.2 },
///                 "bands": { "B4": "s1/B4.tif", "B8": "s1/B8.tif" },
///                 "epsg": 32736, "bounds": [min_x, min_y, max_x, max_y] } ] }
/// ```
///
/// Band paths are relative to the manifest.
#[derive(Debug, Clone)]
pub struct DirectoryCatalog {
    root: PathBuf,
}

impl DirectoryCatalog {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    fn collection_dir(&self, collection: &str) -> PathBuf {
        self.root.join(collection.replace('/', "_"))
    }

    fn manifest(&self, collection: &str) -> Result<(PathBuf, Manifest)> {
        let dir = self.collection_dir(collection);
        let path = dir.join("catalog.json");
        if !path.exists() {
            return Err(EngineError::CollectionNotFound(collection.to_string()));
        }
        let content = fs::read_to_string(&path)?;
        let manifest = serde_json::from_str(&content).map_err(|e| EngineError::InvalidManifest {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Ok((dir, manifest))
    }
}

impl Catalog for DirectoryCatalog {
    fn scenes(&self, collection: &str) -> Result<Vec<Scene>> {
        let (_, manifest) = self.manifest(collection)?;
        manifest
            .scenes
            .into_iter()
            .map(|s| {
                Ok(Scene {
                    date: parse_date(&s.date)?,
                    id: s.id,
                    properties: s.properties,
                    bounds: s.bounds.map(|b| (b[0], b[1], b[2], b[3])),
                })
            })
            .collect()
    }

    fn load(&self, collection: &str, scene: &Scene, bands: &[String]) -> Result<Image> {
        let (dir, manifest) = self.manifest(collection)?;
        let entry = manifest
            .scenes
            .into_iter()
            .find(|s| s.id == scene.id)
            .ok_or_else(|| EngineError::AssetNotFound(format!("{collection}/{}", scene.id)))?;

        let names: Vec<String> = if bands.is_empty() {
            entry.bands.keys().cloned().collect()
        } else {
            bands.to_vec()
        };

        let mut loaded = Vec::with_capacity(names.len());
        for name in names {
            let rel = entry.bands.get(&name).ok_or_else(|| lulc_core::Error::MissingBand {
                name: name.clone(),
                available: entry.bands.keys().cloned().collect::<Vec<_>>().join(", "),
            })?;
            let mut raster: Raster<f64> = read_geotiff(dir.join(rel))?;
            if let Some(epsg) = entry.epsg {
                raster.set_crs(Some(CRS::from_epsg(epsg)));
            }
            loaded.push(Band::new(name, nodata_to_nan(raster)));
        }
        debug!("Loaded scene {} ({} bands)", scene.id, loaded.len());
        Ok(Image::new(loaded)?)
    }
}

fn nodata_to_nan(raster: Raster<f64>) -> Raster<f64> {
    let nodata = raster.nodata();
    let mut out = raster.map(|v| if v.is_nan() || Some(v) == nodata { f64::NAN } else { v });
    out.set_nodata(Some(f64::NAN));
    out
}
