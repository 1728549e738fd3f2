//! Workflow configuration.
//!
//! Every field has a default reproducing the reference Kisumu workflow, so a
//! TOML file only needs the values that differ. Environment variables
//! (`LULC_CATALOG`, `LULC_ASSETS`, `LULC_OUTPUT`) override the file, and CLI
//! flags override both.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::catalog::SceneFilter;
use crate::error::{EngineError, Result};
use lulc_algorithms::classification::RandomForestParams;
use lulc_algorithms::statistics::AreaParams;
use lulc_colormap::{Rgb, VisParams};
use lulc_core::ClassScheme;

/// One compositing period, `[start, end)`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeriodConfig {
    pub label: String,
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl PeriodConfig {
    fn new(label: &str, start: (i32, u32, u32), end: (i32, u32, u32)) -> Self {
        let date = |(y, m, d): (i32, u32, u32)| NaiveDate::from_ymd_opt(y, m, d).unwrap_or_default();
        Self {
            label: label.to_string(),
            start: date(start),
            end: date(end),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    /// Cap on training features, applied after merging
    pub limit: Option<usize>,
    /// Sampling scale in meters
    pub scale: f64,
    /// Sampling scale for the validation table
    pub validation_scale: f64,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            limit: Some(500),
            scale: 50.0,
            validation_scale: 10.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    pub root: PathBuf,
    pub folder: String,
    pub image_description: String,
    pub image_prefix: String,
    pub table_description: String,
    pub table_prefix: String,
    pub scale: f64,
    pub max_pixels: u64,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("exports"),
            folder: "earthengine".into(),
            image_description: "classified_image2024".into(),
            image_prefix: "classified2024".into(),
            table_description: "TrainingDataExport".into(),
            table_prefix: "training_data".into(),
            scale: 10.0,
            max_pixels: 1_000_000_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    /// Directory for rendered layers, legends and charts; nothing is written
    /// when unset
    pub output: Option<PathBuf>,
    pub zoom: u8,
    pub true_color: VisParams,
    pub ndvi: VisParams,
    pub change_palette: Vec<String>,
    /// Color of the AOI outline layer
    pub aoi_color: String,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            output: Some(PathBuf::from("render")),
            zoom: 10,
            true_color: VisParams::rgb(["B4", "B3", "B2"], 0.0, 3000.0, Some(1.4)),
            ndvi: VisParams::palette("NDVI", -1.0, 1.0, &["blue", "yellow", "green"]),
            change_palette: vec!["white".into(), "black".into()],
            aoi_color: "red".into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkflowConfig {
    pub catalog_root: PathBuf,
    pub asset_root: PathBuf,
    pub aoi_asset: String,
    /// Labelled collections merged into the training set
    pub training_assets: Vec<String>,
    /// Separate validation collections; the training set is reused when unset
    pub validation_assets: Option<Vec<String>>,
    pub collection: String,
    pub cloud_property: String,
    pub max_cloud: f64,
    pub before: PeriodConfig,
    pub after: PeriodConfig,
    /// Classifier inputs
    pub bands: Vec<String>,
    pub nir_band: String,
    pub red_band: String,
    pub class_property: String,
    pub classifier: RandomForestParams,
    pub training: TrainingConfig,
    pub area: AreaParams,
    pub classes: ClassScheme,
    pub export: ExportConfig,
    pub render: RenderConfig,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        let assets = "projects/ee-john-odero/assets";
        Self {
            catalog_root: PathBuf::from("data/catalog"),
            asset_root: PathBuf::from("data/assets"),
            aoi_asset: format!("{assets}/Kissumu"),
            training_assets: ["built_up", "vegetation", "bareland", "water_body"]
                .iter()
                .map(|a| format!("{assets}/{a}"))
                .collect(),
            validation_assets: None,
            collection: "COPERNICUS/S2_SR_HARMONIZED".into(),
            cloud_property: "CLOUDY_PIXEL_PERCENTAGE".into(),
            max_cloud: 20.0,
            before: PeriodConfig::new("2020", (2020, 1, 1), (2020, 12, 30)),
            after: PeriodConfig::new("2024", (2024, 1, 1), (2024, 10, 20)),
            bands: ["B2", "B3", "B4", "B8"].iter().map(|b| b.to_string()).collect(),
            nir_band: "B8".into(),
            red_band: "B4".into(),
            class_property: "class".into(),
            classifier: RandomForestParams::default(),
            training: TrainingConfig::default(),
            area: AreaParams {
                scale: Some(10.0),
                max_pixels: 1_000_000_000,
            },
            classes: ClassScheme::default_land_cover(),
            export: ExportConfig::default(),
            render: RenderConfig::default(),
        }
    }
}

impl WorkflowConfig {
    /// Load from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref()).map_err(|e| EngineError::ConfigInvalid {
            key: "file".into(),
            reason: format!("failed to read {}: {e}", path.as_ref().display()),
        })?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| EngineError::ConfigInvalid {
            key: "file".into(),
            reason: format!("failed to parse TOML: {e}"),
        })
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| EngineError::ConfigInvalid {
            key: "file".into(),
            reason: e.to_string(),
        })
    }

    /// Apply `LULC_CATALOG`, `LULC_ASSETS` and `LULC_OUTPUT`
    pub fn apply_env(mut self) -> Self {
        if let Ok(v) = env::var("LULC_CATALOG") {
            self.catalog_root = PathBuf::from(v);
        }
        if let Ok(v) = env::var("LULC_ASSETS") {
            self.asset_root = PathBuf::from(v);
        }
        if let Ok(v) = env::var("LULC_OUTPUT") {
            let root = PathBuf::from(v);
            self.render.output = Some(root.join("render"));
            self.export.root = root.join("exports");
        }
        self
    }

    /// Reject parameter combinations that cannot run
    pub fn validate(&self) -> Result<()> {
        let invalid = |key: &str, reason: String| {
            Err(EngineError::ConfigInvalid {
                key: key.to_string(),
                reason,
            })
        };

        for (key, p) in [("before", &self.before), ("after", &self.after)] {
            if p.start >= p.end {
                return invalid(key, format!("start {} is not before end {}", p.start, p.end));
            }
        }
        if self.before.label == self.after.label {
            return invalid("after.label", format!("duplicates before.label '{}'", self.before.label));
        }
        if self.bands.is_empty() {
            return invalid("bands", "at least one classifier input is required".into());
        }
        if self.training_assets.is_empty() {
            return invalid("training_assets", "at least one labelled collection is required".into());
        }
        if let Some(v) = &self.validation_assets {
            if v.is_empty() {
                return invalid("validation_assets", "empty list; omit it to reuse the training set".into());
            }
        }
        if self.classifier.n_trees == 0 {
            return invalid("classifier.n_trees", "must be at least 1".into());
        }
        if self.training.limit == Some(0) {
            return invalid("training.limit", "must be at least 1".into());
        }
        for (key, v) in [
            ("training.scale", self.training.scale),
            ("training.validation_scale", self.training.validation_scale),
            ("export.scale", self.export.scale),
            ("area.scale", self.area.scale.unwrap_or(1.0)),
        ] {
            if !(v > 0.0) {
                return invalid(key, format!("must be positive, got {v}"));
            }
        }
        if self.area.max_pixels == 0 || self.export.max_pixels == 0 {
            return invalid("max_pixels", "must be positive".into());
        }
        if self.classes.is_empty() {
            return invalid("classes", "class scheme is empty".into());
        }
        if self.render.change_palette.len() != 2 {
            return invalid(
                "render.change_palette",
                format!("expected 2 colors, got {}", self.render.change_palette.len()),
            );
        }
        Rgb::parse(&self.render.aoi_color)?;
        self.render.true_color.validate()?;
        self.render.ndvi.validate()?;
        Ok(())
    }

    /// Bands each composite must carry: classifier inputs, NDVI bands and
    /// true-color bands, without duplicates
    pub fn composite_bands(&self) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        let wanted = self
            .bands
            .iter()
            .chain([&self.nir_band, &self.red_band])
            .chain(self.render.true_color.bands.iter());
        for b in wanted {
            if !out.contains(b) {
                out.push(b.clone());
            }
        }
        out
    }

    pub fn filter(&self, period: &PeriodConfig) -> SceneFilter {
        SceneFilter::new(period.start, period.end, &self.cloud_property, self.max_cloud)
    }

    /// Validation collections; the training ones when none are configured
    pub fn validation_assets(&self) -> &[String] {
        self.validation_assets.as_deref().unwrap_or(&self.training_assets)
    }

    /// Whether validation samples the training geometries again
    pub fn validation_reuses_training(&self) -> bool {
        self.validation_assets() == self.training_assets.as_slice()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_toml_gives_defaults() {
        let cfg = WorkflowConfig::from_toml("").unwrap();
        assert_eq!(cfg, WorkflowConfig::default());
        assert_eq!(cfg.classifier.n_trees, 10);
        assert_eq!(cfg.training.limit, Some(500));
        assert_eq!(cfg.before.end.to_string(), "2020-12-30");
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn partial_toml_overrides() {
        let cfg = WorkflowConfig::from_toml(
            r#"
            catalog_root = "/srv/catalog"
            max_cloud = 10.0

            [after]
            label = "2023"
            start = "2023-01-01"
            end = "2023-06-01"

            [classifier]
            n_trees = 25
            seed = 7
            "#,
        )
        .unwrap();
        assert_eq!(cfg.catalog_root, PathBuf::from("/srv/catalog"));
        assert_eq!(cfg.after.label, "2023");
        assert_eq!(cfg.classifier.n_trees, 25);
        assert_eq!(cfg.classifier.min_samples_leaf, 1);
        assert_eq!(cfg.bands.len(), 4);
    }

    #[test]
    fn roundtrips_through_toml() {
        let cfg = WorkflowConfig::default();
        let text = cfg.to_toml().unwrap();
        assert_eq!(WorkflowConfig::from_toml(&text).unwrap(), cfg);
    }

    #[test]
    fn validation_rejects_bad_values() {
        let mut cfg = WorkflowConfig::default();
        cfg.before.end = cfg.before.start;
        assert!(cfg.validate().is_err());

        let mut cfg = WorkflowConfig::default();
        cfg.classifier.n_trees = 0;
        assert!(cfg.validate().is_err());

        let mut cfg = WorkflowConfig::default();
        cfg.training.scale = -5.0;
        assert!(cfg.validate().is_err());

        let mut cfg = WorkflowConfig::default();
        cfg.bands.clear();
        assert!(cfg.validate().is_err());

        let mut cfg = WorkflowConfig::default();
        cfg.render.aoi_color = "not-a-color".into();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn duplicate_classes_rejected_at_parse() {
        let err = WorkflowConfig::from_toml(
            r#"
            [[classes]]
            value = 0
            label = "A"
            color = "red"

            [[classes]]
            value = 0
            label = "B"
            color = "blue"
            "#,
        );
        assert!(err.is_err());
    }

    #[test]
    fn composite_bands_are_deduplicated() {
        let cfg = WorkflowConfig::default();
        assert_eq!(cfg.composite_bands(), vec!["B2", "B3", "B4", "B8"]);
    }
}
