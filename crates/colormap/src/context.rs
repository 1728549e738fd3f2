//! Explicit render context collecting layers, legends and charts.
//!
//! Nothing here is global: the workflow builds a context, fills it and
//! decides whether to write it out.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::chart::ColumnChart;
use crate::error::Result;
use crate::legend::Legend;
use crate::vis::{render_image, render_raster, VisParams};
use lulc_core::io::write_rgba_geotiff;
use lulc_core::raster::{GeoTransform, Raster, RasterElement};
use lulc_core::{Image, CRS};

/// Map center and zoom level
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MapCenter {
    pub x: f64,
    pub y: f64,
    pub zoom: u8,
}

/// A rendered map layer
#[derive(Debug, Clone)]
pub struct MapLayer {
    pub name: String,
    pub vis: VisParams,
    pub shown: bool,
    pub rows: usize,
    pub cols: usize,
    pub transform: GeoTransform,
    pub crs: Option<CRS>,
    /// Row-major RGBA, `rows * cols * 4` bytes
    pub rgba: Vec<u8>,
}

#[derive(Debug, Clone, Default)]
pub struct RenderContext {
    center: Option<MapCenter>,
    layers: Vec<MapLayer>,
    legends: Vec<Legend>,
    charts: Vec<ColumnChart>,
}

impl RenderContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_center(&mut self, x: f64, y: f64, zoom: u8) {
        self.center = Some(MapCenter { x, y, zoom });
    }

    pub fn center(&self) -> Option<MapCenter> {
        self.center
    }

    /// Render an image layer
    pub fn add_layer(&mut self, name: &str, image: &Image, vis: &VisParams) -> Result<()> {
        let rgba = render_image(image, vis)?;
        let (rows, cols) = image.shape();
        self.layers.push(MapLayer {
            name: name.to_string(),
            vis: vis.clone(),
            shown: true,
            rows,
            cols,
            transform: *image.transform(),
            crs: image.crs().cloned(),
            rgba,
        });
        debug!("Rendered layer '{}'", name);
        Ok(())
    }

    /// Render a single raster (class map, change mask) as a layer
    pub fn add_raster_layer<T: RasterElement>(
        &mut self,
        name: &str,
        raster: &Raster<T>,
        vis: &VisParams,
    ) -> Result<()> {
        let rgba = render_raster(raster, vis)?;
        self.layers.push(MapLayer {
            name: name.to_string(),
            vis: vis.clone(),
            shown: true,
            rows: raster.rows(),
            cols: raster.cols(),
            transform: *raster.transform(),
            crs: raster.crs().cloned(),
            rgba,
        });
        debug!("Rendered layer '{}'", name);
        Ok(())
    }

    pub fn add_legend(&mut self, legend: Legend) {
        self.legends.push(legend);
    }

    pub fn add_chart(&mut self, chart: ColumnChart) {
        self.charts.push(chart);
    }

    pub fn layers(&self) -> &[MapLayer] {
        &self.layers
    }

    pub fn layer(&self, name: &str) -> Option<&MapLayer> {
        self.layers.iter().find(|l| l.name == name)
    }

    pub fn legends(&self) -> &[Legend] {
        &self.legends
    }

    pub fn charts(&self) -> &[ColumnChart] {
        &self.charts
    }

    /// Write one RGBA GeoTIFF per layer plus `legends.json`, `charts.json`
    /// and `map.json` (center and layer list). Returns the written paths.
    pub fn write_to_dir<P: AsRef<Path>>(&self, dir: P) -> Result<Vec<PathBuf>> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)?;
        let mut written = Vec::new();

        for layer in &self.layers {
            let path = dir.join(format!("{}.tif", file_stem(&layer.name)));
            write_rgba_geotiff(
                &layer.rgba,
                layer.rows,
                layer.cols,
                &layer.transform,
                layer.crs.as_ref(),
                &path,
            )?;
            written.push(path);
        }

        let legends = dir.join("legends.json");
        fs::write(&legends, serde_json::to_string_pretty(&self.legends)?)?;
        written.push(legends);

        let charts = dir.join("charts.json");
        fs::write(&charts, serde_json::to_string_pretty(&self.charts)?)?;
        written.push(charts);

        let map = serde_json::json!({
            "center": self.center,
            "layers": self
                .layers
                .iter()
                .map(|l| serde_json::json!({
                    "name": l.name,
                    "file": format!("{}.tif", file_stem(&l.name)),
                    "shown": l.shown,
                    "vis": l.vis,
                }))
                .collect::<Vec<_>>(),
        });
        let map_path = dir.join("map.json");
        fs::write(&map_path, serde_json::to_string_pretty(&map)?)?;
        written.push(map_path);

        debug!("Wrote {} render files to {}", written.len(), dir.display());
        Ok(written)
    }
}

/// Layer name as a file stem: alphanumerics kept, everything else `_`
fn file_stem(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '_' })
        .collect()
}
