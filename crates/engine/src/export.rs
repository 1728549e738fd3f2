//! Export tasks: classified rasters to GeoTIFF, tables to CSV.
//!
//! Tasks are queued while the graph is built and run afterwards. Each task
//! evaluates its own source; a failure is recorded on the task and the
//! remaining tasks still run.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{EngineError, Result};
use crate::expr::{Engine, LazyAoi, LazyClassRaster, LazyTable};
use lulc_core::io::{write_geotiff, write_table_csv, GeoTiffOptions};
use lulc_core::{Error, Raster, RasterElement};

/// Where and how to write a raster
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageExport {
    pub description: String,
    pub folder: String,
    pub file_prefix: String,
    /// Ground resolution in meters; coarser than native means resampling
    pub scale: Option<f64>,
    pub max_pixels: u64,
}

/// Where to write a table as CSV
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableExport {
    pub description: String,
    pub folder: String,
    pub file_prefix: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExportStatus {
    Pending,
    Completed(Vec<PathBuf>),
    Failed(String),
}

#[derive(Debug, Clone)]
enum ExportSource {
    Classes {
        raster: LazyClassRaster,
        region: Option<LazyAoi>,
        params: ImageExport,
    },
    Table {
        table: LazyTable,
        params: TableExport,
    },
}

#[derive(Debug, Clone)]
pub struct ExportTask {
    source: ExportSource,
    status: ExportStatus,
}

impl ExportTask {
    pub fn description(&self) -> &str {
        match &self.source {
            ExportSource::Classes { params, .. } => &params.description,
            ExportSource::Table { params, .. } => &params.description,
        }
    }

    pub fn status(&self) -> &ExportStatus {
        &self.status
    }
}

/// Queue of export tasks writing under one root directory
#[derive(Debug, Clone)]
pub struct ExportQueue {
    root: PathBuf,
    tasks: Vec<ExportTask>,
}

impl ExportQueue {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            tasks: Vec::new(),
        }
    }

    pub fn export_classes(&mut self, raster: &LazyClassRaster, region: Option<&LazyAoi>, params: ImageExport) {
        self.push(ExportSource::Classes {
            raster: raster.clone(),
            region: region.cloned(),
            params,
        });
    }

    pub fn export_table(&mut self, table: &LazyTable, params: TableExport) {
        self.push(ExportSource::Table {
            table: table.clone(),
            params,
        });
    }

    fn push(&mut self, source: ExportSource) {
        self.tasks.push(ExportTask {
            source,
            status: ExportStatus::Pending,
        });
    }

    pub fn tasks(&self) -> &[ExportTask] {
        &self.tasks
    }

    /// Run every pending task
    pub fn run(&mut self, engine: &dyn Engine) -> &[ExportTask] {
        let root = self.root.clone();
        for task in self.tasks.iter_mut().filter(|t| t.status == ExportStatus::Pending) {
            task.status = match run_task(&root, &task.source, engine) {
                Ok(paths) => {
                    info!("Export '{}' completed", task.description());
                    ExportStatus::Completed(paths)
                }
                Err(e) => {
                    warn!("Export '{}' failed: {}", task.description(), e);
                    ExportStatus::Failed(e.to_string())
                }
            };
        }
        &self.tasks
    }
}

fn run_task(root: &Path, source: &ExportSource, engine: &dyn Engine) -> Result<Vec<PathBuf>> {
    match source {
        ExportSource::Classes { raster, region, params } => {
            let raster = raster.evaluate(engine)?;
            let region = region.as_ref().map(|r| r.evaluate(engine)).transpose()?;
            let out = prepare_raster(&raster, region.as_deref(), params)?;
            let path = target(root, &params.folder, &params.file_prefix, "tif")?;
            write_geotiff(&out, &path, Some(GeoTiffOptions { nodata: Some(f64::from(i32::MIN)) }))?;
            Ok(vec![path])
        }
        ExportSource::Table { table, params } => {
            let table = table.evaluate(engine)?;
            let path = target(root, &params.folder, &params.file_prefix, "csv")?;
            write_table_csv(&table, &path)?;
            Ok(vec![path])
        }
    }
}

/// Resample to the export scale, blank cells outside the region and enforce
/// the pixel cap
fn prepare_raster<T: RasterElement>(
    raster: &Raster<T>,
    region: Option<&lulc_core::Aoi>,
    params: &ImageExport,
) -> Result<Raster<T>> {
    let stride = params.scale.map_or(1, |s| raster.stride_for_scale(s));
    let mut out = raster.coarsen(stride);
    let nodata = out.nodata().unwrap_or(T::default_nodata());
    out.set_nodata(Some(nodata));

    if let Some(aoi) = region {
        let mask = aoi.mask(&out);
        out = out.zip_map(&mask, |v, m| if m == 1 { v } else { nodata })?;
        out.set_nodata(Some(nodata));
    }

    let count = out.len() as u64;
    if count > params.max_pixels {
        return Err(Error::TooManyPixels {
            count,
            max: params.max_pixels,
        }
        .into());
    }
    Ok(out)
}

fn target(root: &Path, folder: &str, stem: &str, ext: &str) -> Result<PathBuf> {
    if stem.is_empty() || stem.contains(['/', '\\']) {
        return Err(EngineError::Export {
            description: stem.to_string(),
            reason: "file prefix must be a plain file name".into(),
        });
    }
    let dir = root.join(folder);
    fs::create_dir_all(&dir)?;
    Ok(dir.join(format!("{stem}.{ext}")))
}
