//! # LULC Engine
//!
//! Lazy computation graph for the land-cover workflow and the local engine
//! that evaluates it.
//!
//! - [`expr`]: typed lazy handles (`LazyImage`, `LazyTable`, ...) over shared
//!   graph nodes
//! - [`local`]: [`LocalEngine`], evaluating nodes against a [`Catalog`] and an
//!   [`AssetStore`] with per-node caching
//! - [`catalog`] / [`assets`]: scene catalogs and labelled feature assets,
//!   on disk or in memory
//! - [`export`]: raster and table export tasks
//! - [`config`] / [`workflow`]: the configured two-period workflow
//!
//! ## Usage
//!
//! ```ignore
//! use lulc_engine::{DirectoryAssetStore, DirectoryCatalog, LocalEngine, Workflow, WorkflowConfig};
//!
//! let config = WorkflowConfig::from_file("lulc.toml")?.apply_env();
//! let engine = LocalEngine::new(
//!     DirectoryCatalog::new(&config.catalog_root),
//!     DirectoryAssetStore::new(&config.asset_root),
//! );
//! let workflow = Workflow::new(config)?;
//! let report = workflow.evaluate(&engine)?;
//! println!("{report}");
//! ```

pub mod assets;
pub mod catalog;
pub mod config;
pub mod error;
pub mod export;
pub mod expr;
pub mod local;
pub mod workflow;

pub use assets::{AssetStore, DirectoryAssetStore, MemoryAssetStore};
pub use catalog::{parse_date, Catalog, DirectoryCatalog, MemoryCatalog, Scene, SceneFilter};
pub use config::{ExportConfig, PeriodConfig, RenderConfig, TrainingConfig, WorkflowConfig};
pub use error::{EngineError, Result};
pub use export::{ExportQueue, ExportStatus, ExportTask, ImageExport, TableExport};
pub use expr::{
    Engine, LazyAoi, LazyAreas, LazyChangeMask, LazyClassRaster, LazyClassifier, LazyFeatures, LazyImage,
    LazyMatrix, LazyTable, LazyTransitions, Node, Value,
};
pub use local::LocalEngine;
pub use workflow::{LabelDomainWarning, PeriodGraph, Workflow, WorkflowGraph, WorkflowReport};
