//! Error types for graph evaluation, catalogs, exports and configuration

use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error(transparent)]
    Core(#[from] lulc_core::Error),

    #[error(transparent)]
    Render(#[from] lulc_colormap::ColormapError),

    #[error("No scenes in '{collection}' match the filter ({filter})")]
    EmptyComposite { collection: String, filter: String },

    #[error("Asset not found: {0}")]
    AssetNotFound(String),

    #[error("Collection not found: {0}")]
    CollectionNotFound(String),

    #[error("Invalid catalog manifest {path}: {reason}")]
    InvalidManifest { path: String, reason: String },

    #[error("Invalid date '{value}': {reason}")]
    InvalidDate { value: String, reason: String },

    #[error("Invalid configuration: {key}: {reason}")]
    ConfigInvalid { key: String, reason: String },

    #[error("Node {id} evaluated to {actual}, expected {expected}")]
    TypeMismatch {
        id: u64,
        expected: &'static str,
        actual: &'static str,
    },

    #[error("Export '{description}' failed: {reason}")]
    Export { description: String, reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, EngineError>;
