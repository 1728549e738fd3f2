//! Error types for the presentation layer

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ColormapError {
    #[error("Invalid color: {0}")]
    InvalidColor(String),

    #[error("Invalid visualization parameters: {0}")]
    InvalidVis(String),

    #[error("Chart error: {0}")]
    Chart(String),

    #[error(transparent)]
    Core(#[from] lulc_core::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, ColormapError>;
