//! Error types for LULC

use thiserror::Error;

/// Main error type for core raster, vector and I/O operations
#[derive(Error, Debug)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Invalid raster dimensions: {width}x{height}")]
    InvalidDimensions { width: usize, height: usize },

    #[error("Index out of bounds: ({row}, {col}) in raster of size ({rows}, {cols})")]
    IndexOutOfBounds {
        row: usize,
        col: usize,
        rows: usize,
        cols: usize,
    },

    #[error("Raster size mismatch: expected ({er}, {ec}), got ({ar}, {ac})")]
    SizeMismatch { er: usize, ec: usize, ar: usize, ac: usize },

    #[error("Band not found: {name} (available: {available})")]
    MissingBand { name: String, available: String },

    #[error("Duplicate band name: {0}")]
    DuplicateBand(String),

    #[error("Feature {feature} has no usable property '{property}'")]
    MissingProperty { feature: String, property: String },

    #[error("Invalid class scheme: {0}")]
    InvalidClassScheme(String),

    #[error("Region covers {count} pixels, exceeding max_pixels = {max}")]
    TooManyPixels { count: u64, max: u64 },

    #[error("Unsupported data type: {0}")]
    UnsupportedDataType(String),

    #[error("Invalid parameter: {name} = {value} ({reason})")]
    InvalidParameter {
        name: &'static str,
        value: String,
        reason: String,
    },

    #[error("GeoJSON error: {0}")]
    GeoJson(String),

    #[error("TIFF error: {0}")]
    Tiff(String),

    #[error("Algorithm error: {0}")]
    Algorithm(String),

    #[error("{0}")]
    Other(String),
}

impl From<tiff::TiffError> for Error {
    fn from(e: tiff::TiffError) -> Self {
        Error::Tiff(e.to_string())
    }
}

/// Result type alias for core operations
pub type Result<T> = std::result::Result<T, Error>;
