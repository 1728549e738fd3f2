//! # LULC Core
//!
//! Core types and I/O shared by the land-cover workspace.
//!
//! This crate provides:
//! - `Raster<T>`: Generic georeferenced grid
//! - `Image`: Ordered set of named bands sharing one grid
//! - `GeoTransform` and `CRS`: Georeferencing and per-pixel area
//! - `FeatureCollection` and `Aoi`: Labelled vector data and the area of interest
//! - `ClassScheme`: Land-cover classes as (value, label, color) records
//! - `SampleTable`: Band values sampled at labelled geometries
//! - I/O for GeoTIFF, GeoJSON and CSV

pub mod classes;
pub mod crs;
pub mod error;
pub mod image;
pub mod io;
pub mod raster;
pub mod table;
pub mod vector;

pub use classes::{ClassScheme, LandCoverClass};
pub use crs::CRS;
pub use error::{Error, Result};
pub use image::{Band, Image};
pub use raster::{GeoTransform, Raster, RasterElement};
pub use table::{SampleRow, SampleTable};
pub use vector::{Aoi, AttributeValue, Feature, FeatureCollection};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::classes::{ClassScheme, LandCoverClass};
    pub use crate::crs::CRS;
    pub use crate::error::{Error, Result};
    pub use crate::image::{Band, Image};
    pub use crate::raster::{GeoTransform, Raster, RasterElement};
    pub use crate::table::{SampleRow, SampleTable};
    pub use crate::vector::{Aoi, AttributeValue, Feature, FeatureCollection};
}
