//! Statistical summaries of classified rasters
//!
//! - **area**: Per-class area in hectares within a region

mod area;

pub use area::{class_areas, AreaParams, AreaReport, AreaTable, UnmappedClassWarning};
