//! # LULC Algorithms
//!
//! Raster and table algorithms behind the land-cover workflow.
//!
//! ## Available Algorithm Categories
//!
//! - **imagery**: Median compositing, normalized difference / NDVI, class change detection
//! - **sampling**: Band values at labelled points and polygons
//! - **classification**: Random forest, confusion matrix and accuracy metrics
//! - **statistics**: Per-class area within a region

pub(crate) mod maybe_rayon;

pub mod classification;
pub mod imagery;
pub mod sampling;
pub mod statistics;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::classification::{
        classify_image, classify_table, ConfusionMatrix, RandomForest, RandomForestParams,
    };
    pub use crate::imagery::{
        class_change, median_composite, ndvi, normalized_difference, normalized_difference_image,
        transition_matrix, TransitionMatrix,
    };
    pub use crate::sampling::{sample_regions, SampleParams};
    pub use crate::statistics::{class_areas, AreaParams, AreaReport, AreaTable, UnmappedClassWarning};
    pub use lulc_core::prelude::*;
}
