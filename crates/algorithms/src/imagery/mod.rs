//! Imagery analysis algorithms
//!
//! - Median composites over a stack of scenes
//! - Normalized difference and NDVI
//! - Class change masks and from/to transition counts

mod change_detection;
mod composite;
mod indices;

pub use change_detection::{
    changed_pixel_count, class_change, transition_matrix, TransitionMatrix, CHANGE, CHANGE_NODATA,
    NO_CHANGE,
};
pub use composite::median_composite;
pub use indices::{ndvi, normalized_difference, normalized_difference_image};
