//! # LULC Colormap
//!
//! Presentation layer for land-cover maps: colour parsing and palettes,
//! visualization parameters that turn images into RGBA buffers, legends,
//! grouped column charts and the [`RenderContext`] that collects them.
//!
//! ## Usage
//!
//! ```ignore
//! use lulc_colormap::{RenderContext, VisParams};
//!
//! let mut ctx = RenderContext::new();
//! ctx.add_layer("NDVI 2020", &ndvi, &VisParams::palette("NDVI", -1.0, 1.0, &["blue", "yellow", "green"]))?;
//! ctx.write_to_dir("render")?;
//! ```

mod chart;
mod context;
mod error;
mod legend;
mod palette;
mod vis;

pub use chart::{ColumnChart, Series};
pub use context::{MapCenter, MapLayer, RenderContext};
pub use error::{ColormapError, Result};
pub use legend::{Legend, LegendEntry};
pub use palette::{ColorStop, Palette, Rgb};
pub use vis::{render_image, render_raster, VisParams};
