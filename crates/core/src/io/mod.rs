//! I/O operations for reading and writing geospatial data

mod csv;
mod geojson;
mod native;

pub use self::csv::{write_csv, write_table_csv};
pub use self::geojson::{parse_feature_collection, read_aoi, read_feature_collection};
pub use native::{
    read_geotiff, read_geotiff_from_buffer, write_geotiff, write_geotiff_to_buffer,
    write_rgba_geotiff, GeoTiffOptions,
};
