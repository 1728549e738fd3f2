//! Band values at labelled geometries
//!
//! Points read the pixel they fall in. Polygons average the pixel centers
//! they contain on a grid thinned to the requested scale, and fall back to
//! the pixel under their centroid when they are smaller than one cell.

use geo::{BoundingRect, Centroid, Contains};
use geo_types::{Geometry, MultiPolygon, Point};
use tracing::debug;

use crate::maybe_rayon::*;
use lulc_core::{Error, Feature, FeatureCollection, Image, Result, SampleRow, SampleTable};

/// Parameters for [`sample_regions`]
#[derive(Debug, Clone)]
pub struct SampleParams {
    /// Feature properties copied onto every output row
    pub properties: Vec<String>,
    /// Sampling scale in meters
    pub scale: f64,
    /// Sample only the first this many features
    pub limit: Option<usize>,
}

impl Default for SampleParams {
    fn default() -> Self {
        Self {
            properties: vec!["class".to_string()],
            scale: 10.0,
            limit: None,
        }
    }
}

/// Extract the image's band values at each feature.
///
/// The feature cap is applied before sampling, so a capped feature that
/// falls outside the image still counts against it. Every kept feature must
/// carry all requested properties. Features outside the image, or whose
/// pixels are all nodata, produce no row.
pub fn sample_regions(
    image: &Image,
    features: &FeatureCollection,
    params: &SampleParams,
) -> Result<SampleTable> {
    if !(params.scale > 0.0) {
        return Err(Error::InvalidParameter {
            name: "scale",
            value: params.scale.to_string(),
            reason: "must be positive".into(),
        });
    }

    let kept = params.limit.map_or(features.len(), |max| max.min(features.len()));
    let features = &features.features[..kept];

    for feature in features {
        for property in &params.properties {
            if feature.get_property(property).is_none() {
                return Err(Error::MissingProperty {
                    feature: feature.display_id(),
                    property: property.clone(),
                });
            }
        }
    }

    let stride = image.grid().stride_for_scale(params.scale);
    let band_names: Vec<String> = image.band_names().iter().map(|s| s.to_string()).collect();
    let mut table = SampleTable::new(band_names, params.properties.clone());

    let sampled: Vec<Option<SampleRow>> = (0..features.len())
        .into_par_iter()
        .map(|i| sample_feature(image, &features[i], stride, &params.properties))
        .collect();

    let mut dropped = 0usize;
    for row in sampled {
        match row {
            Some(row) => table.push(row)?,
            None => dropped += 1,
        }
    }

    debug!(
        "Sampled {} of {} features at stride {} ({} dropped)",
        table.len(),
        features.len(),
        stride,
        dropped
    );
    Ok(table)
}

fn sample_feature(
    image: &Image,
    feature: &Feature,
    stride: usize,
    properties: &[String],
) -> Option<SampleRow> {
    let geometry = feature.geometry.as_ref()?;
    let values = match geometry {
        Geometry::Point(p) => pixel_at(image, p),
        Geometry::Polygon(p) => region_mean(image, &MultiPolygon::new(vec![p.clone()]), stride),
        Geometry::MultiPolygon(mp) => region_mean(image, mp, stride),
        Geometry::Rect(r) => region_mean(image, &MultiPolygon::new(vec![r.to_polygon()]), stride),
        Geometry::MultiPoint(mp) => mean_of(mp.iter().filter_map(|p| pixel_at(image, p))),
        other => other.centroid().and_then(|c| pixel_at(image, &c)),
    }?;

    Some(SampleRow {
        feature_id: feature.id.clone(),
        values,
        properties: properties
            .iter()
            .filter_map(|p| feature.get_property(p).cloned())
            .collect(),
    })
}

fn pixel_at(image: &Image, point: &Point<f64>) -> Option<Vec<f64>> {
    let (row, col) = image.grid().cell_at(point.x(), point.y())?;
    let mut values = Vec::with_capacity(image.band_count());
    image.pixel_into(row, col, &mut values).then_some(values)
}

fn region_mean(image: &Image, region: &MultiPolygon<f64>, stride: usize) -> Option<Vec<f64>> {
    let rect = region.bounding_rect()?;
    let grid = image.grid();
    let gt = grid.transform();
    let (rows, cols) = grid.shape();

    // Pixel window covering the region's bounds, clamped to the image
    let (c0, r0) = gt.geo_to_pixel(rect.min().x, rect.max().y);
    let (c1, r1) = gt.geo_to_pixel(rect.max().x, rect.min().y);
    let clamp = |v: f64, n: usize| (v.floor().max(0.0) as usize).min(n);
    let (row_start, row_end) = (clamp(r0.min(r1), rows), clamp(r0.max(r1) + 1.0, rows));
    let (col_start, col_end) = (clamp(c0.min(c1), cols), clamp(c0.max(c1) + 1.0, cols));

    let offset = stride / 2;
    let inside = (row_start..row_end)
        .filter(|r| r % stride == offset)
        .flat_map(|r| {
            (col_start..col_end)
                .filter(move |c| c % stride == offset)
                .map(move |c| (r, c))
        })
        .filter_map(|(r, c)| {
            let (x, y) = gt.pixel_to_geo(c, r);
            if !region.contains(&Point::new(x, y)) {
                return None;
            }
            let mut values = Vec::with_capacity(image.band_count());
            image.pixel_into(r, c, &mut values).then_some(values)
        });

    mean_of(inside).or_else(|| region.centroid().and_then(|c| pixel_at(image, &c)))
}

fn mean_of(vectors: impl Iterator<Item = Vec<f64>>) -> Option<Vec<f64>> {
    let mut sum: Vec<f64> = Vec::new();
    let mut n = 0usize;
    for v in vectors {
        if sum.is_empty() {
            sum = vec![0.0; v.len()];
        }
        for (s, x) in sum.iter_mut().zip(&v) {
            *s += x;
        }
        n += 1;
    }
    if n == 0 {
        return None;
    }
    Some(sum.into_iter().map(|s| s / n as f64).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use geo_types::{polygon, Point};
    use lulc_core::{AttributeValue, Band, GeoTransform, Raster};

    /// 10 x 10 image of 1 m cells; band "b" holds row * 10 + col
    fn image() -> Image {
        let data: Vec<f64> = (0..100).map(|v| v as f64).collect();
        let raster = Raster::from_vec(data, 10, 10)
            .unwrap()
            .georeferenced(GeoTransform::new(0.0, 10.0, 1.0, -1.0), Some(lulc_core::CRS::utm(33, true)));
        Image::new(vec![Band::new("b", raster)]).unwrap()
    }

    fn point(x: f64, y: f64, class: i64) -> Feature {
        Feature::new(Point::new(x, y)).with_property("class", AttributeValue::Int(class))
    }

    fn params(scale: f64) -> SampleParams {
        SampleParams {
            properties: vec!["class".into()],
            scale,
            limit: None,
        }
    }

    #[test]
    fn test_point_reads_containing_pixel() {
        let fc = FeatureCollection::from_features(vec![point(2.5, 7.5, 1)]);
        let table = sample_regions(&image(), &fc, &params(1.0)).unwrap();
        assert_eq!(table.len(), 1);
        // y = 7.5 is row 2, x = 2.5 is col 2
        assert_eq!(table.rows()[0].values, vec![22.0]);
        assert_eq!(table.rows()[0].properties, vec![AttributeValue::Int(1)]);
    }

    #[test]
    fn test_polygon_means_inner_pixels() {
        let poly = polygon![(x: 0.0, y: 10.0), (x: 2.0, y: 10.0), (x: 2.0, y: 8.0), (x: 0.0, y: 8.0)];
        let fc = FeatureCollection::from_features(vec![
            Feature::new(poly).with_property("class", AttributeValue::Int(3)),
        ]);
        let table = sample_regions(&image(), &fc, &params(1.0)).unwrap();
        // pixels (0,0), (0,1), (1,0), (1,1)
        assert_relative_eq!(table.rows()[0].values[0], (0.0 + 1.0 + 10.0 + 11.0) / 4.0);
    }

    #[test]
    fn test_tiny_polygon_uses_centroid_pixel() {
        let poly = polygon![(x: 5.1, y: 4.9), (x: 5.3, y: 4.9), (x: 5.3, y: 4.7), (x: 5.1, y: 4.7)];
        let fc = FeatureCollection::from_features(vec![
            Feature::new(poly).with_property("class", AttributeValue::Int(0)),
        ]);
        let table = sample_regions(&image(), &fc, &params(1.0)).unwrap();
        assert_eq!(table.rows()[0].values, vec![55.0]);
    }

    #[test]
    fn test_outside_and_nodata_dropped() {
        let mut img = image();
        let mut b = img.band("b").unwrap().clone();
        b.set(0, 0, f64::NAN).unwrap();
        img = Image::new(vec![Band::new("b", b)]).unwrap();

        let fc = FeatureCollection::from_features(vec![
            point(0.5, 9.5, 1),
            point(50.0, 50.0, 1),
            point(1.5, 9.5, 2),
        ]);
        let table = sample_regions(&img, &fc, &params(1.0)).unwrap();
        assert_eq!(table.len(), 1);
        assert_eq!(table.rows()[0].values, vec![1.0]);
    }

    #[test]
    fn test_limit_caps_rows() {
        let fc = FeatureCollection::from_features((0..8).map(|i| point(i as f64 + 0.5, 0.5, 0)).collect());
        let mut p = params(1.0);
        p.limit = Some(5);
        assert_eq!(sample_regions(&image(), &fc, &p).unwrap().len(), 5);
        p.limit = Some(50);
        assert_eq!(sample_regions(&image(), &fc, &p).unwrap().len(), 8);
    }

    #[test]
    fn test_limit_counts_features_outside_image() {
        let fc = FeatureCollection::from_features(vec![
            point(50.0, 50.0, 0),
            point(1.5, 9.5, 1),
            point(2.5, 9.5, 2),
        ]);
        let mut p = params(1.0);
        p.limit = Some(2);
        let table = sample_regions(&image(), &fc, &p).unwrap();
        assert_eq!(table.len(), 1);
        assert_eq!(table.rows()[0].properties, vec![AttributeValue::Int(1)]);
    }

    #[test]
    fn test_properties_checked_only_within_limit() {
        let fc = FeatureCollection::from_features(vec![
            point(1.5, 9.5, 1),
            Feature::new(Point::new(2.5, 9.5)),
        ]);
        let mut p = params(1.0);
        p.limit = Some(1);
        assert_eq!(sample_regions(&image(), &fc, &p).unwrap().len(), 1);
    }

    #[test]
    fn test_missing_property_is_error() {
        let fc = FeatureCollection::from_features(vec![Feature::new(Point::new(1.0, 1.0))]);
        let err = sample_regions(&image(), &fc, &params(1.0)).unwrap_err();
        assert!(matches!(err, Error::MissingProperty { .. }));
    }

    #[test]
    fn test_coarser_scale_thins_polygon_grid() {
        let poly = polygon![(x: 0.0, y: 10.0), (x: 4.0, y: 10.0), (x: 4.0, y: 6.0), (x: 0.0, y: 6.0)];
        let fc = FeatureCollection::from_features(vec![
            Feature::new(poly).with_property("class", AttributeValue::Int(1)),
        ]);
        let table = sample_regions(&image(), &fc, &params(2.0)).unwrap();
        // stride 2, offset 1: pixels (1,1), (1,3), (3,1), (3,3)
        assert_relative_eq!(table.rows()[0].values[0], (11.0 + 13.0 + 31.0 + 33.0) / 4.0);
    }
}
