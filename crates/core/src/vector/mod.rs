//! Labelled feature collections and the area of interest

use crate::error::{Error, Result};
use crate::raster::{Raster, RasterElement};
use geo::{BoundingRect, Contains, Intersects};
use geo_types::{Geometry, MultiPolygon, Point, Polygon, Rect};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Attribute value types
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
}

impl AttributeValue {
    /// Integer view; floats qualify only when integral
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            AttributeValue::Int(v) => Some(*v),
            AttributeValue::Float(v) if v.fract() == 0.0 && v.is_finite() => Some(*v as i64),
            AttributeValue::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            AttributeValue::Int(v) => Some(*v as f64),
            AttributeValue::Float(v) => Some(*v),
            AttributeValue::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            AttributeValue::String(s) => s.trim().parse().ok(),
            AttributeValue::Null => None,
        }
    }
}

impl fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttributeValue::Null => Ok(()),
            AttributeValue::Bool(b) => write!(f, "{b}"),
            AttributeValue::Int(v) => write!(f, "{v}"),
            AttributeValue::Float(v) => write!(f, "{v}"),
            AttributeValue::String(s) => write!(f, "{s}"),
        }
    }
}

impl From<serde_json::Value> for AttributeValue {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => AttributeValue::Null,
            serde_json::Value::Bool(b) => AttributeValue::Bool(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => AttributeValue::Int(i),
                None => AttributeValue::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            serde_json::Value::String(s) => AttributeValue::String(s),
            other => AttributeValue::String(other.to_string()),
        }
    }
}

/// A geographic feature with geometry and attributes
#[derive(Debug, Clone)]
pub struct Feature {
    /// Feature geometry
    pub geometry: Option<Geometry<f64>>,
    /// Feature attributes
    pub properties: BTreeMap<String, AttributeValue>,
    /// Optional feature ID
    pub id: Option<String>,
}

impl Feature {
    /// Create a new feature with geometry
    pub fn new(geometry: impl Into<Geometry<f64>>) -> Self {
        Self {
            geometry: Some(geometry.into()),
            properties: BTreeMap::new(),
            id: None,
        }
    }

    /// Builder-style property setter
    pub fn with_property(mut self, key: impl Into<String>, value: AttributeValue) -> Self {
        self.properties.insert(key.into(), value);
        self
    }

    /// Builder-style id setter
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Set an attribute
    pub fn set_property(&mut self, key: impl Into<String>, value: AttributeValue) {
        self.properties.insert(key.into(), value);
    }

    /// Get an attribute
    pub fn get_property(&self, key: &str) -> Option<&AttributeValue> {
        self.properties.get(key)
    }

    /// Integer class label stored under `property`
    pub fn class_value(&self, property: &str) -> Result<i64> {
        self.get_property(property)
            .and_then(AttributeValue::as_i64)
            .ok_or_else(|| Error::MissingProperty {
                feature: self.display_id(),
                property: property.to_string(),
            })
    }

    /// Id for messages; `<unnamed>` when absent
    pub fn display_id(&self) -> String {
        self.id.clone().unwrap_or_else(|| "<unnamed>".to_string())
    }
}

/// Collection of features
#[derive(Debug, Clone, Default)]
pub struct FeatureCollection {
    pub features: Vec<Feature>,
}

impl FeatureCollection {
    pub fn new() -> Self {
        Self { features: Vec::new() }
    }

    pub fn from_features(features: Vec<Feature>) -> Self {
        Self { features }
    }

    pub fn push(&mut self, feature: Feature) {
        self.features.push(feature);
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Feature> {
        self.features.iter()
    }

    /// Union of two collections, `self` first
    pub fn merge(mut self, other: FeatureCollection) -> Self {
        self.features.extend(other.features);
        self
    }

    /// First `max` features
    pub fn limit(mut self, max: usize) -> Self {
        self.features.truncate(max);
        self
    }

    /// Distinct values of an integer property, sorted
    pub fn distinct_classes(&self, property: &str) -> Result<Vec<i64>> {
        let mut values = self
            .features
            .iter()
            .map(|f| f.class_value(property))
            .collect::<Result<Vec<_>>>()?;
        values.sort_unstable();
        values.dedup();
        Ok(values)
    }

    /// Bounding box over all geometries
    pub fn bounding_rect(&self) -> Option<Rect<f64>> {
        self.features
            .iter()
            .filter_map(|f| f.geometry.as_ref()?.bounding_rect())
            .reduce(|a, b| {
                Rect::new(
                    (a.min().x.min(b.min().x), a.min().y.min(b.min().y)),
                    (a.max().x.max(b.max().x), a.max().y.max(b.max().y)),
                )
            })
    }
}

impl IntoIterator for FeatureCollection {
    type Item = Feature;
    type IntoIter = std::vec::IntoIter<Feature>;

    fn into_iter(self) -> Self::IntoIter {
        self.features.into_iter()
    }
}

/// Area of interest: the polygonal region constraining every spatial query
#[derive(Debug, Clone, PartialEq)]
pub struct Aoi {
    geometry: MultiPolygon<f64>,
}

impl Aoi {
    pub fn new(geometry: MultiPolygon<f64>) -> Result<Self> {
        if geometry.0.is_empty() {
            return Err(Error::InvalidParameter {
                name: "aoi",
                value: "empty".into(),
                reason: "area of interest needs at least one polygon".into(),
            });
        }
        Ok(Self { geometry })
    }

    pub fn from_polygon(polygon: Polygon<f64>) -> Self {
        Self {
            geometry: MultiPolygon::new(vec![polygon]),
        }
    }

    /// Axis-aligned rectangle AOI
    pub fn from_bounds(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
        Self::from_polygon(Rect::new((min_x, min_y), (max_x, max_y)).to_polygon())
    }

    /// Union of all polygon geometries in a collection
    pub fn from_features(fc: &FeatureCollection) -> Result<Self> {
        let mut polygons = Vec::new();
        for feature in fc.iter() {
            match &feature.geometry {
                Some(Geometry::Polygon(p)) => polygons.push(p.clone()),
                Some(Geometry::MultiPolygon(mp)) => polygons.extend(mp.0.iter().cloned()),
                Some(Geometry::Rect(r)) => polygons.push(r.to_polygon()),
                _ => {}
            }
        }
        Self::new(MultiPolygon::new(polygons))
    }

    pub fn geometry(&self) -> &MultiPolygon<f64> {
        &self.geometry
    }

    /// `(min_x, min_y, max_x, max_y)`
    pub fn bounds(&self) -> (f64, f64, f64, f64) {
        match self.geometry.bounding_rect() {
            Some(r) => (r.min().x, r.min().y, r.max().x, r.max().y),
            None => (0.0, 0.0, 0.0, 0.0),
        }
    }

    pub fn contains_point(&self, x: f64, y: f64) -> bool {
        self.geometry.contains(&Point::new(x, y))
    }

    /// Whether the AOI touches the rectangle `(min_x, min_y, max_x, max_y)`
    pub fn intersects_bounds(&self, bounds: (f64, f64, f64, f64)) -> bool {
        let (min_x, min_y, max_x, max_y) = bounds;
        let rect = Rect::new((min_x, min_y), (max_x, max_y));
        self.geometry.intersects(&rect.to_polygon())
    }

    /// Inclusion mask on the grid of `like`: 1 where the cell center lies
    /// inside the AOI, 0 elsewhere
    pub fn mask<T: RasterElement>(&self, like: &Raster<T>) -> Raster<u8> {
        let mut mask: Raster<u8> = like.with_same_meta();
        let gt = *like.transform();
        let (min_x, min_y, max_x, max_y) = self.bounds();
        for ((row, col), m) in mask.data_mut().indexed_iter_mut() {
            let (x, y) = gt.pixel_to_geo(col, row);
            if x < min_x || x > max_x || y < min_y || y > max_y {
                continue;
            }
            if self.contains_point(x, y) {
                *m = 1;
            }
        }
        mask
    }

    /// Boundary cells on the grid of `like`: 1 for inside cells with a
    /// 4-neighbour outside the AOI or off the grid, 0 elsewhere (nodata)
    pub fn outline<T: RasterElement>(&self, like: &Raster<T>) -> Raster<u8> {
        let mask = self.mask(like);
        let (rows, cols) = mask.shape();
        let inside = |r: usize, c: usize| mask.data()[(r, c)] == 1;
        let mut out: Raster<u8> = like.with_same_meta();
        out.set_nodata(Some(0));
        for ((row, col), m) in out.data_mut().indexed_iter_mut() {
            if !inside(row, col) {
                continue;
            }
            let edge = row == 0
                || col == 0
                || row + 1 == rows
                || col + 1 == cols
                || !inside(row - 1, col)
                || !inside(row + 1, col)
                || !inside(row, col - 1)
                || !inside(row, col + 1);
            if edge {
                *m = 1;
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::raster::GeoTransform;

    fn labelled(x: f64, y: f64, class: i64) -> Feature {
        Feature::new(Point::new(x, y)).with_property("class", AttributeValue::Int(class))
    }

    #[test]
    fn test_merge_and_limit() {
        let a = FeatureCollection::from_features(vec![labelled(0.0, 0.0, 0), labelled(1.0, 1.0, 0)]);
        let b = FeatureCollection::from_features(vec![labelled(2.0, 2.0, 3)]);
        let merged = a.merge(b);
        assert_eq!(merged.len(), 3);
        assert_eq!(merged.distinct_classes("class").unwrap(), vec![0, 3]);
        assert_eq!(merged.limit(2).len(), 2);
    }

    #[test]
    fn test_class_value_parsing() {
        let f = Feature::new(Point::new(0.0, 0.0)).with_property("class", AttributeValue::Float(2.0));
        assert_eq!(f.class_value("class").unwrap(), 2);
        let g = Feature::new(Point::new(0.0, 0.0)).with_property("class", AttributeValue::Float(2.5));
        assert!(g.class_value("class").is_err());
        assert!(f.class_value("label").is_err());
    }

    #[test]
    fn test_aoi_mask_uses_cell_centers() {
        let aoi = Aoi::from_bounds(0.0, 0.0, 5.0, 10.0);
        let grid: Raster<f64> =
            Raster::new(10, 10).georeferenced(GeoTransform::new(0.0, 10.0, 1.0, -1.0), None);
        let mask = aoi.mask(&grid);
        let inside = mask.data().iter().filter(|&&m| m == 1).count();
        assert_eq!(inside, 50);
        assert_eq!(mask.get(0, 4).unwrap(), 1);
        assert_eq!(mask.get(0, 5).unwrap(), 0);
    }

    #[test]
    fn test_aoi_outline_marks_boundary_cells() {
        let aoi = Aoi::from_bounds(0.0, 0.0, 5.0, 10.0);
        let grid: Raster<f64> =
            Raster::new(10, 10).georeferenced(GeoTransform::new(0.0, 10.0, 1.0, -1.0), None);
        let outline = aoi.outline(&grid);
        assert_eq!(outline.nodata(), Some(0));
        // rows 0 and 9 across five columns, plus columns 0 and 4 in between
        assert_eq!(outline.data().iter().filter(|&&m| m == 1).count(), 26);
        assert_eq!(outline.get(3, 4).unwrap(), 1);
        assert_eq!(outline.get(3, 2).unwrap(), 0);
        assert_eq!(outline.get(3, 5).unwrap(), 0);
    }

    #[test]
    fn test_aoi_intersects_bounds() {
        let aoi = Aoi::from_bounds(0.0, 0.0, 5.0, 5.0);
        assert!(aoi.intersects_bounds((4.0, 4.0, 8.0, 8.0)));
        assert!(!aoi.intersects_bounds((6.0, 6.0, 8.0, 8.0)));
    }
}
