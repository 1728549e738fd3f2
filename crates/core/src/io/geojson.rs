//! GeoJSON feature collections

use crate::error::{Error, Result};
use crate::vector::{Aoi, AttributeValue, Feature, FeatureCollection};
use std::fs;
use std::path::Path;

/// Read a GeoJSON file into a [`FeatureCollection`]
pub fn read_feature_collection<P: AsRef<Path>>(path: P) -> Result<FeatureCollection> {
    let content = fs::read_to_string(path.as_ref())?;
    parse_feature_collection(&content)
}

/// Read a GeoJSON file and union its polygons into an [`Aoi`]
pub fn read_aoi<P: AsRef<Path>>(path: P) -> Result<Aoi> {
    Aoi::from_features(&read_feature_collection(path)?)
}

/// Parse GeoJSON text.
///
/// A bare Feature or Geometry is accepted and wrapped in a collection.
pub fn parse_feature_collection(content: &str) -> Result<FeatureCollection> {
    let geojson: geojson::GeoJson = content
        .parse()
        .map_err(|e| Error::GeoJson(format!("Failed to parse GeoJSON: {e}")))?;

    match geojson {
        geojson::GeoJson::FeatureCollection(fc) => {
            let features = fc
                .features
                .into_iter()
                .enumerate()
                .map(|(idx, f)| convert_feature(f, idx))
                .collect::<Result<Vec<_>>>()?;
            Ok(FeatureCollection::from_features(features))
        }
        geojson::GeoJson::Feature(f) => Ok(FeatureCollection::from_features(vec![convert_feature(f, 0)?])),
        geojson::GeoJson::Geometry(g) => {
            let geometry = convert_geometry(g, 0)?;
            Ok(FeatureCollection::from_features(vec![Feature::new(geometry).with_id("0")]))
        }
    }
}

fn convert_geometry(geometry: geojson::Geometry, idx: usize) -> Result<geo_types::Geometry<f64>> {
    geo_types::Geometry::<f64>::try_from(geometry)
        .map_err(|e| Error::GeoJson(format!("feature {idx}: unsupported geometry: {e}")))
}

fn convert_feature(feature: geojson::Feature, idx: usize) -> Result<Feature> {
    let id = match feature.id {
        Some(geojson::feature::Id::String(s)) => s,
        Some(geojson::feature::Id::Number(n)) => n.to_string(),
        None => idx.to_string(),
    };

    let geometry = feature
        .geometry
        .map(|g| convert_geometry(g, idx))
        .transpose()?;

    let properties = feature
        .properties
        .unwrap_or_default()
        .into_iter()
        .map(|(k, v)| (k, AttributeValue::from(v)))
        .collect();

    Ok(Feature {
        geometry,
        properties,
        id: Some(id),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const LABELS: &str = r#"{
        "type": "FeatureCollection",
        "features": [
            {"type": "Feature", "id": "w1",
             "geometry": {"type": "Point", "coordinates": [34.75, -0.10]},
             "properties": {"class": 3}},
            {"type": "Feature",
             "geometry": {"type": "Polygon", "coordinates": [[[0,0],[1,0],[1,1],[0,1],[0,0]]]},
             "properties": {"class": 1, "note": "field"}}
        ]
    }"#;

    #[test]
    fn test_parse_labels() {
        let fc = parse_feature_collection(LABELS).unwrap();
        assert_eq!(fc.len(), 2);
        assert_eq!(fc.features[0].id.as_deref(), Some("w1"));
        assert_eq!(fc.features[1].id.as_deref(), Some("1"));
        assert_eq!(fc.distinct_classes("class").unwrap(), vec![1, 3]);
        assert_eq!(
            fc.features[1].get_property("note"),
            Some(&AttributeValue::String("field".into()))
        );
    }

    #[test]
    fn test_aoi_from_polygons_only() {
        let fc = parse_feature_collection(LABELS).unwrap();
        let aoi = Aoi::from_features(&fc).unwrap();
        assert!(aoi.contains_point(0.5, 0.5));
        assert!(!aoi.contains_point(34.75, -0.10));
    }

    #[test]
    fn test_invalid_geojson() {
        assert!(parse_feature_collection("{\"type\": \"Nope\"}").is_err());
    }
}
