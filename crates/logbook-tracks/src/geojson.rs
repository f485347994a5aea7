//! Logbook GeoJSON Types
//!
//! Serializable FeatureCollection / Feature / MultiLineString shapes
//! returned by the track endpoints.
//!
//! @version 0.1.0
//! @author AutomataNexus Development Team

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Media type for GeoJSON responses.
pub const GEOJSON_CONTENT_TYPE: &str = "application/vnd.geo+json";

/// One line: `[longitude, latitude]` pairs.
pub type Line = Vec<[f64; 2]>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Geometry {
    MultiLineString { coordinates: Vec<Line> },
}

impl Geometry {
    pub fn multi_line(coordinates: Vec<Line>) -> Self {
        Geometry::MultiLineString { coordinates }
    }

    pub fn lines(&self) -> &[Line] {
        match self {
            Geometry::MultiLineString { coordinates } => coordinates,
        }
    }
}

/// Properties attached to every track feature.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackProperties {
    pub id: Option<i64>,
    pub start_time: String,
    pub end_time: String,
    pub clipped_start_time: Option<String>,
    pub clipped_end_time: Option<String>,
    /// Auxiliary series, lines parallel to the geometry coordinates.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub values: BTreeMap<String, Vec<Vec<Value>>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename = "Feature")]
pub struct Feature {
    pub properties: TrackProperties,
    pub geometry: Geometry,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename = "FeatureCollection")]
pub struct FeatureCollection {
    pub features: Vec<Feature>,
}

impl FeatureCollection {
    pub fn new(features: Vec<Feature>) -> Self {
        Self { features }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_feature_collection_shape() {
        let collection = FeatureCollection::new(vec![Feature {
            properties: TrackProperties {
                id: Some(3),
                start_time: "2024-05-01T10:00:00.000Z".into(),
                end_time: "2024-05-01T11:00:00.000Z".into(),
                ..Default::default()
            },
            geometry: Geometry::multi_line(vec![vec![[24.9, 60.1], [24.91, 60.11]]]),
        }]);

        let value = serde_json::to_value(&collection).unwrap();
        assert_eq!(value["type"], "FeatureCollection");
        assert_eq!(value["features"][0]["type"], "Feature");
        assert_eq!(value["features"][0]["geometry"]["type"], "MultiLineString");
        assert_eq!(value["features"][0]["geometry"]["coordinates"][0][1], json!([24.91, 60.11]));
        assert_eq!(value["features"][0]["properties"]["clippedStartTime"], Value::Null);
        assert!(value["features"][0]["properties"].get("values").is_none());
    }
}
