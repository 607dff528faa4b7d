//! Field access on semi-structured feature records.

use std::collections::BTreeMap;
use std::path::Path;

use serde_json::{Map, Value};

use crate::error::{PantilerError, Result};
use crate::spec::PointFields;

/// Read access to one source feature.
///
/// Lookups return `None` for anything absent; they never fail.
pub trait FeatureReader {
    /// Value of the named field.
    fn get(&self, field: &str) -> Option<&Value>;

    /// Names of every field the feature carries, in source order.
    fn field_names(&self) -> Vec<&str>;

    /// The feature's own geometry.
    fn geometry(&self) -> Option<&Value>;
}

/// A GeoJSON `Feature` object.
#[derive(Debug, Clone, Copy)]
pub struct GeoJsonFeature<'a> {
    properties: Option<&'a Map<String, Value>>,
    geometry: Option<&'a Value>,
}

impl<'a> GeoJsonFeature<'a> {
    pub fn new(feature: &'a Value) -> Self {
        Self {
            properties: feature.get("properties").and_then(Value::as_object),
            geometry: feature.get("geometry").filter(|g| !g.is_null()),
        }
    }
}

impl FeatureReader for GeoJsonFeature<'_> {
    fn get(&self, field: &str) -> Option<&Value> {
        self.properties?.get(field)
    }

    fn field_names(&self) -> Vec<&str> {
        self.properties
            .map(|p| p.keys().map(String::as_str).collect())
            .unwrap_or_default()
    }

    fn geometry(&self) -> Option<&Value> {
        self.geometry
    }
}

/// Render a property value as text, keeping nulls.
pub fn text(value: &Value) -> Value {
    match value {
        Value::Null => Value::Null,
        Value::String(s) => Value::String(s.clone()),
        other => Value::String(other.to_string()),
    }
}

/// Build an output feature's properties.
///
/// With a mapping, every output field is present and takes the text of its
/// source field, or null when the source field is missing. Without one,
/// every source field is carried over.
pub fn remap(
    reader: &dyn FeatureReader,
    fields: Option<&BTreeMap<String, String>>,
) -> Map<String, Value> {
    match fields {
        Some(mapping) => mapping
            .iter()
            .map(|(output, source)| {
                let value = reader.get(source).map(text).unwrap_or(Value::Null);
                (output.clone(), value)
            })
            .collect(),
        None => reader
            .field_names()
            .into_iter()
            .map(|name| {
                let value = reader.get(name).map(text).unwrap_or(Value::Null);
                (name.to_string(), value)
            })
            .collect(),
    }
}

/// Set an output's extra properties on a feature, replacing mapped ones of the same name.
pub fn annotate(properties: &mut Map<String, Value>, additional: Option<&Map<String, Value>>) {
    if let Some(additional) = additional {
        properties.extend(additional.iter().map(|(k, v)| (k.clone(), v.clone())));
    }
}

fn number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Point geometry built from the declared coordinate fields.
///
/// Returns `None` when either field is missing or not numeric.
pub fn point_from_fields(reader: &dyn FeatureReader, fields: &PointFields) -> Option<(f64, f64)> {
    let x = reader.get(&fields.longitude).and_then(number)?;
    let y = reader.get(&fields.latitude).and_then(number)?;
    Some((x, y))
}

/// Load the features of a GeoJSON document.
///
/// Accepts a `FeatureCollection` or a bare `Feature`.
pub fn read_features(path: &Path) -> Result<Vec<Value>> {
    let invalid = |reason: String| PantilerError::InvalidDocument {
        path: path.to_path_buf(),
        reason,
    };
    let bytes = std::fs::read(path).map_err(|e| PantilerError::ReadFailed {
        path: path.to_path_buf(),
        source: e,
    })?;
    let document: Value = serde_json::from_slice(&bytes).map_err(|e| invalid(e.to_string()))?;

    match document.get("type").and_then(Value::as_str) {
        Some("FeatureCollection") => match document.get("features") {
            Some(Value::Array(features)) => Ok(features.clone()),
            Some(Value::Null) | None => Ok(Vec::new()),
            Some(_) => Err(invalid("features is not a list".to_string())),
        },
        Some("Feature") => Ok(vec![document]),
        other => Err(invalid(format!(
            "expected a FeatureCollection, found {}",
            other.unwrap_or("no type")
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn feature() -> Value {
        json!({
            "type": "Feature",
            "geometry": { "type": "Point", "coordinates": [1, 2] },
            "properties": { "name": "Hyde Park", "area": 142, "open": true, "note": null, "x": "-0.16", "y": 51.5 }
        })
    }

    #[test]
    fn test_reader_lookups() {
        let raw = feature();
        let reader = GeoJsonFeature::new(&raw);
        assert_eq!(reader.get("name"), Some(&json!("Hyde Park")));
        assert_eq!(reader.get("missing"), None);
        assert_eq!(reader.geometry().unwrap()["type"], "Point");

        let bare = json!({ "type": "Feature", "geometry": null });
        let reader = GeoJsonFeature::new(&bare);
        assert_eq!(reader.get("name"), None);
        assert!(reader.geometry().is_none());
        assert!(reader.field_names().is_empty());
    }

    #[test]
    fn test_remap_with_mapping_stringifies_and_nulls_unknown() {
        let raw = feature();
        let reader = GeoJsonFeature::new(&raw);
        let mapping = BTreeMap::from([
            ("title".to_string(), "name".to_string()),
            ("size".to_string(), "area".to_string()),
            ("public".to_string(), "open".to_string()),
            ("ghost".to_string(), "does-not-exist".to_string()),
        ]);

        let props = remap(&reader, Some(&mapping));

        assert_eq!(props.len(), 4);
        assert_eq!(props["title"], json!("Hyde Park"));
        assert_eq!(props["size"], json!("142"));
        assert_eq!(props["public"], json!("true"));
        assert_eq!(props["ghost"], Value::Null);
    }

    #[test]
    fn test_remap_without_mapping_carries_everything() {
        let raw = feature();
        let props = remap(&GeoJsonFeature::new(&raw), None);
        assert_eq!(props.len(), 6);
        assert_eq!(props["note"], Value::Null);
        assert_eq!(props["y"], json!("51.5"));
    }

    #[test]
    fn test_annotate_overrides_mapped_properties() {
        let raw = feature();
        let mut props = remap(&GeoJsonFeature::new(&raw), None);
        let extra = json!({ "kind": "park", "area": 150, "tags": ["green"] });

        annotate(&mut props, extra.as_object());

        assert_eq!(props.len(), 8);
        assert_eq!(props["kind"], json!("park"));
        assert_eq!(props["area"], json!(150));
        assert_eq!(props["tags"], json!(["green"]));
        assert_eq!(props["name"], json!("Hyde Park"));

        let before = props.clone();
        annotate(&mut props, None);
        assert_eq!(props, before);
    }

    #[test]
    fn test_point_from_fields() {
        let raw = feature();
        let reader = GeoJsonFeature::new(&raw);
        let fields = PointFields {
            longitude: "x".to_string(),
            latitude: "y".to_string(),
        };
        assert_eq!(point_from_fields(&reader, &fields), Some((-0.16, 51.5)));

        let wrong = PointFields {
            longitude: "name".to_string(),
            latitude: "y".to_string(),
        };
        assert_eq!(point_from_fields(&reader, &wrong), None);
    }

    #[test]
    fn test_read_features() {
        let temp = TempDir::new().unwrap();
        let collection = temp.path().join("c.geojson");
        std::fs::write(
            &collection,
            json!({ "type": "FeatureCollection", "features": [feature(), feature()] }).to_string(),
        )
        .unwrap();
        assert_eq!(read_features(&collection).unwrap().len(), 2);

        let single = temp.path().join("f.geojson");
        std::fs::write(&single, feature().to_string()).unwrap();
        assert_eq!(read_features(&single).unwrap().len(), 1);

        let wrong = temp.path().join("w.json");
        std::fs::write(&wrong, r#"{"type":"Topology"}"#).unwrap();
        assert!(matches!(
            read_features(&wrong),
            Err(PantilerError::InvalidDocument { .. })
        ));
    }
}
