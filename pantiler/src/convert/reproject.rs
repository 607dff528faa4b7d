//! In-process reprojection into WGS84 longitude/latitude.
//!
//! Only systems with a closed-form inverse are handled here; everything else
//! goes through the external conversion engine.

use std::f64::consts::PI;

use serde_json::Value;

/// WGS84 semi-major axis in metres, the sphere radius of Web Mercator.
pub const EARTH_RADIUS: f64 = 6_378_137.0;

const GEOGRAPHIC: &[&str] = &["EPSG:4326", "CRS:84", "WGS84", "OGC:CRS84"];
const WEB_MERCATOR: &[&str] = &["EPSG:3857", "EPSG:900913", "EPSG:3785", "EPSG:102100"];

/// A transform from a source system into WGS84 degrees.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reprojection {
    /// Coordinates are already longitude/latitude.
    Identity,
    /// Coordinates are spherical Mercator metres.
    InverseMercator,
}

impl Reprojection {
    /// The transform for a coordinate-system identifier, if it can be done natively.
    pub fn for_system(system: &str) -> Option<Self> {
        let matches = |names: &[&str]| names.iter().any(|n| n.eq_ignore_ascii_case(system.trim()));
        if matches(GEOGRAPHIC) {
            Some(Self::Identity)
        } else if matches(WEB_MERCATOR) {
            Some(Self::InverseMercator)
        } else {
            None
        }
    }

    /// Transform one position, returning `(lon, lat)` in degrees.
    pub fn position(self, x: f64, y: f64) -> (f64, f64) {
        match self {
            Self::Identity => (x, y),
            Self::InverseMercator => {
                let lon = x / EARTH_RADIUS * 180.0 / PI;
                let lat = (y / EARTH_RADIUS).sinh().atan() * 180.0 / PI;
                (lon, lat)
            }
        }
    }

    /// Transform a GeoJSON geometry object in place.
    pub fn geometry(self, geometry: &mut Value) {
        if self == Self::Identity {
            return;
        }
        let Some(object) = geometry.as_object_mut() else {
            return;
        };
        if let Some(Value::Array(members)) = object.get_mut("geometries") {
            for member in members {
                self.geometry(member);
            }
        }
        if let Some(coordinates) = object.get_mut("coordinates") {
            self.coordinates(coordinates);
        }
    }

    fn coordinates(self, value: &mut Value) {
        let Value::Array(items) = value else {
            return;
        };
        match (items.first().and_then(Value::as_f64), items.get(1).and_then(Value::as_f64)) {
            (Some(x), Some(y)) => {
                let (lon, lat) = self.position(x, y);
                items[0] = Value::from(lon);
                items[1] = Value::from(lat);
            }
            _ => {
                for item in items {
                    self.coordinates(item);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-6
    }

    #[test]
    fn test_for_system() {
        assert_eq!(Reprojection::for_system("EPSG:4326"), Some(Reprojection::Identity));
        assert_eq!(Reprojection::for_system("epsg:3857"), Some(Reprojection::InverseMercator));
        assert_eq!(Reprojection::for_system("EPSG:27700"), None);
    }

    #[test]
    fn test_inverse_mercator_known_points() {
        let (lon, lat) = Reprojection::InverseMercator.position(0.0, 0.0);
        assert!(close(lon, 0.0) && close(lat, 0.0));

        // Edge of the Web Mercator square
        let edge = PI * EARTH_RADIUS;
        let (lon, lat) = Reprojection::InverseMercator.position(edge, edge);
        assert!(close(lon, 180.0));
        assert!(close(lat, 85.05112878));
    }

    #[test]
    fn test_geometry_nested_rings() {
        let edge = PI * EARTH_RADIUS;
        let mut polygon = json!({
            "type": "Polygon",
            "coordinates": [[[0.0, 0.0], [edge / 2.0, 0.0], [0.0, 0.0]]]
        });
        Reprojection::InverseMercator.geometry(&mut polygon);
        let lon = polygon["coordinates"][0][1][0].as_f64().unwrap();
        assert!(close(lon, 90.0));
    }

    #[test]
    fn test_geometry_collection_and_extra_ordinates() {
        let edge = PI * EARTH_RADIUS;
        let mut collection = json!({
            "type": "GeometryCollection",
            "geometries": [{ "type": "Point", "coordinates": [-edge, 0.0, 12.5] }]
        });
        Reprojection::InverseMercator.geometry(&mut collection);
        let point = &collection["geometries"][0]["coordinates"];
        assert!(close(point[0].as_f64().unwrap(), -180.0));
        assert_eq!(point[2], json!(12.5));
    }

    #[test]
    fn test_identity_leaves_geometry() {
        let mut point = json!({ "type": "Point", "coordinates": [1.5, 2.5] });
        let before = point.clone();
        Reprojection::Identity.geometry(&mut point);
        assert_eq!(point, before);
    }
}
