//! Typed build-spec model.
//!
//! These types are only ever constructed from a document that has already
//! passed [`validate`](super::validate), so deserialization here is not
//! expected to fail.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use reqwest::Url;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A validated description of everything one build produces.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildSpec {
    /// Base URL the dataset will be served from.
    pub host: String,
    pub zoom_from: u32,
    pub zoom_to: u32,
    #[serde(default)]
    pub fonts: Vec<AssetInput>,
    #[serde(default)]
    pub sprites: Vec<AssetInput>,
    pub sources: Vec<Source>,
    /// Opaque style overrides, merged over the synthesized style document.
    #[serde(default)]
    pub styling: Map<String, Value>,
}

/// A fetchable item: a font, a sprite icon, or a data file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetInput {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
    /// Extension override for locations that don't carry one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
}

/// Where an [`AssetInput`] is retrieved from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Location<'a> {
    Path(&'a Path),
    Url(&'a str),
}

impl AssetInput {
    /// Resolve the retrieval location. A local path wins over a URL.
    pub fn location(&self) -> Option<Location<'_>> {
        match (&self.path, &self.url) {
            (Some(path), _) => Some(Location::Path(path)),
            (None, Some(url)) => Some(Location::Url(url)),
            (None, None) => None,
        }
    }

    /// File extension for the cached copy of this input.
    ///
    /// Uses `format` when given, otherwise the final dot-segment of the path
    /// or of the URL's path component.
    pub fn extension(&self) -> Option<String> {
        if let Some(format) = &self.format {
            return Some(format.trim_start_matches('.').to_string());
        }
        match self.location()? {
            Location::Path(path) => path
                .extension()
                .and_then(|e| e.to_str())
                .map(str::to_string),
            Location::Url(url) => {
                let parsed = Url::parse(url).ok()?;
                let last = parsed.path_segments()?.next_back()?.to_string();
                last.rsplit_once('.').map(|(_, ext)| ext.to_string())
            }
        }
    }
}

/// One named unit of input geodata plus its output layers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Source {
    pub name: String,
    /// Coordinate reference system of the inputs, e.g. `EPSG:27700`.
    pub system: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field_longitude: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field_latitude: Option<String>,
    pub inputs: Vec<AssetInput>,
    pub outputs: Vec<Output>,
}

/// Property names holding point coordinates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PointFields {
    pub longitude: String,
    pub latitude: String,
}

impl Source {
    /// The point-from-fields configuration, when both fields are declared.
    pub fn point_fields(&self) -> Option<PointFields> {
        match (&self.field_longitude, &self.field_latitude) {
            (Some(longitude), Some(latitude)) => Some(PointFields {
                longitude: longitude.clone(),
                latitude: latitude.clone(),
            }),
            _ => None,
        }
    }
}

/// One target layer produced from a source's inputs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Output {
    pub name: String,
    /// Layer to read from multi-layer inputs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub layer: Option<String>,
    /// Output field name to source field name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fields: Option<BTreeMap<String, String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zoom_min: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zoom_max: Option<u32>,
    /// Extra properties set on every feature, over the mapped fields.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub additional: Option<Map<String, Value>>,
}

/// Per-feature zoom bounds handed to the tiling engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TilingHint {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub minzoom: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub maxzoom: Option<u32>,
}

impl Output {
    pub fn tiling_hint(&self) -> Option<TilingHint> {
        if self.zoom_min.is_none() && self.zoom_max.is_none() {
            return None;
        }
        Some(TilingHint {
            minzoom: self.zoom_min,
            maxzoom: self.zoom_max,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(url: Option<&str>, path: Option<&str>, format: Option<&str>) -> AssetInput {
        AssetInput {
            name: "in".to_string(),
            url: url.map(str::to_string),
            path: path.map(PathBuf::from),
            format: format.map(str::to_string),
        }
    }

    #[test]
    fn test_extension_from_path() {
        let i = input(None, Some("data/roads.geojson"), None);
        assert_eq!(i.extension().as_deref(), Some("geojson"));
    }

    #[test]
    fn test_extension_from_url_ignores_query() {
        let i = input(Some("https://x.test/files/parks.zip?token=abc"), None, None);
        assert_eq!(i.extension().as_deref(), Some("zip"));
    }

    #[test]
    fn test_extension_format_override() {
        let i = input(Some("https://x.test/download"), None, Some("zip"));
        assert_eq!(i.extension().as_deref(), Some("zip"));
        assert_eq!(input(Some("https://x.test/download"), None, None).extension(), None);
    }

    #[test]
    fn test_location_prefers_path() {
        let i = input(Some("https://x.test/a.zip"), Some("/tmp/a.zip"), None);
        assert_eq!(i.location(), Some(Location::Path(Path::new("/tmp/a.zip"))));
        assert_eq!(input(None, None, None).location(), None);
    }

    #[test]
    fn test_tiling_hint_only_when_declared() {
        let mut output = Output {
            name: "o".to_string(),
            layer: None,
            fields: None,
            zoom_min: None,
            zoom_max: None,
            additional: None,
        };
        assert_eq!(output.tiling_hint(), None);
        output.zoom_max = Some(9);
        assert_eq!(
            output.tiling_hint(),
            Some(TilingHint {
                minzoom: None,
                maxzoom: Some(9)
            })
        );
    }
}
