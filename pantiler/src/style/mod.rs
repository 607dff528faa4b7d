//! Style stage: synthesize the style document served next to the tiles.
//!
//! Synthesis is pure. [`synthesize`] builds the defaults from the tile
//! metadata and [`merge`] layers the build spec's `styling` object on top,
//! top-level keys only, with the override winning.

use std::path::{Path, PathBuf};

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{json, Map, Value};
use tracing::{info, instrument};

use crate::error::{PantilerError, Result};
use crate::progress::{ProgressEvent, ProgressReporter, DONE, IN_PROGRESS};
use crate::tile::{TileMetadata, METADATA_FILE};

/// Style schema version.
pub const STYLE_VERSION: u32 = 8;

/// File name of the style document in the target directory.
pub const STYLE_FILE: &str = "style.json";

fn invalid(reason: String) -> PantilerError {
    PantilerError::InvalidMetadata {
        path: PathBuf::from(METADATA_FILE),
        reason,
    }
}

fn parse_bounds(bounds: &str) -> Result<Vec<f64>> {
    bounds
        .split(',')
        .map(|part| {
            part.trim()
                .parse::<f64>()
                .map_err(|e| invalid(format!("bounds {:?}: {}", bounds, e)))
        })
        .collect()
}

fn parse_zoom(name: &str, zoom: &str) -> Result<u32> {
    zoom.trim()
        .parse()
        .map_err(|e| invalid(format!("{} {:?}: {}", name, zoom, e)))
}

/// Build the default style document.
///
/// `glyphs` and `sprite` are only present when fonts or sprites were built.
pub fn synthesize(
    metadata: &TileMetadata,
    host: &str,
    has_glyphs: bool,
    has_sprites: bool,
    now: DateTime<Utc>,
) -> Result<Map<String, Value>> {
    let host = host.trim_end_matches('/');
    let mut style = Map::new();
    style.insert("version".to_string(), json!(STYLE_VERSION));
    style.insert(
        "metadata".to_string(),
        json!({ "date": now.to_rfc3339_opts(SecondsFormat::Millis, true) }),
    );
    if has_glyphs {
        style.insert(
            "glyphs".to_string(),
            json!(format!("{}/glyphs/{{fontstack}}/{{range}}.pbf", host)),
        );
    }
    if has_sprites {
        style.insert("sprite".to_string(), json!(format!("{}/sprites", host)));
    }
    style.insert(
        "sources".to_string(),
        json!({
            "primary": {
                "type": "vector",
                "tiles": [format!("{}/{{z}}/{{x}}/{{y}}.pbf", host)],
                "bounds": parse_bounds(&metadata.bounds)?,
                "minzoom": parse_zoom("minzoom", &metadata.minzoom)?,
                "maxzoom": parse_zoom("maxzoom", &metadata.maxzoom)?,
            }
        }),
    );
    Ok(style)
}

/// Layer `overrides` over `defaults`; every override key replaces the default.
pub fn merge(defaults: Map<String, Value>, overrides: &Map<String, Value>) -> Map<String, Value> {
    let mut merged = defaults;
    for (key, value) in overrides {
        merged.insert(key.clone(), value.clone());
    }
    merged
}

/// Writes the style document.
pub struct StyleStage<'a> {
    reporter: &'a dyn ProgressReporter,
}

impl<'a> StyleStage<'a> {
    pub fn new(reporter: &'a dyn ProgressReporter) -> Self {
        Self { reporter }
    }

    /// Synthesize, merge and write `style.json` under `target`.
    #[instrument(skip_all, fields(target = %target.display()))]
    pub async fn run(
        &self,
        metadata: &TileMetadata,
        host: &str,
        styling: &Map<String, Value>,
        has_glyphs: bool,
        has_sprites: bool,
        target: &Path,
    ) -> Result<PathBuf> {
        let event = ProgressEvent::process("styling").with_output(STYLE_FILE);
        self.reporter.report(event.clone().with_message(IN_PROGRESS));

        let defaults = synthesize(metadata, host, has_glyphs, has_sprites, Utc::now())?;
        let style = merge(defaults, styling);

        let path = target.join(STYLE_FILE);
        let bytes = serde_json::to_vec_pretty(&Value::Object(style)).map_err(|e| {
            PantilerError::InvalidDocument {
                path: path.clone(),
                reason: e.to_string(),
            }
        })?;
        tokio::fs::write(&path, bytes)
            .await
            .map_err(|e| PantilerError::WriteFailed {
                path: path.clone(),
                source: e,
            })?;

        info!(path = %path.display(), "Wrote style");
        self.reporter.report(event.with_message(DONE));
        Ok(path)
    }
}
