//! Tile stage: one tiling-engine invocation over every converted output.
//!
//! The engine writes `{z}/{x}/{y}.pbf` files straight into the target
//! directory together with a `metadata.json` describing the tileset. That
//! file is read for the style document and then removed.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde_json::Value;
use tracing::{info, instrument};

use crate::convert::ConvertedOutput;
use crate::error::{PantilerError, Result};
use crate::process::ProcessSupervisor;
use crate::progress::{ProgressEvent, ProgressReporter, DONE, IN_PROGRESS};

/// Metadata file the engine leaves in the output directory.
pub const METADATA_FILE: &str = "metadata.json";

/// A WGS84 box data is clipped to.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClipBounds {
    pub min_longitude: f64,
    pub min_latitude: f64,
    pub max_longitude: f64,
    pub max_latitude: f64,
}

impl fmt::Display for ClipBounds {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{},{},{},{}",
            self.min_longitude, self.min_latitude, self.max_longitude, self.max_latitude
        )
    }
}

impl FromStr for ClipBounds {
    type Err = PantilerError;

    /// Parse `minLon,minLat,maxLon,maxLat`.
    fn from_str(s: &str) -> Result<Self> {
        let invalid = |reason: &str| PantilerError::InvalidBounds {
            value: s.to_string(),
            reason: reason.to_string(),
        };
        let values = s
            .split(',')
            .map(|part| part.trim().parse::<f64>())
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| invalid(&e.to_string()))?;
        match values[..] {
            [min_longitude, min_latitude, max_longitude, max_latitude] => Ok(Self {
                min_longitude,
                min_latitude,
                max_longitude,
                max_latitude,
            }),
            _ => Err(invalid("expected minLon,minLat,maxLon,maxLat")),
        }
    }
}

/// Tileset description reported by the engine.
///
/// Values are kept as the engine wrote them; the style stage turns them
/// into numbers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TileMetadata {
    /// `minLon,minLat,maxLon,maxLat`.
    pub bounds: String,
    pub minzoom: String,
    pub maxzoom: String,
}

impl TileMetadata {
    /// Parse the engine's metadata document.
    pub fn parse(path: &Path, bytes: &[u8]) -> Result<Self> {
        let invalid = |reason: String| PantilerError::InvalidMetadata {
            path: path.to_path_buf(),
            reason,
        };
        let document: Value = serde_json::from_slice(bytes).map_err(|e| invalid(e.to_string()))?;
        let field = |key: &str| match document.get(key) {
            Some(Value::String(s)) => Ok(s.clone()),
            Some(Value::Number(n)) => Ok(n.to_string()),
            _ => Err(invalid(format!("missing {}", key))),
        };
        Ok(Self {
            bounds: field("bounds")?,
            minzoom: field("minzoom")?,
            maxzoom: field("maxzoom")?,
        })
    }
}

/// What to tile and where.
#[derive(Debug, Clone, PartialEq)]
pub struct TileOptions {
    pub zoom_from: u32,
    pub zoom_to: u32,
    pub target: PathBuf,
    pub bounds: Option<ClipBounds>,
}

/// Engine arguments naming every output file as a layer.
pub fn args(layers: &[ConvertedOutput], options: &TileOptions) -> Vec<String> {
    let mut args = vec![
        format!("--minimum-zoom={}", options.zoom_from),
        format!("--maximum-zoom={}", options.zoom_to),
        format!("--output-to-directory={}", options.target.display()),
        "--generate-ids".to_string(),
        "--no-tile-compression".to_string(),
    ];
    args.extend(
        layers
            .iter()
            .map(|layer| format!("--named-layer={}:{}", layer.name, layer.path.display())),
    );
    if let Some(bounds) = options.bounds {
        args.push(format!("--clip-bounding-box={}", bounds));
    }
    args
}

/// Runs the tiling engine.
pub struct TileStage<'a> {
    engine: &'a ProcessSupervisor,
    reporter: &'a dyn ProgressReporter,
}

impl<'a> TileStage<'a> {
    pub fn new(engine: &'a ProcessSupervisor, reporter: &'a dyn ProgressReporter) -> Self {
        Self { engine, reporter }
    }

    /// Tile `layers` into `options.target` and consume the metadata file.
    #[instrument(skip_all, fields(layers = layers.len()))]
    pub async fn run(&self, layers: &[ConvertedOutput], options: &TileOptions) -> Result<TileMetadata> {
        let event = ProgressEvent::process("tiling");
        self.reporter.report(event.clone().with_message(IN_PROGRESS));

        self.engine
            .run(&args(layers, options), self.reporter, &event)
            .await?;

        let path = options.target.join(METADATA_FILE);
        let bytes = tokio::fs::read(&path)
            .await
            .map_err(|e| PantilerError::ReadFailed {
                path: path.clone(),
                source: e,
            })?;
        let metadata = TileMetadata::parse(&path, &bytes)?;
        tokio::fs::remove_file(&path)
            .await
            .map_err(|e| PantilerError::WriteFailed {
                path: path.clone(),
                source: e,
            })?;

        info!(bounds = %metadata.bounds, minzoom = %metadata.minzoom, maxzoom = %metadata.maxzoom, "Tiled");
        self.reporter.report(event.with_message(DONE));
        Ok(metadata)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CacheStatus;
    use crate::process::ToolConfig;
    use crate::progress::RecordingReporter;
    use tempfile::TempDir;

    fn layer(name: &str, path: &str) -> ConvertedOutput {
        ConvertedOutput {
            name: name.to_string(),
            path: PathBuf::from(path),
            status: CacheStatus::Produced,
        }
    }

    fn options(target: &Path, bounds: Option<ClipBounds>) -> TileOptions {
        TileOptions {
            zoom_from: 2,
            zoom_to: 10,
            target: target.to_path_buf(),
            bounds,
        }
    }

    #[test]
    fn test_args_name_every_layer() {
        let layers = vec![layer("roads", "/c/roads.geo.json"), layer("rail", "/c/mix-rail.geo.json")];
        let args = args(&layers, &options(Path::new("/out"), None));
        assert_eq!(
            args,
            vec![
                "--minimum-zoom=2",
                "--maximum-zoom=10",
                "--output-to-directory=/out",
                "--generate-ids",
                "--no-tile-compression",
                "--named-layer=roads:/c/roads.geo.json",
                "--named-layer=rail:/c/mix-rail.geo.json",
            ]
        );
    }

    #[test]
    fn test_args_clip_when_bounded() {
        let bounds: ClipBounds = "-1.5, 50,2,55.25".parse().unwrap();
        let args = args(&[], &options(Path::new("/out"), Some(bounds)));
        assert_eq!(args.last().unwrap(), "--clip-bounding-box=-1.5,50,2,55.25");
    }

    #[test]
    fn test_bounds_rejects_bad_input() {
        assert!(matches!(
            "1,2,3".parse::<ClipBounds>(),
            Err(PantilerError::InvalidBounds { .. })
        ));
        assert!("1,2,x,4".parse::<ClipBounds>().is_err());
    }

    #[test]
    fn test_metadata_strings_or_numbers() {
        let path = Path::new("metadata.json");
        let metadata =
            TileMetadata::parse(path, br#"{"bounds":"-1,2,3,4","minzoom":"2","maxzoom":10}"#).unwrap();
        assert_eq!(
            metadata,
            TileMetadata {
                bounds: "-1,2,3,4".to_string(),
                minzoom: "2".to_string(),
                maxzoom: "10".to_string(),
            }
        );

        let err = TileMetadata::parse(path, br#"{"bounds":"-1,2,3,4"}"#).unwrap_err();
        assert!(err.to_string().contains("missing minzoom"));
    }

    #[cfg(unix)]
    fn fake_engine(dir: &Path, body: &str) -> ProcessSupervisor {
        use std::os::unix::fs::PermissionsExt;

        let script = dir.join("fake-tippecanoe");
        std::fs::write(&script, format!("#!/bin/sh\n{}\n", body)).unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();
        ProcessSupervisor::new(ToolConfig::tippecanoe().with_program(script))
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_run_reads_and_removes_metadata() {
        let temp = TempDir::new().unwrap();
        let target = temp.path().join("out");
        std::fs::create_dir(&target).unwrap();
        let engine = fake_engine(
            temp.path(),
            r#"[ "$1" = "-v" ] && exit 0
for arg in "$@"; do
  case "$arg" in --output-to-directory=*) dir="${arg#*=}" ;; esac
done
echo 'Read 3 features' >&2
printf '{"bounds":"-1,2,3,4","minzoom":"2","maxzoom":"10"}' > "$dir/metadata.json""#,
        );
        let reporter = RecordingReporter::new();

        let metadata = TileStage::new(&engine, &reporter)
            .run(&[layer("roads", "/c/roads.geo.json")], &options(&target, None))
            .await
            .unwrap();

        assert_eq!(metadata.maxzoom, "10");
        assert!(!target.join(METADATA_FILE).exists());
        assert_eq!(
            reporter.messages(),
            vec!["in progress...", "read 3 features", "done"]
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_run_without_metadata_fails() {
        let temp = TempDir::new().unwrap();
        let engine = fake_engine(temp.path(), "exit 0");

        let err = TileStage::new(&engine, &RecordingReporter::new())
            .run(&[], &options(temp.path(), None))
            .await
            .unwrap_err();

        assert!(matches!(err, PantilerError::ReadFailed { .. }));
    }
}
