//! Normalisation of arbitrary inputs through the external conversion engine.
//!
//! Inputs that can't be read in-process are translated by `ogr2ogr` into a
//! WGS84 GeoJSON file in the cache, which the native path then reads.

use std::path::{Path, PathBuf};

use tracing::{debug, instrument};

use crate::cache::{commit, label, partial_path, CacheStatus, CacheStore};
use crate::error::Result;
use crate::extract::ResolvedInput;
use crate::process::ProcessSupervisor;
use crate::progress::{ProgressEvent, ProgressReporter, CACHED, DONE, IN_PROGRESS};
use crate::spec::PointFields;

/// Target system of every normalised file.
pub const TARGET_SYSTEM: &str = "EPSG:4326";

/// Cache extension of normalised files.
pub const NORMALISED_EXTENSION: &str = "wgs84.geo.json";

/// What to translate.
#[derive(Debug, Clone, Copy)]
pub struct Translation<'a> {
    pub source: &'a str,
    pub system: &'a str,
    pub input: &'a ResolvedInput,
    /// Number of inputs declared by the source.
    pub siblings: usize,
    pub layer: Option<&'a str>,
    pub point_fields: Option<&'a PointFields>,
}

impl Translation<'_> {
    fn is_csv(&self) -> bool {
        self.input.extension.eq_ignore_ascii_case("csv")
    }

    /// Cache path of the normalised file, `{source}[-{input}][-{layer}].wgs84.geo.json`.
    pub fn destination(&self, cache: &CacheStore) -> PathBuf {
        let mut variant = Vec::new();
        if self.siblings > 1 {
            variant.push(self.input.name.as_str());
        }
        variant.extend(self.layer);
        let variant = variant.join("-");
        let variant = (!variant.is_empty()).then_some(variant.as_str());
        cache.path(self.source, variant, NORMALISED_EXTENSION)
    }

    /// Layer the engine reads: the declared one, else the file's own name.
    fn source_layer(&self) -> String {
        match self.layer {
            Some(layer) => layer.to_string(),
            None => self
                .input
                .path
                .file_stem()
                .map(|stem| stem.to_string_lossy().into_owned())
                .unwrap_or_else(|| self.input.name.clone()),
        }
    }

    /// SQL building point geometry from the longitude and latitude fields.
    fn point_query(&self, fields: &PointFields) -> String {
        format!(
            "SELECT *, MakePoint(CAST({} AS REAL), CAST({} AS REAL)) AS geometry FROM {}",
            quote_identifier(&fields.longitude),
            quote_identifier(&fields.latitude),
            quote_identifier(&self.source_layer()),
        )
    }

    /// Engine arguments writing to `dest`.
    pub fn args(&self, dest: &Path) -> Vec<String> {
        let mut args = vec![
            "-f".to_string(),
            "GeoJSON".to_string(),
            "-s_srs".to_string(),
            self.system.to_string(),
            "-t_srs".to_string(),
            TARGET_SYSTEM.to_string(),
        ];

        let query = match self.point_fields {
            Some(fields) if self.is_csv() => {
                args.extend([
                    "-oo".to_string(),
                    format!("X_POSSIBLE_NAMES={}", fields.longitude),
                    "-oo".to_string(),
                    format!("Y_POSSIBLE_NAMES={}", fields.latitude),
                ]);
                None
            }
            Some(fields) => Some(self.point_query(fields)),
            None => None,
        };
        if let Some(query) = &query {
            args.extend([
                "-dialect".to_string(),
                "SQLite".to_string(),
                "-sql".to_string(),
                query.clone(),
            ]);
        }

        args.push(dest.display().to_string());
        args.push(self.input.path.display().to_string());
        // A query names its layer itself
        if let (None, Some(layer)) = (&query, self.layer) {
            args.push(layer.to_string());
        }
        args
    }
}

fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Runs the conversion engine with caching.
pub struct Translator<'a> {
    cache: &'a CacheStore,
    engine: &'a ProcessSupervisor,
    reporter: &'a dyn ProgressReporter,
}

impl<'a> Translator<'a> {
    pub fn new(
        cache: &'a CacheStore,
        engine: &'a ProcessSupervisor,
        reporter: &'a dyn ProgressReporter,
    ) -> Self {
        Self {
            cache,
            engine,
            reporter,
        }
    }

    /// Produce the normalised file for `translation`, reusing a cached one.
    #[instrument(skip_all, fields(source = translation.source, input = %translation.input.name))]
    pub async fn normalise(&self, translation: Translation<'_>) -> Result<(PathBuf, CacheStatus)> {
        let dest = translation.destination(self.cache);
        let event = ProgressEvent::process("normalising")
            .with_input(format!("{}/{}", translation.source, translation.input.name))
            .with_output(label(&dest));

        if self.cache.exists(&dest).await {
            self.reporter.report(event.with_message(CACHED));
            return Ok((dest, CacheStatus::Hit));
        }

        let partial = partial_path(&dest);
        let args = translation.args(&partial);
        // The engine refuses to overwrite a leftover partial file
        if tokio::fs::remove_file(&partial).await.is_ok() {
            debug!(path = %partial.display(), "Removed stale partial file");
        }

        self.reporter.report(event.clone().with_message(IN_PROGRESS));
        self.engine.run(&args, self.reporter, &event).await?;
        commit(&partial, &dest).await?;
        self.reporter.report(event.with_message(DONE));
        Ok((dest, CacheStatus::Produced))
    }
}
