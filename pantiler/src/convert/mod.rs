//! Convert stage: fold a source's inputs into one GeoJSON file per output.
//!
//! Outputs of a source are produced strictly one after another. For each
//! output whose cache file is missing, every input is read in declaration
//! order:
//!
//! - GeoJSON in a system [`Reprojection`] understands is read directly;
//! - anything else is first normalised to WGS84 GeoJSON by the conversion
//!   engine (see [`Translator`]).
//!
//! Each feature gets its properties remapped as text plus the output's
//! additional properties, its geometry taken from the point fields or its
//! own geometry and reprojected, and the output's tiling hint. The result is written to a `.part` file and renamed
//! onto `{cache}/{source}[-{output}].geo.json`.

mod feature;
mod reproject;
mod translator;

pub use feature::{
    annotate, point_from_fields, read_features, remap, text, FeatureReader, GeoJsonFeature,
};
pub use reproject::{Reprojection, EARTH_RADIUS};
pub use translator::{Translation, Translator, NORMALISED_EXTENSION, TARGET_SYSTEM};

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use serde_json::{json, Map, Value};
use tracing::{info, instrument};

use crate::cache::{commit, label, partial_path, CacheStatus, CacheStore, CacheTally};
use crate::error::{PantilerError, Result};
use crate::extract::ResolvedInput;
use crate::process::ProcessSupervisor;
use crate::progress::{ProgressEvent, ProgressReporter, CACHED, DONE, IN_PROGRESS};
use crate::sequence::run_in_order;
use crate::spec::{Output, PointFields, Source, TilingHint};

/// Cache extension of converted outputs.
pub const OUTPUT_EXTENSION: &str = "geo.json";

/// Input extensions read without the conversion engine.
pub const NATIVE_EXTENSIONS: &[&str] = &["json", "geojson"];

/// A converted output, ready for tiling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConvertedOutput {
    /// Output name, which becomes the tile layer name.
    pub name: String,
    pub path: PathBuf,
    pub status: CacheStatus,
}

/// One input as the output writer reads it.
#[derive(Debug, Clone)]
struct PreparedInput {
    path: PathBuf,
    reprojection: Reprojection,
    point_fields: Option<PointFields>,
}

/// Converts sources into per-output GeoJSON files.
pub struct ConvertStage<'a> {
    cache: &'a CacheStore,
    engine: &'a ProcessSupervisor,
    reporter: &'a dyn ProgressReporter,
}

impl<'a> ConvertStage<'a> {
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

    /// Convert every output of `source`, in declaration order.
    #[instrument(skip_all, fields(source = %source.name))]
    pub async fn run(
        &self,
        source: &Source,
        inputs: &[ResolvedInput],
    ) -> Result<(Vec<ConvertedOutput>, CacheTally)> {
        let results = run_in_order(&source.outputs, |output| {
            self.convert_output(source, inputs, output)
        })
        .await?;

        let mut tally = CacheTally::default();
        let mut converted = Vec::with_capacity(results.len());
        for (output, counts) in results {
            tally.add(counts);
            converted.push(output);
        }
        Ok((converted, tally))
    }

    async fn convert_output(
        &self,
        source: &Source,
        inputs: &[ResolvedInput],
        output: &Output,
    ) -> Result<(ConvertedOutput, CacheTally)> {
        let dest = self.cache.entry(
            &source.name,
            &output.name,
            source.outputs.len(),
            OUTPUT_EXTENSION,
        );
        let event = ProgressEvent::process("converting")
            .with_input(format!("{}/{}", source.name, output.name))
            .with_output(label(&dest));
        let mut tally = CacheTally::default();

        if self.cache.exists(&dest).await {
            self.reporter.report(event.with_message(CACHED));
            tally.record(CacheStatus::Hit);
            return Ok((
                ConvertedOutput {
                    name: output.name.clone(),
                    path: dest,
                    status: CacheStatus::Hit,
                },
                tally,
            ));
        }

        self.reporter.report(event.clone().with_message(IN_PROGRESS));

        let point_fields = source.point_fields();
        let translator = Translator::new(self.cache, self.engine, self.reporter);
        let mut prepared = Vec::with_capacity(inputs.len());
        for input in inputs {
            let native = NATIVE_EXTENSIONS
                .iter()
                .any(|ext| input.extension.eq_ignore_ascii_case(ext));
            match (native, Reprojection::for_system(&source.system)) {
                (true, Some(reprojection)) => prepared.push(PreparedInput {
                    path: input.path.clone(),
                    reprojection,
                    point_fields: point_fields.clone(),
                }),
                _ => {
                    let translation = Translation {
                        source: &source.name,
                        system: &source.system,
                        input,
                        siblings: inputs.len(),
                        layer: output.layer.as_deref(),
                        point_fields: point_fields.as_ref(),
                    };
                    let (path, status) = translator.normalise(translation).await?;
                    tally.record(status);
                    prepared.push(PreparedInput {
                        path,
                        reprojection: Reprojection::Identity,
                        point_fields: None,
                    });
                }
            }
        }

        let partial = partial_path(&dest);
        let annotation = Annotation {
            fields: output.fields.clone(),
            additional: output.additional.clone(),
            hint: output.tiling_hint(),
        };
        let target = partial.clone();
        let count =
            tokio::task::spawn_blocking(move || write_output(&prepared, &annotation, &target))
                .await??;
        commit(&partial, &dest).await?;

        info!(output = %output.name, features = count, path = %dest.display(), "Converted output");
        self.reporter.report(event.with_message(DONE));
        tally.record(CacheStatus::Produced);

        Ok((
            ConvertedOutput {
                name: output.name.clone(),
                path: dest,
                status: CacheStatus::Produced,
            },
            tally,
        ))
    }
}

/// What an output sets on each of its features.
#[derive(Debug, Clone)]
struct Annotation {
    fields: Option<BTreeMap<String, String>>,
    additional: Option<Map<String, Value>>,
    hint: Option<TilingHint>,
}

/// Build one output feature from a source feature.
fn convert_feature(
    raw: &Value,
    input: &PreparedInput,
    annotation: &Annotation,
    hint: Option<&Value>,
) -> Value {
    let reader = GeoJsonFeature::new(raw);
    let geometry = match &input.point_fields {
        Some(point) => point_from_fields(&reader, point).map(|(x, y)| {
            let (lon, lat) = input.reprojection.position(x, y);
            json!({ "type": "Point", "coordinates": [lon, lat] })
        }),
        None => reader.geometry().cloned().map(|mut geometry| {
            input.reprojection.geometry(&mut geometry);
            geometry
        }),
    };

    let mut properties = remap(&reader, annotation.fields.as_ref());
    annotate(&mut properties, annotation.additional.as_ref());
    let mut feature = json!({
        "type": "Feature",
        "properties": properties,
        "geometry": geometry.unwrap_or(Value::Null),
    });
    if let Some(hint) = hint {
        feature["tippecanoe"] = hint.clone();
    }
    feature
}

/// Write the feature collection for one output, returning the feature count.
fn write_output(inputs: &[PreparedInput], annotation: &Annotation, dest: &Path) -> Result<usize> {
    let invalid = |reason: String| PantilerError::InvalidDocument {
        path: dest.to_path_buf(),
        reason,
    };
    let hint = annotation
        .hint
        .map(serde_json::to_value)
        .transpose()
        .map_err(|e| invalid(e.to_string()))?;

    let mut features = Vec::new();
    for input in inputs {
        for raw in read_features(&input.path)? {
            features.push(convert_feature(&raw, input, annotation, hint.as_ref()));
        }
    }
    let count = features.len();
    let collection = json!({ "type": "FeatureCollection", "features": features });

    let write_failed = |e| PantilerError::WriteFailed {
        path: dest.to_path_buf(),
        source: e,
    };
    let file = File::create(dest).map_err(write_failed)?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer(&mut writer, &collection).map_err(|e| invalid(e.to_string()))?;
    writer.flush().map_err(write_failed)?;
    writer.get_ref().sync_all().map_err(write_failed)?;
    Ok(count)
}
