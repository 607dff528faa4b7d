//! Pipeline orchestrator.
//!
//! A run moves through a fixed sequence of stages:
//!
//! ```text
//! ┌──────────┐   ┌─────────────┐   ┌────────┐   ┌─────────────────────────────┐
//! │ Validate │──►│ Directories │──►│ Glyphs │──►│ Sources (all concurrently)  │
//! └──────────┘   └─────────────┘   │   ∥    │   │  fetch ─► extract ─► convert│
//!                                  │Sprites │   └──────────────┬──────────────┘
//!                                  └────────┘                  ▼
//!                               ┌─────────┐   ┌───────┐   ┌──────┐
//!                               │ Cleanup │◄──│ Style │◄──│ Tile │
//!                               └─────────┘   └───────┘   └──────┘
//! ```
//!
//! The target-directory check and validation happen before anything is
//! created; a failure there leaves the filesystem untouched. Any later
//! failure aborts the run and leaves whatever cache and output files were
//! already written. The tile stage waits for every source to finish.

mod config;

pub use config::PipelineConfig;

use std::path::PathBuf;
use std::sync::Arc;

use futures::future::try_join_all;
use serde_json::Value;
use tracing::{info, instrument};

use crate::cache::{CacheStore, CacheTally};
use crate::convert::{ConvertStage, ConvertedOutput};
use crate::error::{PantilerError, Result};
use crate::extract::ExtractStage;
use crate::fetch::{FetchStage, HttpDownloader};
use crate::glyphs::GlyphStage;
use crate::process::ProcessSupervisor;
use crate::progress::{ProgressEvent, ProgressReporter};
use crate::spec::{validate, BuildSpec, Source};
use crate::sprites::SpriteStage;
use crate::style::StyleStage;
use crate::tile::{TileMetadata, TileOptions, TileStage};

/// Final message of a successful run.
pub const FINISHED: &str = "Done!";

/// What a successful run produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildSummary {
    /// Path of the written style document.
    pub style: PathBuf,
    pub metadata: TileMetadata,
    /// Number of tile layers.
    pub layers: usize,
    pub glyph_files: usize,
    pub sprite_sheets: usize,
    pub fetched: CacheTally,
    pub extracted: CacheTally,
    pub converted: CacheTally,
}

/// One source's converted outputs and cache counts.
struct SourceBuild {
    outputs: Vec<ConvertedOutput>,
    fetched: CacheTally,
    extracted: CacheTally,
    converted: CacheTally,
}

/// Builds a tile dataset from a build spec.
pub struct Pipeline {
    config: PipelineConfig,
    reporter: Arc<dyn ProgressReporter>,
    cache: CacheStore,
    http: HttpDownloader,
    tiler: ProcessSupervisor,
    converter: ProcessSupervisor,
}

impl Pipeline {
    pub fn new(config: PipelineConfig, reporter: Arc<dyn ProgressReporter>) -> Result<Self> {
        let http = match config.http_timeout {
            Some(timeout) => HttpDownloader::with_timeout(timeout)?,
            None => HttpDownloader::new()?,
        };
        Ok(Self {
            cache: CacheStore::new(config.cache.clone()),
            tiler: ProcessSupervisor::new(config.tippecanoe.clone()),
            converter: ProcessSupervisor::new(config.ogr2ogr.clone()),
            http,
            reporter,
            config,
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Build everything `document` describes into the target directory.
    #[instrument(skip_all, fields(target = %self.config.target.display()))]
    pub async fn run(&self, document: &Value) -> Result<BuildSummary> {
        let target = &self.config.target;
        let exists = tokio::fs::try_exists(target)
            .await
            .map_err(|e| PantilerError::ReadFailed {
                path: target.clone(),
                source: e,
            })?;
        if exists {
            return Err(PantilerError::TargetExists(target.clone()));
        }

        let spec = validate(document)?;
        info!(
            sources = spec.sources.len(),
            fonts = spec.fonts.len(),
            sprites = spec.sprites.len(),
            "Build spec validated"
        );

        tokio::fs::create_dir_all(target)
            .await
            .map_err(|e| PantilerError::CreateDirFailed {
                path: target.clone(),
                source: e,
            })?;
        self.cache.ensure().await?;

        let (glyph_files, sprite_sheets) = self.assets(&spec).await?;

        let builds = try_join_all(spec.sources.iter().map(|source| self.source(source))).await?;

        let mut fetched = CacheTally::default();
        let mut extracted = CacheTally::default();
        let mut converted = CacheTally::default();
        let mut layers = Vec::new();
        for build in builds {
            fetched.add(build.fetched);
            extracted.add(build.extracted);
            converted.add(build.converted);
            layers.extend(build.outputs);
        }

        let reporter = self.reporter.as_ref();
        let options = TileOptions {
            zoom_from: spec.zoom_from,
            zoom_to: spec.zoom_to,
            target: target.clone(),
            bounds: self.config.bounds,
        };
        let metadata = TileStage::new(&self.tiler, reporter)
            .run(&layers, &options)
            .await?;

        let style = StyleStage::new(reporter)
            .run(
                &metadata,
                &spec.host,
                &spec.styling,
                !spec.fonts.is_empty(),
                !spec.sprites.is_empty(),
                target,
            )
            .await?;

        if self.config.clear_cache {
            reporter.report(ProgressEvent::message("Removing cache directory..."));
            self.cache.clear().await?;
        }

        reporter.report(ProgressEvent::message(FINISHED));
        let summary = BuildSummary {
            style,
            metadata,
            layers: layers.len(),
            glyph_files,
            sprite_sheets,
            fetched,
            extracted,
            converted,
        };
        info!(
            layers = summary.layers,
            cache_hits = fetched.hits + extracted.hits + converted.hits,
            "Build complete"
        );
        Ok(summary)
    }

    /// Render glyphs and sprites side by side, skipping whichever is not declared.
    async fn assets(&self, spec: &BuildSpec) -> Result<(usize, usize)> {
        let reporter = self.reporter.as_ref();
        let target = &self.config.target;

        let glyphs = async {
            if spec.fonts.is_empty() {
                return Ok(0);
            }
            GlyphStage::new(&self.http, Arc::clone(&self.config.rasterizer), reporter)
                .run(&spec.fonts, target)
                .await
        };
        let sprites = async {
            if spec.sprites.is_empty() {
                return Ok(0);
            }
            SpriteStage::new(&self.http, reporter)
                .run(&spec.sprites, target)
                .await
        };

        tokio::try_join!(glyphs, sprites)
    }

    /// Fetch, extract and convert one source, strictly in that order.
    #[instrument(skip_all, fields(source = %source.name))]
    async fn source(&self, source: &Source) -> Result<SourceBuild> {
        let reporter = self.reporter.as_ref();

        let fetched = FetchStage::new(&self.cache, &self.http, reporter)
            .run(&source.name, &source.inputs)
            .await?;
        let fetch_tally: CacheTally = fetched.iter().map(|input| input.status).collect();

        let (resolved, extracted) = ExtractStage::new(&self.cache, reporter)
            .run(&source.name, fetched)
            .await?;

        let (outputs, converted) = ConvertStage::new(&self.cache, &self.converter, reporter)
            .run(source, &resolved)
            .await?;

        Ok(SourceBuild {
            outputs,
            fetched: fetch_tally,
            extracted,
            converted,
        })
    }
}
