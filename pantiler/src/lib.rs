//! Pantiler - build servable vector-tile datasets from declared geodata
//!
//! This library turns a build spec (hosts, zoom range, fonts, sprites and
//! geodata sources) into a directory of vector tiles, a style document and
//! optional glyph and sprite assets. Geometry conversion and tiling are
//! delegated to external engines; this crate owns the incremental pipeline
//! around them: caching, ordering, process supervision and progress.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use pantiler::{Pipeline, PipelineConfig, TracingReporter};
//!
//! let config = PipelineConfig::new("tiles").with_clear_cache(true);
//! let pipeline = Pipeline::new(config, Arc::new(TracingReporter))?;
//! let summary = pipeline.run(&document).await?;
//! println!("style written to {}", summary.style.display());
//! ```

pub mod cache;
pub mod convert;
pub mod error;
pub mod extract;
pub mod fetch;
pub mod glyphs;
pub mod pipeline;
pub mod process;
pub mod progress;
pub mod sequence;
pub mod spec;
pub mod sprites;
pub mod style;
pub mod tile;

pub use error::{PantilerError, Result};
pub use pipeline::{BuildSummary, Pipeline, PipelineConfig};
pub use process::ToolConfig;
pub use progress::{
    NullReporter, ProgressEvent, ProgressReporter, RecordingReporter, TracingReporter, CACHED,
    DONE, IN_PROGRESS,
};
pub use spec::{validate, BuildSpec, ValidationErrors};
pub use tile::{ClipBounds, TileMetadata};
