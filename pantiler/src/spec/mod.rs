//! Build-spec model and validation.
//!
//! A build spec arrives as an untyped document (the CLI reads YAML or JSON
//! into a [`serde_json::Value`]). [`validate`] checks it structurally,
//! collecting every violation with its path, and only then produces the
//! typed [`BuildSpec`] the pipeline works from.

mod types;
mod validation;

pub use types::{AssetInput, BuildSpec, Location, Output, PointFields, Source, TilingHint};
pub use validation::{render_path, validate, PathSegment, ValidationErrors, Violation};
