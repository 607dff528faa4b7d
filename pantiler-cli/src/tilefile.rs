//! Loading tilefiles.
//!
//! A tilefile is YAML (JSON works too, being a subset). It is read into an
//! untyped document; the library does all validation.

use std::path::Path;

use serde_json::Value;

use crate::error::CliError;

/// Read and parse the tilefile at `path`.
pub fn load(path: &Path) -> Result<Value, CliError> {
    let text = std::fs::read_to_string(path).map_err(|e| CliError::ReadTilefile {
        path: path.to_path_buf(),
        source: e,
    })?;
    parse(path, &text)
}

pub fn parse(path: &Path, text: &str) -> Result<Value, CliError> {
    serde_yaml::from_str(text).map_err(|e| CliError::ParseTilefile {
        path: path.to_path_buf(),
        source: e,
    })
}
