//! Error types for the build pipeline.
//!
//! Every stage reports failures through [`PantilerError`]. Errors always
//! abort the whole run; nothing is retried and there is no partial-success
//! reporting.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::spec::ValidationErrors;

/// Result type for pipeline operations.
pub type Result<T> = std::result::Result<T, PantilerError>;

/// Errors that can occur while building a tile dataset.
#[derive(Debug, Error)]
pub enum PantilerError {
    /// The build spec failed structural validation.
    #[error("{0}")]
    Validation(ValidationErrors),

    /// An input declares neither a `url` nor a `path`.
    #[error("{source_name}/{input}: need to specify either url or path")]
    MissingLocation { source_name: String, input: String },

    /// An archive expanded into several files and none is the primary format.
    #[error("{source_name}/{archive}: archive has multiple files, unclear which is main")]
    AmbiguousArchive { source_name: String, archive: String },

    /// The target directory already exists.
    #[error("directory already exists: {}", .0.display())]
    TargetExists(PathBuf),

    /// An external tool could not be run at all.
    #[error("{tool} could not run")]
    ToolUnavailable { tool: String },

    /// An external tool ran but exited unsuccessfully.
    #[error("{tool} failure{}", describe_failure(.status, .usage))]
    ToolFailed {
        tool: String,
        status: Option<i32>,
        usage: bool,
    },

    /// Failed to read a file or directory.
    #[error("failed to read {}: {source}", path.display())]
    ReadFailed { path: PathBuf, source: io::Error },

    /// Failed to write a file.
    #[error("failed to write {}: {source}", path.display())]
    WriteFailed { path: PathBuf, source: io::Error },

    /// Failed to create a directory.
    #[error("failed to create directory {}: {source}", path.display())]
    CreateDirFailed { path: PathBuf, source: io::Error },

    /// The HTTP client could not be constructed.
    #[error("failed to create HTTP client: {0}")]
    HttpClient(String),

    /// Failed to download a remote input.
    #[error("failed to download {url}: {reason}")]
    DownloadFailed { url: String, reason: String },

    /// Archive extraction failed.
    #[error("failed to extract {}: {reason}", path.display())]
    ExtractionFailed { path: PathBuf, reason: String },

    /// A data file could not be parsed or produced.
    #[error("invalid document {}: {reason}", path.display())]
    InvalidDocument { path: PathBuf, reason: String },

    /// The tiling engine's metadata could not be interpreted.
    #[error("invalid tile metadata {}: {reason}", path.display())]
    InvalidMetadata { path: PathBuf, reason: String },

    /// Clip bounds were not four comma-separated numbers.
    #[error("invalid bounds {value:?}: {reason}")]
    InvalidBounds { value: String, reason: String },

    /// Font data could not be parsed.
    #[error("invalid font {font}: {reason}")]
    InvalidFont { font: String, reason: String },

    /// A sprite image could not be decoded or the sheet could not be encoded.
    #[error("invalid sprite image {name}: {reason}")]
    InvalidImage { name: String, reason: String },

    /// A blocking worker panicked or was cancelled.
    #[error("background task failed: {0}")]
    Task(String),
}

fn describe_failure(status: &Option<i32>, usage: &bool) -> String {
    match (*usage, status) {
        (true, _) => " (rejected its arguments)".to_string(),
        (false, Some(code)) => format!(" (exit status {})", code),
        (false, None) => " (terminated by signal)".to_string(),
    }
}

impl From<ValidationErrors> for PantilerError {
    fn from(errors: ValidationErrors) -> Self {
        PantilerError::Validation(errors)
    }
}

impl From<tokio::task::JoinError> for PantilerError {
    fn from(e: tokio::task::JoinError) -> Self {
        PantilerError::Task(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_location_names_source_and_input() {
        let err = PantilerError::MissingLocation {
            source_name: "rivers".to_string(),
            input: "north".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "rivers/north: need to specify either url or path"
        );
    }

    #[test]
    fn test_tool_failed_display() {
        let err = PantilerError::ToolFailed {
            tool: "tippecanoe".to_string(),
            status: Some(2),
            usage: false,
        };
        assert_eq!(err.to_string(), "tippecanoe failure (exit status 2)");

        let err = PantilerError::ToolFailed {
            tool: "tippecanoe".to_string(),
            status: Some(1),
            usage: true,
        };
        assert!(err.to_string().contains("rejected its arguments"));
    }

    #[test]
    fn test_target_exists_display() {
        let err = PantilerError::TargetExists(PathBuf::from("/tmp/out"));
        assert_eq!(err.to_string(), "directory already exists: /tmp/out");
    }
}
