//! CLI error types.

use std::io;
use std::path::PathBuf;

use console::style;
use pantiler::PantilerError;
use thiserror::Error;

/// Errors surfaced to the user by the CLI.
#[derive(Debug, Error)]
pub enum CliError {
    #[error("failed to read tilefile {}: {source}", path.display())]
    ReadTilefile { path: PathBuf, source: io::Error },

    #[error("tilefile {} could not be parsed: {source}", path.display())]
    ParseTilefile {
        path: PathBuf,
        source: serde_yaml::Error,
    },

    #[error("failed to open log file {}: {source}", path.display())]
    LogFile { path: PathBuf, source: io::Error },

    #[error(transparent)]
    Pipeline(#[from] PantilerError),
}

impl CliError {
    /// Text printed to stderr before exiting.
    ///
    /// Validation failures list every violation plainly; anything else is a
    /// single highlighted line.
    pub fn render(&self) -> String {
        match self {
            CliError::Pipeline(PantilerError::Validation(errors)) => errors.to_string(),
            other => style(other.to_string()).red().to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pantiler::spec::{ValidationErrors, Violation};

    #[test]
    fn test_validation_lists_violations() {
        console::set_colors_enabled(false);
        let err = CliError::from(PantilerError::Validation(ValidationErrors {
            violations: vec![
                Violation {
                    path: "host".to_string(),
                    message: "invalid url".to_string(),
                },
                Violation {
                    path: "sources[0].outputs".to_string(),
                    message: "required".to_string(),
                },
            ],
        }));
        assert_eq!(
            err.render(),
            "tilefile is not valid:\n  host: invalid url\n  sources[0].outputs: required"
        );
    }

    #[test]
    fn test_other_errors_single_line() {
        console::set_colors_enabled(false);
        let err = CliError::from(PantilerError::TargetExists(PathBuf::from("tiles")));
        assert_eq!(err.render(), "directory already exists: tiles");
    }
}
