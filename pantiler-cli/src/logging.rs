//! Diagnostic logging setup.
//!
//! Logs go to stderr, or to a file when one is given. `RUST_LOG` takes
//! precedence over the level chosen by `--verbose`.

use std::fs::OpenOptions;
use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

use crate::error::CliError;

/// Default filter directives.
pub fn default_directives(verbose: bool) -> &'static str {
    if verbose {
        "warn,pantiler=debug,pantiler_cli=debug"
    } else {
        "warn"
    }
}

/// Install the global subscriber.
///
/// The returned guard must be held until exit so buffered file output is flushed.
pub fn init(verbose: bool, log_file: Option<&Path>) -> Result<Option<WorkerGuard>, CliError> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives(verbose)));

    match log_file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(|e| CliError::LogFile {
                    path: path.to_path_buf(),
                    source: e,
                })?;
            let (writer, guard) = tracing_appender::non_blocking(file);
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(writer)
                .with_ansi(false)
                .init();
            Ok(Some(guard))
        }
        None => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .init();
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verbose_raises_crate_levels() {
        assert_eq!(default_directives(false), "warn");
        assert!(default_directives(true).contains("pantiler=debug"));
        assert!(EnvFilter::try_new(default_directives(true)).is_ok());
    }
}
