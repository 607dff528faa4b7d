//! Spawning and supervising external tools.

use std::path::PathBuf;
use std::process::Stdio;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tracing::{debug, info, instrument, warn};

use super::classifier::{LineClass, LineClassifier};
use crate::error::{PantilerError, Result};
use crate::progress::{ProgressEvent, ProgressReporter};

/// How to find and probe an external tool.
///
/// The executable is always named explicitly; the supervisor never edits
/// `PATH` to locate a bundled binary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolConfig {
    /// Name used in errors and logs.
    pub name: String,
    /// Executable to run, either a bare name resolved through `PATH` or a path.
    pub program: PathBuf,
    /// Arguments that make the tool print its version and exit successfully.
    pub version_args: Vec<String>,
    /// Line prefix that announces a usage banner.
    pub usage_marker: String,
}

impl ToolConfig {
    pub fn new(name: impl Into<String>, program: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            program: program.into(),
            version_args: vec!["--version".to_string()],
            usage_marker: "Usage".to_string(),
        }
    }

    /// The tile-generation engine.
    pub fn tippecanoe() -> Self {
        Self::new("tippecanoe", "tippecanoe").with_version_args(["-v"])
    }

    /// The reprojection / format-conversion engine.
    pub fn ogr2ogr() -> Self {
        Self::new("ogr2ogr", "ogr2ogr")
    }

    pub fn with_program(mut self, program: impl Into<PathBuf>) -> Self {
        self.program = program.into();
        self
    }

    pub fn with_version_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.version_args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_usage_marker(mut self, marker: impl Into<String>) -> Self {
        self.usage_marker = marker.into();
        self
    }
}

/// Which of the child's output streams a line came from.
#[derive(Debug, Clone, Copy)]
enum Stream {
    Stdout,
    Stderr,
}

impl Stream {
    fn close(self, stdout_open: &mut bool, stderr_open: &mut bool) {
        match self {
            Stream::Stdout => *stdout_open = false,
            Stream::Stderr => *stderr_open = false,
        }
    }
}

/// Decode one raw output line, replacing invalid UTF-8 and dropping the line ending.
fn decode_line(bytes: &[u8]) -> String {
    let bytes = bytes.strip_suffix(b"\n").unwrap_or(bytes);
    let bytes = bytes.strip_suffix(b"\r").unwrap_or(bytes);
    String::from_utf8_lossy(bytes).into_owned()
}

/// Runs one external tool, streaming its output to a progress reporter.
#[derive(Debug, Clone)]
pub struct ProcessSupervisor {
    tool: ToolConfig,
}

impl ProcessSupervisor {
    pub fn new(tool: ToolConfig) -> Self {
        Self { tool }
    }

    pub fn tool(&self) -> &ToolConfig {
        &self.tool
    }

    /// Check the tool can be run by invoking its version probe.
    pub async fn ensure_available(&self) -> Result<()> {
        let status = Command::new(&self.tool.program)
            .args(&self.tool.version_args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await;

        match status {
            Ok(status) if status.success() => {
                debug!(tool = %self.tool.name, "Tool available");
                Ok(())
            }
            Ok(status) => {
                warn!(tool = %self.tool.name, code = ?status.code(), "Version probe failed");
                Err(self.unavailable())
            }
            Err(e) => {
                warn!(tool = %self.tool.name, error = %e, "Tool could not be started");
                Err(self.unavailable())
            }
        }
    }

    /// Run the tool to completion.
    ///
    /// Each output line is classified; progress lines are sent to `reporter`
    /// as copies of `template` carrying the line as their message. A non-zero
    /// exit is reported as [`PantilerError::ToolFailed`] without the output
    /// attached, since it has already been streamed.
    #[instrument(skip_all, fields(tool = %self.tool.name))]
    pub async fn run(
        &self,
        args: &[String],
        reporter: &dyn ProgressReporter,
        template: &ProgressEvent,
    ) -> Result<()> {
        self.ensure_available().await?;

        info!(args = ?args, "Spawning tool");
        let mut child = Command::new(&self.tool.program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                warn!(error = %e, "Spawn failed");
                self.unavailable()
            })?;

        let mut classifier = LineClassifier::new(self.tool.usage_marker.clone());

        if let (Some(stdout), Some(stderr)) = (child.stdout.take(), child.stderr.take()) {
            let mut stdout = BufReader::new(stdout);
            let mut stderr = BufReader::new(stderr);
            // Partial reads survive a lost select race in these buffers
            let mut stdout_line = Vec::new();
            let mut stderr_line = Vec::new();
            let mut stdout_open = true;
            let mut stderr_open = true;

            while stdout_open || stderr_open {
                let (read, stream) = tokio::select! {
                    read = stdout.read_until(b'\n', &mut stdout_line), if stdout_open => (read, Stream::Stdout),
                    read = stderr.read_until(b'\n', &mut stderr_line), if stderr_open => (read, Stream::Stderr),
                };
                let buffer = match stream {
                    Stream::Stdout => &mut stdout_line,
                    Stream::Stderr => &mut stderr_line,
                };
                match read {
                    Ok(read) => {
                        if !buffer.is_empty() {
                            self.forward(&mut classifier, &decode_line(buffer), reporter, template);
                            buffer.clear();
                        }
                        if read == 0 {
                            stream.close(&mut stdout_open, &mut stderr_open);
                        }
                    }
                    Err(e) => {
                        warn!(error = %e, "Reading tool output failed, ignoring rest of stream");
                        stream.close(&mut stdout_open, &mut stderr_open);
                    }
                }
            }
        }

        let status = child.wait().await.map_err(|e| {
            warn!(error = %e, "Waiting for tool failed");
            self.unavailable()
        })?;

        if status.success() {
            info!("Tool finished");
            Ok(())
        } else {
            warn!(code = ?status.code(), usage = classifier.in_usage_error(), "Tool failed");
            Err(PantilerError::ToolFailed {
                tool: self.tool.name.clone(),
                status: status.code(),
                usage: classifier.in_usage_error(),
            })
        }
    }

    /// Classify one raw line, which may hold several carriage-return separated updates.
    fn forward(
        &self,
        classifier: &mut LineClassifier,
        line: &str,
        reporter: &dyn ProgressReporter,
        template: &ProgressEvent,
    ) {
        for piece in line.split('\r') {
            debug!(line = piece, "Tool output");
            if let LineClass::Progress(message) = classifier.classify(piece) {
                reporter.report(template.clone().with_message(message));
            }
        }
    }

    fn unavailable(&self) -> PantilerError {
        PantilerError::ToolUnavailable {
            tool: self.tool.name.clone(),
        }
    }
}
