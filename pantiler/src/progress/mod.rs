//! Progress events emitted while a build runs.
//!
//! Stages describe what they are doing through [`ProgressEvent`]s sent to a
//! [`ProgressReporter`]. Rendering is the reporter's business; this module
//! only fixes the event contract:
//!
//! ```text
//! { process?, input?, output?, message }
//! ```
//!
//! `message` is free-form text or one of the sentinels [`IN_PROGRESS`],
//! [`DONE`] and [`CACHED`], which reporters may style distinctly.

use std::fmt;
use std::sync::{Arc, Mutex};

use tracing::info;

/// Sentinel message for work that has started.
pub const IN_PROGRESS: &str = "in progress...";

/// Sentinel message for work that has finished.
pub const DONE: &str = "done";

/// Sentinel message for work skipped because its cache file exists.
pub const CACHED: &str = "using cache";

/// A single status update.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ProgressEvent {
    pub process: Option<String>,
    pub input: Option<String>,
    pub output: Option<String>,
    pub message: String,
}

impl ProgressEvent {
    /// A bare message with no process, input or output.
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            ..Default::default()
        }
    }

    /// Start an event for the named process.
    pub fn process(process: impl Into<String>) -> Self {
        Self {
            process: Some(process.into()),
            ..Default::default()
        }
    }

    pub fn with_input(mut self, input: impl Into<String>) -> Self {
        self.input = Some(input.into());
        self
    }

    pub fn with_output(mut self, output: impl Into<String>) -> Self {
        self.output = Some(output.into());
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    /// Key identifying the line of work this event belongs to.
    ///
    /// Consecutive events with the same key describe the same unit of work.
    pub fn key(&self) -> String {
        [&self.process, &self.input, &self.output]
            .into_iter()
            .flatten()
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join("-")
    }

    pub fn is_done(&self) -> bool {
        self.message == DONE
    }

    pub fn is_in_progress(&self) -> bool {
        self.message == IN_PROGRESS
    }
}

impl fmt::Display for ProgressEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(process) = &self.process {
            write!(f, "{}", process)?;
        }
        if let Some(input) = &self.input {
            write!(f, " {}", input)?;
        }
        if let Some(output) = &self.output {
            write!(f, " -> {}", output)?;
        }
        if self.process.is_some() || self.input.is_some() || self.output.is_some() {
            write!(f, ": ")?;
        }
        write!(f, "{}", self.message)
    }
}

/// A sink for progress events.
///
/// Implementations must be cheap to call and safe to share across the
/// concurrently running source chains.
pub trait ProgressReporter: Send + Sync {
    fn report(&self, event: ProgressEvent);
}

/// Discards every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullReporter;

impl ProgressReporter for NullReporter {
    fn report(&self, _event: ProgressEvent) {}
}

/// Forwards events to `tracing` at info level.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingReporter;

impl ProgressReporter for TracingReporter {
    fn report(&self, event: ProgressEvent) {
        info!(
            process = event.process.as_deref().unwrap_or(""),
            input = event.input.as_deref().unwrap_or(""),
            output = event.output.as_deref().unwrap_or(""),
            "{}",
            event.message
        );
    }
}

/// Keeps every event in memory, in arrival order.
#[derive(Debug, Default, Clone)]
pub struct RecordingReporter {
    events: Arc<Mutex<Vec<ProgressEvent>>>,
}

impl RecordingReporter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the events received so far.
    pub fn events(&self) -> Vec<ProgressEvent> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }

    /// Messages received so far, in order.
    pub fn messages(&self) -> Vec<String> {
        self.events().into_iter().map(|e| e.message).collect()
    }
}

impl ProgressReporter for RecordingReporter {
    fn report(&self, event: ProgressEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }
}

impl<R: ProgressReporter + ?Sized> ProgressReporter for Arc<R> {
    fn report(&self, event: ProgressEvent) {
        (**self).report(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_key_skips_missing_parts() {
        let event = ProgressEvent::process("fetching").with_output("parks.zip");
        assert_eq!(event.key(), "fetching-parks.zip");
        assert_eq!(ProgressEvent::message("x").key(), "");
    }

    #[test]
    fn test_event_display() {
        let event = ProgressEvent::process("converting")
            .with_input("parks")
            .with_output("parks.geo.json")
            .with_message(DONE);
        assert_eq!(event.to_string(), "converting parks -> parks.geo.json: done");
        assert_eq!(ProgressEvent::message("Done!").to_string(), "Done!");
    }

    #[test]
    fn test_sentinels() {
        assert!(ProgressEvent::message(DONE).is_done());
        assert!(ProgressEvent::message(IN_PROGRESS).is_in_progress());
        assert!(!ProgressEvent::message(CACHED).is_done());
    }

    #[test]
    fn test_recording_reporter_keeps_order() {
        let reporter = RecordingReporter::new();
        reporter.report(ProgressEvent::message("one"));
        reporter.report(ProgressEvent::message("two"));
        assert_eq!(reporter.messages(), vec!["one", "two"]);
    }

    #[test]
    fn test_arc_reporter_forwards() {
        let recording = Arc::new(RecordingReporter::new());
        let shared: Arc<dyn ProgressReporter> = recording.clone();
        shared.report(ProgressEvent::message("hello"));
        assert_eq!(recording.messages(), vec!["hello"]);
    }
}
