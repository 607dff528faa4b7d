//! Terminal rendering of progress events.
//!
//! Each line of work (same process, input and output) owns one line on
//! screen that is rewritten in place as its events arrive. Bare messages
//! are printed above the live lines. When stderr is not a terminal every
//! event is printed as its own line instead.

use std::collections::HashMap;
use std::sync::Mutex;

use console::{style, Term};
use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};
use pantiler::{ProgressEvent, ProgressReporter, CACHED, DONE, IN_PROGRESS};
use tracing::debug;

/// Format one event as `process input -> output: message`, coloured.
pub fn render(event: &ProgressEvent) -> String {
    let mut line = String::new();
    if let Some(process) = &event.process {
        line.push_str(&style(process).blue().to_string());
    }
    if let Some(input) = &event.input {
        line.push_str(&format!(" {}", input));
    }
    if let Some(output) = &event.output {
        line.push_str(&format!(" -> {}", output));
    }
    if event.process.is_some() || event.input.is_some() || event.output.is_some() {
        line.push_str(": ");
    }
    let message = match event.message.as_str() {
        DONE => style(&event.message).green(),
        IN_PROGRESS => style(&event.message).yellow(),
        CACHED => style(&event.message).cyan(),
        _ => style(&event.message).magenta(),
    };
    line.push_str(&message.to_string());
    line
}

/// Renders events to stderr.
pub struct TerminalReporter {
    progress: MultiProgress,
    lines: Mutex<HashMap<String, ProgressBar>>,
    interactive: bool,
}

impl TerminalReporter {
    pub fn new() -> Self {
        let interactive = Term::stderr().is_term();
        let target = if interactive {
            ProgressDrawTarget::stderr()
        } else {
            ProgressDrawTarget::hidden()
        };
        Self {
            progress: MultiProgress::with_draw_target(target),
            lines: Mutex::new(HashMap::new()),
            interactive,
        }
    }

    fn line_style() -> ProgressStyle {
        ProgressStyle::with_template("{msg}").unwrap_or_else(|_| ProgressStyle::default_spinner())
    }

    fn print(&self, text: String) {
        if !self.interactive {
            eprintln!("{}", text);
        } else if let Err(e) = self.progress.println(text) {
            debug!(error = %e, "Could not print progress message");
        }
    }

    /// Leave every line as it last looked.
    pub fn finish(&self) {
        if let Ok(lines) = self.lines.lock() {
            for bar in lines.values().filter(|bar| !bar.is_finished()) {
                bar.abandon();
            }
        }
    }
}

impl Default for TerminalReporter {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressReporter for TerminalReporter {
    fn report(&self, event: ProgressEvent) {
        let text = render(&event);
        let key = event.key();
        if key.is_empty() || !self.interactive {
            self.print(text);
            return;
        }

        let Ok(mut lines) = self.lines.lock() else {
            return;
        };
        let bar = lines.entry(key).or_insert_with(|| {
            let bar = self.progress.add(ProgressBar::new_spinner());
            bar.set_style(Self::line_style());
            bar
        });
        bar.set_message(text);
        if event.is_done() || event.message == CACHED {
            bar.finish();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_full_event() {
        console::set_colors_enabled(false);
        let event = ProgressEvent::process("converting")
            .with_input("parks/north")
            .with_output("parks-north.geo.json")
            .with_message(DONE);
        assert_eq!(
            render(&event),
            "converting parks/north -> parks-north.geo.json: done"
        );
    }

    #[test]
    fn test_render_bare_message() {
        console::set_colors_enabled(false);
        assert_eq!(render(&ProgressEvent::message("Done!")), "Done!");
        assert_eq!(
            render(&ProgressEvent::process("tiling").with_message("read 3 features")),
            "tiling: read 3 features"
        );
    }

    #[test]
    fn test_report_tracks_lines_by_key() {
        let reporter = TerminalReporter {
            progress: MultiProgress::with_draw_target(ProgressDrawTarget::hidden()),
            lines: Mutex::new(HashMap::new()),
            interactive: true,
        };
        let event = ProgressEvent::process("fetching").with_input("parks/parks");

        reporter.report(event.clone().with_message(IN_PROGRESS));
        reporter.report(event.with_message(DONE));
        reporter.report(ProgressEvent::process("tiling").with_message(IN_PROGRESS));

        let lines = reporter.lines.lock().unwrap();
        assert_eq!(lines.len(), 2);
        assert!(lines["fetching-parks/parks"].is_finished());
        assert!(!lines["tiling"].is_finished());
    }
}
