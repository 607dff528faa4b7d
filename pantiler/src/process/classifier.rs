//! Classification of external tool output lines.
//!
//! Tools print progress on stdout/stderr, but when they reject their
//! arguments they dump a usage banner followed by pages of help text. The
//! classifier recognises the banner and from then on suppresses everything:
//!
//! ```text
//! Normal ──(line starts with marker)──► UsageError
//! ```
//!
//! The transition is one-way.

/// Current mode of a [`LineClassifier`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClassifierState {
    Normal,
    UsageError,
}

/// What to do with one line of tool output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineClass {
    /// Forward this normalised message to the reporter.
    Progress(String),
    /// Nothing left after normalisation.
    Blank,
    /// Usage-help noise.
    Suppressed,
}

/// Two-state classifier applied to every line a tool prints.
#[derive(Debug, Clone)]
pub struct LineClassifier {
    marker: String,
    state: ClassifierState,
}

impl LineClassifier {
    /// Create a classifier that enters usage-error mode on lines starting with `marker`.
    pub fn new(marker: impl Into<String>) -> Self {
        Self {
            marker: marker.into(),
            state: ClassifierState::Normal,
        }
    }

    pub fn state(&self) -> ClassifierState {
        self.state
    }

    pub fn in_usage_error(&self) -> bool {
        self.state == ClassifierState::UsageError
    }

    pub fn classify(&mut self, line: &str) -> LineClass {
        if self.state == ClassifierState::Normal && line.starts_with(&self.marker) {
            self.state = ClassifierState::UsageError;
        }
        if self.state == ClassifierState::UsageError {
            return LineClass::Suppressed;
        }
        let message = normalize(line);
        if message.is_empty() {
            LineClass::Blank
        } else {
            LineClass::Progress(message)
        }
    }
}

/// Drop the first colon, trim, and lower-case a raw output line.
pub fn normalize(line: &str) -> String {
    line.replacen(':', "", 1).trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize() {
        assert_eq!(normalize("  Read 1.00 million features  "), "read 1.00 million features");
        assert_eq!(normalize("Choosing a maxzoom: 12: ok"), "choosing a maxzoom 12: ok");
        assert_eq!(normalize("   "), "");
    }

    #[test]
    fn test_progress_lines_forwarded() {
        let mut classifier = LineClassifier::new("Usage");
        assert_eq!(
            classifier.classify("For layer 0, using name \"parks\""),
            LineClass::Progress("for layer 0, using name \"parks\"".to_string())
        );
        assert_eq!(classifier.classify(""), LineClass::Blank);
        assert_eq!(classifier.state(), ClassifierState::Normal);
    }

    #[test]
    fn test_usage_banner_suppresses_everything_after() {
        let mut classifier = LineClassifier::new("Usage");
        classifier.classify("starting");
        assert_eq!(
            classifier.classify("Usage: tippecanoe [options] [file.json ...]"),
            LineClass::Suppressed
        );
        assert!(classifier.in_usage_error());
        assert_eq!(classifier.classify("  --output=output.mbtiles"), LineClass::Suppressed);
        assert_eq!(classifier.classify("Read 10 features"), LineClass::Suppressed);
        assert!(classifier.in_usage_error());
    }

    #[test]
    fn test_marker_must_prefix_line() {
        let mut classifier = LineClassifier::new("Usage");
        assert!(matches!(
            classifier.classify("see Usage notes"),
            LineClass::Progress(_)
        ));
        assert!(!classifier.in_usage_error());
    }
}
