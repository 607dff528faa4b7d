//! External process supervision.
//!
//! Geometry conversion and tiling are delegated to external engines. This
//! module runs them:
//!
//! 1. Probe the configured executable with its version arguments; failure is
//!    a [`ToolUnavailable`](crate::PantilerError::ToolUnavailable) error.
//! 2. Spawn the tool and read stdout and stderr line by line.
//! 3. Classify each line ([`LineClassifier`]) and forward progress lines to
//!    the reporter; a usage banner silences the rest of the output.
//! 4. Resolve on exit status zero, otherwise fail with
//!    [`ToolFailed`](crate::PantilerError::ToolFailed).

mod classifier;
mod supervisor;

pub use classifier::{normalize, ClassifierState, LineClass, LineClassifier};
pub use supervisor::{ProcessSupervisor, ToolConfig};
