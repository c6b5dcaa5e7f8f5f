//! Output lines: the unit of incremental output flowing from the workflow to a consumer.
//!
//! Lines are immutable once created. A consumer must not be able to tell
//! whether a line came from a buffered or a streamed step, so the tag format
//! lives here and nowhere else.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Which stream a line was captured from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamKind {
    Stdout,
    Stderr,
    /// Terminal error of a command (non-zero exit, transport fault).
    Error,
}

impl StreamKind {
    pub fn as_str(self) -> &'static str {
        match self {
            StreamKind::Stdout => "stdout",
            StreamKind::Stderr => "stderr",
            StreamKind::Error => "error",
        }
    }
}

impl fmt::Display for StreamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One ordered chunk of task output.
///
/// Step-tagged lines render as `[step][stream] text`. Notes (artifact
/// announcements, failure summaries) carry no step and render as bare text,
/// matching what the caller sees on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputLine {
    step: Option<String>,
    stream: StreamKind,
    text: String,
}

impl OutputLine {
    pub fn stdout(step: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            step: Some(step.into()),
            stream: StreamKind::Stdout,
            text: text.into(),
        }
    }

    pub fn stderr(step: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            step: Some(step.into()),
            stream: StreamKind::Stderr,
            text: text.into(),
        }
    }

    pub fn error(step: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            step: Some(step.into()),
            stream: StreamKind::Error,
            text: text.into(),
        }
    }

    /// Untagged line, e.g. `产出文件:` or a final failure message.
    pub fn note(text: impl Into<String>) -> Self {
        Self {
            step: None,
            stream: StreamKind::Stdout,
            text: text.into(),
        }
    }

    pub fn step(&self) -> Option<&str> {
        self.step.as_deref()
    }

    pub fn stream(&self) -> StreamKind {
        self.stream
    }

    pub fn text(&self) -> &str {
        &self.text
    }
}

impl fmt::Display for OutputLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.step {
            Some(step) => write!(f, "[{step}][{}] {}", self.stream, self.text),
            None => f.write_str(&self.text),
        }
    }
}
