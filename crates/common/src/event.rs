//! Line events produced by followed files
//!
//! One [`LineEvent`] is produced per line read from a follower's stdout. The
//! serialized form is what subscribers see on the wire:
//! `{"file": "app.log", "time": "2024-01-01T00:00:00Z", "line": "hello"}`.

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single line emitted by a tailed file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineEvent {
    /// Basename of the file the line came from
    pub file: String,
    /// When the event was produced
    pub time: DateTime<Utc>,
    /// The line text, without its terminator
    pub line: String,
}

impl LineEvent {
    pub fn new(file: impl Into<String>, line: impl Into<String>) -> Self {
        Self {
            file: file.into(),
            time: Utc::now(),
            line: line.into(),
        }
    }

    /// Build an event for a line read from `path`, stamped now
    pub fn for_path(path: &Path, line: impl Into<String>) -> Self {
        Self::new(file_label(path), line)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// The label used for `file` in events: the path's basename, or the whole
/// path when it has none.
pub fn file_label(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Decode one raw line as read up to and including its `\n`.
///
/// Strips the trailing `\n` and an optional `\r` before it. Invalid UTF-8 is
/// replaced rather than rejected so that one bad byte never ends a tail.
pub fn decode_line(raw: &[u8]) -> String {
    let mut end = raw.len();
    if end > 0 && raw[end - 1] == b'\n' {
        end -= 1;
        if end > 0 && raw[end - 1] == b'\r' {
            end -= 1;
        }
    }
    String::from_utf8_lossy(&raw[..end]).into_owned()
}
