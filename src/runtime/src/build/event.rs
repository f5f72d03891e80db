//! Build progress events.
//!
//! The engine reports a build as a stream of JSON objects, one per line.
//! Each line is decoded on its own; a line that does not decode is reported
//! as [`BuildItem::Malformed`] and never aborts the stream.

use serde::{Deserialize, Serialize};

/// Stream text prefix that marks a completed, tagged image.
pub const SUCCESS_MARKER: &str = "Successfully tagged";

/// A single decoded build progress line.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildEvent {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub stream: Option<String>,
    #[serde(default)]
    pub progress: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

/// One item of a build stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildItem {
    Event(BuildEvent),
    /// Undecodable line, carried for diagnostics only
    Malformed(String),
}

impl BuildEvent {
    /// Decode one line of engine output.
    pub fn parse_line(line: &str) -> BuildItem {
        match serde_json::from_str::<BuildEvent>(line.trim()) {
            Ok(event) => BuildItem::Event(event),
            Err(_) => BuildItem::Malformed(line.to_string()),
        }
    }

    /// Whether this event announces the tagged image.
    pub fn is_tagged(&self) -> bool {
        self.stream
            .as_deref()
            .map_or(false, |s| s.starts_with(SUCCESS_MARKER))
    }

    /// Status, progress and stream text on one line, for logging.
    pub fn summary(&self) -> String {
        [&self.status, &self.progress, &self.stream]
            .iter()
            .filter_map(|field| field.as_deref())
            .map(|text| text.trim_end_matches('\n'))
            .filter(|text| !text.is_empty())
            .collect::<Vec<_>>()
            .join(" ")
    }
}
