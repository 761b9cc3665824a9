//! Events pushed to viewers

use serde::{Deserialize, Serialize};

/// One message on the push stream
///
/// Serialized as `{"type":"log","text":...}` or `{"type":"line","text":...}`.
/// `Log` carries human-readable progress text, `Line` carries protocol
/// lines (`HELLO ...` schema or `DATA ...` records).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "text", rename_all = "lowercase")]
pub enum StreamEvent {
    Log(String),
    Line(String),
}

impl StreamEvent {
    pub fn log(text: impl Into<String>) -> Self {
        StreamEvent::Log(text.into())
    }

    pub fn line(text: impl Into<String>) -> Self {
        StreamEvent::Line(text.into())
    }

    pub fn text(&self) -> &str {
        match self {
            StreamEvent::Log(text) | StreamEvent::Line(text) => text,
        }
    }

    pub fn is_line(&self) -> bool {
        matches!(self, StreamEvent::Line(_))
    }

    /// Render the event as the JSON payload of one push-stream message
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| String::from("{}"))
    }
}
