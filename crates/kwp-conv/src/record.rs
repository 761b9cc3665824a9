//! Telemetry records as pushed to viewers

use serde::{Deserialize, Serialize};

use crate::precision::format_value;

/// Keyword prefixing every data line
pub const DATA_KEYWORD: &str = "DATA";

/// One decoded poll cycle
///
/// `values` holds one entry per catalog parameter, in catalog order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryRecord {
    /// Wall clock time of the poll in milliseconds since the Unix epoch
    pub timestamp_ms: i64,
    pub values: Vec<f64>,
}

impl TelemetryRecord {
    pub fn new(timestamp_ms: i64, values: Vec<f64>) -> Self {
        Self {
            timestamp_ms,
            values,
        }
    }

    /// Render as `DATA <ts>,<v1>,<v2>,...`
    pub fn to_line(&self) -> String {
        let mut line = format!("{} {}", DATA_KEYWORD, self.timestamp_ms);
        for value in &self.values {
            line.push(',');
            line.push_str(&format_value(*value));
        }
        line
    }
}
