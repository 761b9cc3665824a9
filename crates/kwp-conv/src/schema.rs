//! Schema handshake sent to every viewer before live data
//!
//! The schema lists one field per catalog parameter, in catalog order, so
//! viewers can label the columns of each data line.

use serde::{Deserialize, Serialize};

use crate::catalog::Catalog;

/// Keyword prefixing the schema line
pub const SCHEMA_KEYWORD: &str = "HELLO";

/// Schema format version
pub const SCHEMA_VERSION: u32 = 1;

/// Derive a stable machine key from a display label
///
/// Lower-cases the label, collapses every run of non-alphanumeric
/// characters into one underscore and trims underscores at both ends.
/// Applying it to an already derived key returns the key unchanged.
pub fn sanitize_key(label: &str) -> String {
    let mut key = String::with_capacity(label.len());
    let mut in_run = false;

    for c in label.to_lowercase().chars() {
        if c.is_ascii_alphanumeric() {
            key.push(c);
            in_run = false;
        } else if !in_run {
            key.push('_');
            in_run = true;
        }
    }

    key.trim_matches('_').to_string()
}

/// One column of the telemetry record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaField {
    pub key: String,
    pub label: String,
    pub unit: String,
}

/// Schema announced to viewers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schema {
    pub device: String,
    pub schema: u32,
    pub fields: Vec<SchemaField>,
}

impl Schema {
    /// Render as a push-stream line: keyword followed by the JSON object
    pub fn to_line(&self) -> String {
        format!(
            "{} {}",
            SCHEMA_KEYWORD,
            serde_json::to_string(self).unwrap_or_default()
        )
    }
}

/// Build the schema for a catalog
pub fn build_schema(catalog: &Catalog, device: &str) -> Schema {
    let fields = catalog
        .parameters()
        .map(|p| SchemaField {
            key: sanitize_key(&p.name),
            label: p.name.clone(),
            unit: p.unit.clone(),
        })
        .collect();

    Schema {
        device: device.to_string(),
        schema: SCHEMA_VERSION,
        fields,
    }
}
