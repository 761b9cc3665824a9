//! Core types for the parameter catalog
//!
//! A catalog is an ordered list of data sources, each addressing one block
//! of live values on the ECU by local identifier.

use serde::{Deserialize, Serialize};

/// Raw-to-physical conversion for a parameter
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Conversion {
    /// Raw value passed through (status and enum fields)
    #[default]
    Identity,
    /// physical = raw * scale + offset
    Affine {
        scale: f64,
        #[serde(default)]
        offset: f64,
    },
}

impl Conversion {
    /// Pure scaling, no offset
    pub fn scaled(scale: f64) -> Self {
        Self::Affine { scale, offset: 0.0 }
    }

    pub fn affine(scale: f64, offset: f64) -> Self {
        Self::Affine { scale, offset }
    }

    /// Apply the conversion to a raw unsigned reading
    pub fn apply(&self, raw: u32) -> f64 {
        match *self {
            Conversion::Identity => raw as f64,
            Conversion::Affine { scale, offset } => raw as f64 * scale + offset,
        }
    }
}

fn default_byte_size() -> usize {
    1
}

/// One live value inside a data source block
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parameter {
    /// Display label, also the source of the schema key
    pub name: String,
    /// Unit string announced to viewers (may be empty)
    #[serde(default)]
    pub unit: String,
    /// Position of the first byte inside the raw block
    #[serde(alias = "position")]
    pub byte_offset: usize,
    /// Width of the little-endian field (1 or 2)
    #[serde(default = "default_byte_size", alias = "size")]
    pub byte_size: usize,
    #[serde(default)]
    pub conversion: Conversion,
    /// Decimal digits kept after conversion
    #[serde(default)]
    pub precision: u8,
}

impl Parameter {
    /// Create a parameter with identity conversion and no decimals
    pub fn new(
        name: impl Into<String>,
        unit: impl Into<String>,
        byte_offset: usize,
        byte_size: usize,
    ) -> Self {
        Self {
            name: name.into(),
            unit: unit.into(),
            byte_offset,
            byte_size,
            conversion: Conversion::Identity,
            precision: 0,
        }
    }

    pub fn with_conversion(mut self, conversion: Conversion) -> Self {
        self.conversion = conversion;
        self
    }

    pub fn with_precision(mut self, precision: u8) -> Self {
        self.precision = precision;
        self
    }

    /// Exclusive end of the field inside the raw block
    pub fn byte_end(&self) -> usize {
        self.byte_offset.saturating_add(self.byte_size)
    }
}

/// A block of parameters read with one ReadDataByLocalIdentifier request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataSource {
    /// Local identifier addressing the block on the ECU
    pub local_identifier: u8,
    /// Parameters in announcement and record order
    pub parameters: Vec<Parameter>,
}

impl DataSource {
    pub fn new(local_identifier: u8, parameters: Vec<Parameter>) -> Self {
        Self {
            local_identifier,
            parameters,
        }
    }
}
