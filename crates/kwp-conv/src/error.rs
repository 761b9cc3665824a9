//! Error types for catalog loading

use thiserror::Error;

/// Errors that can occur while loading or validating a catalog
#[derive(Debug, Error)]
pub enum ConvError {
    /// Catalog declares no parameters at all
    #[error("catalog has no parameters")]
    EmptyCatalog,

    /// A parameter definition cannot be decoded
    #[error("invalid parameter '{name}': {reason}")]
    InvalidParameter { name: String, reason: String },

    /// Two labels sanitize to the same schema key
    #[error("schema key '{key}' produced by both '{first}' and '{second}'")]
    DuplicateKey {
        key: String,
        first: String,
        second: String,
    },

    /// Two sources address the same local identifier
    #[error("duplicate local identifier 0x{0:02X}")]
    DuplicateLocalIdentifier(u8),

    /// YAML parsing error
    #[error("YAML parse error: {0}")]
    YamlError(#[from] serde_yaml::Error),

    /// IO error
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Result type for catalog operations
pub type ConvResult<T> = Result<T, ConvError>;
