//! Common error types for session control

use thiserror::Error;

/// Result type for session control operations
pub type BridgeResult<T> = Result<T, BridgeError>;

/// Errors surfaced by session control to its callers
#[derive(Debug, Error)]
pub enum BridgeError {
    /// Invalid parameter or request
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Port enumeration failed
    #[error("Port enumeration failed: {0}")]
    Ports(String),
}

impl BridgeError {
    /// Returns the HTTP status code for this error
    pub fn status_code(&self) -> u16 {
        match self {
            BridgeError::InvalidRequest(_) => 400,
            BridgeError::Ports(_) => 500,
        }
    }
}
