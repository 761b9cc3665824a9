//! HTTP handlers for the bridge API

pub mod control;
pub mod ports;
pub mod status;
pub mod stream;

use crate::error::ApiError;

/// Fallback for unknown routes
pub async fn not_found() -> ApiError {
    ApiError::NotFound("not found".to_string())
}
