//! KWP2000 protocol errors

use thiserror::Error;

use super::NegativeResponseCode;
use crate::transport::TransportError;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum KwpError {
    #[error("Negative response: {nrc} (0x{nrc:02X}) for service 0x{service_id:02X}")]
    NegativeResponse {
        service_id: u8,
        nrc: NegativeResponseCode,
    },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Response timeout")]
    Timeout,

    #[error("Transport error: {0}")]
    Transport(String),
}

impl From<TransportError> for KwpError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::NegativeResponse { service, nrc } => KwpError::NegativeResponse {
                service_id: service,
                nrc: NegativeResponseCode::from(nrc),
            },
            TransportError::Timeout(_) => KwpError::Timeout,
            other => KwpError::Transport(other.to_string()),
        }
    }
}
