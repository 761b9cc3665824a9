//! Transport layer errors

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Connection closed")]
    ConnectionClosed,

    #[error("Receive failed: {0}")]
    ReceiveFailed(String),

    #[error("Timeout after {0} ms")]
    Timeout(u64),

    /// The ECU answered with a negative response frame
    #[error("Negative response 0x{nrc:02X} for service 0x{service:02X}")]
    NegativeResponse { service: u8, nrc: u8 },

    #[error("Invalid address: 0x{0:08X}")]
    InvalidAddress(u32),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}
