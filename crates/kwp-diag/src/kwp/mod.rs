//! KWP2000 (ISO 14230) service layer
//!
//! This module provides the request/response services the session
//! orchestrator needs on top of a [`KwpTransport`](crate::transport::KwpTransport).

mod error;
mod nrc;
mod services;

pub use error::KwpError;
pub use nrc::NegativeResponseCode;
pub use services::KwpService;

/// Offset between a request service id and its positive response id
pub const POSITIVE_RESPONSE_OFFSET: u8 = 0x40;

/// Positive response id for a request service id
pub const fn positive_response(service: u8) -> u8 {
    service.wrapping_add(POSITIVE_RESPONSE_OFFSET)
}

/// KWP2000 service id constants
pub mod service_id {
    pub const START_DIAGNOSTIC_SESSION: u8 = 0x10;
    pub const STOP_DIAGNOSTIC_SESSION: u8 = 0x20;
    pub const READ_DATA_BY_LOCAL_ID: u8 = 0x21;
    pub const READ_MEMORY_BY_ADDRESS: u8 = 0x23;
    pub const SECURITY_ACCESS: u8 = 0x27;
    pub const TESTER_PRESENT: u8 = 0x3E;
    pub const NEGATIVE_RESPONSE: u8 = 0x7F;
    pub const START_COMMUNICATION: u8 = 0x81;
    pub const STOP_COMMUNICATION: u8 = 0x82;
    pub const ACCESS_TIMING_PARAMETERS: u8 = 0x83;
}

/// StartDiagnosticSession (0x10) session types
pub mod session_type {
    /// Standard session, required for live data
    pub const DEFAULT: u8 = 0x81;
    /// ECU programming session, required for memory reads
    pub const FLASH_REPROGRAMMING: u8 = 0x85;
}

/// AccessTimingParameters (0x83) sub-functions
pub mod timing_parameter {
    pub const READ_LIMITS: u8 = 0x00;
    pub const SET_VALUES: u8 = 0x03;
    /// Number of timing bytes (P2min, P2max, P3min, P3max, P4min)
    pub const VALUE_COUNT: usize = 5;
}

/// SecurityAccess (0x27) sub-functions
pub mod security_sub_function {
    pub const REQUEST_SEED: u8 = 0x01;
    pub const SEND_KEY: u8 = 0x02;
}

/// TesterPresent (0x3E) sub-functions
pub mod tester_present {
    pub const RESPONSE_REQUIRED: u8 = 0x01;
}
