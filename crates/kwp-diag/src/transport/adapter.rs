//! Transport trait and types

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use kwp_core::PortInfo;

use super::TransportError;
use crate::kwp::service_id;

/// Largest address a ReadMemoryByAddress request can carry
pub const MAX_MEMORY_ADDRESS: u32 = 0x00FF_FFFF;

/// Positive response to a service request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KwpResponse {
    /// Response service id (request id + 0x40)
    pub status: u8,
    /// Payload following the status byte
    pub data: Vec<u8>,
}

impl KwpResponse {
    pub fn new(status: u8, data: Vec<u8>) -> Self {
        Self { status, data }
    }
}

/// Transport-agnostic interface for KWP2000 over K-Line
///
/// Every method may be called while another one is in flight; `close` in
/// particular is called from outside the session worker and must make
/// pending requests fail promptly.
#[async_trait]
pub trait KwpTransport: Send + Sync {
    /// Port this transport was opened on
    fn port(&self) -> &str;

    /// Wake up the ECU with `start` and keep the link alive by sending
    /// `keepalive` whenever the line has been idle for `keepalive_interval`
    ///
    /// The keepalive runs until the transport is closed.
    async fn init(
        &self,
        start: &[u8],
        keepalive: &[u8],
        keepalive_interval: Duration,
    ) -> Result<(), TransportError>;

    /// Send one service request and wait for its positive response
    ///
    /// Negative responses are reported as [`TransportError::NegativeResponse`].
    async fn execute(&self, service: u8, data: &[u8]) -> Result<KwpResponse, TransportError>;

    /// Read `size` bytes of ECU memory starting at `address`
    async fn read_memory(&self, address: u32, size: u8) -> Result<Vec<u8>, TransportError> {
        if address > MAX_MEMORY_ADDRESS {
            return Err(TransportError::InvalidAddress(address));
        }
        let [_, hi, mid, lo] = address.to_be_bytes();
        let response = self
            .execute(service_id::READ_MEMORY_BY_ADDRESS, &[hi, mid, lo, size])
            .await?;
        Ok(response.data)
    }

    /// Response timeout applied to subsequent requests
    fn set_timeout(&self, timeout: Duration);

    /// Stop the keepalive and release the port. Idempotent.
    async fn close(&self);

    fn is_open(&self) -> bool;
}

/// Opens transports on named ports
#[async_trait]
pub trait TransportFactory: Send + Sync {
    async fn open(&self, port: &str) -> Result<Arc<dyn KwpTransport>, TransportError>;

    /// Ports a session can be started on
    async fn list_ports(&self) -> Result<Vec<PortInfo>, TransportError>;
}
