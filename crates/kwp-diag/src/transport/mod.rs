//! Transport layer for KWP2000 communication
//!
//! The transport owns framing, echo handling, response-pending retries and
//! the periodic keepalive. The orchestrator only issues service requests
//! through [`KwpTransport`] and opens ports through a [`TransportFactory`].
//!
//! # Example
//!
//! ```ignore
//! use kwp_diag::config::TransportConfig;
//! use kwp_diag::transport::create_transport_factory;
//!
//! let factory = create_transport_factory(&TransportConfig::default())?;
//! let transport = factory.open("/dev/ttyUSB0").await?;
//! transport.init(&[0x81], &[0x3E, 0x01], Duration::from_millis(1500)).await?;
//! let response = transport.execute(0x21, &[0x01]).await?;
//! ```

mod adapter;
pub mod error;
pub mod mock;

pub use adapter::{KwpResponse, KwpTransport, TransportFactory};
pub use error::TransportError;

use std::sync::Arc;

use crate::config::TransportConfig;

/// Create a transport factory based on configuration
pub fn create_transport_factory(
    config: &TransportConfig,
) -> Result<Arc<dyn TransportFactory>, TransportError> {
    match config {
        TransportConfig::Mock(cfg) => Ok(Arc::new(mock::MockTransportFactory::new(cfg.clone()))),
    }
}
