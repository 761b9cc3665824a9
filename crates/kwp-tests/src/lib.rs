//! Integration tests for the K-Line bridge
//!
//! These tests run the full stack against the simulated ECU:
//! - HTTP control routes and the SSE push stream
//! - Session bring-up, polling and teardown
//! - Catalog decoding end to end
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p kwp-tests
//! ```
//!
//! # Test Structure
//!
//! - `session_test.rs` - Session manager lifecycle against the mock ECU
//! - `e2e_test.rs` - Catalog to DATA line, and the shipped config files
//! - `api_integration_test.rs` - HTTP routes backed by a real manager

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use kwp_api::{create_router, AppState};
use kwp_conv::Catalog;
use kwp_core::{BroadcastHub, StreamEvent, Subscription};
use kwp_diag::config::{MockConfig, SessionConfig};
use kwp_diag::transport::mock::{MockTransportFactory, LIVE_DATA_LEN, LIVE_DATA_LOCAL_ID};
use kwp_diag::SessionManager;

/// How long a test waits for one event before giving up
pub const EVENT_TIMEOUT: Duration = Duration::from_secs(5);

/// A bridge wired to the simulated ECU
pub struct TestBridge {
    pub factory: Arc<MockTransportFactory>,
    pub manager: Arc<SessionManager>,
    pub hub: BroadcastHub,
}

impl TestBridge {
    /// Bridge over the built-in catalog
    pub fn new() -> Self {
        Self::with_catalog(Catalog::builtin())
    }

    /// Bridge over `catalog`, polling every 5 ms
    pub fn with_catalog(catalog: Catalog) -> Self {
        let config = SessionConfig {
            poll_interval_ms: 5,
            subscriber_queue: 4096,
            ..SessionConfig::default()
        };
        let factory = Arc::new(MockTransportFactory::new(MockConfig::default()));
        let manager = match SessionManager::new(factory.clone(), Arc::new(catalog), config) {
            Ok(manager) => Arc::new(manager),
            Err(e) => panic!("invalid test catalog: {}", e),
        };
        let hub = manager.hub().clone();

        Self {
            factory,
            manager,
            hub,
        }
    }

    /// HTTP router serving this bridge
    pub fn router(&self) -> Router {
        create_router(AppState::new(self.manager.clone(), self.hub.clone()), None)
    }
}

impl Default for TestBridge {
    fn default() -> Self {
        Self::new()
    }
}

/// Read events until one starts with `prefix`; returns everything read
///
/// Panics if the stream stays quiet for [`EVENT_TIMEOUT`].
pub async fn wait_for(viewer: &mut Subscription, prefix: &str) -> Vec<StreamEvent> {
    let mut seen = Vec::new();
    loop {
        match tokio::time::timeout(EVENT_TIMEOUT, viewer.recv()).await {
            Ok(Some(event)) => {
                let done = event.text().starts_with(prefix);
                seen.push(event);
                if done {
                    return seen;
                }
            }
            other => panic!("no '{}' on the stream: {:?}", prefix, other),
        }
    }
}

/// Live data block as the ECU answers it, local id echo included
///
/// Every `(offset, bytes)` pair is copied into an otherwise zeroed block.
pub fn live_block(fields: &[(usize, Vec<u8>)]) -> Vec<u8> {
    let mut block = vec![0u8; LIVE_DATA_LEN];
    block[0] = LIVE_DATA_LOCAL_ID;
    for (offset, bytes) in fields {
        block[*offset..*offset + bytes.len()].copy_from_slice(bytes);
    }
    block
}
