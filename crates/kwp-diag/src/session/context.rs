//! State shared between a session worker and the manager stopping it

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use kwp_core::BroadcastHub;
use parking_lot::Mutex;
use tracing::info;

use crate::transport::KwpTransport;

pub(crate) struct SessionContext {
    port: String,
    cancelled: AtomicBool,
    transport: Mutex<Option<Arc<dyn KwpTransport>>>,
    terminated: AtomicBool,
}

impl SessionContext {
    pub fn new(port: impl Into<String>) -> Self {
        Self {
            port: port.into(),
            cancelled: AtomicBool::new(false),
            transport: Mutex::new(None),
            terminated: AtomicBool::new(false),
        }
    }

    pub fn port(&self) -> &str {
        &self.port
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Hand the opened transport to the context so `release` can close it
    ///
    /// Returns `false` if the session was cancelled while the port was
    /// being opened; the caller then owns closing it.
    pub fn attach(&self, transport: Arc<dyn KwpTransport>) -> bool {
        let mut slot = self.transport.lock();
        if self.is_cancelled() {
            return false;
        }
        *slot = Some(transport);
        true
    }

    /// Close the transport if one is attached. Safe to call repeatedly.
    pub async fn release(&self) {
        let transport = self.transport.lock().take();
        if let Some(transport) = transport {
            transport.close().await;
        }
    }

    /// Tell viewers the session is over, once
    pub fn announce_termination(&self, hub: &BroadcastHub) {
        if !self.terminated.swap(true, Ordering::SeqCst) {
            info!(port = %self.port, "Session terminated");
            hub.log(format!("Session on {} terminated", self.port));
        }
    }
}
