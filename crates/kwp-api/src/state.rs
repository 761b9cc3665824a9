//! Application state for the bridge API

use std::sync::Arc;

use kwp_core::{BroadcastHub, SessionControl};

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    session: Arc<dyn SessionControl>,
    hub: BroadcastHub,
}

impl AppState {
    pub fn new(session: Arc<dyn SessionControl>, hub: BroadcastHub) -> Self {
        Self { session, hub }
    }

    /// Session control the start/stop endpoints act on
    pub fn session(&self) -> &Arc<dyn SessionControl> {
        &self.session
    }

    /// Hub the stream endpoint subscribes viewers to
    pub fn hub(&self) -> &BroadcastHub {
        &self.hub
    }
}
