//! SessionControl trait - the seam between the HTTP layer and the orchestrator

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::BridgeResult;

/// State of the diagnostic session.
///
/// # Lifecycle
///
/// ```text
/// Idle → Connecting → TimingNegotiation → SecurityUnlock → Identifying → Streaming
///                                                                            │
///                                                      stop() or poll error  │
///                                                                            ▼
///                                                                 Stopping → Stopped
/// ```
///
/// `Error` is entered from any bring-up state when a fatal step fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    #[default]
    Idle,
    Connecting,
    TimingNegotiation,
    SecurityUnlock,
    Identifying,
    Streaming,
    Stopping,
    Stopped,
    Error,
}

impl SessionState {
    /// Whether a worker may still be running in this state
    pub fn is_active(&self) -> bool {
        !matches!(
            self,
            SessionState::Idle | SessionState::Stopped | SessionState::Error
        )
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SessionState::Idle => "idle",
            SessionState::Connecting => "connecting",
            SessionState::TimingNegotiation => "timing_negotiation",
            SessionState::SecurityUnlock => "security_unlock",
            SessionState::Identifying => "identifying",
            SessionState::Streaming => "streaming",
            SessionState::Stopping => "stopping",
            SessionState::Stopped => "stopped",
            SessionState::Error => "error",
        };
        f.write_str(name)
    }
}

/// Snapshot of the current or last session
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionStatus {
    pub state: SessionState,
    /// Port of the current or last session
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<String>,
    /// Name of the identified ECU, once known
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ecu: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
}

/// A serial port a session can be started on
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortInfo {
    pub port: String,
    pub description: String,
}

impl PortInfo {
    pub fn new(port: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            port: port.into(),
            description: description.into(),
        }
    }
}

/// Control operations exposed to the HTTP layer
///
/// Implementations serialize `start` and `stop` so at most one session is
/// live at any time.
#[async_trait]
pub trait SessionControl: Send + Sync {
    /// Stop any running session, then start a new one on `port`
    ///
    /// Returns once the new worker is spawned; bring-up progress is reported
    /// on the push stream.
    async fn start(&self, port: &str) -> BridgeResult<()>;

    /// Stop the running session, if any. Idempotent.
    async fn stop(&self) -> BridgeResult<()>;

    /// Current session status
    fn status(&self) -> SessionStatus;

    /// Enumerate ports a session can be started on
    async fn list_ports(&self) -> BridgeResult<Vec<PortInfo>>;
}
