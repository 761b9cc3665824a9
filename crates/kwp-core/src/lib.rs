//! kwp-core - Core traits and types for the K-Line live data bridge
//!
//! This crate holds the pieces shared by the session orchestrator and the
//! HTTP layer: the event model pushed to viewers, the broadcast hub that
//! fans those events out, and the `SessionControl` trait the control
//! endpoints are written against.

pub mod control;
pub mod error;
pub mod event;
pub mod hub;

pub use control::{PortInfo, SessionControl, SessionState, SessionStatus};
pub use error::{BridgeError, BridgeResult};
pub use event::StreamEvent;
pub use hub::{BroadcastHub, Subscription, DEFAULT_QUEUE_CAPACITY};
