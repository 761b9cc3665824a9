//! kwp-diag - KWP2000 K-Line session orchestrator
//!
//! This crate drives one diagnostic session at a time against a K-Line
//! engine ECU and turns its live data into telemetry records for the
//! broadcast hub.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     SessionManager                          │
//! │  Implements SessionControl (start / stop / ports)           │
//! │                          │                                  │
//! │                    ┌─────┴─────┐                            │
//! │                    │  Worker   │──── BroadcastHub (events)  │
//! │                    │ bring-up, │                            │
//! │                    │  polling  │                            │
//! │                    └─────┬─────┘                            │
//! │         ┌────────────────┼────────────────┐                 │
//! │  ┌──────┴──────┐  ┌──────┴──────┐  ┌──────┴──────┐          │
//! │  │  security   │  │  identify   │  │  kwp_conv   │          │
//! │  │ (seed/key)  │  │ (ECU probe) │  │  (decode)   │          │
//! │  └──────┬──────┘  └──────┬──────┘  └─────────────┘          │
//! │         └───────┬────────┘                                  │
//! │           ┌─────┴─────┐                                     │
//! │           │KwpService │                                     │
//! │           │(protocol) │                                     │
//! │           └─────┬─────┘                                     │
//! │        ┌────────┴────────┐                                  │
//! │        │  KwpTransport   │                                  │
//! │        │ (K-Line / mock) │                                  │
//! │        └─────────────────┘                                  │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod config;
pub mod identify;
pub mod kwp;
pub mod security;
pub mod session;
pub mod transport;

pub use config::{MockConfig, SessionConfig, TransportConfig};
pub use identify::{builtin_table, identify, EcuDescriptor, IdentificationEntry};
pub use kwp::{KwpError, KwpService, NegativeResponseCode};
pub use security::{compute_key, unlock, UnlockOutcome};
pub use session::SessionManager;
pub use transport::{create_transport_factory, KwpTransport, TransportError, TransportFactory};
