//! Diagnostic session orchestration
//!
//! A session is driven by one background worker that brings the ECU link
//! up step by step and then polls the catalog's local identifiers until it
//! is cancelled or a poll fails. [`SessionManager`] serializes `start` and
//! `stop` so at most one session is active at a time.
//!
//! Bring-up order:
//!
//! 1. Connecting: open the port, stop any stale diagnostic session, send
//!    StartCommunication and start the keepalive
//! 2. Flash reprogramming session with the extended response timeout
//! 3. TimingNegotiation: read the timing limits and apply them
//! 4. SecurityUnlock: seed/key exchange
//! 5. Identifying: probe the identification table, read calibration info
//! 6. Default session, schema announcement, then Streaming
//!
//! Steps 3 to 5 are best effort: their failures are logged to viewers and
//! bring-up continues.

mod context;
mod manager;
mod worker;

pub use manager::SessionManager;
