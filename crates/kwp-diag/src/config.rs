//! Diagnostic session configuration
//!
//! This module contains configuration types for the session orchestrator
//! and the transport it opens.

use std::time::Duration;

use serde::{Deserialize, Serialize};

// =============================================================================
// Session Configuration
// =============================================================================

/// Timing and presentation settings for diagnostic sessions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Tester present interval in milliseconds
    #[serde(default = "default_keepalive_interval")]
    pub keepalive_interval_ms: u64,
    /// Response timeout used outside bring-up
    #[serde(default = "default_timeout")]
    pub default_timeout_ms: u64,
    /// Response timeout while the flash session is being brought up
    #[serde(default = "default_bringup_timeout")]
    pub bringup_timeout_ms: u64,
    /// Pause between two poll cycles
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,
    /// How long `stop` waits for the worker before aborting it
    #[serde(default = "default_stop_timeout")]
    pub stop_timeout_ms: u64,
    /// Device name announced in the schema line
    #[serde(default = "default_device_name")]
    pub device_name: String,
    /// Per-viewer queue capacity
    #[serde(default = "default_subscriber_queue")]
    pub subscriber_queue: usize,
}

fn default_keepalive_interval() -> u64 {
    1500
}

fn default_timeout() -> u64 {
    2000
}

fn default_bringup_timeout() -> u64 {
    12000
}

fn default_poll_interval() -> u64 {
    100
}

fn default_stop_timeout() -> u64 {
    2000
}

fn default_device_name() -> String {
    "KWP2000".to_string()
}

fn default_subscriber_queue() -> usize {
    kwp_core::DEFAULT_QUEUE_CAPACITY
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            keepalive_interval_ms: default_keepalive_interval(),
            default_timeout_ms: default_timeout(),
            bringup_timeout_ms: default_bringup_timeout(),
            poll_interval_ms: default_poll_interval(),
            stop_timeout_ms: default_stop_timeout(),
            device_name: default_device_name(),
            subscriber_queue: default_subscriber_queue(),
        }
    }
}

impl SessionConfig {
    pub fn keepalive_interval(&self) -> Duration {
        Duration::from_millis(self.keepalive_interval_ms)
    }

    pub fn default_timeout(&self) -> Duration {
        Duration::from_millis(self.default_timeout_ms)
    }

    pub fn bringup_timeout(&self) -> Duration {
        Duration::from_millis(self.bringup_timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn stop_timeout(&self) -> Duration {
        Duration::from_millis(self.stop_timeout_ms)
    }
}

// =============================================================================
// Transport Configuration
// =============================================================================

/// Transport configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum TransportConfig {
    /// Simulated SIMK43 engine ECU
    Mock(MockConfig),
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self::Mock(MockConfig::default())
    }
}

/// Mock transport configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MockConfig {
    /// Simulated latency in milliseconds
    #[serde(default)]
    pub latency_ms: u64,
    /// Ports reported by port enumeration
    #[serde(default = "default_mock_ports")]
    pub ports: Vec<String>,
    /// Seed handed out on the first security access request
    #[serde(default = "default_mock_seed")]
    pub seed: u16,
}

fn default_mock_ports() -> Vec<String> {
    vec!["/dev/ttyUSB0".to_string()]
}

fn default_mock_seed() -> u16 {
    0x3A5C
}

impl Default for MockConfig {
    fn default() -> Self {
        Self {
            latency_ms: 0,
            ports: default_mock_ports(),
            seed: default_mock_seed(),
        }
    }
}
