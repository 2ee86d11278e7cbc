//! Client configuration
//!
//! Timing and protocol tunables for the cluster client. Defaults match
//! the wire dialect's reference deployment; tests shrink the timeouts.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Client configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Protocol tag proposed on connect (exactly 3 ASCII bytes)
    #[serde(default = "default_protocol_tag")]
    pub protocol_tag: String,

    /// Dial timeout
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_ms: u64,

    /// In-flight request timeout; on expiry the socket is closed
    #[serde(default = "default_request_timeout")]
    pub request_timeout_ms: u64,

    /// Reconnect tick for disconnected nodes
    #[serde(default = "default_reconnect_interval")]
    pub reconnect_interval_ms: u64,

    /// Retry interval for a failed bootstrap
    #[serde(default = "default_bootstrap_retry")]
    pub bootstrap_retry_ms: u64,

    /// Pending-request queue capacity per connection
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

fn default_protocol_tag() -> String {
    "pb0".to_string()
}
fn default_connect_timeout() -> u64 {
    5_000
}
fn default_request_timeout() -> u64 {
    5_000
}
fn default_reconnect_interval() -> u64 {
    5_000
}
fn default_bootstrap_retry() -> u64 {
    10_000
}
fn default_queue_capacity() -> usize {
    256
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            protocol_tag: default_protocol_tag(),
            connect_timeout_ms: default_connect_timeout(),
            request_timeout_ms: default_request_timeout(),
            reconnect_interval_ms: default_reconnect_interval(),
            bootstrap_retry_ms: default_bootstrap_retry(),
            queue_capacity: default_queue_capacity(),
        }
    }
}

impl ClientConfig {
    /// Load from a JSON file
    pub fn from_file(path: impl AsRef<std::path::Path>) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: ClientConfig = serde_json::from_str(&content)
            .map_err(|e| crate::Error::InvalidConfig(format!("failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> crate::Result<()> {
        if self.protocol_tag.len() != 3 || !self.protocol_tag.is_ascii() {
            return Err(crate::Error::InvalidConfig(format!(
                "protocol tag must be 3 ASCII bytes, got '{}'",
                self.protocol_tag
            )));
        }

        if self.request_timeout_ms == 0 || self.connect_timeout_ms == 0 {
            return Err(crate::Error::InvalidConfig("timeouts must be non-zero".into()));
        }

        if self.queue_capacity == 0 {
            return Err(crate::Error::InvalidConfig(
                "queue capacity must be non-zero".into(),
            ));
        }

        Ok(())
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn reconnect_interval(&self) -> Duration {
        Duration::from_millis(self.reconnect_interval_ms)
    }

    pub fn bootstrap_retry(&self) -> Duration {
        Duration::from_millis(self.bootstrap_retry_ms)
    }
}
