//! SSE driver configuration

use serde::Deserialize;
use std::time::Duration;

use super::error::ValidationError;

/// SSE driver configuration
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct SseConfig {
    /// Mount path for the event stream endpoint
    #[serde(default = "default_path")]
    pub path: String,

    /// Heartbeat comment period in milliseconds
    #[serde(default = "default_heartbeat_interval")]
    pub heartbeat_interval_ms: u64,

    /// Reserved; accepted and validated but not enforced
    #[serde(default = "default_connection_timeout")]
    pub connection_timeout_ms: u64,

    /// Reconnect delay advertised through the `retry:` directive
    #[serde(default = "default_retry_interval")]
    pub retry_interval_ms: u64,
}

impl SseConfig {
    /// Get the heartbeat interval as Duration
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    /// Get the retry interval as Duration
    pub fn retry_interval(&self) -> Duration {
        Duration::from_millis(self.retry_interval_ms)
    }

    /// Set the heartbeat interval.
    pub fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval_ms = interval.as_millis() as u64;
        self
    }

    /// Validate SSE configuration
    pub fn validate(&self) -> Result<(), ValidationError> {
        if !self.path.starts_with('/') {
            return Err(ValidationError::InvalidPath(self.path.clone()));
        }
        if self.heartbeat_interval_ms == 0 {
            return Err(ValidationError::ZeroInterval("heartbeat_interval_ms"));
        }
        Ok(())
    }
}

impl Default for SseConfig {
    fn default() -> Self {
        Self {
            path: default_path(),
            heartbeat_interval_ms: default_heartbeat_interval(),
            connection_timeout_ms: default_connection_timeout(),
            retry_interval_ms: default_retry_interval(),
        }
    }
}

fn default_path() -> String {
    "/sse".to_string()
}

fn default_heartbeat_interval() -> u64 {
    15_000
}

fn default_connection_timeout() -> u64 {
    60_000
}

fn default_retry_interval() -> u64 {
    3_000
}
