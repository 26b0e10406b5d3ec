//! WebSocket driver configuration

use serde::Deserialize;
use std::time::Duration;

use super::error::ValidationError;
use super::redis::RedisConfig;

/// Redis channel carrying cross-instance relay traffic.
pub const DEFAULT_RELAY_CHANNEL: &str = "velox:broadcast";

/// WebSocket driver configuration
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct WebSocketConfig {
    /// Mount path for the upgrade endpoint
    #[serde(default = "default_path")]
    pub path: String,

    /// Liveness sweep period in milliseconds
    #[serde(default = "default_ping_interval")]
    pub ping_interval_ms: u64,

    /// Reserved; accepted and validated but not enforced
    #[serde(default = "default_connection_timeout")]
    pub connection_timeout_ms: u64,

    /// Maximum inbound message size in bytes
    #[serde(default = "default_max_payload_size")]
    pub max_payload_size: usize,

    /// Queued outbound bytes above which ordinary events are dropped
    #[serde(default = "default_backpressure_watermark")]
    pub backpressure_watermark: usize,

    /// Redis channel used for cross-instance relay
    #[serde(default = "default_relay_channel")]
    pub relay_channel: String,

    /// Enables cross-instance relay when set
    #[serde(default)]
    pub redis: Option<RedisConfig>,
}

impl WebSocketConfig {
    /// Get the ping interval as Duration
    pub fn ping_interval(&self) -> Duration {
        Duration::from_millis(self.ping_interval_ms)
    }

    /// Get the connection timeout as Duration
    pub fn connection_timeout(&self) -> Duration {
        Duration::from_millis(self.connection_timeout_ms)
    }

    /// Set the ping interval.
    pub fn with_ping_interval(mut self, interval: Duration) -> Self {
        self.ping_interval_ms = interval.as_millis() as u64;
        self
    }

    /// Set the backpressure watermark in bytes.
    pub fn with_backpressure_watermark(mut self, bytes: usize) -> Self {
        self.backpressure_watermark = bytes;
        self
    }

    /// Enable Redis relay.
    pub fn with_redis(mut self, redis: RedisConfig) -> Self {
        self.redis = Some(redis);
        self
    }

    /// Validate WebSocket configuration
    pub fn validate(&self) -> Result<(), ValidationError> {
        if !self.path.starts_with('/') {
            return Err(ValidationError::InvalidPath(self.path.clone()));
        }
        if self.ping_interval_ms == 0 {
            return Err(ValidationError::ZeroInterval("ping_interval_ms"));
        }
        if self.max_payload_size == 0 {
            return Err(ValidationError::InvalidPayloadSize);
        }
        if self.relay_channel.is_empty() {
            return Err(ValidationError::EmptyRelayChannel);
        }
        if let Some(redis) = &self.redis {
            redis.validate()?;
        }
        Ok(())
    }
}

impl Default for WebSocketConfig {
    fn default() -> Self {
        Self {
            path: default_path(),
            ping_interval_ms: default_ping_interval(),
            connection_timeout_ms: default_connection_timeout(),
            max_payload_size: default_max_payload_size(),
            backpressure_watermark: default_backpressure_watermark(),
            relay_channel: default_relay_channel(),
            redis: None,
        }
    }
}

fn default_path() -> String {
    "/ws".to_string()
}

fn default_ping_interval() -> u64 {
    30_000
}

fn default_connection_timeout() -> u64 {
    60_000
}

fn default_max_payload_size() -> usize {
    100 * 1024
}

fn default_backpressure_watermark() -> usize {
    64 * 1024
}

fn default_relay_channel() -> String {
    DEFAULT_RELAY_CHANNEL.to_string()
}
