//! Redis relay connection settings

use serde::Deserialize;
use std::time::Duration;

use super::error::ValidationError;

const SCHEMES: &[&str] = &["redis://", "rediss://", "redis+unix://", "unix://"];

/// Connection settings for the cross-instance relay
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct RedisConfig {
    /// `redis://`, `rediss://` (TLS) or a unix socket URL
    pub url: String,

    /// Applies to each of the two relay connections
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
}

impl RedisConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            connect_timeout_secs: default_connect_timeout(),
        }
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    /// URL with any password replaced, for logs.
    pub fn redacted_url(&self) -> String {
        let Some((scheme, rest)) = self.url.split_once("://") else {
            return self.url.clone();
        };
        match rest.rsplit_once('@') {
            Some((credentials, host)) => {
                let user = credentials.split(':').next().unwrap_or_default();
                format!("{scheme}://{user}:***@{host}")
            }
            None => self.url.clone(),
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.url.is_empty() {
            return Err(ValidationError::MissingRequired("VELOX__WEBSOCKET__REDIS__URL"));
        }
        if !SCHEMES.iter().any(|scheme| self.url.starts_with(scheme)) {
            return Err(ValidationError::InvalidRedisUrl);
        }
        if self.connect_timeout_secs == 0 {
            return Err(ValidationError::ZeroInterval("connect_timeout_secs"));
        }
        Ok(())
    }
}

fn default_connect_timeout() -> u64 {
    5
}
