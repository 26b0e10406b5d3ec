//! Application configuration module
//!
//! This module provides type-safe configuration loading from environment variables
//! using the `config` and `dotenvy` crates. Configuration is loaded with the
//! `VELOX` prefix and nested values use double underscores as separators.
//!
//! # Example
//!
//! ```no_run
//! use velox_events::config::AppConfig;
//!
//! let config = AppConfig::load().expect("Failed to load configuration");
//! config.validate().expect("Invalid configuration");
//!
//! println!("WebSocket endpoint mounted at {}", config.websocket.path);
//! ```

mod error;
mod redis;
mod server;
mod sse;
mod websocket;

pub use error::{ConfigError, ValidationError};
pub use self::redis::RedisConfig;
pub use server::{CorsOrigins, Environment, LogFormat, ServerConfig};
pub use sse::SseConfig;
pub use websocket::{WebSocketConfig, DEFAULT_RELAY_CHANNEL};

use serde::Deserialize;

/// Root application configuration
///
/// Every section has defaults, so an empty environment yields a working
/// single-instance setup. Load using [`AppConfig::load()`].
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    /// Server configuration (host, port, environment, logging)
    #[serde(default)]
    pub server: ServerConfig,

    /// WebSocket driver configuration (including optional Redis relay)
    #[serde(default)]
    pub websocket: WebSocketConfig,

    /// SSE driver configuration
    #[serde(default)]
    pub sse: SseConfig,
}

impl AppConfig {
    /// Load configuration from environment variables
    ///
    /// This function:
    /// 1. Loads `.env` file if present (for development)
    /// 2. Reads environment variables with `VELOX` prefix
    /// 3. Uses `__` (double underscore) to separate nested values
    /// 4. Deserializes into typed configuration structs
    ///
    /// # Environment Variable Format
    ///
    /// - `VELOX__SERVER__PORT=8080` -> `server.port = 8080`
    /// - `VELOX__WEBSOCKET__REDIS__URL=...` -> `websocket.redis.url = ...`
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if values cannot be parsed into expected types.
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let config = config::Config::builder()
            .add_source(
                config::Environment::default()
                    .prefix("VELOX")
                    .separator("__"),
            )
            .build()?
            .try_deserialize()?;

        Ok(config)
    }

    /// Validate all configuration values
    ///
    /// # Errors
    ///
    /// Returns `ValidationError` if any configuration value is invalid.
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.server.validate()?;
        self.websocket.validate()?;
        self.sse.validate()?;
        if self.websocket.path == self.sse.path {
            return Err(ValidationError::PathConflict(self.sse.path.clone()));
        }
        Ok(())
    }

    /// Check if running in production environment
    pub fn is_production(&self) -> bool {
        self.server.is_production()
    }
}
