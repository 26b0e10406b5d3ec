//! Configuration error types

use thiserror::Error;

/// Errors that can occur during configuration loading
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration loading failed: {0}")]
    LoadError(#[from] config::ConfigError),

    #[error("Validation failed: {0}")]
    ValidationFailed(#[from] ValidationError),
}

/// Errors that can occur during configuration validation
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Required configuration missing: {0}")]
    MissingRequired(&'static str),

    #[error("Invalid port number")]
    InvalidPort,

    #[error("Invalid bind address")]
    InvalidBindAddress,

    #[error("Invalid Redis URL format")]
    InvalidRedisUrl,

    #[error("Mount path must start with '/': {0}")]
    InvalidPath(String),

    #[error("Interval '{0}' must be greater than zero")]
    ZeroInterval(&'static str),

    #[error("Maximum payload size must be greater than zero")]
    InvalidPayloadSize,

    #[error("Relay channel name cannot be empty")]
    EmptyRelayChannel,

    #[error("WebSocket and SSE endpoints share the path {0}")]
    PathConflict(String),
}
