//! Error types for the broadcast layer.

use thiserror::Error;

use super::ids::ConnectionId;

/// Errors raised by relay (cross-instance pub/sub) operations.
#[derive(Debug, Clone, Error)]
pub enum RelayError {
    /// Redis communication error
    #[error("Redis error: {0}")]
    Redis(String),

    /// Operation timed out waiting on the relay backend
    #[error("Relay operation timed out")]
    Timeout,

    /// Envelope could not be serialized
    #[error("Failed to encode relay message: {0}")]
    Encode(String),

    /// The relay has been shut down
    #[error("Relay is closed")]
    Closed,
}

/// Errors raised by broadcast driver operations.
///
/// Per-connection delivery failures are never reported through this type;
/// they are isolated at the point of writing.
#[derive(Debug, Clone, Error)]
pub enum BroadcastError {
    #[error("Relay failure: {0}")]
    Relay(#[from] RelayError),

    #[error("Unknown connection: {0}")]
    UnknownConnection(ConnectionId),

    #[error("Driver is closed")]
    Closed,
}
