//! Server-Sent Events transport for the broadcast layer.
//!
//! - [`connection`] - Per-stream state and SSE frame encoding
//! - [`driver`] - [`SseDriver`]: stream handler, RPC-driven subscriptions,
//!   heartbeat

pub mod connection;
pub mod driver;

pub use connection::{SseConnection, SseFrame};
pub use driver::{SseDriver, SseStream};
