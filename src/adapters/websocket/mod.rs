//! WebSocket transport for the broadcast layer.
//!
//! # Components
//!
//! - [`connection`] - Per-client state: outbound queue, liveness flag,
//!   buffered-byte backpressure
//! - [`driver`] - [`WebSocketDriver`]: upgrade handling, client protocol,
//!   liveness sweep, cross-instance relay
//! - [`memory`] - In-memory socket pair for driving connections without a
//!   network

pub mod connection;
pub mod driver;
pub mod memory;

pub use connection::{Outbound, WsConnection};
pub use driver::WebSocketDriver;
pub use memory::{socket_pair, MemoryClient, MemorySocket};
