//! Adapters - Implementations of port interfaces.
//!
//! Adapters connect the broadcast domain to external systems:
//! - `broadcast` - Wire protocol and the connection hub shared by transports
//! - `relay` - Cross-instance pub/sub backends (Redis, in-memory)
//! - `websocket` - WebSocket broadcast driver
//! - `sse` - Server-Sent Events broadcast driver

pub mod broadcast;
pub mod relay;
pub mod sse;
pub mod websocket;

pub use relay::InMemoryRelay;
pub use sse::SseDriver;
pub use websocket::WebSocketDriver;
