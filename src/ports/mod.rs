//! Ports - Interfaces for external dependencies.
//!
//! Following hexagonal architecture, ports define the contracts between
//! the broadcast core and the outside world. Adapters implement these ports.
//!
//! ## Delivery Ports
//!
//! - `BroadcastDriver` - Driver contract shared by WebSocket and SSE transports
//!
//! ## Scaling Infrastructure Ports
//!
//! - `RelayPublisher` / `RelaySubscriber` - Split pub/sub roles for cross-instance fan-out
//! - `Relay` - Optional relay capability (enabled or disabled at construction)

mod broadcast_driver;
mod relay;

pub use broadcast_driver::BroadcastDriver;
pub use relay::{Relay, RelayPublisher, RelaySubscriber};
