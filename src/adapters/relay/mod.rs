//! Relay adapters - cross-instance pub/sub backends.
//!
//! - `redis` - Production relay over two Redis connections
//! - `in_memory` - In-process relay for tests and single-binary setups

pub mod in_memory;
pub mod redis;

pub use in_memory::{InMemoryRelay, InMemoryRelayPublisher, InMemoryRelaySubscriber};
pub use self::redis::{RedisRelayPublisher, RedisRelaySubscriber};
