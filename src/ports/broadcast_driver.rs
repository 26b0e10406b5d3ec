//! BroadcastDriver port - the contract every real-time transport implements.
//!
//! Application code publishes through this trait and never needs to know
//! whether clients are attached over WebSocket or SSE.

use async_trait::async_trait;

use crate::domain::broadcast::{BroadcastError, BroadcastEvent, ConnectionId, PresenceMember};

/// Port for delivering broadcast events to connected clients.
///
/// Implementations must ensure:
/// - `broadcast` never fails because of an individual connection; a send
///   failure on one connection does not affect delivery to others
/// - Queries reflect only channels with at least one live subscriber
/// - `close` stops timers, terminates connections and releases relay
///   connections, in that order, and does not hang
///
/// # Example
///
/// ```ignore
/// let event = BroadcastEvent::new("orders.123", "updated", json!({"status": "shipped"}));
/// driver.broadcast(event).await?;
/// ```
#[async_trait]
pub trait BroadcastDriver: Send + Sync {
    /// Deliver `event` to local subscribers of `event.channel` (minus
    /// `event.except`) and, where supported, relay it to peer instances.
    ///
    /// Local delivery happens before the relay publish, so a relay error
    /// means peers missed the event, not local subscribers.
    async fn broadcast(&self, event: BroadcastEvent) -> Result<(), BroadcastError>;

    /// Connection IDs currently subscribed to `channel`.
    async fn subscribers(&self, channel: &str) -> Vec<ConnectionId>;

    /// Presence members of `channel`; empty for non-presence channels.
    async fn presence_members(&self, channel: &str) -> Vec<PresenceMember>;

    /// Number of subscribers of `channel` (0 if absent).
    async fn connection_count(&self, channel: &str) -> usize;

    /// Every channel with at least one subscriber.
    async fn channels(&self) -> Vec<String>;

    /// Number of live connections, subscribed or not.
    async fn connection_total(&self) -> usize;

    /// Release every resource held by the driver.
    async fn close(&self);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::{SseDriver, WebSocketDriver};

    // Supertraits make this a Send + Sync check as well
    fn assert_driver<T: BroadcastDriver>() {}

    #[test]
    fn both_transports_implement_the_driver_contract() {
        assert_driver::<WebSocketDriver>();
        assert_driver::<SseDriver>();
    }
}
