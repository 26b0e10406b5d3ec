//! Relay ports - cross-instance pub/sub used for horizontal fan-out.
//!
//! Pub/sub backends forbid issuing commands on a connection that is in
//! subscriber mode, so the two roles are separate types backed by separate
//! physical connections. A subscriber has no way to publish and a
//! publisher has no way to subscribe.

use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::domain::broadcast::RelayError;

/// Publishing half of a relay.
#[async_trait]
pub trait RelayPublisher: Send + Sync {
    /// Publish `payload` on `channel`.
    async fn publish(&self, channel: &str, payload: String) -> Result<(), RelayError>;

    /// Close the underlying connection.
    async fn quit(&self) -> Result<(), RelayError>;
}

/// Subscribing half of a relay.
#[async_trait]
pub trait RelaySubscriber: Send {
    /// Subscribe to `channel`. Must be called before [`into_messages`].
    ///
    /// [`into_messages`]: RelaySubscriber::into_messages
    async fn subscribe(&mut self, channel: &str) -> Result<(), RelayError>;

    /// Consume the subscriber, yielding raw payloads of received messages.
    ///
    /// The stream ends when the connection closes. Dropping it closes the
    /// subscriber connection.
    fn into_messages(self: Box<Self>) -> BoxStream<'static, String>;
}

/// Optional relay capability injected into a driver.
///
/// `Disabled` is the single-instance deployment: no relay traffic at all.
pub enum Relay {
    Disabled,
    Enabled {
        publisher: Box<dyn RelayPublisher>,
        subscriber: Box<dyn RelaySubscriber>,
    },
}

impl Relay {
    /// Build an enabled relay from its two halves.
    pub fn enabled(
        publisher: impl RelayPublisher + 'static,
        subscriber: impl RelaySubscriber + 'static,
    ) -> Self {
        Relay::Enabled {
            publisher: Box::new(publisher),
            subscriber: Box::new(subscriber),
        }
    }

    pub fn is_enabled(&self) -> bool {
        matches!(self, Relay::Enabled { .. })
    }
}

impl std::fmt::Debug for Relay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Relay::Disabled => write!(f, "Relay::Disabled"),
            Relay::Enabled { .. } => write!(f, "Relay::Enabled"),
        }
    }
}
