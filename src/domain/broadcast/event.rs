//! Broadcast events and their relay envelope.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::ids::{ConnectionId, InstanceId};

/// Reserved name prefix marking a channel as a presence channel.
pub const PRESENCE_PREFIX: &str = "presence-";

/// Member info a connection declares when joining a presence channel.
///
/// Arbitrary JSON chosen by the application (typically `{id, name}`).
pub type PresenceMember = Value;

/// Returns true when `channel` carries the presence prefix.
pub fn is_presence_channel(channel: &str) -> bool {
    channel.starts_with(PRESENCE_PREFIX)
}

/// A transient (channel, event, payload) triple to deliver to subscribers.
///
/// `except` suppresses echo back to the originating connection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BroadcastEvent {
    pub channel: String,
    pub event: String,
    #[serde(default)]
    pub data: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub except: Option<ConnectionId>,
}

impl BroadcastEvent {
    /// Creates an event addressed to every subscriber of `channel`.
    pub fn new(channel: impl Into<String>, event: impl Into<String>, data: Value) -> Self {
        Self {
            channel: channel.into(),
            event: event.into(),
            data,
            except: None,
        }
    }

    /// Excludes `connection` from delivery.
    pub fn except(mut self, connection: ConnectionId) -> Self {
        self.except = Some(connection);
        self
    }
}

/// Wire form of a [`BroadcastEvent`] relayed between instances.
///
/// Identical to the event plus an `__origin` field naming the publishing
/// instance. Receivers drop envelopes carrying their own origin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelayEnvelope {
    #[serde(flatten)]
    pub event: BroadcastEvent,
    #[serde(rename = "__origin")]
    pub origin: InstanceId,
}

impl RelayEnvelope {
    /// Tags `event` with the publishing instance.
    pub fn new(event: BroadcastEvent, origin: InstanceId) -> Self {
        Self { event, origin }
    }

    /// Whether this envelope was published by `instance`.
    pub fn is_from(&self, instance: &InstanceId) -> bool {
        &self.origin == instance
    }

    /// Strips the origin tag.
    pub fn into_event(self) -> BroadcastEvent {
        self.event
    }
}
