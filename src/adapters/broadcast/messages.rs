//! Wire protocol shared by the WebSocket and SSE transports.
//!
//! Defines the protocol between server and connected clients:
//! - Server → Client: connection handshake, events, subscription
//!   acknowledgements, errors, pongs
//! - Client → Server (WebSocket only): subscribe, unsubscribe, ping,
//!   client-originated messages

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::broadcast::{BroadcastEvent, PresenceMember};

/// Event name of the first message sent on every connection.
pub const CONNECTED_EVENT: &str = "connected";

/// Event name announcing a member joining a presence channel.
pub const MEMBER_ADDED_EVENT: &str = "member_added";

/// Event name announcing a member leaving a presence channel.
pub const MEMBER_REMOVED_EVENT: &str = "member_removed";

// ============================================
// Server → Client Messages
// ============================================

/// All message types that can be sent from server to client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Application broadcast, presence notification or the handshake.
    Event(EventMessage),

    /// Acknowledges a subscription.
    SubscriptionSucceeded(SubscriptionSucceededMessage),

    /// Malformed or rejected client message.
    Error(ErrorMessage),

    /// Heartbeat response.
    Pong,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventMessage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel: Option<String>,
    pub event: String,
    #[serde(default)]
    pub data: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubscriptionSucceededMessage {
    pub channel: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<PresenceSnapshot>,
}

/// Members already on a presence channel when a subscription succeeds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PresenceSnapshot {
    pub members: Vec<PresenceMember>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorMessage {
    pub error: String,
}

/// How a message is treated when the recipient is saturated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Always attempted (handshake, acknowledgements, errors, pongs).
    Critical,
    /// Dropped for a connection above its backpressure watermark.
    Droppable,
}

impl ServerMessage {
    /// The connection handshake carrying the assigned identifier.
    ///
    /// `data` is transport specific (`{socketId}` or `{connectionId}`).
    pub fn connected(data: Value) -> Self {
        ServerMessage::Event(EventMessage {
            channel: None,
            event: CONNECTED_EVENT.to_string(),
            data,
        })
    }

    /// An event on `channel`.
    pub fn event(channel: impl Into<String>, event: impl Into<String>, data: Value) -> Self {
        ServerMessage::Event(EventMessage {
            channel: Some(channel.into()),
            event: event.into(),
            data,
        })
    }

    pub fn member_added(channel: &str, member: PresenceMember) -> Self {
        Self::event(channel, MEMBER_ADDED_EVENT, member)
    }

    pub fn member_removed(channel: &str, member: PresenceMember) -> Self {
        Self::event(channel, MEMBER_REMOVED_EVENT, member)
    }

    /// Subscription acknowledgement; `members` is set for presence channels.
    pub fn subscription_succeeded(
        channel: impl Into<String>,
        members: Option<Vec<PresenceMember>>,
    ) -> Self {
        ServerMessage::SubscriptionSucceeded(SubscriptionSucceededMessage {
            channel: channel.into(),
            data: members.map(|members| PresenceSnapshot { members }),
        })
    }

    pub fn error(error: impl Into<String>) -> Self {
        ServerMessage::Error(ErrorMessage {
            error: error.into(),
        })
    }

    /// Channel events are droppable; the channel-less handshake and every
    /// other message are critical.
    pub fn delivery(&self) -> Delivery {
        match self {
            ServerMessage::Event(e) if e.channel.is_none() && e.event == CONNECTED_EVENT => {
                Delivery::Critical
            }
            ServerMessage::Event(_) => Delivery::Droppable,
            _ => Delivery::Critical,
        }
    }

    /// Name used for the SSE `event:` field.
    pub fn event_name(&self) -> &str {
        match self {
            ServerMessage::Event(e) => &e.event,
            ServerMessage::SubscriptionSucceeded(_) => "subscription_succeeded",
            ServerMessage::Error(_) => "error",
            ServerMessage::Pong => "pong",
        }
    }
}

impl From<&BroadcastEvent> for ServerMessage {
    fn from(event: &BroadcastEvent) -> Self {
        ServerMessage::event(event.channel.clone(), event.event.clone(), event.data.clone())
    }
}

// ============================================
// Client → Server Messages
// ============================================

/// All message types that can be received from a WebSocket client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Join a channel; `data` is member info for presence channels.
    Subscribe {
        channel: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        data: Option<PresenceMember>,
    },

    /// Leave a channel.
    Unsubscribe { channel: String },

    /// Application-level heartbeat.
    Ping,

    /// Client-originated event for the other subscribers of `channel`.
    Message {
        channel: String,
        event: String,
        #[serde(default)]
        data: Value,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn connected_message_has_no_channel() {
        let msg = ServerMessage::connected(json!({"socketId": "1.abc"}));
        let json = serde_json::to_value(&msg).unwrap();

        assert_eq!(
            json,
            json!({"type": "event", "event": "connected", "data": {"socketId": "1.abc"}})
        );
    }

    #[test]
    fn event_message_serializes_with_type_tag() {
        let msg = ServerMessage::event("orders.123", "updated", json!({"id": 123}));
        let json = serde_json::to_string(&msg).unwrap();

        assert!(json.contains(r#""type":"event""#));
        assert!(json.contains(r#""channel":"orders.123""#));
    }

    #[test]
    fn subscription_succeeded_includes_members_for_presence() {
        let msg = ServerMessage::subscription_succeeded(
            "presence-room-1",
            Some(vec![json!({"id": "u1", "name": "Alice"})]),
        );
        let json = serde_json::to_value(&msg).unwrap();

        assert_eq!(json["type"], "subscription_succeeded");
        assert_eq!(json["data"]["members"][0]["name"], "Alice");
    }

    #[test]
    fn subscription_succeeded_omits_data_for_plain_channels() {
        let msg = ServerMessage::subscription_succeeded("chat", None);
        let json = serde_json::to_value(&msg).unwrap();

        assert_eq!(json, json!({"type": "subscription_succeeded", "channel": "chat"}));
    }

    #[test]
    fn pong_and_error_serialize_correctly() {
        assert_eq!(
            serde_json::to_string(&ServerMessage::Pong).unwrap(),
            r#"{"type":"pong"}"#
        );
        assert_eq!(
            serde_json::to_value(ServerMessage::error("bad")).unwrap(),
            json!({"type": "error", "error": "bad"})
        );
    }

    #[test]
    fn only_ordinary_events_are_droppable() {
        assert_eq!(
            ServerMessage::event("c", "e", Value::Null).delivery(),
            Delivery::Droppable
        );
        assert_eq!(
            ServerMessage::member_added("presence-c", json!({})).delivery(),
            Delivery::Droppable
        );
        assert_eq!(
            ServerMessage::connected(json!({})).delivery(),
            Delivery::Critical
        );
        assert_eq!(
            ServerMessage::event("chat", CONNECTED_EVENT, Value::Null).delivery(),
            Delivery::Droppable
        );
        assert_eq!(
            ServerMessage::subscription_succeeded("c", None).delivery(),
            Delivery::Critical
        );
        assert_eq!(ServerMessage::error("x").delivery(), Delivery::Critical);
        assert_eq!(ServerMessage::Pong.delivery(), Delivery::Critical);
    }

    #[test]
    fn client_message_deserializes_subscribe_with_member() {
        let json = r#"{"type":"subscribe","channel":"presence-room","data":{"id":"u1"}}"#;
        let msg: ClientMessage = serde_json::from_str(json).unwrap();

        assert_eq!(
            msg,
            ClientMessage::Subscribe {
                channel: "presence-room".to_string(),
                data: Some(json!({"id": "u1"})),
            }
        );
    }

    #[test]
    fn client_message_deserializes_ping_and_unsubscribe() {
        let ping: ClientMessage = serde_json::from_str(r#"{"type":"ping"}"#).unwrap();
        assert_eq!(ping, ClientMessage::Ping);

        let unsub: ClientMessage =
            serde_json::from_str(r#"{"type":"unsubscribe","channel":"chat"}"#).unwrap();
        assert_eq!(
            unsub,
            ClientMessage::Unsubscribe {
                channel: "chat".to_string()
            }
        );
    }

    #[test]
    fn client_message_rejects_unknown_type() {
        assert!(serde_json::from_str::<ClientMessage>(r#"{"type":"explode"}"#).is_err());
        assert!(serde_json::from_str::<ClientMessage>(r#"{"type":"subscribe"}"#).is_err());
    }

    #[test]
    fn broadcast_event_converts_to_event_message() {
        let event = BroadcastEvent::new("chat", "typing", json!({"user": "u1"}));
        let msg = ServerMessage::from(&event);

        assert_eq!(msg, ServerMessage::event("chat", "typing", json!({"user": "u1"})));
    }
}
