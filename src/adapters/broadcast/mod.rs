//! Transport-independent broadcast plumbing.
//!
//! - [`messages`] - Wire protocol shared by both transports
//! - [`hub`] - Connection registry, channel subscriptions and presence
//!   notifications, composed into each driver

pub mod hub;
pub mod messages;

pub use hub::{ConnectionHub, HubConnection};
pub use messages::{
    ClientMessage, Delivery, ErrorMessage, EventMessage, PresenceSnapshot, ServerMessage,
    SubscriptionSucceededMessage, CONNECTED_EVENT, MEMBER_ADDED_EVENT, MEMBER_REMOVED_EVENT,
};
