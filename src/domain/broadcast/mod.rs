//! Broadcast domain - connections, channels, presence and events.
//!
//! Transport-independent vocabulary shared by the WebSocket and SSE
//! drivers. Nothing here performs I/O.

mod errors;
mod event;
mod ids;
mod registry;

pub use errors::{BroadcastError, RelayError};
pub use event::{
    is_presence_channel, BroadcastEvent, PresenceMember, RelayEnvelope, PRESENCE_PREFIX,
};
pub use ids::{ConnectionId, InstanceId};
pub use registry::{ChannelRegistry, Joined, Left};
