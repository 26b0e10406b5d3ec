//! Connection hub: live connections plus the shared channel registry.
//!
//! Both transports compose a `ConnectionHub` and differ only in how a
//! connection writes a [`ServerMessage`] to its client. The hub owns all
//! mutable broadcast state for one driver instance; nothing is global, so
//! several drivers (or tests) can run side by side.
//!
//! # Delivery
//!
//! Recipients are snapshotted under the lock and messages are delivered
//! after it is released. `HubConnection::deliver` must not block: it queues
//! or drops, and reports which.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::domain::broadcast::{
    BroadcastError, BroadcastEvent, ChannelRegistry, ConnectionId, Left, PresenceMember,
};

use super::messages::ServerMessage;

/// A transport connection the hub can deliver messages to.
pub trait HubConnection: Send + Sync + 'static {
    fn id(&self) -> &ConnectionId;

    /// Queue `message` for the client without blocking.
    ///
    /// Returns `false` when the message was not queued (dropped under
    /// backpressure or the transport is gone). Never panics.
    fn deliver(&self, message: &ServerMessage) -> bool;
}

struct HubState<C> {
    connections: HashMap<ConnectionId, Arc<C>>,
    registry: ChannelRegistry<ConnectionId>,
}

impl<C> HubState<C> {
    fn lookup(&self, ids: &[ConnectionId]) -> Vec<Arc<C>> {
        ids.iter()
            .filter_map(|id| self.connections.get(id).cloned())
            .collect()
    }
}

/// Registry of live connections and their channel memberships.
pub struct ConnectionHub<C> {
    state: RwLock<HubState<C>>,
}

impl<C: HubConnection> ConnectionHub<C> {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(HubState {
                connections: HashMap::new(),
                registry: ChannelRegistry::new(),
            }),
        }
    }

    /// Register a freshly accepted connection.
    pub async fn register(&self, connection: Arc<C>) {
        let mut state = self.state.write().await;
        state
            .connections
            .insert(connection.id().clone(), connection);
    }

    pub async fn connection(&self, id: &ConnectionId) -> Option<Arc<C>> {
        self.state.read().await.connections.get(id).cloned()
    }

    /// Snapshot of every live connection.
    pub async fn connections(&self) -> Vec<Arc<C>> {
        self.state.read().await.connections.values().cloned().collect()
    }

    /// Subscribe a registered connection to `channel`.
    ///
    /// On presence channels with member info, the other subscribers receive
    /// `member_added`. The subscriber then receives `subscription_succeeded`,
    /// carrying the pre-existing members on presence channels.
    pub async fn subscribe(
        &self,
        id: &ConnectionId,
        channel: &str,
        member: Option<PresenceMember>,
    ) -> Result<(), BroadcastError> {
        let (subscriber, peers, joined) = {
            let mut state = self.state.write().await;
            let subscriber = state
                .connections
                .get(id)
                .cloned()
                .ok_or_else(|| BroadcastError::UnknownConnection(id.clone()))?;
            let joined = state.registry.subscribe(id, channel, member);
            let peers = state.lookup(&joined.peers);
            (subscriber, peers, joined)
        };

        if let Some(member) = joined.member_added {
            let announcement = ServerMessage::member_added(channel, member);
            for peer in &peers {
                peer.deliver(&announcement);
            }
        }

        subscriber.deliver(&ServerMessage::subscription_succeeded(
            channel,
            joined.members,
        ));

        tracing::debug!(connection_id = %id, channel, "Subscribed");
        Ok(())
    }

    /// Unsubscribe a connection from `channel`.
    ///
    /// Returns `false` if it was not subscribed.
    pub async fn unsubscribe(&self, id: &ConnectionId, channel: &str) -> bool {
        let departure = {
            let mut state = self.state.write().await;
            state.registry.unsubscribe(id, channel).map(|left| {
                let peers = state.lookup(&left.peers);
                (left, peers)
            })
        };

        match departure {
            Some((left, peers)) => {
                announce_departure(&left, &peers);
                tracing::debug!(connection_id = %id, channel, "Unsubscribed");
                true
            }
            None => false,
        }
    }

    /// Remove a connection and every subscription it holds.
    ///
    /// Safe to call more than once; later calls return `None`.
    pub async fn remove(&self, id: &ConnectionId) -> Option<Arc<C>> {
        let (connection, departures) = {
            let mut state = self.state.write().await;
            let connection = state.connections.remove(id)?;
            let departures: Vec<_> = state
                .registry
                .remove_connection(id)
                .into_iter()
                .map(|left| {
                    let peers = state.lookup(&left.peers);
                    (left, peers)
                })
                .collect();
            (connection, departures)
        };

        for (left, peers) in &departures {
            announce_departure(left, peers);
        }

        tracing::debug!(
            connection_id = %id,
            channels = departures.len(),
            "Connection removed"
        );
        Some(connection)
    }

    /// Deliver `event` to local subscribers, skipping `event.except`.
    ///
    /// Returns how many connections accepted the message.
    pub async fn broadcast(&self, event: &BroadcastEvent) -> usize {
        let recipients = {
            let state = self.state.read().await;
            let ids = state
                .registry
                .recipients(&event.channel, event.except.as_ref());
            state.lookup(&ids)
        };

        if recipients.is_empty() {
            return 0;
        }

        let message = ServerMessage::from(event);
        recipients
            .iter()
            .filter(|connection| connection.deliver(&message))
            .count()
    }

    pub async fn is_subscribed(&self, id: &ConnectionId, channel: &str) -> bool {
        self.state.read().await.registry.is_subscribed(id, channel)
    }

    pub async fn subscribers(&self, channel: &str) -> Vec<ConnectionId> {
        self.state.read().await.registry.subscribers(channel)
    }

    pub async fn presence_members(&self, channel: &str) -> Vec<PresenceMember> {
        self.state.read().await.registry.presence_members(channel)
    }

    pub async fn connection_count(&self, channel: &str) -> usize {
        self.state.read().await.registry.subscriber_count(channel)
    }

    pub async fn channels(&self) -> Vec<String> {
        self.state.read().await.registry.channels()
    }

    pub async fn channels_of(&self, id: &ConnectionId) -> Vec<String> {
        self.state.read().await.registry.channels_of(id)
    }

    pub async fn connection_total(&self) -> usize {
        self.state.read().await.connections.len()
    }

    /// Clear all state, handing back the connections for termination.
    ///
    /// No presence notifications are sent: every peer is going away too.
    pub async fn drain(&self) -> Vec<Arc<C>> {
        let mut state = self.state.write().await;
        state.registry.clear();
        state.connections.drain().map(|(_, c)| c).collect()
    }
}

impl<C: HubConnection> Default for ConnectionHub<C> {
    fn default() -> Self {
        Self::new()
    }
}

fn announce_departure<C: HubConnection>(left: &Left<ConnectionId>, peers: &[Arc<C>]) {
    if let Some(member) = &left.member_removed {
        let announcement = ServerMessage::member_removed(&left.channel, member.clone());
        for peer in peers {
            peer.deliver(&announcement);
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::adapters::broadcast::messages::MEMBER_ADDED_EVENT;
    use serde_json::json;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;

    /// Connection that records everything it is asked to deliver.
    pub(crate) struct RecordingConnection {
        id: ConnectionId,
        sent: Mutex<Vec<ServerMessage>>,
        broken: AtomicBool,
    }

    impl RecordingConnection {
        pub(crate) fn new(id: &str) -> Arc<Self> {
            Arc::new(Self {
                id: ConnectionId::from(id),
                sent: Mutex::new(Vec::new()),
                broken: AtomicBool::new(false),
            })
        }

        pub(crate) fn sent(&self) -> Vec<ServerMessage> {
            self.sent.lock().unwrap().clone()
        }

        pub(crate) fn events(&self, name: &str) -> Vec<ServerMessage> {
            self.sent()
                .into_iter()
                .filter(|m| matches!(m, ServerMessage::Event(e) if e.event == name))
                .collect()
        }

        fn break_transport(&self) {
            self.broken.store(true, Ordering::SeqCst);
        }
    }

    impl HubConnection for RecordingConnection {
        fn id(&self) -> &ConnectionId {
            &self.id
        }

        fn deliver(&self, message: &ServerMessage) -> bool {
            if self.broken.load(Ordering::SeqCst) {
                return false;
            }
            self.sent.lock().unwrap().push(message.clone());
            true
        }
    }

    async fn hub_with(ids: &[&str]) -> (ConnectionHub<RecordingConnection>, Vec<Arc<RecordingConnection>>) {
        let hub = ConnectionHub::new();
        let mut connections = Vec::new();
        for id in ids {
            let connection = RecordingConnection::new(id);
            hub.register(connection.clone()).await;
            connections.push(connection);
        }
        (hub, connections)
    }

    #[tokio::test]
    async fn subscribe_unknown_connection_fails() {
        let hub: ConnectionHub<RecordingConnection> = ConnectionHub::new();
        let result = hub.subscribe(&ConnectionId::from("ghost"), "chat", None).await;

        assert!(matches!(result, Err(BroadcastError::UnknownConnection(_))));
        assert!(hub.channels().await.is_empty());
    }

    #[tokio::test]
    async fn subscribe_acknowledges_plain_channel_without_members() {
        let (hub, conns) = hub_with(&["a"]).await;
        hub.subscribe(conns[0].id(), "chat", None).await.unwrap();

        assert_eq!(
            conns[0].sent(),
            vec![ServerMessage::subscription_succeeded("chat", None)]
        );
    }

    #[tokio::test]
    async fn presence_example_scenario() {
        let alice = json!({"id": "u1", "name": "Alice"});
        let bob = json!({"id": "u2", "name": "Bob"});
        let (hub, conns) = hub_with(&["A", "B"]).await;
        let (a, b) = (&conns[0], &conns[1]);

        hub.subscribe(a.id(), "presence-room-1", Some(alice.clone()))
            .await
            .unwrap();
        hub.subscribe(b.id(), "presence-room-1", Some(bob.clone()))
            .await
            .unwrap();

        assert_eq!(
            a.events(MEMBER_ADDED_EVENT),
            vec![ServerMessage::member_added("presence-room-1", bob.clone())]
        );
        assert!(b.events(MEMBER_ADDED_EVENT).is_empty());
        assert_eq!(
            b.sent().last().unwrap(),
            &ServerMessage::subscription_succeeded("presence-room-1", Some(vec![alice.clone()]))
        );

        hub.remove(b.id()).await;

        assert_eq!(
            a.events("member_removed"),
            vec![ServerMessage::member_removed("presence-room-1", bob)]
        );
        assert!(b.events("member_removed").is_empty());
        assert_eq!(hub.presence_members("presence-room-1").await, vec![alice]);
    }

    #[tokio::test]
    async fn unsubscribe_without_member_entry_sends_no_member_removed() {
        let (hub, conns) = hub_with(&["A", "B"]).await;
        hub.subscribe(conns[0].id(), "presence-room", Some(json!({"id": 1})))
            .await
            .unwrap();
        hub.subscribe(conns[1].id(), "presence-room", None)
            .await
            .unwrap();

        assert!(hub.unsubscribe(conns[1].id(), "presence-room").await);
        assert!(conns[0].events("member_removed").is_empty());
    }

    #[tokio::test]
    async fn broadcast_skips_excluded_connection() {
        let (hub, conns) = hub_with(&["a", "b", "c"]).await;
        for conn in &conns {
            hub.subscribe(conn.id(), "chat", None).await.unwrap();
        }

        let event = BroadcastEvent::new("chat", "typing", json!({})).except(conns[0].id().clone());
        let delivered = hub.broadcast(&event).await;

        assert_eq!(delivered, 2);
        assert!(conns[0].events("typing").is_empty());
        assert_eq!(conns[1].events("typing").len(), 1);
        assert_eq!(conns[2].events("typing").len(), 1);
    }

    #[tokio::test]
    async fn broadcast_is_isolated_by_channel_name() {
        let (hub, conns) = hub_with(&["a", "b", "c"]).await;
        hub.subscribe(conns[0].id(), "orders.123", None).await.unwrap();
        hub.subscribe(conns[1].id(), "orders.124", None).await.unwrap();
        hub.subscribe(conns[2].id(), "orders", None).await.unwrap();

        hub.broadcast(&BroadcastEvent::new("orders.123", "updated", json!({})))
            .await;

        assert_eq!(conns[0].events("updated").len(), 1);
        assert!(conns[1].events("updated").is_empty());
        assert!(conns[2].events("updated").is_empty());
    }

    #[tokio::test]
    async fn failing_connection_does_not_affect_others() {
        let (hub, conns) = hub_with(&["a", "b"]).await;
        for conn in &conns {
            hub.subscribe(conn.id(), "chat", None).await.unwrap();
        }
        conns[0].break_transport();

        let delivered = hub
            .broadcast(&BroadcastEvent::new("chat", "msg", json!("hi")))
            .await;

        assert_eq!(delivered, 1);
        assert_eq!(conns[1].events("msg").len(), 1);
        // A failed send does not close the connection
        assert_eq!(hub.connection_total().await, 2);
    }

    #[tokio::test]
    async fn remove_is_idempotent_and_cleans_channels() {
        let (hub, conns) = hub_with(&["a"]).await;
        hub.subscribe(conns[0].id(), "chat", None).await.unwrap();

        assert!(hub.remove(conns[0].id()).await.is_some());
        assert!(hub.remove(conns[0].id()).await.is_none());
        assert!(hub.channels().await.is_empty());
        assert_eq!(hub.connection_count("chat").await, 0);
    }

    #[tokio::test]
    async fn drain_returns_connections_and_clears_state() {
        let (hub, conns) = hub_with(&["a", "b"]).await;
        hub.subscribe(conns[0].id(), "presence-x", Some(json!({})))
            .await
            .unwrap();

        let drained = hub.drain().await;

        assert_eq!(drained.len(), 2);
        assert_eq!(hub.connection_total().await, 0);
        assert!(hub.channels().await.is_empty());
        assert!(hub.presence_members("presence-x").await.is_empty());
    }
}
