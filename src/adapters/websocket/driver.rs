//! WebSocket broadcast driver.
//!
//! Owns the live connections of one server instance and runs two background
//! tasks:
//!
//! - the liveness sweep: every `ping_interval` each connection that answered
//!   the previous ping is pinged again, and each one that did not is
//!   terminated
//! - the relay listener (only with a relay): replays events published by
//!   other instances to local subscribers
//!
//! # Connection lifecycle
//!
//! ```text
//! accept ──► connected{socketId} ──► subscribe / unsubscribe / message / ping
//!                                             │
//!                 client close, stream error, │ failed liveness check, close()
//!                                             ▼
//!                              removed from every channel
//!                              (member_removed on presence channels)
//! ```

use std::fmt::Display;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use axum::extract::ws::{Message, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use axum::routing::get;
use axum::Router;
use futures::stream::BoxStream;
use futures::{Sink, SinkExt, Stream, StreamExt};
use serde_json::json;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};

use crate::adapters::broadcast::{ClientMessage, ConnectionHub, HubConnection, ServerMessage};
use crate::adapters::relay;
use crate::config::WebSocketConfig;
use crate::domain::broadcast::{
    BroadcastError, BroadcastEvent, ConnectionId, InstanceId, PresenceMember, RelayEnvelope,
    RelayError,
};
use crate::ports::{BroadcastDriver, Relay, RelayPublisher};

use super::connection::{Outbound, WsConnection};

#[derive(Default)]
struct Tasks {
    sweep: Option<JoinHandle<()>>,
    relay: Option<JoinHandle<()>>,
}

/// Broadcast driver serving clients over WebSocket.
pub struct WebSocketDriver {
    config: WebSocketConfig,
    hub: ConnectionHub<WsConnection>,
    instance_id: InstanceId,
    publisher: Option<Box<dyn RelayPublisher>>,
    shutdown: watch::Sender<bool>,
    tasks: Mutex<Tasks>,
    closed: AtomicBool,
}

impl WebSocketDriver {
    /// Create a driver, connecting to Redis when `config.redis` is set.
    ///
    /// # Errors
    ///
    /// Returns `RelayError` if the Redis relay cannot be established.
    pub async fn connect(config: WebSocketConfig) -> Result<Arc<Self>, RelayError> {
        let relay = match &config.redis {
            Some(redis) => relay::redis::connect(redis).await?,
            None => Relay::Disabled,
        };
        Self::with_relay(config, relay).await
    }

    /// Create a driver using an already constructed relay.
    ///
    /// Must be called within a Tokio runtime; background tasks are spawned
    /// immediately.
    ///
    /// # Errors
    ///
    /// Returns `RelayError` if subscribing to the relay channel fails.
    pub async fn with_relay(config: WebSocketConfig, relay: Relay) -> Result<Arc<Self>, RelayError> {
        let (publisher, messages) = match relay {
            Relay::Disabled => (None, None),
            Relay::Enabled {
                publisher,
                mut subscriber,
            } => {
                subscriber.subscribe(&config.relay_channel).await?;
                (Some(publisher), Some(subscriber.into_messages()))
            }
        };

        let (shutdown, _) = watch::channel(false);
        let instance_id = InstanceId::new();
        tracing::info!(
            instance_id = %instance_id,
            path = %config.path,
            relay = publisher.is_some(),
            "WebSocket driver started"
        );

        let driver = Arc::new(Self {
            config,
            hub: ConnectionHub::new(),
            instance_id,
            publisher,
            shutdown,
            tasks: Mutex::new(Tasks::default()),
            closed: AtomicBool::new(false),
        });

        let mut tasks = driver.tasks.lock().await;
        tasks.sweep = Some(tokio::spawn(run_sweep(
            Arc::downgrade(&driver),
            driver.config.ping_interval(),
            driver.shutdown.subscribe(),
        )));
        if let Some(messages) = messages {
            tasks.relay = Some(tokio::spawn(run_relay_listener(
                Arc::downgrade(&driver),
                messages,
                driver.shutdown.subscribe(),
            )));
        }
        drop(tasks);

        Ok(driver)
    }

    pub fn config(&self) -> &WebSocketConfig {
        &self.config
    }

    /// Origin tag stamped on relayed events.
    pub fn instance_id(&self) -> &InstanceId {
        &self.instance_id
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Router serving the upgrade endpoint at `config.path`.
    pub fn router(self: &Arc<Self>) -> Router {
        Router::new()
            .route(&self.config.path, get(upgrade_handler))
            .with_state(Arc::clone(self))
    }

    /// Complete an HTTP upgrade and run the connection on the new socket.
    pub fn handle_upgrade(self: &Arc<Self>, ws: WebSocketUpgrade) -> Response {
        let driver = Arc::clone(self);
        ws.max_message_size(self.config.max_payload_size)
            .on_upgrade(move |socket| async move { driver.accept(socket).await })
    }

    /// Run one client connection until it disconnects or is terminated.
    ///
    /// Assigns an ID, sends the `connected` handshake, then processes client
    /// frames. Any exit path (client close, transport error, failed liveness
    /// check, driver close) ends in the same cleanup.
    pub async fn accept<S, E>(self: &Arc<Self>, socket: S)
    where
        S: Stream<Item = Result<Message, E>> + Sink<Message> + Send + 'static,
        E: Display + Send,
        <S as Sink<Message>>::Error: Display + Send,
    {
        if self.is_closed() {
            tracing::debug!("Rejecting connection on closed driver");
            return;
        }

        let id = ConnectionId::generate();
        let (connection, outbound) = WsConnection::new(id.clone(), self.config.backpressure_watermark);
        let connection = Arc::new(connection);
        let termination = connection.termination();

        self.hub.register(Arc::clone(&connection)).await;
        if self.is_closed() {
            // close() drained the hub before this registration landed
            self.hub.remove(&id).await;
            return;
        }
        tracing::debug!(connection_id = %id, "WebSocket connected");

        connection.deliver(&ServerMessage::connected(json!({ "socketId": id })));

        let (sink, stream) = socket.split();
        tokio::select! {
            _ = write_loop(sink, outbound, Arc::clone(&connection)) => {}
            _ = self.read_loop(&connection, stream) => {}
            _ = terminated(termination) => {
                tracing::debug!(connection_id = %id, "Connection terminated");
            }
        }

        self.hub.remove(&id).await;
        tracing::debug!(
            connection_id = %id,
            dropped_messages = connection.dropped_messages(),
            "WebSocket disconnected"
        );
    }

    async fn read_loop<R, E>(&self, connection: &Arc<WsConnection>, mut stream: R)
    where
        R: Stream<Item = Result<Message, E>> + Unpin,
        E: Display,
    {
        while let Some(frame) = stream.next().await {
            match frame {
                Ok(Message::Text(text)) => self.handle_text(connection, &text).await,
                Ok(Message::Pong(_)) => connection.mark_alive(),
                // Protocol pings are answered by the WebSocket layer
                Ok(Message::Ping(_)) => {}
                Ok(Message::Binary(_)) => {
                    connection.deliver(&ServerMessage::error("Binary messages are not supported"));
                }
                Ok(Message::Close(_)) => {
                    tracing::debug!(connection_id = %connection.id(), "Client sent close frame");
                    break;
                }
                Err(e) => {
                    tracing::debug!(connection_id = %connection.id(), error = %e, "Receive error");
                    break;
                }
            }
        }
    }

    async fn handle_text(&self, connection: &Arc<WsConnection>, text: &str) {
        let message = match serde_json::from_str::<ClientMessage>(text) {
            Ok(message) => message,
            Err(e) => {
                tracing::debug!(connection_id = %connection.id(), error = %e, "Malformed client message");
                connection.deliver(&ServerMessage::error("Invalid message format"));
                return;
            }
        };

        match message {
            ClientMessage::Subscribe { channel, data } => {
                if let Err(e) = self.hub.subscribe(connection.id(), &channel, data).await {
                    // Only possible if the connection was removed concurrently
                    tracing::debug!(connection_id = %connection.id(), error = %e, "Subscribe failed");
                }
            }
            ClientMessage::Unsubscribe { channel } => {
                self.hub.unsubscribe(connection.id(), &channel).await;
            }
            ClientMessage::Ping => {
                connection.deliver(&ServerMessage::Pong);
            }
            ClientMessage::Message {
                channel,
                event,
                data,
            } => {
                if !self.hub.is_subscribed(connection.id(), &channel).await {
                    connection.deliver(&ServerMessage::error(format!(
                        "Not subscribed to channel: {channel}"
                    )));
                    return;
                }
                let event = BroadcastEvent::new(channel, event, data).except(connection.id().clone());
                if let Err(e) = self.broadcast(event).await {
                    tracing::warn!(connection_id = %connection.id(), error = %e, "Client message relay failed");
                }
            }
        }
    }

    /// One liveness pass over every connection.
    ///
    /// Returns the number of connections terminated.
    pub async fn sweep(&self) -> usize {
        let mut terminated = 0;
        for connection in self.hub.connections().await {
            if connection.check_alive() {
                connection.ping();
            } else {
                connection.terminate();
                self.hub.remove(connection.id()).await;
                terminated += 1;
            }
        }
        if terminated > 0 {
            tracing::debug!(terminated, "Terminated unresponsive connections");
        }
        terminated
    }

    /// Handle one raw payload from the relay channel.
    ///
    /// Envelopes this instance published are ignored; others are delivered
    /// locally and never republished. Returns the number of local deliveries.
    pub async fn receive_relayed(&self, payload: &str) -> usize {
        if self.is_closed() {
            return 0;
        }

        let envelope: RelayEnvelope = match serde_json::from_str(payload) {
            Ok(envelope) => envelope,
            Err(e) => {
                tracing::warn!(error = %e, "Dropping malformed relay message");
                return 0;
            }
        };

        if envelope.is_from(&self.instance_id) {
            return 0;
        }

        self.hub.broadcast(&envelope.into_event()).await
    }

    /// Subscribe a connection without a client frame (server-side join).
    ///
    /// # Errors
    ///
    /// Returns `BroadcastError::UnknownConnection` if `id` is not connected.
    pub async fn subscribe(
        &self,
        id: &ConnectionId,
        channel: &str,
        member: Option<PresenceMember>,
    ) -> Result<(), BroadcastError> {
        self.hub.subscribe(id, channel, member).await
    }

    /// Remove `id` from `channel`. Returns `false` if it was not subscribed.
    pub async fn unsubscribe(&self, id: &ConnectionId, channel: &str) -> bool {
        self.hub.unsubscribe(id, channel).await
    }

    /// Backpressure drops recorded for a live connection.
    pub async fn dropped_messages(&self, id: &ConnectionId) -> Option<u64> {
        self.hub
            .connection(id)
            .await
            .map(|connection| connection.dropped_messages())
    }

    async fn stop_task(task: Option<JoinHandle<()>>) {
        if let Some(task) = task {
            task.abort();
            let _ = task.await;
        }
    }
}

#[async_trait]
impl BroadcastDriver for WebSocketDriver {
    async fn broadcast(&self, event: BroadcastEvent) -> Result<(), BroadcastError> {
        if self.is_closed() {
            return Err(BroadcastError::Closed);
        }

        let delivered = self.hub.broadcast(&event).await;
        tracing::trace!(
            channel = %event.channel,
            event = %event.event,
            delivered,
            "Broadcast delivered locally"
        );

        if let Some(publisher) = &self.publisher {
            let envelope = RelayEnvelope::new(event, self.instance_id.clone());
            let payload =
                serde_json::to_string(&envelope).map_err(|e| RelayError::Encode(e.to_string()))?;
            publisher.publish(&self.config.relay_channel, payload).await?;
        }
        Ok(())
    }

    async fn subscribers(&self, channel: &str) -> Vec<ConnectionId> {
        self.hub.subscribers(channel).await
    }

    async fn presence_members(&self, channel: &str) -> Vec<PresenceMember> {
        self.hub.presence_members(channel).await
    }

    async fn connection_count(&self, channel: &str) -> usize {
        self.hub.connection_count(channel).await
    }

    async fn channels(&self) -> Vec<String> {
        self.hub.channels().await
    }

    async fn connection_total(&self) -> usize {
        self.hub.connection_total().await
    }

    /// Stop the sweep, terminate connections, then shut down the relay.
    ///
    /// Each step runs even if an earlier one failed. Later calls return
    /// immediately.
    async fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        let _ = self.shutdown.send(true);

        let (sweep, relay) = {
            let mut tasks = self.tasks.lock().await;
            (tasks.sweep.take(), tasks.relay.take())
        };

        Self::stop_task(sweep).await;

        let connections = self.hub.drain().await;
        for connection in &connections {
            connection.terminate();
        }

        Self::stop_task(relay).await;
        if let Some(publisher) = &self.publisher {
            if let Err(e) = publisher.quit().await {
                tracing::warn!(error = %e, "Relay publisher quit failed; continuing shutdown");
            }
        }

        tracing::info!(
            instance_id = %self.instance_id,
            terminated = connections.len(),
            "WebSocket driver closed"
        );
    }
}

async fn upgrade_handler(
    State(driver): State<Arc<WebSocketDriver>>,
    ws: WebSocketUpgrade,
) -> Response {
    driver.handle_upgrade(ws)
}

async fn terminated(mut termination: watch::Receiver<bool>) {
    let _ = termination.wait_for(|terminated| *terminated).await;
}

async fn write_loop<W>(
    mut sink: W,
    mut outbound: mpsc::UnboundedReceiver<Outbound>,
    connection: Arc<WsConnection>,
) where
    W: Sink<Message> + Unpin,
    W::Error: Display,
{
    while let Some(frame) = outbound.recv().await {
        let (message, bytes) = match frame {
            Outbound::Text(text) => {
                let bytes = text.len();
                (Message::Text(text), bytes)
            }
            Outbound::Ping => (Message::Ping(Vec::new()), 0),
        };

        let result = sink.send(message).await;
        connection.mark_flushed(bytes);
        if let Err(e) = result {
            tracing::debug!(connection_id = %connection.id(), error = %e, "Send error, closing connection");
            break;
        }
    }
    let _ = sink.close().await;
}

async fn run_sweep(driver: Weak<WebSocketDriver>, period: Duration, mut shutdown: watch::Receiver<bool>) {
    let mut interval = time::interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            _ = interval.tick() => {
                let Some(driver) = driver.upgrade() else { break };
                driver.sweep().await;
            }
        }
    }
}

async fn run_relay_listener(
    driver: Weak<WebSocketDriver>,
    mut messages: BoxStream<'static, String>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            next = messages.next() => match next {
                Some(payload) => {
                    let Some(driver) = driver.upgrade() else { break };
                    driver.receive_relayed(&payload).await;
                }
                None => {
                    tracing::warn!("Relay subscription ended");
                    break;
                }
            }
        }
    }
}
