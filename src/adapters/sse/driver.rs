//! SSE broadcast driver.
//!
//! Event streams are one-way, so clients cannot subscribe over them. An
//! RPC layer in front of the driver calls [`SseDriver::subscribe`] and
//! [`SseDriver::unsubscribe`] with the connection ID the client received in
//! its `connected` event.
//!
//! A heartbeat comment is written to every stream each
//! `heartbeat_interval` to keep idle proxies from closing it. Streams are
//! reaped when the client goes away and the response body is dropped.

use std::convert::Infallible;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::task::{Context, Poll};
use std::time::Duration;

use async_trait::async_trait;
use axum::extract::State;
use axum::response::sse::Sse;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use futures::{Stream, StreamExt};
use http::{HeaderName, HeaderValue, StatusCode};
use serde_json::json;
use tokio::runtime::Handle;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};

use crate::adapters::broadcast::{ConnectionHub, HubConnection, ServerMessage};
use crate::config::SseConfig;
use crate::domain::broadcast::{BroadcastError, BroadcastEvent, ConnectionId, PresenceMember};
use crate::domain::foundation::Timestamp;
use crate::ports::BroadcastDriver;

use super::connection::{Outbound, SseConnection, SseFrame};

const CONNECTION_ID_PREFIX: &str = "sse";

/// Broadcast driver serving clients over Server-Sent Events.
pub struct SseDriver {
    config: SseConfig,
    hub: ConnectionHub<SseConnection>,
    shutdown: watch::Sender<bool>,
    heartbeat: Mutex<Option<JoinHandle<()>>>,
    closed: AtomicBool,
}

impl SseDriver {
    /// Create a driver and start its heartbeat.
    ///
    /// Must be called within a Tokio runtime.
    pub fn new(config: SseConfig) -> Arc<Self> {
        let (shutdown, _) = watch::channel(false);
        tracing::info!(path = %config.path, "SSE driver started");

        Arc::new_cyclic(|driver: &Weak<Self>| {
            let heartbeat = tokio::spawn(run_heartbeat(
                driver.clone(),
                config.heartbeat_interval(),
                shutdown.subscribe(),
            ));
            Self {
                config,
                hub: ConnectionHub::new(),
                shutdown,
                heartbeat: Mutex::new(Some(heartbeat)),
                closed: AtomicBool::new(false),
            }
        })
    }

    pub fn config(&self) -> &SseConfig {
        &self.config
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Router serving the event stream at `config.path`.
    pub fn router(self: &Arc<Self>) -> Router {
        Router::new()
            .route(&self.config.path, get(stream_handler))
            .with_state(Arc::clone(self))
    }

    /// Open a stream and return it as an SSE response.
    ///
    /// Responds `503 Service Unavailable` once the driver is closed.
    pub async fn handle_request(self: &Arc<Self>) -> Response {
        match self.open_stream().await {
            Ok(stream) => {
                let events = stream.map(|frame| Ok::<_, Infallible>(frame.into_event()));
                (
                    [(
                        HeaderName::from_static("x-accel-buffering"),
                        HeaderValue::from_static("no"),
                    )],
                    Sse::new(events),
                )
                    .into_response()
            }
            Err(_) => StatusCode::SERVICE_UNAVAILABLE.into_response(),
        }
    }

    /// Register a new connection and return its frame stream.
    ///
    /// The stream starts with the `retry:` directive and the `connected`
    /// event, and stays open until the driver closes. Dropping it
    /// disconnects the client.
    ///
    /// # Errors
    ///
    /// Returns `BroadcastError::Closed` if the driver is closed.
    pub async fn open_stream(self: &Arc<Self>) -> Result<SseStream, BroadcastError> {
        if self.is_closed() {
            return Err(BroadcastError::Closed);
        }

        let id = ConnectionId::generate_prefixed(CONNECTION_ID_PREFIX);
        let (connection, rx) = SseConnection::new(id.clone());
        connection.send(SseFrame::Retry(self.config.retry_interval()));
        connection.deliver(&ServerMessage::connected(json!({ "connectionId": id })));

        self.hub.register(Arc::new(connection)).await;
        if self.is_closed() {
            self.hub.remove(&id).await;
            return Err(BroadcastError::Closed);
        }
        tracing::debug!(connection_id = %id, "SSE stream opened");

        Ok(SseStream {
            id: id.clone(),
            rx,
            finished: false,
            _guard: DisconnectGuard {
                driver: Arc::downgrade(self),
                id,
            },
        })
    }

    /// Subscribe an open stream to `channel`.
    ///
    /// # Errors
    ///
    /// Returns `BroadcastError::UnknownConnection` if `id` is not open.
    pub async fn subscribe(
        &self,
        id: &ConnectionId,
        channel: &str,
        member: Option<PresenceMember>,
    ) -> Result<(), BroadcastError> {
        self.hub.subscribe(id, channel, member).await
    }

    /// Unsubscribe an open stream from `channel`.
    ///
    /// Returns `Ok(false)` if the stream was not subscribed.
    ///
    /// # Errors
    ///
    /// Returns `BroadcastError::UnknownConnection` if `id` is not open.
    pub async fn unsubscribe(&self, id: &ConnectionId, channel: &str) -> Result<bool, BroadcastError> {
        if self.hub.connection(id).await.is_none() {
            return Err(BroadcastError::UnknownConnection(id.clone()));
        }
        Ok(self.hub.unsubscribe(id, channel).await)
    }

    /// Drop a connection and its subscriptions. Returns `false` if unknown.
    pub async fn disconnect(&self, id: &ConnectionId) -> bool {
        let Some(connection) = self.hub.remove(id).await else {
            return false;
        };
        let now = Timestamp::now();
        let open_for = now.since(&connection.opened_at());
        let idle_for = now.since(&connection.last_activity());
        tracing::debug!(
            connection_id = %id,
            open_ms = open_for.as_millis() as u64,
            idle_ms = idle_for.as_millis() as u64,
            "SSE stream closed"
        );
        true
    }

    /// Write a heartbeat comment to every stream.
    ///
    /// Returns how many streams accepted it; failures are ignored.
    pub async fn heartbeat(&self) -> usize {
        let frame = SseFrame::heartbeat();
        self.hub
            .connections()
            .await
            .iter()
            .filter(|connection| connection.send(frame.clone()))
            .count()
    }
}

#[async_trait]
impl BroadcastDriver for SseDriver {
    async fn broadcast(&self, event: BroadcastEvent) -> Result<(), BroadcastError> {
        if self.is_closed() {
            return Err(BroadcastError::Closed);
        }
        let delivered = self.hub.broadcast(&event).await;
        tracing::trace!(
            channel = %event.channel,
            event = %event.event,
            delivered,
            "Broadcast delivered"
        );
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

    /// Stop the heartbeat, then end every stream.
    async fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        let _ = self.shutdown.send(true);

        if let Some(heartbeat) = self.heartbeat.lock().await.take() {
            heartbeat.abort();
            let _ = heartbeat.await;
        }

        let connections = self.hub.drain().await;
        for connection in &connections {
            connection.end();
        }

        tracing::info!(ended = connections.len(), "SSE driver closed");
    }
}

/// Frames for one SSE client, in write order.
pub struct SseStream {
    id: ConnectionId,
    rx: mpsc::UnboundedReceiver<Outbound>,
    finished: bool,
    _guard: DisconnectGuard,
}

impl SseStream {
    pub fn connection_id(&self) -> &ConnectionId {
        &self.id
    }
}

impl Stream for SseStream {
    type Item = SseFrame;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if self.finished {
            return Poll::Ready(None);
        }
        match self.rx.poll_recv(cx) {
            Poll::Ready(Some(Outbound::Frame(frame))) => Poll::Ready(Some(frame)),
            Poll::Ready(Some(Outbound::End)) | Poll::Ready(None) => {
                self.finished = true;
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

/// Removes the connection when its stream is dropped.
struct DisconnectGuard {
    driver: Weak<SseDriver>,
    id: ConnectionId,
}

impl Drop for DisconnectGuard {
    fn drop(&mut self) {
        let Some(driver) = self.driver.upgrade() else {
            return;
        };
        if let Ok(handle) = Handle::try_current() {
            let id = self.id.clone();
            handle.spawn(async move {
                driver.disconnect(&id).await;
            });
        }
    }
}

async fn stream_handler(State(driver): State<Arc<SseDriver>>) -> Response {
    driver.handle_request().await
}

async fn run_heartbeat(driver: Weak<SseDriver>, period: Duration, mut shutdown: watch::Receiver<bool>) {
    let mut interval = time::interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            _ = interval.tick() => {
                let Some(driver) = driver.upgrade() else { break };
                let written = driver.heartbeat().await;
                tracing::trace!(written, "Heartbeat sent");
            }
        }
    }
}
