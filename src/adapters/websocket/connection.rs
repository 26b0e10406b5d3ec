//! WebSocket client connection state.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};

use tokio::sync::{mpsc, watch};

use crate::adapters::broadcast::{Delivery, HubConnection, ServerMessage};
use crate::domain::broadcast::ConnectionId;

/// A frame queued for the socket writer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    Text(String),
    Ping,
}

/// Represents a connected WebSocket client.
///
/// Sends are fire-and-forget: messages go onto an unbounded queue drained
/// by the connection's writer task. `buffered` counts bytes queued but not
/// yet written to the socket, and is what the backpressure check reads.
pub struct WsConnection {
    id: ConnectionId,
    tx: mpsc::UnboundedSender<Outbound>,
    /// Set on pong, cleared by each liveness sweep.
    alive: AtomicBool,
    buffered: AtomicUsize,
    watermark: usize,
    dropped: AtomicU64,
    terminate: watch::Sender<bool>,
}

impl WsConnection {
    /// Create a connection and the receiving end of its outbound queue.
    pub fn new(
        id: ConnectionId,
        watermark: usize,
    ) -> (Self, mpsc::UnboundedReceiver<Outbound>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let (terminate, _) = watch::channel(false);
        let connection = Self {
            id,
            tx,
            alive: AtomicBool::new(true),
            buffered: AtomicUsize::new(0),
            watermark,
            dropped: AtomicU64::new(0),
            terminate,
        };
        (connection, rx)
    }

    /// Bytes queued for the socket but not yet written.
    pub fn buffered_amount(&self) -> usize {
        self.buffered.load(Ordering::Acquire)
    }

    /// Record that `bytes` of queued text reached the socket.
    pub fn mark_flushed(&self, bytes: usize) {
        let _ = self
            .buffered
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                Some(current.saturating_sub(bytes))
            });
    }

    /// Messages dropped by the backpressure check.
    pub fn dropped_messages(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Mark the connection as alive (pong received).
    pub fn mark_alive(&self) {
        self.alive.store(true, Ordering::Release);
    }

    /// Check and reset the alive flag for the liveness sweep.
    ///
    /// Returns `true` if the connection was alive since the last check.
    pub fn check_alive(&self) -> bool {
        self.alive.swap(false, Ordering::AcqRel)
    }

    /// Queue a protocol-level ping.
    pub fn ping(&self) -> bool {
        self.tx.send(Outbound::Ping).is_ok()
    }

    /// Ask the connection task to drop the socket immediately.
    pub fn terminate(&self) {
        let _ = self.terminate.send(true);
    }

    /// Receiver that fires once `terminate` is called.
    pub fn termination(&self) -> watch::Receiver<bool> {
        self.terminate.subscribe()
    }
}

impl HubConnection for WsConnection {
    fn id(&self) -> &ConnectionId {
        &self.id
    }

    fn deliver(&self, message: &ServerMessage) -> bool {
        if message.delivery() == Delivery::Droppable && self.buffered_amount() > self.watermark {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            tracing::trace!(
                connection_id = %self.id,
                buffered = self.buffered_amount(),
                "Backpressure: dropping event"
            );
            return false;
        }

        let text = match serde_json::to_string(message) {
            Ok(text) => text,
            Err(e) => {
                tracing::debug!(connection_id = %self.id, error = %e, "Failed to encode message");
                return false;
            }
        };

        let bytes = text.len();
        self.buffered.fetch_add(bytes, Ordering::AcqRel);
        if self.tx.send(Outbound::Text(text)).is_err() {
            self.mark_flushed(bytes);
            return false;
        }
        true
    }
}
