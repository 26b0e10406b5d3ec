//! SSE connection state and frame encoding.

use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use axum::response::sse::Event;
use tokio::sync::mpsc;

use crate::adapters::broadcast::{HubConnection, ServerMessage};
use crate::domain::broadcast::ConnectionId;
use crate::domain::foundation::Timestamp;

/// One unit written to an event stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SseFrame {
    /// `retry:` reconnect delay directive.
    Retry(Duration),
    /// `event:` name plus the JSON message as `data:`.
    Message { event: String, data: String },
    /// Comment line, ignored by clients.
    Comment(String),
}

impl SseFrame {
    /// Frame for a protocol message.
    pub fn message(message: &ServerMessage) -> Result<Self, serde_json::Error> {
        Ok(SseFrame::Message {
            event: message.event_name().to_string(),
            data: serde_json::to_string(message)?,
        })
    }

    /// Heartbeat comment stamped with the current time.
    pub fn heartbeat() -> Self {
        SseFrame::Comment(format!("heartbeat {}", Timestamp::now().as_unix_millis()))
    }

    pub fn into_event(self) -> Event {
        match self {
            SseFrame::Retry(delay) => Event::default().retry(delay),
            SseFrame::Message { event, data } => {
                Event::default().event(single_line(&event)).data(data)
            }
            SseFrame::Comment(text) => Event::default().comment(single_line(&text)),
        }
    }
}

/// Field values may not span lines.
fn single_line(value: &str) -> String {
    value.replace(['\r', '\n'], " ")
}

#[derive(Debug)]
pub(crate) enum Outbound {
    Frame(SseFrame),
    End,
}

/// Represents one open event stream.
pub struct SseConnection {
    id: ConnectionId,
    tx: mpsc::UnboundedSender<Outbound>,
    opened_at: Timestamp,
    /// Unix millis of the last frame accepted for this stream.
    last_activity: AtomicI64,
}

impl SseConnection {
    pub(crate) fn new(id: ConnectionId) -> (Self, mpsc::UnboundedReceiver<Outbound>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let opened_at = Timestamp::now();
        let connection = Self {
            id,
            tx,
            opened_at,
            last_activity: AtomicI64::new(opened_at.as_unix_millis()),
        };
        (connection, rx)
    }

    pub fn opened_at(&self) -> Timestamp {
        self.opened_at
    }

    /// When a frame was last queued, or `opened_at` if none has been.
    pub fn last_activity(&self) -> Timestamp {
        Timestamp::from_unix_millis(self.last_activity.load(Ordering::Relaxed))
    }

    /// Queue a raw frame. Returns `false` if the stream is gone.
    pub fn send(&self, frame: SseFrame) -> bool {
        let sent = self.tx.send(Outbound::Frame(frame)).is_ok();
        if sent {
            self.last_activity
                .store(Timestamp::now().as_unix_millis(), Ordering::Relaxed);
        }
        sent
    }

    /// End the stream after already queued frames.
    pub fn end(&self) {
        let _ = self.tx.send(Outbound::End);
    }
}

impl HubConnection for SseConnection {
    fn id(&self) -> &ConnectionId {
        &self.id
    }

    fn deliver(&self, message: &ServerMessage) -> bool {
        match SseFrame::message(message) {
            Ok(frame) => self.send(frame),
            Err(e) => {
                tracing::debug!(connection_id = %self.id, error = %e, "Failed to encode message");
                false
            }
        }
    }
}
