//! In-memory WebSocket pair.
//!
//! [`MemorySocket`] is the server end handed to
//! [`WebSocketDriver::accept`](super::WebSocketDriver::accept);
//! [`MemoryClient`] plays the browser. Frames travel over unbounded
//! channels, so no network or HTTP upgrade is involved.

use std::convert::Infallible;
use std::pin::Pin;
use std::task::{Context, Poll};

use axum::extract::ws::Message;
use futures::channel::mpsc;
use futures::{FutureExt, Sink, SinkExt, Stream, StreamExt};
use serde_json::Value;

/// Create a connected server/client pair.
pub fn socket_pair() -> (MemorySocket, MemoryClient) {
    let (to_server, incoming) = mpsc::unbounded();
    let (outgoing, from_server) = mpsc::unbounded();
    (
        MemorySocket { incoming, outgoing },
        MemoryClient {
            tx: to_server,
            rx: from_server,
        },
    )
}

/// Server end of an in-memory WebSocket.
pub struct MemorySocket {
    incoming: mpsc::UnboundedReceiver<Message>,
    outgoing: mpsc::UnboundedSender<Message>,
}

impl Stream for MemorySocket {
    type Item = Result<Message, Infallible>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.incoming.poll_next_unpin(cx).map(|frame| frame.map(Ok))
    }
}

impl Sink<Message> for MemorySocket {
    type Error = mpsc::SendError;

    fn poll_ready(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.outgoing.poll_ready_unpin(cx)
    }

    fn start_send(mut self: Pin<&mut Self>, item: Message) -> Result<(), Self::Error> {
        self.outgoing.start_send_unpin(item)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.outgoing.poll_flush_unpin(cx)
    }

    fn poll_close(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.outgoing.poll_close_unpin(cx)
    }
}

/// Client end of an in-memory WebSocket.
pub struct MemoryClient {
    tx: mpsc::UnboundedSender<Message>,
    rx: mpsc::UnboundedReceiver<Message>,
}

impl MemoryClient {
    /// Send a raw frame. Returns `false` once the server end is gone.
    pub fn send(&self, message: Message) -> bool {
        self.tx.unbounded_send(message).is_ok()
    }

    /// Send `value` as a JSON text frame.
    pub fn send_json(&self, value: &Value) -> bool {
        self.send(Message::Text(value.to_string()))
    }

    /// Next frame from the server; `None` once the server dropped the socket.
    pub async fn recv(&mut self) -> Option<Message> {
        self.rx.next().await
    }

    /// Next text frame parsed as JSON, skipping control frames.
    pub async fn recv_json(&mut self) -> Option<Value> {
        while let Some(frame) = self.recv().await {
            if let Message::Text(text) = frame {
                return serde_json::from_str(&text).ok();
            }
        }
        None
    }

    /// A frame that is already queued, without waiting.
    pub fn try_recv(&mut self) -> Option<Message> {
        self.rx.next().now_or_never().flatten()
    }

    /// Close the client side, as a browser closing the tab would.
    pub fn close(&mut self) {
        self.tx.close_channel();
    }
}
