//! In-process relay implementation.
//!
//! Several drivers sharing one `InMemoryRelay` behave like separate
//! instances sharing a Redis server: every published payload reaches every
//! subscriber of the channel, including the publisher's own subscriber.
//! Intended for tests and single-binary setups.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use futures::stream::{self, BoxStream};
use futures::StreamExt;
use tokio::sync::mpsc;

use crate::domain::broadcast::RelayError;
use crate::ports::{Relay, RelayPublisher, RelaySubscriber};

#[derive(Default)]
struct Inner {
    subscribers: Mutex<HashMap<String, Vec<mpsc::UnboundedSender<String>>>>,
    published: Mutex<Vec<(String, String)>>,
    quits: AtomicUsize,
}

/// Shared in-memory pub/sub bus.
///
/// Clones share the same bus.
#[derive(Clone, Default)]
pub struct InMemoryRelay {
    inner: Arc<Inner>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl InMemoryRelay {
    pub fn new() -> Self {
        Self::default()
    }

    /// A relay capability attached to this bus, ready to inject into a driver.
    pub fn relay(&self) -> Relay {
        Relay::enabled(self.publisher(), self.subscriber())
    }

    pub fn publisher(&self) -> InMemoryRelayPublisher {
        InMemoryRelayPublisher {
            inner: Arc::clone(&self.inner),
        }
    }

    pub fn subscriber(&self) -> InMemoryRelaySubscriber {
        let (tx, rx) = mpsc::unbounded_channel();
        InMemoryRelaySubscriber {
            inner: Arc::clone(&self.inner),
            tx,
            rx,
        }
    }

    // === Test Helpers ===

    /// Every (channel, payload) published so far.
    pub fn published(&self) -> Vec<(String, String)> {
        lock(&self.inner.published).clone()
    }

    /// Number of publishes so far.
    pub fn publish_count(&self) -> usize {
        lock(&self.inner.published).len()
    }

    /// Number of `quit` calls received.
    pub fn quit_count(&self) -> usize {
        self.inner.quits.load(Ordering::SeqCst)
    }

    /// Deliver a raw payload to subscribers of `channel` without recording
    /// it as published (simulates foreign or malformed traffic).
    pub fn inject(&self, channel: &str, payload: impl Into<String>) {
        let payload = payload.into();
        let mut subscribers = lock(&self.inner.subscribers);
        if let Some(senders) = subscribers.get_mut(channel) {
            senders.retain(|tx| tx.send(payload.clone()).is_ok());
        }
    }
}

/// Publishing half of an [`InMemoryRelay`].
pub struct InMemoryRelayPublisher {
    inner: Arc<Inner>,
}

#[async_trait]
impl RelayPublisher for InMemoryRelayPublisher {
    async fn publish(&self, channel: &str, payload: String) -> Result<(), RelayError> {
        lock(&self.inner.published).push((channel.to_string(), payload.clone()));

        let mut subscribers = lock(&self.inner.subscribers);
        if let Some(senders) = subscribers.get_mut(channel) {
            // Closed subscribers are pruned as they are discovered
            senders.retain(|tx| tx.send(payload.clone()).is_ok());
        }
        Ok(())
    }

    async fn quit(&self) -> Result<(), RelayError> {
        self.inner.quits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Subscribing half of an [`InMemoryRelay`].
pub struct InMemoryRelaySubscriber {
    inner: Arc<Inner>,
    tx: mpsc::UnboundedSender<String>,
    rx: mpsc::UnboundedReceiver<String>,
}

#[async_trait]
impl RelaySubscriber for InMemoryRelaySubscriber {
    async fn subscribe(&mut self, channel: &str) -> Result<(), RelayError> {
        lock(&self.inner.subscribers)
            .entry(channel.to_string())
            .or_default()
            .push(self.tx.clone());
        Ok(())
    }

    fn into_messages(self: Box<Self>) -> BoxStream<'static, String> {
        let InMemoryRelaySubscriber { rx, .. } = *self;
        stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|payload| (payload, rx))
        })
        .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn publish_reaches_every_subscriber() {
        let relay = InMemoryRelay::new();
        let mut first = relay.subscriber();
        let mut second = relay.subscriber();
        first.subscribe("bus").await.unwrap();
        second.subscribe("bus").await.unwrap();
        let mut first = Box::new(first).into_messages();
        let mut second = Box::new(second).into_messages();

        relay
            .publisher()
            .publish("bus", "hello".to_string())
            .await
            .unwrap();

        assert_eq!(first.next().await.as_deref(), Some("hello"));
        assert_eq!(second.next().await.as_deref(), Some("hello"));
        assert_eq!(relay.published(), vec![("bus".to_string(), "hello".to_string())]);
    }

    #[tokio::test]
    async fn publish_ignores_other_channels() {
        let relay = InMemoryRelay::new();
        let mut subscriber = relay.subscriber();
        subscriber.subscribe("bus").await.unwrap();

        relay
            .publisher()
            .publish("elsewhere", "x".to_string())
            .await
            .unwrap();
        relay.inject("bus", "y");

        let mut messages = Box::new(subscriber).into_messages();
        assert_eq!(messages.next().await.as_deref(), Some("y"));
        assert_eq!(relay.publish_count(), 1);
    }

    #[tokio::test]
    async fn dropped_subscriber_is_pruned() {
        let relay = InMemoryRelay::new();
        let mut subscriber = relay.subscriber();
        subscriber.subscribe("bus").await.unwrap();
        drop(Box::new(subscriber).into_messages());

        let result = relay
            .publisher()
            .publish("bus", "x".to_string())
            .await;

        assert!(result.is_ok());
        assert!(lock(&relay.inner.subscribers)["bus"].is_empty());
    }

    #[tokio::test]
    async fn quit_is_counted() {
        let relay = InMemoryRelay::new();
        relay.publisher().quit().await.unwrap();
        assert_eq!(relay.quit_count(), 1);
    }
}
