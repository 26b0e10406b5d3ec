//! Redis-backed relay for multi-instance deployments.
//!
//! Opens two physical connections: a multiplexed connection used only for
//! `PUBLISH`, and a dedicated pub/sub connection used only for `SUBSCRIBE`.
//! A connection in subscriber mode rejects ordinary commands, so keeping
//! the roles on separate types makes misuse a compile error.

use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;
use redis::aio::{MultiplexedConnection, PubSub};
use redis::AsyncCommands;
use tokio::time::timeout;

use crate::config::RedisConfig;
use crate::domain::broadcast::RelayError;
use crate::ports::{Relay, RelayPublisher, RelaySubscriber};

fn redis_error(e: redis::RedisError) -> RelayError {
    RelayError::Redis(e.to_string())
}

/// Connect both relay halves to the Redis server in `config`.
///
/// # Errors
///
/// Returns `RelayError` if the URL is invalid or either connection cannot
/// be established within the configured timeout.
pub async fn connect(config: &RedisConfig) -> Result<Relay, RelayError> {
    let client = redis::Client::open(config.url.as_str()).map_err(redis_error)?;

    let conn = timeout(config.connect_timeout(), client.get_multiplexed_tokio_connection())
        .await
        .map_err(|_| RelayError::Timeout)?
        .map_err(redis_error)?;

    let pubsub = timeout(config.connect_timeout(), client.get_async_connection())
        .await
        .map_err(|_| RelayError::Timeout)?
        .map_err(redis_error)?
        .into_pubsub();

    tracing::info!(url = %config.redacted_url(), "Redis relay connected (publisher + subscriber)");

    Ok(Relay::enabled(
        RedisRelayPublisher { conn },
        RedisRelaySubscriber { pubsub },
    ))
}

/// Publishing half backed by a multiplexed connection.
#[derive(Clone)]
pub struct RedisRelayPublisher {
    conn: MultiplexedConnection,
}

impl RedisRelayPublisher {
    pub fn new(conn: MultiplexedConnection) -> Self {
        Self { conn }
    }
}

#[async_trait]
impl RelayPublisher for RedisRelayPublisher {
    async fn publish(&self, channel: &str, payload: String) -> Result<(), RelayError> {
        let mut conn = self.conn.clone();
        let receivers: i64 = conn.publish(channel, payload).await.map_err(redis_error)?;
        tracing::trace!(channel, receivers, "Published relay message");
        Ok(())
    }

    async fn quit(&self) -> Result<(), RelayError> {
        let mut conn = self.conn.clone();
        redis::cmd("QUIT")
            .query_async::<_, ()>(&mut conn)
            .await
            .map_err(redis_error)
    }
}

/// Subscribing half backed by a dedicated pub/sub connection.
pub struct RedisRelaySubscriber {
    pubsub: PubSub,
}

impl RedisRelaySubscriber {
    pub fn new(pubsub: PubSub) -> Self {
        Self { pubsub }
    }
}

#[async_trait]
impl RelaySubscriber for RedisRelaySubscriber {
    async fn subscribe(&mut self, channel: &str) -> Result<(), RelayError> {
        self.pubsub.subscribe(channel).await.map_err(redis_error)
    }

    fn into_messages(self: Box<Self>) -> BoxStream<'static, String> {
        self.pubsub
            .into_on_message()
            .filter_map(|msg| async move {
                match msg.get_payload::<String>() {
                    Ok(payload) => Some(payload),
                    Err(e) => {
                        tracing::warn!(
                            channel = msg.get_channel_name(),
                            error = %e,
                            "Dropping non-text relay payload"
                        );
                        None
                    }
                }
            })
            .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn connect_rejects_invalid_url() {
        let config = RedisConfig::new("not-a-url");
        let result = connect(&config).await;
        assert!(matches!(result, Err(RelayError::Redis(_))));
    }

    // Requires a running Redis; run with `cargo test -- --ignored`.
    #[tokio::test]
    #[ignore]
    async fn publish_reaches_subscriber() {
        let config = RedisConfig::new("redis://127.0.0.1:6379");
        let Relay::Enabled {
            publisher,
            mut subscriber,
        } = connect(&config).await.unwrap()
        else {
            panic!("expected enabled relay");
        };
        subscriber.subscribe("velox:test").await.unwrap();
        let mut messages = subscriber.into_messages();

        publisher
            .publish("velox:test", "hello".to_string())
            .await
            .unwrap();

        assert_eq!(messages.next().await.as_deref(), Some("hello"));
        publisher.quit().await.unwrap();
    }
}
