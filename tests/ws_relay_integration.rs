//! Integration tests for multi-instance WebSocket fan-out.
//!
//! Two drivers share an in-memory relay the way two server processes share
//! a Redis server. Clients connect through in-memory sockets, so the full
//! connection state machine runs without a network.

use std::sync::Arc;

use serde_json::{json, Value};

use velox_events::adapters::relay::InMemoryRelay;
use velox_events::adapters::websocket::{socket_pair, MemoryClient};
use velox_events::adapters::WebSocketDriver;
use velox_events::config::WebSocketConfig;
use velox_events::domain::broadcast::BroadcastEvent;
use velox_events::ports::{BroadcastDriver, Relay};

// =============================================================================
// Test Infrastructure
// =============================================================================

async fn instance(relay: &InMemoryRelay) -> Arc<WebSocketDriver> {
    WebSocketDriver::with_relay(WebSocketConfig::default(), relay.relay())
        .await
        .expect("driver should start")
}

async fn connect(driver: &Arc<WebSocketDriver>) -> (MemoryClient, String) {
    let (socket, mut client) = socket_pair();
    let driver = Arc::clone(driver);
    tokio::spawn(async move { driver.accept(socket).await });

    let connected = client.recv_json().await.expect("connected event");
    assert_eq!(connected["type"], "event");
    assert_eq!(connected["event"], "connected");
    let id = connected["data"]["socketId"]
        .as_str()
        .expect("socketId")
        .to_string();
    (client, id)
}

async fn subscribe(client: &mut MemoryClient, channel: &str, member: Option<Value>) -> Value {
    let mut frame = json!({"type": "subscribe", "channel": channel});
    if let Some(member) = member {
        frame["data"] = member;
    }
    assert!(client.send_json(&frame));
    next_of_type(client, "subscription_succeeded").await
}

async fn next_of_type(client: &mut MemoryClient, kind: &str) -> Value {
    let frame = client.recv_json().await.expect("frame");
    assert_eq!(frame["type"], kind, "unexpected frame: {frame}");
    frame
}

/// Round-trip an application ping; everything queued before it has arrived.
async fn assert_nothing_pending(client: &mut MemoryClient) {
    assert!(client.send_json(&json!({"type": "ping"})));
    assert_eq!(client.recv_json().await, Some(json!({"type": "pong"})));
}

// =============================================================================
// Fan-out
// =============================================================================

#[tokio::test]
async fn broadcast_reaches_subscribers_on_every_instance() {
    let relay = InMemoryRelay::new();
    let a = instance(&relay).await;
    let b = instance(&relay).await;
    let (mut on_a, _) = connect(&a).await;
    let (mut on_b, _) = connect(&b).await;
    subscribe(&mut on_a, "orders.123", None).await;
    subscribe(&mut on_b, "orders.123", None).await;

    a.broadcast(BroadcastEvent::new("orders.123", "updated", json!({"status": "shipped"})))
        .await
        .unwrap();

    let local = next_of_type(&mut on_a, "event").await;
    let remote = next_of_type(&mut on_b, "event").await;
    assert_eq!(local, remote);
    assert_eq!(remote["data"], json!({"status": "shipped"}));
    assert!(remote.get("__origin").is_none());

    // One hop only: B delivered without republishing
    assert_eq!(relay.publish_count(), 1);
}

#[tokio::test]
async fn origin_instance_does_not_deliver_twice() {
    let relay = InMemoryRelay::new();
    let a = instance(&relay).await;
    let b = instance(&relay).await;
    let (mut on_a, _) = connect(&a).await;
    subscribe(&mut on_a, "chat", None).await;

    a.broadcast(BroadcastEvent::new("chat", "first", json!(1)))
        .await
        .unwrap();
    // Relayed after A's own echo, so it arrives behind any duplicate
    b.broadcast(BroadcastEvent::new("chat", "second", json!(2)))
        .await
        .unwrap();

    assert_eq!(next_of_type(&mut on_a, "event").await["event"], "first");
    assert_eq!(next_of_type(&mut on_a, "event").await["event"], "second");
    assert_nothing_pending(&mut on_a).await;
    assert_eq!(relay.publish_count(), 2);
}

#[tokio::test]
async fn client_message_is_relayed_but_skips_sender() {
    let relay = InMemoryRelay::new();
    let a = instance(&relay).await;
    let b = instance(&relay).await;
    let (mut sender, _) = connect(&a).await;
    let (mut neighbour, _) = connect(&a).await;
    let (mut remote, _) = connect(&b).await;
    for client in [&mut sender, &mut neighbour, &mut remote] {
        subscribe(client, "chat", None).await;
    }

    sender.send_json(&json!({
        "type": "message", "channel": "chat", "event": "typing", "data": {"user": "u1"}
    }));

    assert_eq!(next_of_type(&mut neighbour, "event").await["event"], "typing");
    assert_eq!(next_of_type(&mut remote, "event").await["event"], "typing");
    assert_nothing_pending(&mut sender).await;
}

#[tokio::test]
async fn malformed_relay_traffic_is_ignored() {
    let relay = InMemoryRelay::new();
    let a = instance(&relay).await;
    let b = instance(&relay).await;
    let (mut on_b, _) = connect(&b).await;
    subscribe(&mut on_b, "chat", None).await;

    relay.inject("velox:broadcast", "{not json");
    relay.inject("velox:broadcast", r#"{"channel":"chat","event":"x"}"#);
    a.broadcast(BroadcastEvent::new("chat", "after", json!(null)))
        .await
        .unwrap();

    // The listener survived and the valid event came through
    assert_eq!(next_of_type(&mut on_b, "event").await["event"], "after");
}

#[tokio::test]
async fn single_instance_without_relay_delivers_locally() {
    let driver = WebSocketDriver::with_relay(WebSocketConfig::default(), Relay::Disabled)
        .await
        .unwrap();
    let (mut client, _) = connect(&driver).await;
    subscribe(&mut client, "chat", None).await;

    driver
        .broadcast(BroadcastEvent::new("chat", "msg", json!("hi")))
        .await
        .unwrap();

    assert_eq!(next_of_type(&mut client, "event").await["data"], "hi");
}

// =============================================================================
// Presence
// =============================================================================

#[tokio::test]
async fn presence_example_scenario() {
    let relay = InMemoryRelay::new();
    let driver = instance(&relay).await;
    let (mut a, _) = connect(&driver).await;
    let (mut b, b_id) = connect(&driver).await;

    let ack = subscribe(&mut a, "presence-room-1", Some(json!({"id": "u1", "name": "Alice"}))).await;
    assert_eq!(ack["data"]["members"], json!([]));

    let ack = subscribe(&mut b, "presence-room-1", Some(json!({"id": "u2", "name": "Bob"}))).await;
    assert_eq!(
        ack["data"]["members"],
        json!([{"id": "u1", "name": "Alice"}])
    );

    let added = next_of_type(&mut a, "event").await;
    assert_eq!(added["event"], "member_added");
    assert_eq!(added["data"], json!({"id": "u2", "name": "Bob"}));
    assert_nothing_pending(&mut b).await;

    assert_eq!(driver.connection_count("presence-room-1").await, 2);
    assert!(driver
        .subscribers("presence-room-1")
        .await
        .iter()
        .any(|id| id.as_str() == b_id));

    b.close();

    let removed = next_of_type(&mut a, "event").await;
    assert_eq!(removed["event"], "member_removed");
    assert_eq!(removed["data"], json!({"id": "u2", "name": "Bob"}));
    assert_eq!(
        driver.presence_members("presence-room-1").await,
        vec![json!({"id": "u1", "name": "Alice"})]
    );
}

// =============================================================================
// Shutdown
// =============================================================================

#[tokio::test]
async fn close_releases_everything() {
    let relay = InMemoryRelay::new();
    let a = instance(&relay).await;
    let b = instance(&relay).await;
    let (mut on_a, _) = connect(&a).await;
    subscribe(&mut on_a, "chat", None).await;

    a.close().await;

    assert!(on_a.recv().await.is_none());
    assert!(a.channels().await.is_empty());
    assert_eq!(a.connection_total().await, 0);
    assert_eq!(relay.quit_count(), 1);

    // The other instance keeps working
    let (mut on_b, _) = connect(&b).await;
    subscribe(&mut on_b, "chat", None).await;
    b.broadcast(BroadcastEvent::new("chat", "still-here", json!(null)))
        .await
        .unwrap();
    assert_eq!(next_of_type(&mut on_b, "event").await["event"], "still-here");
}
