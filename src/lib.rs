//! Velox Events - real-time broadcast delivery
//!
//! WebSocket and SSE drivers sharing one channel and presence registry,
//! with optional Redis fan-out across server instances.
//!
//! # Example
//!
//! ```no_run
//! use serde_json::json;
//! use velox_events::adapters::WebSocketDriver;
//! use velox_events::config::WebSocketConfig;
//! use velox_events::domain::broadcast::BroadcastEvent;
//! use velox_events::ports::BroadcastDriver;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let driver = WebSocketDriver::connect(WebSocketConfig::default()).await?;
//! let app = driver.router();
//!
//! driver
//!     .broadcast(BroadcastEvent::new("orders.123", "updated", json!({"status": "shipped"})))
//!     .await?;
//! # drop(app);
//! driver.close().await;
//! # Ok(())
//! # }
//! ```

pub mod adapters;
pub mod config;
pub mod domain;
pub mod ports;
