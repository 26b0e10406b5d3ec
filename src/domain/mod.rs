//! Domain layer containing the broadcast model.
//!
//! # Module Organization
//!
//! - `foundation` - Shared primitives (timestamps)
//! - `broadcast` - Connections, channels, presence and broadcast events

pub mod broadcast;
pub mod foundation;
