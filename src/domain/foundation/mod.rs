//! Foundation module - Shared domain primitives.
//!
//! Contains the value objects used across the broadcast domain.

mod timestamp;

pub use timestamp::Timestamp;
