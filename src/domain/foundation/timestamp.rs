//! UTC timestamps for connection bookkeeping and heartbeats.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Point in time, always UTC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(DateTime<Utc>);

impl Timestamp {
    pub fn now() -> Self {
        Self(Utc::now())
    }

    /// Out-of-range values clamp to the Unix epoch.
    pub fn from_unix_millis(millis: i64) -> Self {
        Self(Utc.timestamp_millis_opt(millis).single().unwrap_or_default())
    }

    pub fn as_unix_millis(&self) -> i64 {
        self.0.timestamp_millis()
    }

    pub fn as_datetime(&self) -> &DateTime<Utc> {
        &self.0
    }

    /// Time elapsed from `earlier` to `self`; zero if `earlier` is later.
    pub fn since(&self, earlier: &Timestamp) -> Duration {
        (self.0 - earlier.0).to_std().unwrap_or(Duration::ZERO)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn now_is_current_time() {
        let before = Utc::now();
        let ts = Timestamp::now();

        assert!(ts.as_datetime() >= &before);
        assert!(ts.as_datetime() <= &Utc::now());
    }

    #[test]
    fn unix_millis_roundtrip() {
        let ts = Timestamp::from_unix_millis(1_736_467_200_123);
        assert_eq!(ts.as_unix_millis(), 1_736_467_200_123);
    }

    #[test]
    fn since_saturates_at_zero() {
        let earlier = Timestamp::from_unix_millis(1_000);
        let later = Timestamp::from_unix_millis(4_000);

        assert_eq!(later.since(&earlier), Duration::from_secs(3));
        assert_eq!(earlier.since(&later), Duration::ZERO);
    }

    #[test]
    fn serializes_as_rfc3339() {
        let json = serde_json::to_string(&Timestamp::from_unix_millis(0)).unwrap();
        assert_eq!(json, r#""1970-01-01T00:00:00Z""#);
    }
}
