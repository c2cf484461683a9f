use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use crate::utils::helper::current_timestamp_ms;

/// Wall-clock instant in milliseconds since the Unix epoch.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp(u64);

impl Timestamp {
    pub fn now() -> Self {
        Timestamp(current_timestamp_ms())
    }

    pub fn from_millis(millis: u64) -> Self {
        Timestamp(millis)
    }

    pub fn as_millis(&self) -> u64 {
        self.0
    }

    /// Time elapsed since this timestamp; zero if it lies in the future.
    pub fn elapsed(&self) -> Duration {
        Timestamp::now() - *self
    }

    pub fn to_datetime(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_millis_opt(self.0 as i64).single()
    }
}

impl std::ops::Add<Duration> for Timestamp {
    type Output = Timestamp;

    fn add(self, duration: Duration) -> Timestamp {
        Timestamp(self.0 + duration.as_millis() as u64)
    }
}

impl std::ops::Sub for Timestamp {
    type Output = Duration;

    fn sub(self, other: Timestamp) -> Duration {
        Duration::from_millis(self.0.saturating_sub(other.0))
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.to_datetime() {
            Some(dt) => write!(f, "{}", dt.to_rfc3339()),
            None => write!(f, "{}ms", self.0),
        }
    }
}
