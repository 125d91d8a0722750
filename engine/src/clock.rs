//! Wall-clock and id provider.
//!
//! The engine never reads the system time on its own. Every operation that
//! stamps a task asks a [`Clock`], so tests and replays can drive time
//! deterministically with [`ManualClock`].

use crate::{TaskId, Timestamp};
use chrono::{DateTime, Duration, SecondsFormat, SubsecRound, Utc};
use std::cell::Cell;

/// Source of timestamps and fresh task ids.
pub trait Clock: Send {
    /// Current time, at millisecond precision.
    fn now(&self) -> Timestamp;

    /// A fresh, globally unique task id.
    fn new_id(&self) -> TaskId;
}

/// The real clock: `Utc::now()` truncated to milliseconds, UUID v4 ids.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        Utc::now().trunc_subsecs(3)
    }

    fn new_id(&self) -> TaskId {
        uuid::Uuid::new_v4().to_string()
    }
}

/// A clock that advances by a fixed step on every reading.
///
/// Ids are sequential (`task-1`, `task-2`, ...).
#[derive(Debug)]
pub struct ManualClock {
    next: Cell<Timestamp>,
    step: Duration,
    ids: Cell<u64>,
}

impl ManualClock {
    /// Create a clock starting at `start`, advancing one second per reading.
    pub fn new(start: Timestamp) -> Self {
        Self::with_step(start, Duration::seconds(1))
    }

    /// Create a clock with a custom step. A zero step freezes time.
    pub fn with_step(start: Timestamp, step: Duration) -> Self {
        Self {
            next: Cell::new(start),
            step,
            ids: Cell::new(0),
        }
    }

    /// Jump the clock to a specific instant.
    pub fn set(&self, at: Timestamp) {
        self.next.set(at);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        let now = self.next.get();
        self.next.set(now + self.step);
        now
    }

    fn new_id(&self) -> TaskId {
        let n = self.ids.get() + 1;
        self.ids.set(n);
        format!("task-{n}")
    }
}

/// Format a timestamp the way the wire format stores it
/// (`2024-03-01T10:00:00.000Z`).
pub fn format_timestamp(ts: &Timestamp) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Parse an RFC 3339 timestamp in any offset, normalised to UTC.
pub fn parse_timestamp(raw: &str) -> Option<Timestamp> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Serde adapter for [`Timestamp`] fields.
pub mod serde_ts {
    use super::{format_timestamp, parse_timestamp};
    use crate::Timestamp;
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(ts: &Timestamp, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format_timestamp(ts))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Timestamp, D::Error> {
        let raw = String::deserialize(deserializer)?;
        parse_timestamp(&raw)
            .ok_or_else(|| de::Error::custom(format!("invalid timestamp: {raw}")))
    }

    /// Serde adapter for nullable [`Timestamp`] fields.
    pub mod option {
        use super::{format_timestamp, parse_timestamp};
        use crate::Timestamp;
        use serde::{de, Deserialize, Deserializer, Serializer};

        pub fn serialize<S: Serializer>(
            ts: &Option<Timestamp>,
            serializer: S,
        ) -> Result<S::Ok, S::Error> {
            match ts {
                Some(ts) => serializer.serialize_str(&format_timestamp(ts)),
                None => serializer.serialize_none(),
            }
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(
            deserializer: D,
        ) -> Result<Option<Timestamp>, D::Error> {
            match Option::<String>::deserialize(deserializer)? {
                Some(raw) => parse_timestamp(&raw)
                    .map(Some)
                    .ok_or_else(|| de::Error::custom(format!("invalid timestamp: {raw}"))),
                None => Ok(None),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn start() -> Timestamp {
        Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap()
    }

    #[test]
    fn manual_clock_advances_by_step() {
        let clock = ManualClock::new(start());
        let t1 = clock.now();
        let t2 = clock.now();
        assert_eq!(t1, start());
        assert_eq!(t2 - t1, Duration::seconds(1));
    }

    #[test]
    fn frozen_clock_repeats() {
        let clock = ManualClock::with_step(start(), Duration::zero());
        assert_eq!(clock.now(), clock.now());
    }

    #[test]
    fn manual_ids_are_sequential() {
        let clock = ManualClock::new(start());
        assert_eq!(clock.new_id(), "task-1");
        assert_eq!(clock.new_id(), "task-2");
    }

    #[test]
    fn system_ids_are_unique() {
        let clock = SystemClock;
        assert_ne!(clock.new_id(), clock.new_id());
    }

    #[test]
    fn system_clock_has_millisecond_precision() {
        let now = SystemClock.now();
        assert_eq!(now.timestamp_subsec_nanos() % 1_000_000, 0);
    }

    #[test]
    fn timestamp_format_matches_web_client() {
        let ts = start() + Duration::milliseconds(42);
        assert_eq!(format_timestamp(&ts), "2024-03-01T10:00:00.042Z");
    }

    #[test]
    fn parse_accepts_offsets() {
        let parsed = parse_timestamp("2024-03-01T11:00:00+01:00").unwrap();
        assert_eq!(parsed, start());
        assert!(parse_timestamp("yesterday").is_none());
    }
}
