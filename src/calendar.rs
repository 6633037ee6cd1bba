//! Day keys and day boundaries at a fixed UTC offset.
//!
//! Daily counters never get deleted explicitly. They are written under a key
//! naming the local calendar day and expire at the next local midnight, so
//! every caller must agree on "today". This module is the single definition.

use chrono::{DateTime, Duration, FixedOffset, NaiveDate, NaiveTime, Offset, TimeZone, Utc};
use parking_lot::Mutex;

use crate::error::{LedgerError, Result};

/// Source of wall-clock time.
pub trait Clock: Send + Sync + std::fmt::Debug {
    /// Current instant.
    fn now(&self) -> DateTime<Utc>;
}

/// Clock backed by the system time.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    /// Create a clock frozen at `at`.
    pub fn new(at: DateTime<Utc>) -> Self {
        Self { now: Mutex::new(at) }
    }

    /// Jump to `at`.
    pub fn set(&self, at: DateTime<Utc>) {
        *self.now.lock() = at;
    }

    /// Move forward by `by`.
    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock();
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock()
    }
}

/// Calendar whose days start at local midnight of a fixed UTC offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DayCalendar {
    offset: FixedOffset,
}

impl DayCalendar {
    /// Create a calendar for a whole-hour offset east of UTC.
    pub fn new(offset_hours: i32) -> Result<Self> {
        let offset = offset_hours
            .checked_mul(3600)
            .and_then(FixedOffset::east_opt)
            .ok_or_else(|| {
                LedgerError::Validation(format!("invalid day offset: {} hours", offset_hours))
            })?;
        Ok(Self { offset })
    }

    /// The UTC calendar.
    pub fn utc() -> Self {
        Self { offset: Utc.fix() }
    }

    /// Offset in whole hours.
    pub fn offset_hours(&self) -> i32 {
        self.offset.local_minus_utc() / 3600
    }

    /// `YYYY-MM-DD` of the local day containing `now`.
    pub fn day_key(&self, now: DateTime<Utc>) -> String {
        now.with_timezone(&self.offset).format("%Y-%m-%d").to_string()
    }

    /// The instant the local day containing `now` ends.
    pub fn next_boundary(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        self.boundary_after(now.with_timezone(&self.offset).date_naive())
    }

    /// The instant the local day named by `day` (`YYYY-MM-DD`) ends.
    pub fn end_of_day(&self, day: &str) -> Result<DateTime<Utc>> {
        let date = NaiveDate::parse_from_str(day, "%Y-%m-%d")
            .map_err(|e| LedgerError::Validation(format!("invalid day key {:?}: {}", day, e)))?;
        Ok(self.boundary_after(date))
    }

    fn boundary_after(&self, date: NaiveDate) -> DateTime<Utc> {
        let next_midnight = date.and_time(NaiveTime::MIN) + Duration::days(1);
        let as_utc = next_midnight - Duration::seconds(i64::from(self.offset.local_minus_utc()));
        Utc.from_utc_datetime(&as_utc)
    }

    /// Whole seconds from `now` until the next boundary.
    pub fn seconds_until_boundary(&self, now: DateTime<Utc>) -> i64 {
        (self.next_boundary(now) - now).num_seconds()
    }
}

impl Default for DayCalendar {
    fn default() -> Self {
        Self::utc()
    }
}

/// Day key for `now` at `offset_hours` east of UTC.
pub fn current_day_key(now: DateTime<Utc>, offset_hours: i32) -> Result<String> {
    Ok(DayCalendar::new(offset_hours)?.day_key(now))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    #[test]
    fn test_utc_day_key() {
        let calendar = DayCalendar::utc();
        assert_eq!(calendar.day_key(at("2025-10-07T12:00:00Z")), "2025-10-07");
    }

    #[test]
    fn test_same_key_within_day() {
        let first = at("2025-10-07T10:00:00Z");
        let second = first + Duration::seconds(1);
        assert_eq!(
            current_day_key(first, 0).unwrap(),
            current_day_key(second, 0).unwrap()
        );
    }

    #[test]
    fn test_key_changes_across_local_midnight() {
        // 00:00 at UTC+7 is 17:00 UTC the previous day
        let before = at("2025-10-07T16:59:59Z");
        let after = at("2025-10-07T17:00:00Z");

        assert_eq!(current_day_key(before, 7).unwrap(), "2025-10-07");
        assert_eq!(current_day_key(after, 7).unwrap(), "2025-10-08");

        // The same instants are on one UTC day
        assert_eq!(
            current_day_key(before, 0).unwrap(),
            current_day_key(after, 0).unwrap()
        );
    }

    #[test]
    fn test_negative_offset() {
        let calendar = DayCalendar::new(-5).unwrap();
        assert_eq!(calendar.day_key(at("2025-10-08T03:00:00Z")), "2025-10-07");
        assert_eq!(calendar.offset_hours(), -5);
    }

    #[test]
    fn test_next_boundary() {
        let calendar = DayCalendar::new(7).unwrap();
        let now = at("2025-10-07T10:00:00Z");
        assert_eq!(calendar.next_boundary(now), at("2025-10-07T17:00:00Z"));
        assert_eq!(calendar.seconds_until_boundary(now), 7 * 3600);

        let utc = DayCalendar::utc();
        assert_eq!(utc.next_boundary(now), at("2025-10-08T00:00:00Z"));
    }

    #[test]
    fn test_boundary_at_exact_midnight_is_next_day() {
        let calendar = DayCalendar::utc();
        let midnight = at("2025-10-08T00:00:00Z");
        assert_eq!(calendar.next_boundary(midnight), at("2025-10-09T00:00:00Z"));
    }

    #[test]
    fn test_invalid_offset() {
        assert!(DayCalendar::new(30).is_err());
        assert!(current_day_key(Utc::now(), 99).is_err());
    }

    #[test]
    fn test_manual_clock() {
        let clock = ManualClock::new(at("2025-10-07T00:00:00Z"));
        clock.advance(Duration::hours(25));
        assert_eq!(clock.now(), at("2025-10-08T01:00:00Z"));
        clock.set(at("2025-01-01T00:00:00Z"));
        assert_eq!(clock.now(), at("2025-01-01T00:00:00Z"));
    }

    #[test]
    fn test_end_of_day_matches_next_boundary() {
        let cal = DayCalendar::new(7).unwrap();
        let now = at("2025-10-07T10:00:00Z");
        assert_eq!(cal.end_of_day(&cal.day_key(now)).unwrap(), cal.next_boundary(now));
        assert_eq!(
            cal.end_of_day("2025-10-06").unwrap(),
            at("2025-10-06T17:00:00Z")
        );
        assert!(cal.end_of_day("yesterday").is_err());
    }
}
