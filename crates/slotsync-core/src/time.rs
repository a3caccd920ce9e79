//! Time types for calendar entities.
//!
//! [`EventTime`] represents an event boundary that is either a concrete UTC
//! instant or an all-day date. [`TimeWindow`] is the half-open interval type
//! used for overlap checks, buffer zones and query ranges.

use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// The start or end of a calendar entity.
///
/// All-day events carry a plain date; they never encode a synthetic
/// time-of-day, so timezone arithmetic stays lossless.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value")]
pub enum EventTime {
    /// A concrete instant, stored in UTC.
    DateTime(DateTime<Utc>),
    /// An all-day date without a time-of-day component.
    AllDay(NaiveDate),
}

impl EventTime {
    /// Creates an `EventTime` from a UTC instant.
    pub fn from_utc(dt: DateTime<Utc>) -> Self {
        Self::DateTime(dt)
    }

    /// Creates an `EventTime` from an instant in any timezone.
    pub fn from_zoned<Tz: TimeZone>(dt: DateTime<Tz>) -> Self {
        Self::DateTime(dt.with_timezone(&Utc))
    }

    /// Creates an all-day `EventTime`.
    pub fn from_date(date: NaiveDate) -> Self {
        Self::AllDay(date)
    }

    /// Returns `true` for the all-day variant.
    pub fn is_all_day(&self) -> bool {
        matches!(self, Self::AllDay(_))
    }

    /// Returns the instant if this is a `DateTime` variant.
    pub fn as_datetime(&self) -> Option<&DateTime<Utc>> {
        match self {
            Self::DateTime(dt) => Some(dt),
            Self::AllDay(_) => None,
        }
    }

    /// Converts to a UTC instant for interval arithmetic.
    ///
    /// All-day boundaries compare at midnight UTC of their date.
    pub fn to_utc(&self) -> DateTime<Utc> {
        match self {
            Self::DateTime(dt) => *dt,
            Self::AllDay(date) => date.and_hms_opt(0, 0, 0).expect("valid time").and_utc(),
        }
    }

    /// Returns the date portion.
    pub fn date(&self) -> NaiveDate {
        match self {
            Self::DateTime(dt) => dt.date_naive(),
            Self::AllDay(date) => *date,
        }
    }
}

impl PartialOrd for EventTime {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for EventTime {
    fn cmp(&self, other: &Self) -> Ordering {
        self.to_utc().cmp(&other.to_utc())
    }
}

/// A half-open UTC interval `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    /// Start of the window (inclusive).
    pub start: DateTime<Utc>,
    /// End of the window (exclusive).
    pub end: DateTime<Utc>,
}

impl TimeWindow {
    /// Creates a new window.
    ///
    /// # Panics
    ///
    /// Panics if `start` is after `end`.
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        assert!(start <= end, "TimeWindow start must be <= end");
        Self { start, end }
    }

    /// Creates a window from a start instant and a duration.
    pub fn from_duration(start: DateTime<Utc>, duration: Duration) -> Self {
        Self::new(start, start + duration)
    }

    /// Returns the window length.
    pub fn duration(&self) -> Duration {
        self.end - self.start
    }

    /// Returns the window length in whole minutes.
    pub fn duration_minutes(&self) -> i64 {
        self.duration().num_minutes()
    }

    /// Checks whether an instant falls inside the window.
    pub fn contains(&self, dt: DateTime<Utc>) -> bool {
        self.start <= dt && dt < self.end
    }

    /// Checks whether two windows intersect.
    ///
    /// The test is symmetric: `a` overlaps `b` iff
    /// `a.start < b.end && b.start < a.end`.
    pub fn overlaps(&self, other: &TimeWindow) -> bool {
        self.start < other.end && other.start < self.end
    }

    /// Returns the length of the intersection in whole minutes (0 when
    /// disjoint).
    pub fn overlap_minutes(&self, other: &TimeWindow) -> i64 {
        let start = self.start.max(other.start);
        let end = self.end.min(other.end);
        if start < end {
            (end - start).num_minutes()
        } else {
            0
        }
    }

    /// Returns the window padded asymmetrically on each side.
    pub fn padded(&self, before: Duration, after: Duration) -> Self {
        Self {
            start: self.start - before,
            end: self.end + after,
        }
    }

    /// Returns the window shifted forward by the given duration.
    pub fn shifted(&self, by: Duration) -> Self {
        Self {
            start: self.start + by,
            end: self.end + by,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn utc(y: i32, m: u32, d: u32, h: u32, min: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, min, s).unwrap()
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    mod event_time {
        use super::*;

        #[test]
        fn datetime_variant() {
            let dt = utc(2025, 6, 10, 9, 30, 0);
            let et = EventTime::from_utc(dt);
            assert!(!et.is_all_day());
            assert_eq!(et.as_datetime(), Some(&dt));
            assert_eq!(et.to_utc(), dt);
            assert_eq!(et.date(), date(2025, 6, 10));
        }

        #[test]
        fn all_day_variant() {
            let et = EventTime::from_date(date(2025, 6, 10));
            assert!(et.is_all_day());
            assert_eq!(et.as_datetime(), None);
            assert_eq!(et.to_utc(), utc(2025, 6, 10, 0, 0, 0));
        }

        #[test]
        fn zoned_conversion_normalizes_to_utc() {
            let paris = chrono_tz::Europe::Paris;
            let local = paris.with_ymd_and_hms(2025, 6, 10, 11, 30, 0).unwrap();
            let et = EventTime::from_zoned(local);
            assert_eq!(et.to_utc(), utc(2025, 6, 10, 9, 30, 0));
        }

        #[test]
        fn ordering_mixes_variants() {
            let midnight = EventTime::from_date(date(2025, 6, 10));
            let morning = EventTime::from_utc(utc(2025, 6, 10, 9, 0, 0));
            let noon = EventTime::from_utc(utc(2025, 6, 10, 12, 0, 0));
            assert!(midnight < morning);
            assert!(morning < noon);
        }

        #[test]
        fn serde_roundtrip() {
            for et in [
                EventTime::from_utc(utc(2025, 6, 10, 9, 30, 0)),
                EventTime::from_date(date(2025, 6, 10)),
            ] {
                let json = serde_json::to_string(&et).unwrap();
                let parsed: EventTime = serde_json::from_str(&json).unwrap();
                assert_eq!(et, parsed);
            }
        }
    }

    mod time_window {
        use super::*;

        fn window(h1: u32, m1: u32, h2: u32, m2: u32) -> TimeWindow {
            TimeWindow::new(utc(2025, 6, 10, h1, m1, 0), utc(2025, 6, 10, h2, m2, 0))
        }

        #[test]
        fn contains_is_half_open() {
            let w = window(9, 0, 17, 0);
            assert!(w.contains(utc(2025, 6, 10, 9, 0, 0)));
            assert!(w.contains(utc(2025, 6, 10, 16, 59, 59)));
            assert!(!w.contains(utc(2025, 6, 10, 17, 0, 0)));
            assert!(!w.contains(utc(2025, 6, 10, 8, 59, 59)));
        }

        #[test]
        #[should_panic(expected = "start must be <= end")]
        fn inverted_window_panics() {
            TimeWindow::new(utc(2025, 6, 10, 17, 0, 0), utc(2025, 6, 10, 9, 0, 0));
        }

        #[test]
        fn overlap_is_symmetric() {
            let a = window(9, 0, 10, 0);
            let b = window(9, 30, 11, 0);
            let c = window(10, 0, 11, 0);

            assert!(a.overlaps(&b));
            assert!(b.overlaps(&a));
            // Touching boundaries do not overlap.
            assert!(!a.overlaps(&c));
            assert!(!c.overlaps(&a));
        }

        #[test]
        fn overlap_minutes_measures_intersection() {
            let a = window(9, 0, 10, 0);
            assert_eq!(a.overlap_minutes(&window(9, 45, 11, 0)), 15);
            assert_eq!(a.overlap_minutes(&window(8, 0, 12, 0)), 60);
            assert_eq!(a.overlap_minutes(&window(10, 0, 11, 0)), 0);
        }

        #[test]
        fn padded_extends_each_side() {
            let w = window(10, 0, 11, 0).padded(Duration::minutes(15), Duration::minutes(30));
            assert_eq!(w.start, utc(2025, 6, 10, 9, 45, 0));
            assert_eq!(w.end, utc(2025, 6, 10, 11, 30, 0));
        }

        #[test]
        fn shifted_moves_both_ends() {
            let w = window(10, 0, 11, 0).shifted(Duration::minutes(90));
            assert_eq!(w.start, utc(2025, 6, 10, 11, 30, 0));
            assert_eq!(w.end, utc(2025, 6, 10, 12, 30, 0));
        }
    }
}
