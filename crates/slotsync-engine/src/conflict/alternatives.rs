//! Alternative-slot search for rescheduling a conflicting item.
//!
//! Candidates are generated at a fixed granularity across a bounded
//! horizon. A candidate survives when its buffer-extended interval avoids
//! every other active item and stays inside business hours; survivors are
//! scored by temporal proximity plus weekday and hour preference, and the
//! top N come back in descending score order.

use chrono::{DateTime, Datelike, Duration, Timelike, Utc, Weekday};
use serde::{Deserialize, Serialize};

use slotsync_core::TimeWindow;

use super::{ScheduleItem, Suggestion};

/// The hours and weekdays candidates must stay inside.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusinessHours {
    /// First bookable hour (inclusive).
    pub start_hour: u32,
    /// Last bookable hour (exclusive; candidates must end by it).
    pub end_hour: u32,
    /// Bookable weekdays.
    pub workdays: Vec<Weekday>,
}

impl Default for BusinessHours {
    fn default() -> Self {
        Self {
            start_hour: 9,
            end_hour: 17,
            workdays: vec![
                Weekday::Mon,
                Weekday::Tue,
                Weekday::Wed,
                Weekday::Thu,
                Weekday::Fri,
            ],
        }
    }
}

impl BusinessHours {
    /// True when the whole window fits a bookable day and hour range.
    pub fn contains(&self, window: &TimeWindow) -> bool {
        if !self.workdays.contains(&window.start.weekday()) {
            return false;
        }
        if window.start.date_naive() != window.end.date_naive() {
            return false;
        }
        let start_minutes = window.start.hour() * 60 + window.start.minute();
        let end_minutes = window.end.hour() * 60 + window.end.minute();
        start_minutes >= self.start_hour * 60 && end_minutes <= self.end_hour * 60
    }
}

/// Parameters for the forward slot search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlotSearchConfig {
    /// Candidate step size in minutes.
    pub granularity_minutes: i64,
    /// How far ahead to search, in days.
    pub horizon_days: i64,
    /// How many scored candidates to return.
    pub top_n: usize,
    /// Business-hours constraint.
    pub business: BusinessHours,
    /// Hour range that earns a scoring bonus (inclusive-exclusive).
    pub preferred_hours: (u32, u32),
}

impl Default for SlotSearchConfig {
    fn default() -> Self {
        Self {
            granularity_minutes: 30,
            horizon_days: 5,
            top_n: 3,
            business: BusinessHours::default(),
            preferred_hours: (10, 16),
        }
    }
}

/// A surviving candidate with its ranking score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoredSlot {
    /// The candidate interval.
    pub window: TimeWindow,
    /// Ranking score, higher is better.
    pub score: f64,
}

impl ScoredSlot {
    /// Converts into a suggestion for the given item.
    pub fn into_suggestion(self, item_id: impl Into<String>) -> Suggestion {
        Suggestion {
            item_id: item_id.into(),
            window: self.window,
            score: self.score,
        }
    }
}

/// Searches forward from `search_from` for slots the item could move to.
pub fn find_alternative_slots(
    item: &ScheduleItem,
    others: &[ScheduleItem],
    search_from: DateTime<Utc>,
    config: &SlotSearchConfig,
) -> Vec<ScoredSlot> {
    let duration = Duration::minutes(item.duration_minutes());
    let step = Duration::minutes(config.granularity_minutes);
    let horizon = search_from + Duration::days(config.horizon_days);

    let (pad_before, pad_after) = item
        .buffer
        .as_ref()
        .map(|b| {
            (
                Duration::minutes(b.before_minutes as i64),
                Duration::minutes(b.after_minutes as i64),
            )
        })
        .unwrap_or((Duration::zero(), Duration::zero()));

    let obstacles: Vec<TimeWindow> = others
        .iter()
        .filter(|o| o.id != item.id && !o.cancelled && o.owner == item.owner)
        .map(|o| o.effective_window())
        .collect();

    let mut survivors = Vec::new();
    let mut cursor = align_up(search_from, config.granularity_minutes);

    while cursor + duration <= horizon {
        let candidate = TimeWindow::new(cursor, cursor + duration);
        cursor += step;

        // The buffer-extended interval must fit, not just the core.
        let extended = candidate.padded(pad_before, pad_after);
        if !config.business.contains(&extended) {
            continue;
        }
        if obstacles.iter().any(|o| o.overlaps(&extended)) {
            continue;
        }

        let score = score_candidate(&candidate, item, search_from, config);
        survivors.push(ScoredSlot {
            window: candidate,
            score,
        });
    }

    survivors.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.window.start.cmp(&b.window.start))
    });
    survivors.truncate(config.top_n);
    survivors
}

/// Rounds an instant up to the next granularity boundary.
fn align_up(instant: DateTime<Utc>, granularity_minutes: i64) -> DateTime<Utc> {
    let minute_of_hour = instant.minute() as i64;
    let remainder = minute_of_hour % granularity_minutes;
    let base = instant - Duration::seconds(instant.second() as i64)
        - Duration::nanoseconds(instant.nanosecond() as i64);
    if remainder == 0 && instant.second() == 0 && instant.nanosecond() == 0 {
        base
    } else {
        base + Duration::minutes(granularity_minutes - remainder)
    }
}

/// Temporal proximity plus weekday/hour preference.
fn score_candidate(
    candidate: &TimeWindow,
    item: &ScheduleItem,
    search_from: DateTime<Utc>,
    config: &SlotSearchConfig,
) -> f64 {
    let hours_away = (candidate.start - search_from).num_minutes() as f64 / 60.0;
    let mut score = (100.0 - hours_away * 2.0).max(0.0);

    // Staying on the original weekday keeps recurring rhythms intact.
    if candidate.start.weekday() == item.window.start.weekday() {
        score += 10.0;
    }

    let (lo, hi) = config.preferred_hours;
    let hour = candidate.start.hour();
    if hour >= lo && hour < hi {
        score += 20.0;
    }

    score
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conflict::ItemSource;
    use chrono::TimeZone;
    use slotsync_core::{AppointmentKind, BufferStrategy, BufferWindow};

    fn utc(d: u32, h: u32, m: u32) -> DateTime<Utc> {
        // June 2025: the 10th is a Tuesday.
        Utc.with_ymd_and_hms(2025, 6, d, h, m, 0).unwrap()
    }

    fn item(id: &str, start: DateTime<Utc>, minutes: i64) -> ScheduleItem {
        ScheduleItem {
            id: id.into(),
            owner: "alice".into(),
            window: TimeWindow::new(start, start + Duration::minutes(minutes)),
            buffer: None,
            kind: AppointmentKind::General,
            source: ItemSource::Appointment,
            location: None,
            cancelled: false,
            created_at: utc(1, 8, 0),
        }
    }

    #[test]
    fn align_up_rounds_to_granularity() {
        assert_eq!(align_up(utc(10, 9, 0), 30), utc(10, 9, 0));
        assert_eq!(align_up(utc(10, 9, 10), 30), utc(10, 9, 30));
        assert_eq!(align_up(utc(10, 9, 31), 30), utc(10, 10, 0));
    }

    #[test]
    fn business_hours_filtering() {
        let hours = BusinessHours::default();

        // Tuesday inside hours.
        assert!(hours.contains(&TimeWindow::new(utc(10, 9, 0), utc(10, 10, 0))));
        // Ends past closing.
        assert!(!hours.contains(&TimeWindow::new(utc(10, 16, 30), utc(10, 17, 30))));
        // Saturday (2025-06-14).
        assert!(!hours.contains(&TimeWindow::new(utc(14, 10, 0), utc(14, 11, 0))));
    }

    #[test]
    fn finds_open_slots_in_order_of_score() {
        let moving = item("moving", utc(10, 10, 0), 60);
        let blocker = item("blocker", utc(10, 10, 0), 120); // 10:00-12:00

        let results = find_alternative_slots(
            &moving,
            &[blocker],
            utc(10, 10, 0),
            &SlotSearchConfig::default(),
        );

        assert_eq!(results.len(), 3);
        // 12:00 is the first candidate clear of the blocker, and scores
        // highest on proximity.
        assert_eq!(results[0].window.start, utc(10, 12, 0));
        assert!(results[0].score >= results[1].score);
        assert!(results[1].score >= results[2].score);
    }

    #[test]
    fn buffer_extended_candidates_avoid_obstacles() {
        let mut moving = item("moving", utc(10, 10, 0), 60);
        moving.buffer = Some(BufferWindow {
            before_minutes: 30,
            after_minutes: 30,
            effective_start: utc(10, 9, 30),
            effective_end: utc(10, 11, 30),
            strategy: BufferStrategy::Fixed,
        });
        let blocker = item("blocker", utc(10, 10, 0), 120);

        let results = find_alternative_slots(
            &moving,
            &[blocker],
            utc(10, 10, 0),
            &SlotSearchConfig::default(),
        );

        // 12:00 would collide through the 30-minute lead buffer; the first
        // viable start is 12:30.
        assert_eq!(results[0].window.start, utc(10, 12, 30));
    }

    #[test]
    fn other_owners_do_not_block_candidates() {
        let moving = item("moving", utc(10, 10, 0), 60);
        let mut foreign = item("foreign", utc(10, 12, 0), 240);
        foreign.owner = "bob".into();

        let results = find_alternative_slots(
            &moving,
            &[foreign],
            utc(10, 10, 0),
            &SlotSearchConfig::default(),
        );

        assert_eq!(results[0].window.start, utc(10, 10, 0));
    }

    #[test]
    fn fully_blocked_horizon_returns_nothing() {
        let moving = item("moving", utc(10, 10, 0), 60);
        // One obstacle covering the whole horizon.
        let mut wall = item("wall", utc(9, 0, 0), 60 * 24 * 10);
        wall.window = TimeWindow::new(utc(9, 0, 0), utc(16, 0, 0));

        let config = SlotSearchConfig {
            horizon_days: 5,
            ..Default::default()
        };
        let results = find_alternative_slots(&moving, &[wall], utc(10, 10, 0), &config);
        assert!(results.is_empty());
    }

    #[test]
    fn search_is_deterministic() {
        let moving = item("moving", utc(10, 10, 0), 60);
        let blocker = item("blocker", utc(10, 10, 0), 90);

        let first = find_alternative_slots(
            &moving,
            &[blocker.clone()],
            utc(10, 10, 0),
            &SlotSearchConfig::default(),
        );
        let second = find_alternative_slots(
            &moving,
            &[blocker],
            utc(10, 10, 0),
            &SlotSearchConfig::default(),
        );
        assert_eq!(first, second);
    }
}
