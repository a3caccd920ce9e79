//! The timeslot model: owner-published availability windows.
//!
//! Times are minute-granularity UTC wall-clock values on a single date.
//! Non-cancelled timeslots of one owner on one date never overlap; the
//! interval test is half-open (`start < other.end && other.start < end`).

use chrono::{DateTime, NaiveDate, NaiveTime, Timelike, Utc, Weekday};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use slotsync_core::{AppointmentKind, TimeWindow};

use crate::error::{EngineError, EngineResult};

/// Lifecycle status of a timeslot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeslotStatus {
    /// Open for booking.
    #[default]
    Available,
    /// Fully reserved.
    Booked,
    /// Withdrawn by the owner or a booking cancellation.
    Cancelled,
    /// Held back from booking without being cancelled.
    Blocked,
}

impl TimeslotStatus {
    /// Valid transitions. A booked slot only moves toward cancellation.
    pub fn can_transition_to(&self, next: TimeslotStatus) -> bool {
        use TimeslotStatus::*;
        match (self, next) {
            (Available, Booked | Cancelled | Blocked) => true,
            (Booked, Cancelled) => true,
            (Blocked, Available | Cancelled) => true,
            (Cancelled, _) => false,
            (current, next) => *current == next,
        }
    }
}

/// How a timeslot repeats when expanded toward a horizon.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "frequency", content = "on")]
pub enum RecurrenceRule {
    /// No repetition.
    #[default]
    None,
    /// Every day.
    Daily,
    /// On the given weekdays.
    Weekly(Vec<Weekday>),
    /// On the given day of each month (months lacking it are skipped).
    Monthly(u32),
}

impl RecurrenceRule {
    /// True when the rule generates occurrences.
    pub fn is_recurring(&self) -> bool {
        !matches!(self, Self::None)
    }
}

/// An owner-published interval of availability.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Timeslot {
    /// Unique identifier.
    pub id: Uuid,
    /// The owning actor.
    pub owner: String,
    /// The date the slot sits on.
    pub date: NaiveDate,
    /// Start time (minute granularity, UTC).
    pub start: NaiveTime,
    /// End time (minute granularity, UTC).
    pub end: NaiveTime,
    /// The kind of appointment this slot is offered for.
    pub kind: AppointmentKind,
    /// Lifecycle status.
    pub status: TimeslotStatus,
    /// How many bookings the slot accepts.
    pub max_bookings: u32,
    /// How many bookings it currently holds.
    pub current_bookings: u32,
    /// Recurrence rule for expansion.
    #[serde(default)]
    pub recurrence: RecurrenceRule,
    /// The parent slot for generated recurring instances.
    pub parent_id: Option<Uuid>,
    /// Creation instant, used for deterministic conflict precedence.
    pub created_at: DateTime<Utc>,
}

impl Timeslot {
    /// Creates an available timeslot after validating its fields.
    ///
    /// # Errors
    ///
    /// Returns a validation error when `start >= end`, times carry
    /// sub-minute precision, or `max_bookings` is zero.
    pub fn new(
        owner: impl Into<String>,
        date: NaiveDate,
        start: NaiveTime,
        end: NaiveTime,
        kind: AppointmentKind,
        max_bookings: u32,
        created_at: DateTime<Utc>,
    ) -> EngineResult<Self> {
        validate_interval(start, end)?;
        if max_bookings == 0 {
            return Err(EngineError::validation(
                "max_bookings",
                "must accept at least one booking",
            ));
        }

        Ok(Self {
            id: Uuid::new_v4(),
            owner: owner.into(),
            date,
            start,
            end,
            kind,
            status: TimeslotStatus::Available,
            max_bookings,
            current_bookings: 0,
            recurrence: RecurrenceRule::None,
            parent_id: None,
            created_at,
        })
    }

    /// Builder: set the recurrence rule.
    pub fn with_recurrence(mut self, rule: RecurrenceRule) -> Self {
        self.recurrence = rule;
        self
    }

    /// Builder: mark this slot as a generated instance of `parent`.
    pub fn with_parent(mut self, parent: Uuid) -> Self {
        self.parent_id = Some(parent);
        self
    }

    /// The start instant.
    pub fn start_instant(&self) -> DateTime<Utc> {
        self.date.and_time(self.start).and_utc()
    }

    /// The slot's interval as a [`TimeWindow`].
    pub fn window(&self) -> TimeWindow {
        TimeWindow::new(self.start_instant(), self.date.and_time(self.end).and_utc())
    }

    /// Duration in whole minutes.
    pub fn duration_minutes(&self) -> i64 {
        (self.end - self.start).num_minutes()
    }

    /// True unless the slot has been cancelled.
    pub fn is_active(&self) -> bool {
        self.status != TimeslotStatus::Cancelled
    }

    /// True when a reservation could currently succeed.
    pub fn can_book(&self) -> bool {
        self.status == TimeslotStatus::Available && self.current_bookings < self.max_bookings
    }

    /// The overlap test against another slot.
    ///
    /// Only slots of the same owner on the same date can collide, and
    /// cancelled slots never do. Symmetric:
    /// `a.overlaps(b) == b.overlaps(a)`.
    pub fn overlaps(&self, other: &Timeslot) -> bool {
        self.owner == other.owner
            && self.date == other.date
            && self.is_active()
            && other.is_active()
            && self.start < other.end
            && other.start < self.end
    }
}

/// Validates a minute-granularity interval.
pub fn validate_interval(start: NaiveTime, end: NaiveTime) -> EngineResult<()> {
    if start.second() != 0 || end.second() != 0 || start.nanosecond() != 0 || end.nanosecond() != 0
    {
        return Err(EngineError::validation(
            "start",
            "times must have minute granularity",
        ));
    }
    if start >= end {
        return Err(EngineError::validation("start", "start must be before end"));
    }
    Ok(())
}
