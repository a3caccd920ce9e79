//! Recurrence expansion for timeslots.
//!
//! A rule plus a horizon date produces the candidate dates for generated
//! instances, starting the day after the parent. The caller overlap-checks
//! each candidate independently; a conflicting candidate is skipped and
//! counted, never a batch failure.

use chrono::{Datelike, Days, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::timeslot::{RecurrenceRule, Timeslot};

/// Result of expanding one recurring timeslot.
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpansionOutcome {
    /// The generated instances, each carrying a parent link.
    pub created: Vec<Timeslot>,
    /// Candidates skipped because they collided with an existing slot.
    pub skipped: usize,
}

/// The candidate dates for a rule, from the day after `parent_date` up to
/// and including `horizon`.
pub fn occurrence_dates(
    rule: &RecurrenceRule,
    parent_date: NaiveDate,
    horizon: NaiveDate,
) -> Vec<NaiveDate> {
    let mut dates = Vec::new();
    let mut current = parent_date + Days::new(1);

    while current <= horizon {
        let matches = match rule {
            RecurrenceRule::None => false,
            RecurrenceRule::Daily => true,
            RecurrenceRule::Weekly(weekdays) => weekdays.contains(&current.weekday()),
            RecurrenceRule::Monthly(day) => current.day() == *day,
        };
        if matches {
            dates.push(current);
        }
        current = current + Days::new(1);
    }

    dates
}

/// Builds the instance of a parent slot on a candidate date.
///
/// Instances start available with zero bookings and no recurrence of their
/// own; the parent link ties them back for later updates.
pub fn instantiate(parent: &Timeslot, date: NaiveDate) -> Timeslot {
    let mut instance = parent.clone();
    instance.id = uuid::Uuid::new_v4();
    instance.date = date;
    instance.status = crate::timeslot::TimeslotStatus::Available;
    instance.current_bookings = 0;
    instance.recurrence = RecurrenceRule::None;
    instance.parent_id = Some(parent.id);
    instance
}
