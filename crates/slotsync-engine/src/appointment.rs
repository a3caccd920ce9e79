//! Appointments: booked occupancy of a timeslot.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use slotsync_core::{AppointmentKind, BufferWindow, TimeWindow};

/// Lifecycle status of an appointment.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AppointmentStatus {
    /// Booked and upcoming.
    #[default]
    Scheduled,
    /// Took place.
    Completed,
    /// Called off; releases the underlying slot.
    Cancelled,
    /// The participant did not show up.
    NoShow,
}

/// A booking against a timeslot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Appointment {
    /// Unique identifier.
    pub id: Uuid,
    /// The reserved timeslot.
    pub timeslot_id: Uuid,
    /// The slot owner (the calendar the appointment sits on).
    pub owner: String,
    /// Participant identities.
    pub participants: Vec<String>,
    /// Free-text purpose.
    pub purpose: Option<String>,
    /// Appointment kind, feeding the buffer calculator.
    pub kind: AppointmentKind,
    /// Lifecycle status.
    pub status: AppointmentStatus,
    /// Core interval start.
    pub start: DateTime<Utc>,
    /// Core interval end.
    pub end: DateTime<Utc>,
    /// The computed padding, when a buffer preference applied.
    pub buffer: Option<BufferWindow>,
    /// Creation instant, used for deterministic conflict precedence.
    pub created_at: DateTime<Utc>,
}

impl Appointment {
    /// The core interval.
    pub fn window(&self) -> TimeWindow {
        TimeWindow::new(self.start, self.end)
    }

    /// The buffer-extended interval, or the core interval when no buffer
    /// applies.
    pub fn effective_window(&self) -> TimeWindow {
        self.buffer
            .as_ref()
            .map(|b| b.effective_window())
            .unwrap_or_else(|| self.window())
    }

    /// True for appointments that still occupy their slot.
    pub fn is_active(&self) -> bool {
        matches!(self.status, AppointmentStatus::Scheduled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use slotsync_core::BufferStrategy;

    fn utc(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 10, h, m, 0).unwrap()
    }

    fn appointment() -> Appointment {
        Appointment {
            id: Uuid::new_v4(),
            timeslot_id: Uuid::new_v4(),
            owner: "alice".into(),
            participants: vec!["bob".into()],
            purpose: Some("intro call".into()),
            kind: AppointmentKind::Consultation,
            status: AppointmentStatus::Scheduled,
            start: utc(10, 0),
            end: utc(11, 0),
            buffer: None,
            created_at: utc(8, 0),
        }
    }

    #[test]
    fn effective_window_without_buffer_is_the_core() {
        let appt = appointment();
        assert_eq!(appt.effective_window(), appt.window());
    }

    #[test]
    fn effective_window_uses_the_buffer() {
        let mut appt = appointment();
        appt.buffer = Some(BufferWindow {
            before_minutes: 15,
            after_minutes: 15,
            effective_start: utc(9, 45),
            effective_end: utc(11, 15),
            strategy: BufferStrategy::Fixed,
        });

        let w = appt.effective_window();
        assert_eq!(w.start, utc(9, 45));
        assert_eq!(w.end, utc(11, 15));
    }

    #[test]
    fn only_scheduled_appointments_are_active() {
        let mut appt = appointment();
        assert!(appt.is_active());
        appt.status = AppointmentStatus::Cancelled;
        assert!(!appt.is_active());
        appt.status = AppointmentStatus::Completed;
        assert!(!appt.is_active());
    }
}
