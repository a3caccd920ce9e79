//! The canonical, provider-agnostic calendar event model.
//!
//! Every provider adapter maps its wire format into [`CanonicalEvent`] and
//! back. Times are always UTC instants (or explicit all-day dates) plus the
//! source timezone name; naive local times are never stored.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::time::{EventTime, TimeWindow};

/// Participation status of an attendee.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseStatus {
    Accepted,
    Declined,
    Tentative,
    NeedsAction,
    #[default]
    Unknown,
}

/// An event attendee or organizer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attendee {
    /// The attendee's email address.
    pub email: String,
    /// Display name, if known.
    pub name: Option<String>,
    /// Participation status.
    #[serde(default)]
    pub response: ResponseStatus,
}

impl Attendee {
    /// Creates an attendee with just an email address.
    pub fn new(email: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            name: None,
            response: ResponseStatus::Unknown,
        }
    }

    /// Builder: set the display name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Builder: set the participation status.
    pub fn with_response(mut self, response: ResponseStatus) -> Self {
        self.response = response;
        self
    }
}

/// Lifecycle status of an event.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventStatus {
    #[default]
    Confirmed,
    Tentative,
    Cancelled,
}

/// The kind of appointment behind an event, used by the buffer calculator's
/// per-kind multiplier and minimum tables.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AppointmentKind {
    #[default]
    General,
    Consultation,
    Interview,
    Review,
    Workshop,
}

/// A calendar event in canonical form.
///
/// `etag`, `provider` and `calendar_id` tie the event back to its remote
/// copy; writes against the remote are guarded by the etag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CanonicalEvent {
    /// Globally unique event identifier.
    pub uid: String,
    /// Event title/summary.
    pub title: String,
    /// Free-text description.
    pub description: Option<String>,
    /// Start boundary.
    pub start: EventTime,
    /// End boundary.
    pub end: EventTime,
    /// IANA timezone name of the event source, if known.
    pub timezone: Option<String>,
    /// Location text.
    pub location: Option<String>,
    /// Attendees (excluding the organizer).
    #[serde(default)]
    pub attendees: Vec<Attendee>,
    /// The organizer, if known.
    pub organizer: Option<Attendee>,
    /// Raw recurrence rule (RRULE value), if the event recurs.
    pub recurrence: Option<String>,
    /// Lifecycle status.
    #[serde(default)]
    pub status: EventStatus,
    /// Opaque version token for optimistic-concurrency writes.
    pub etag: Option<String>,
    /// Name of the provider this event came from.
    pub provider: String,
    /// Remote calendar identifier.
    pub calendar_id: String,
    /// Last modification instant reported by the provider.
    pub last_modified: Option<DateTime<Utc>>,
}

impl CanonicalEvent {
    /// Creates an event with the required fields.
    pub fn new(
        uid: impl Into<String>,
        title: impl Into<String>,
        start: EventTime,
        end: EventTime,
        provider: impl Into<String>,
        calendar_id: impl Into<String>,
    ) -> Self {
        Self {
            uid: uid.into(),
            title: title.into(),
            description: None,
            start,
            end,
            timezone: None,
            location: None,
            attendees: Vec::new(),
            organizer: None,
            recurrence: None,
            status: EventStatus::Confirmed,
            etag: None,
            provider: provider.into(),
            calendar_id: calendar_id.into(),
            last_modified: None,
        }
    }

    /// Checks the event's structural invariants.
    ///
    /// # Errors
    ///
    /// Returns a [`ValidationError`] when the uid is empty or
    /// `start >= end`.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.uid.trim().is_empty() {
            return Err(ValidationError::new("uid", "uid must not be empty"));
        }
        if self.start >= self.end {
            return Err(ValidationError::new("start", "start must be before end"));
        }
        Ok(())
    }

    /// Returns `true` if this is an all-day event.
    pub fn is_all_day(&self) -> bool {
        self.start.is_all_day()
    }

    /// Returns `true` if the event is cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.status == EventStatus::Cancelled
    }

    /// Returns the event's core interval as a [`TimeWindow`].
    pub fn window(&self) -> TimeWindow {
        TimeWindow::new(self.start.to_utc(), self.end.to_utc())
    }

    /// Returns the duration in whole minutes.
    pub fn duration_minutes(&self) -> i64 {
        (self.end.to_utc() - self.start.to_utc()).num_minutes()
    }

    /// Builder: set the description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Builder: set the location.
    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    /// Builder: set the source timezone.
    pub fn with_timezone(mut self, tz: impl Into<String>) -> Self {
        self.timezone = Some(tz.into());
        self
    }

    /// Builder: add an attendee.
    pub fn with_attendee(mut self, attendee: Attendee) -> Self {
        self.attendees.push(attendee);
        self
    }

    /// Builder: set the organizer.
    pub fn with_organizer(mut self, organizer: Attendee) -> Self {
        self.organizer = Some(organizer);
        self
    }

    /// Builder: set the recurrence rule.
    pub fn with_recurrence(mut self, rrule: impl Into<String>) -> Self {
        self.recurrence = Some(rrule.into());
        self
    }

    /// Builder: set the status.
    pub fn with_status(mut self, status: EventStatus) -> Self {
        self.status = status;
        self
    }

    /// Builder: set the etag.
    pub fn with_etag(mut self, etag: impl Into<String>) -> Self {
        self.etag = Some(etag.into());
        self
    }

    /// Builder: set the last-modified instant.
    pub fn with_last_modified(mut self, at: DateTime<Utc>) -> Self {
        self.last_modified = Some(at);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, TimeZone};

    fn utc(y: i32, m: u32, d: u32, h: u32, min: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, min, s).unwrap()
    }

    fn sample_event() -> CanonicalEvent {
        CanonicalEvent::new(
            "evt-1@slotsync",
            "Project review",
            EventTime::from_utc(utc(2025, 6, 10, 10, 0, 0)),
            EventTime::from_utc(utc(2025, 6, 10, 11, 0, 0)),
            "caldav",
            "/calendars/alice/work/",
        )
    }

    #[test]
    fn valid_event_passes_validation() {
        assert!(sample_event().validate().is_ok());
    }

    #[test]
    fn inverted_interval_fails_validation() {
        let mut event = sample_event();
        event.end = EventTime::from_utc(utc(2025, 6, 10, 9, 0, 0));
        let err = event.validate().unwrap_err();
        assert_eq!(err.field, "start");
    }

    #[test]
    fn empty_uid_fails_validation() {
        let mut event = sample_event();
        event.uid = "  ".into();
        let err = event.validate().unwrap_err();
        assert_eq!(err.field, "uid");
    }

    #[test]
    fn all_day_flag_comes_from_the_variant() {
        let event = CanonicalEvent::new(
            "evt-2@slotsync",
            "Offsite",
            EventTime::from_date(NaiveDate::from_ymd_opt(2025, 6, 10).unwrap()),
            EventTime::from_date(NaiveDate::from_ymd_opt(2025, 6, 11).unwrap()),
            "caldav",
            "/calendars/alice/work/",
        );
        assert!(event.is_all_day());
        assert!(!sample_event().is_all_day());
    }

    #[test]
    fn window_and_duration() {
        let event = sample_event();
        assert_eq!(event.duration_minutes(), 60);
        assert!(event.window().contains(utc(2025, 6, 10, 10, 30, 0)));
    }

    #[test]
    fn builder_fields() {
        let event = sample_event()
            .with_description("quarterly review")
            .with_location("Room 4")
            .with_timezone("Europe/Paris")
            .with_attendee(Attendee::new("bob@example.com").with_name("Bob"))
            .with_organizer(Attendee::new("alice@example.com"))
            .with_recurrence("FREQ=WEEKLY;BYDAY=TU")
            .with_etag("\"v1\"")
            .with_status(EventStatus::Tentative);

        assert_eq!(event.attendees.len(), 1);
        assert_eq!(event.organizer.as_ref().unwrap().email, "alice@example.com");
        assert_eq!(event.recurrence.as_deref(), Some("FREQ=WEEKLY;BYDAY=TU"));
        assert_eq!(event.status, EventStatus::Tentative);
    }

    #[test]
    fn json_uses_camel_case_keys() {
        let json = serde_json::to_value(sample_event()).unwrap();
        assert!(json.get("calendarId").is_some());
        assert!(json.get("lastModified").is_some());
        assert!(json.get("calendar_id").is_none());
    }

    #[test]
    fn serde_roundtrip() {
        let event = sample_event()
            .with_attendee(Attendee::new("bob@example.com"))
            .with_etag("\"abc\"");
        let json = serde_json::to_string(&event).unwrap();
        let parsed: CanonicalEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(event, parsed);
    }
}
