//! Wire event to canonical event conversion pipeline.
//!
//! [`to_canonical`] resolves wire-format times into UTC instants (zoned
//! times go through the timezone service's DST policy, floating times are
//! taken as UTC) and attaches provider context. [`from_canonical`] is the
//! reverse direction for pushes; instants are emitted as UTC so a push and
//! a subsequent pull agree exactly.

use tracing::warn;

use slotsync_core::{CanonicalEvent, EventTime, timezone};

use crate::caldav::ics::{WireEvent, WireTime};
use crate::error::{ProviderError, ProviderResult};

/// Converts a decoded wire event into a [`CanonicalEvent`].
///
/// # Errors
///
/// Returns an invalid-response error when a zoned time names an unknown
/// zone, a local time cannot be resolved, or the event violates the
/// `start < end` invariant. Callers skip the offending event and keep the
/// rest of the payload.
pub fn to_canonical(
    wire: &WireEvent,
    provider: &str,
    calendar_id: &str,
    etag: Option<String>,
) -> ProviderResult<CanonicalEvent> {
    let start = convert_time(&wire.start)?;
    let end = convert_time(&wire.end)?;

    let mut event = CanonicalEvent::new(
        &wire.uid,
        &wire.summary,
        start,
        end,
        provider,
        calendar_id,
    )
    .with_status(wire.status);

    if let Some(tzid) = source_timezone(&wire.start) {
        event = event.with_timezone(tzid);
    }
    if let Some(ref description) = wire.description {
        event = event.with_description(description);
    }
    if let Some(ref location) = wire.location {
        event = event.with_location(location);
    }
    if let Some(ref rrule) = wire.rrule {
        event = event.with_recurrence(rrule);
    }
    if let Some(ref organizer) = wire.organizer {
        event = event.with_organizer(organizer.clone());
    }
    event.attendees = wire.attendees.clone();
    if let Some(modified) = wire.last_modified {
        event = event.with_last_modified(modified);
    }
    if let Some(etag) = etag {
        event = event.with_etag(etag);
    }

    event
        .validate()
        .map_err(|e| ProviderError::invalid_response(format!("event {}: {}", wire.uid, e)))?;

    Ok(event)
}

/// Converts a batch of wire events, skipping the ones that fail.
///
/// Skips are logged; one malformed event never poisons a listing.
pub fn to_canonical_batch(
    wires: &[(WireEvent, Option<String>)],
    provider: &str,
    calendar_id: &str,
) -> Vec<CanonicalEvent> {
    wires
        .iter()
        .filter_map(
            |(wire, etag)| match to_canonical(wire, provider, calendar_id, etag.clone()) {
                Ok(event) => Some(event),
                Err(e) => {
                    warn!(uid = %wire.uid, error = %e, "skipping unnormalizable event");
                    None
                }
            },
        )
        .collect()
}

/// Converts a [`CanonicalEvent`] back into its wire form.
pub fn from_canonical(event: &CanonicalEvent) -> WireEvent {
    WireEvent {
        uid: event.uid.clone(),
        summary: event.title.clone(),
        description: event.description.clone(),
        location: event.location.clone(),
        start: wire_time(&event.start),
        end: wire_time(&event.end),
        status: event.status,
        rrule: event.recurrence.clone(),
        organizer: event.organizer.clone(),
        attendees: event.attendees.clone(),
        last_modified: event.last_modified,
    }
}

fn convert_time(time: &WireTime) -> ProviderResult<EventTime> {
    match time {
        WireTime::Date(date) => Ok(EventTime::from_date(*date)),
        WireTime::Utc(dt) => Ok(EventTime::from_utc(*dt)),
        // Floating times carry no zone; UTC is the only stable reading.
        WireTime::Floating(naive) => Ok(EventTime::from_utc(naive.and_utc())),
        WireTime::Zoned { datetime, tzid } => {
            let zone = timezone::parse_zone(tzid)
                .map_err(|e| ProviderError::invalid_response(e.to_string()))?;
            let instant = timezone::to_utc(*datetime, zone)
                .map_err(|e| ProviderError::invalid_response(e.to_string()))?;
            Ok(EventTime::from_utc(instant))
        }
    }
}

fn source_timezone(time: &WireTime) -> Option<&str> {
    match time {
        WireTime::Zoned { tzid, .. } => Some(tzid),
        _ => None,
    }
}

fn wire_time(time: &EventTime) -> WireTime {
    match time {
        EventTime::DateTime(dt) => WireTime::Utc(*dt),
        EventTime::AllDay(date) => WireTime::Date(*date),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::caldav::ics::{generate_calendar, parse_calendar};
    use chrono::{DateTime, NaiveDate, TimeZone, Utc};
    use slotsync_core::{Attendee, EventStatus};

    fn utc(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, min, 0).unwrap()
    }

    fn sample_wire() -> WireEvent {
        WireEvent {
            uid: "evt-1@example.com".into(),
            summary: "Planning".into(),
            description: None,
            location: None,
            start: WireTime::Utc(utc(2025, 6, 10, 10, 0)),
            end: WireTime::Utc(utc(2025, 6, 10, 11, 0)),
            status: EventStatus::Confirmed,
            rrule: None,
            organizer: None,
            attendees: Vec::new(),
            last_modified: None,
        }
    }

    #[test]
    fn normalizes_utc_event() {
        let event = to_canonical(&sample_wire(), "caldav", "/cal/work/", Some("v1".into()))
            .unwrap();

        assert_eq!(event.uid, "evt-1@example.com");
        assert_eq!(event.provider, "caldav");
        assert_eq!(event.calendar_id, "/cal/work/");
        assert_eq!(event.etag.as_deref(), Some("v1"));
        assert_eq!(event.start, EventTime::from_utc(utc(2025, 6, 10, 10, 0)));
        assert!(!event.is_all_day());
    }

    #[test]
    fn zoned_time_resolves_through_the_zone() {
        let mut wire = sample_wire();
        let local = NaiveDate::from_ymd_opt(2025, 6, 10)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap();
        wire.start = WireTime::Zoned {
            datetime: local,
            tzid: "Europe/Paris".into(),
        };
        wire.end = WireTime::Zoned {
            datetime: local + chrono::Duration::hours(1),
            tzid: "Europe/Paris".into(),
        };

        let event = to_canonical(&wire, "caldav", "/cal/", None).unwrap();

        // Paris noon in June is 10:00 UTC.
        assert_eq!(event.start, EventTime::from_utc(utc(2025, 6, 10, 10, 0)));
        assert_eq!(event.timezone.as_deref(), Some("Europe/Paris"));
    }

    #[test]
    fn unknown_zone_is_an_error() {
        let mut wire = sample_wire();
        wire.start = WireTime::Zoned {
            datetime: NaiveDate::from_ymd_opt(2025, 6, 10)
                .unwrap()
                .and_hms_opt(12, 0, 0)
                .unwrap(),
            tzid: "Not/AZone".into(),
        };

        assert!(to_canonical(&wire, "caldav", "/cal/", None).is_err());
    }

    #[test]
    fn all_day_maps_to_the_all_day_variant() {
        let mut wire = sample_wire();
        wire.start = WireTime::Date(NaiveDate::from_ymd_opt(2025, 6, 10).unwrap());
        wire.end = WireTime::Date(NaiveDate::from_ymd_opt(2025, 6, 11).unwrap());

        let event = to_canonical(&wire, "caldav", "/cal/", None).unwrap();
        assert!(event.is_all_day());
    }

    #[test]
    fn inverted_interval_is_rejected() {
        let mut wire = sample_wire();
        wire.end = WireTime::Utc(utc(2025, 6, 10, 9, 0));

        assert!(to_canonical(&wire, "caldav", "/cal/", None).is_err());
    }

    #[test]
    fn batch_skips_bad_events() {
        let good = sample_wire();
        let mut bad = sample_wire();
        bad.uid = "bad@example.com".into();
        bad.end = WireTime::Utc(utc(2025, 6, 10, 9, 0));

        let events = to_canonical_batch(
            &[(good, Some("v1".into())), (bad, None)],
            "caldav",
            "/cal/",
        );

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].uid, "evt-1@example.com");
    }

    #[test]
    fn canonical_to_wire_to_canonical_round_trips() {
        let original = CanonicalEvent::new(
            "roundtrip@example.com",
            "Board sync; Q3, final",
            EventTime::from_utc(utc(2025, 6, 10, 10, 0)),
            EventTime::from_utc(utc(2025, 6, 10, 11, 30)),
            "caldav",
            "/cal/work/",
        )
        .with_description("Agenda:\n1. numbers\n2. hiring")
        .with_attendee(Attendee::new("bob@example.com").with_name("Bob"))
        .with_last_modified(utc(2025, 6, 1, 8, 0));

        let ics = generate_calendar(&from_canonical(&original));
        let parsed = parse_calendar(&ics);
        assert_eq!(parsed.len(), 1);

        let back = to_canonical(&parsed[0], "caldav", "/cal/work/", None).unwrap();

        assert_eq!(back.uid, original.uid);
        assert_eq!(back.title, original.title);
        assert_eq!(back.start, original.start);
        assert_eq!(back.end, original.end);
        assert_eq!(back.description, original.description);
        assert_eq!(back.is_all_day(), original.is_all_day());
    }

    #[test]
    fn all_day_round_trip_stays_all_day() {
        let original = CanonicalEvent::new(
            "offsite@example.com",
            "Offsite",
            EventTime::from_date(NaiveDate::from_ymd_opt(2025, 6, 10).unwrap()),
            EventTime::from_date(NaiveDate::from_ymd_opt(2025, 6, 12).unwrap()),
            "caldav",
            "/cal/work/",
        );

        let ics = generate_calendar(&from_canonical(&original));
        let parsed = parse_calendar(&ics);
        let back = to_canonical(&parsed[0], "caldav", "/cal/work/", None).unwrap();

        assert!(back.is_all_day());
        assert_eq!(back.start, original.start);
        assert_eq!(back.end, original.end);
    }
}
