//! iCalendar VEVENT codec.
//!
//! Parsing goes through the `icalendar` crate's raw parser (`unfold` +
//! `read_calendar`); generation writes properties line by line so the
//! output stays under our control. TEXT values are escaped on generation
//! and unescaped on parse per RFC 5545 §3.3.11 (backslash, semicolon,
//! comma, newline), which keeps round-trips exact.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use icalendar::parser::{Component, Property, read_calendar, unfold};
use tracing::warn;

use slotsync_core::{Attendee, EventStatus, ResponseStatus};

/// A date/time value as it appears on the wire.
///
/// All-day events carry a plain date (`VALUE=DATE`); timed events are UTC,
/// floating, or zoned via a `TZID` parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WireTime {
    /// `VALUE=DATE`: a date without a time-of-day component.
    Date(NaiveDate),
    /// A UTC instant (`...Z` suffix).
    Utc(DateTime<Utc>),
    /// A floating local time with no zone attached.
    Floating(NaiveDateTime),
    /// A local time qualified by a `TZID` parameter.
    Zoned {
        /// The local wall-clock time.
        datetime: NaiveDateTime,
        /// The zone identifier from the `TZID` parameter.
        tzid: String,
    },
}

impl WireTime {
    /// True for the `VALUE=DATE` form.
    pub fn is_date(&self) -> bool {
        matches!(self, Self::Date(_))
    }
}

/// One VEVENT, decoded but not yet normalized.
#[derive(Debug, Clone, PartialEq)]
pub struct WireEvent {
    /// The UID property.
    pub uid: String,
    /// The SUMMARY property (falls back to a placeholder when absent).
    pub summary: String,
    /// The DESCRIPTION property.
    pub description: Option<String>,
    /// The LOCATION property.
    pub location: Option<String>,
    /// DTSTART.
    pub start: WireTime,
    /// DTEND.
    pub end: WireTime,
    /// STATUS, defaulting to confirmed.
    pub status: EventStatus,
    /// The raw RRULE value, when the event recurs.
    pub rrule: Option<String>,
    /// ORGANIZER.
    pub organizer: Option<Attendee>,
    /// ATTENDEE properties.
    pub attendees: Vec<Attendee>,
    /// LAST-MODIFIED.
    pub last_modified: Option<DateTime<Utc>>,
}

/// Parses iCalendar content into wire events.
///
/// Malformed VEVENTs (missing UID or DTSTART) are skipped with a warning;
/// one bad component does not poison the rest of the payload.
pub fn parse_calendar(content: &str) -> Vec<WireEvent> {
    let unfolded = unfold(content);
    let calendar = match read_calendar(&unfolded) {
        Ok(cal) => cal,
        Err(e) => {
            warn!(error = %e, "failed to parse iCalendar payload");
            return Vec::new();
        }
    };

    calendar
        .components
        .iter()
        .filter(|c| c.name == "VEVENT")
        .filter_map(|vevent| {
            let parsed = parse_vevent(vevent);
            if parsed.is_none() {
                warn!("skipping VEVENT without UID or DTSTART");
            }
            parsed
        })
        .collect()
}

fn parse_vevent(vevent: &Component<'_>) -> Option<WireEvent> {
    let uid = vevent.find_prop("UID")?.val.to_string();
    let start = parse_time_prop(vevent.find_prop("DTSTART")?)?;
    // DTEND is optional on the wire; a missing end means a zero-length
    // event at the start boundary.
    let end = vevent
        .find_prop("DTEND")
        .and_then(parse_time_prop)
        .unwrap_or_else(|| start.clone());

    let summary = vevent
        .find_prop("SUMMARY")
        .map(|p| unescape_text(p.val.as_ref()))
        .unwrap_or_else(|| "(no title)".to_string());
    let description = vevent
        .find_prop("DESCRIPTION")
        .map(|p| unescape_text(p.val.as_ref()));
    let location = vevent
        .find_prop("LOCATION")
        .map(|p| unescape_text(p.val.as_ref()));

    let status = vevent
        .find_prop("STATUS")
        .map(|p| match p.val.as_ref() {
            "TENTATIVE" => EventStatus::Tentative,
            "CANCELLED" => EventStatus::Cancelled,
            _ => EventStatus::Confirmed,
        })
        .unwrap_or_default();

    let rrule = vevent.find_prop("RRULE").map(|p| p.val.to_string());

    let organizer = vevent.find_prop("ORGANIZER").map(parse_participant);
    let attendees = vevent
        .properties
        .iter()
        .filter(|p| p.name == "ATTENDEE")
        .map(parse_participant)
        .collect();

    let last_modified = vevent
        .find_prop("LAST-MODIFIED")
        .and_then(|p| parse_utc_stamp(p.val.as_ref()));

    Some(WireEvent {
        uid,
        summary,
        description,
        location,
        start,
        end,
        status,
        rrule,
        organizer,
        attendees,
        last_modified,
    })
}

/// Parses a DTSTART/DTEND property, honoring `VALUE=DATE` and `TZID`.
fn parse_time_prop(prop: &Property<'_>) -> Option<WireTime> {
    let value = prop.val.as_ref().trim();

    let is_date = prop
        .params
        .iter()
        .any(|p| p.key == "VALUE" && p.val.as_ref().map(|v| v.as_ref()) == Some("DATE"));
    if is_date || (value.len() == 8 && value.chars().all(|c| c.is_ascii_digit())) {
        let date = NaiveDate::parse_from_str(value, "%Y%m%d").ok()?;
        return Some(WireTime::Date(date));
    }

    let tzid = prop
        .params
        .iter()
        .find(|p| p.key == "TZID")
        .and_then(|p| p.val.as_ref().map(|v| v.to_string()));

    if let Some(tzid) = tzid {
        let datetime = NaiveDateTime::parse_from_str(value, "%Y%m%dT%H%M%S").ok()?;
        return Some(WireTime::Zoned { datetime, tzid });
    }

    if let Some(stripped) = value.strip_suffix('Z') {
        let naive = NaiveDateTime::parse_from_str(stripped, "%Y%m%dT%H%M%S").ok()?;
        return Some(WireTime::Utc(naive.and_utc()));
    }

    NaiveDateTime::parse_from_str(value, "%Y%m%dT%H%M%S")
        .ok()
        .map(WireTime::Floating)
}

/// Parses an ATTENDEE/ORGANIZER property into an [`Attendee`].
fn parse_participant(prop: &Property<'_>) -> Attendee {
    let email = prop
        .val
        .as_ref()
        .strip_prefix("mailto:")
        .unwrap_or(prop.val.as_ref())
        .to_string();

    let name = prop
        .params
        .iter()
        .find(|p| p.key == "CN")
        .and_then(|p| p.val.as_ref().map(|v| v.as_str().trim_matches('"').to_string()));

    let response = prop
        .params
        .iter()
        .find(|p| p.key == "PARTSTAT")
        .and_then(|p| p.val.as_ref())
        .map(|v| match v.as_ref() {
            "ACCEPTED" => ResponseStatus::Accepted,
            "DECLINED" => ResponseStatus::Declined,
            "TENTATIVE" => ResponseStatus::Tentative,
            "NEEDS-ACTION" => ResponseStatus::NeedsAction,
            _ => ResponseStatus::Unknown,
        })
        .unwrap_or_default();

    let mut attendee = Attendee::new(email).with_response(response);
    if let Some(name) = name {
        attendee = attendee.with_name(name);
    }
    attendee
}

fn parse_utc_stamp(value: &str) -> Option<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(value.trim_end_matches('Z'), "%Y%m%dT%H%M%S")
        .ok()
        .map(|dt| dt.and_utc())
}

/// Generates a complete VCALENDAR wrapping one VEVENT.
pub fn generate_calendar(event: &WireEvent) -> String {
    let mut lines: Vec<String> = vec![
        "BEGIN:VCALENDAR".into(),
        "VERSION:2.0".into(),
        "PRODID:-//slotsync//calendar sync//EN".into(),
        "BEGIN:VEVENT".into(),
    ];

    lines.push(format!("UID:{}", event.uid));

    // DTSTAMP is mandatory; the last-modified instant keeps generation
    // deterministic, falling back to the start boundary.
    let dtstamp = event.last_modified.unwrap_or_else(|| match &event.start {
        WireTime::Utc(dt) => *dt,
        WireTime::Date(d) => d.and_hms_opt(0, 0, 0).expect("valid time").and_utc(),
        WireTime::Floating(dt) | WireTime::Zoned { datetime: dt, .. } => dt.and_utc(),
    });
    lines.push(format!("DTSTAMP:{}", format_utc(dtstamp)));

    if let Some(modified) = event.last_modified {
        lines.push(format!("LAST-MODIFIED:{}", format_utc(modified)));
    }

    lines.push(time_property("DTSTART", &event.start));
    lines.push(time_property("DTEND", &event.end));

    lines.push(format!("SUMMARY:{}", escape_text(&event.summary)));
    if let Some(ref description) = event.description {
        lines.push(format!("DESCRIPTION:{}", escape_text(description)));
    }
    if let Some(ref location) = event.location {
        lines.push(format!("LOCATION:{}", escape_text(location)));
    }

    // CONFIRMED is the implied default.
    match event.status {
        EventStatus::Confirmed => {}
        EventStatus::Tentative => lines.push("STATUS:TENTATIVE".into()),
        EventStatus::Cancelled => lines.push("STATUS:CANCELLED".into()),
    }

    if let Some(ref rrule) = event.rrule {
        lines.push(format!("RRULE:{}", rrule));
    }

    if let Some(ref organizer) = event.organizer {
        lines.push(participant_property("ORGANIZER", organizer));
    }
    for attendee in &event.attendees {
        lines.push(participant_property("ATTENDEE", attendee));
    }

    lines.push("END:VEVENT".into());
    lines.push("END:VCALENDAR".into());

    let mut out = String::new();
    for line in lines {
        out.push_str(&fold_line(&line));
        out.push_str("\r\n");
    }
    out
}

fn time_property(name: &str, time: &WireTime) -> String {
    match time {
        WireTime::Date(d) => format!("{};VALUE=DATE:{}", name, d.format("%Y%m%d")),
        WireTime::Utc(dt) => format!("{}:{}", name, format_utc(*dt)),
        WireTime::Floating(dt) => format!("{}:{}", name, dt.format("%Y%m%dT%H%M%S")),
        WireTime::Zoned { datetime, tzid } => {
            format!("{};TZID={}:{}", name, tzid, datetime.format("%Y%m%dT%H%M%S"))
        }
    }
}

fn participant_property(name: &str, attendee: &Attendee) -> String {
    let mut line = name.to_string();
    if let Some(ref cn) = attendee.name {
        line.push_str(";CN=");
        line.push_str(&param_value(cn));
    }
    let partstat = match attendee.response {
        ResponseStatus::Accepted => Some("ACCEPTED"),
        ResponseStatus::Declined => Some("DECLINED"),
        ResponseStatus::Tentative => Some("TENTATIVE"),
        ResponseStatus::NeedsAction => Some("NEEDS-ACTION"),
        ResponseStatus::Unknown => None,
    };
    if let Some(partstat) = partstat {
        line.push_str(";PARTSTAT=");
        line.push_str(partstat);
    }
    line.push_str(":mailto:");
    line.push_str(&attendee.email);
    line
}

/// Quotes a parameter value when it contains reserved characters.
fn param_value(value: &str) -> String {
    if value.contains([':', ';', ',']) {
        format!("\"{}\"", value)
    } else {
        value.to_string()
    }
}

fn format_utc(dt: DateTime<Utc>) -> String {
    dt.format("%Y%m%dT%H%M%SZ").to_string()
}

/// Escapes a TEXT value per RFC 5545 §3.3.11.
pub fn escape_text(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            ';' => out.push_str("\\;"),
            ',' => out.push_str("\\,"),
            '\n' => out.push_str("\\n"),
            '\r' => {}
            _ => out.push(c),
        }
    }
    out
}

/// Unescapes a TEXT value per RFC 5545 §3.3.11.
pub fn unescape_text(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut chars = input.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') | Some('N') => out.push('\n'),
            Some('\\') => out.push('\\'),
            Some(';') => out.push(';'),
            Some(',') => out.push(','),
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    out
}

/// Folds a content line at 75 octets with CRLF + space continuations.
fn fold_line(line: &str) -> String {
    const LIMIT: usize = 75;
    if line.len() <= LIMIT {
        return line.to_string();
    }

    let mut out = String::with_capacity(line.len() + line.len() / LIMIT * 3);
    let mut budget = LIMIT;
    for c in line.chars() {
        if c.len_utf8() > budget {
            out.push_str("\r\n ");
            // Continuation lines lose one octet to the leading space.
            budget = LIMIT - 1;
        }
        out.push(c);
        budget -= c.len_utf8();
    }
    out
}
