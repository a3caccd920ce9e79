//! XML bodies and parsers for the WebDAV/CalDAV wire protocol.
//!
//! Request bodies cover the discovery handshake (current-user-principal,
//! calendar-home-set, calendar listing), the full-sync calendar-query and
//! the incremental sync-collection report. Parsers walk the multistatus
//! responses, extracting hrefs, etags, calendar data, 404 removals and the
//! next sync token.

use quick_xml::Writer;
use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};

use chrono::{DateTime, Utc};
use std::io::Cursor;

/// DAV namespace.
pub const DAV_NS: &str = "DAV:";
/// CalDAV namespace.
pub const CALDAV_NS: &str = "urn:ietf:params:xml:ns:caldav";

/// A calendar collection as reported by PROPFIND.
#[derive(Debug, Clone)]
pub struct DiscoveredCalendar {
    /// The calendar's href (path).
    pub href: String,
    /// The display name.
    pub display_name: Option<String>,
    /// Whether the current user holds the write privilege.
    pub can_write: bool,
    /// Whether the collection advertises the sync-collection report.
    pub supports_sync_token: bool,
}

/// One entity from a REPORT response.
#[derive(Debug, Clone)]
pub struct EventEntry {
    /// The entity's href.
    pub href: String,
    /// The entity's etag, quotes stripped.
    pub etag: Option<String>,
    /// The iCalendar payload.
    pub data: String,
}

/// A parsed multistatus REPORT response.
#[derive(Debug, Default)]
pub struct ReportOutcome {
    /// Entities present with calendar data.
    pub entries: Vec<EventEntry>,
    /// Hrefs reported 404 (removed since the sync token was issued).
    pub removed: Vec<String>,
    /// The next sync token (sync-collection responses only).
    pub sync_token: Option<String>,
}

/// PROPFIND body asking for the current user's principal URL.
pub fn propfind_principal_body() -> String {
    propfind_body(&["d:current-user-principal"])
}

/// PROPFIND body asking a principal for its calendar-home-set.
pub fn propfind_calendar_home_body() -> String {
    propfind_body(&["c:calendar-home-set"])
}

/// PROPFIND body for listing calendars with the properties sync needs:
/// display name, resource type, write privilege and supported reports.
pub fn propfind_calendars_body() -> String {
    propfind_body(&[
        "d:displayname",
        "d:resourcetype",
        "d:current-user-privilege-set",
        "d:supported-report-set",
    ])
}

/// PROPFIND body asking a collection for its current sync token.
pub fn propfind_sync_token_body() -> String {
    propfind_body(&["d:sync-token"])
}

fn propfind_body(props: &[&str]) -> String {
    let mut writer = Writer::new(Cursor::new(Vec::new()));

    let mut propfind = BytesStart::new("d:propfind");
    propfind.push_attribute(("xmlns:d", DAV_NS));
    propfind.push_attribute(("xmlns:c", CALDAV_NS));
    writer.write_event(Event::Start(propfind)).unwrap();

    writer
        .write_event(Event::Start(BytesStart::new("d:prop")))
        .unwrap();
    for prop in props {
        write_empty_element(&mut writer, prop);
    }
    writer
        .write_event(Event::End(BytesEnd::new("d:prop")))
        .unwrap();

    writer
        .write_event(Event::End(BytesEnd::new("d:propfind")))
        .unwrap();

    into_string(writer)
}

/// REPORT body for a bounded full query over VEVENTs in a time range.
pub fn calendar_query_body(start: DateTime<Utc>, end: DateTime<Utc>) -> String {
    let mut writer = Writer::new(Cursor::new(Vec::new()));

    let mut query = BytesStart::new("c:calendar-query");
    query.push_attribute(("xmlns:d", DAV_NS));
    query.push_attribute(("xmlns:c", CALDAV_NS));
    writer.write_event(Event::Start(query)).unwrap();

    writer
        .write_event(Event::Start(BytesStart::new("d:prop")))
        .unwrap();
    write_empty_element(&mut writer, "d:getetag");
    write_empty_element(&mut writer, "c:calendar-data");
    writer
        .write_event(Event::End(BytesEnd::new("d:prop")))
        .unwrap();

    writer
        .write_event(Event::Start(BytesStart::new("c:filter")))
        .unwrap();

    let mut vcal_filter = BytesStart::new("c:comp-filter");
    vcal_filter.push_attribute(("name", "VCALENDAR"));
    writer.write_event(Event::Start(vcal_filter)).unwrap();

    let mut vevent_filter = BytesStart::new("c:comp-filter");
    vevent_filter.push_attribute(("name", "VEVENT"));
    writer.write_event(Event::Start(vevent_filter)).unwrap();

    let mut time_range = BytesStart::new("c:time-range");
    time_range.push_attribute(("start", format_caldav_datetime(start).as_str()));
    time_range.push_attribute(("end", format_caldav_datetime(end).as_str()));
    writer.write_event(Event::Empty(time_range)).unwrap();

    writer
        .write_event(Event::End(BytesEnd::new("c:comp-filter")))
        .unwrap();
    writer
        .write_event(Event::End(BytesEnd::new("c:comp-filter")))
        .unwrap();
    writer
        .write_event(Event::End(BytesEnd::new("c:filter")))
        .unwrap();
    writer
        .write_event(Event::End(BytesEnd::new("c:calendar-query")))
        .unwrap();

    into_string(writer)
}

/// REPORT body for an incremental sync-collection query from a token.
pub fn sync_collection_body(token: &str) -> String {
    let mut writer = Writer::new(Cursor::new(Vec::new()));

    let mut sync = BytesStart::new("d:sync-collection");
    sync.push_attribute(("xmlns:d", DAV_NS));
    sync.push_attribute(("xmlns:c", CALDAV_NS));
    writer.write_event(Event::Start(sync)).unwrap();

    writer
        .write_event(Event::Start(BytesStart::new("d:sync-token")))
        .unwrap();
    writer
        .write_event(Event::Text(BytesText::new(token)))
        .unwrap();
    writer
        .write_event(Event::End(BytesEnd::new("d:sync-token")))
        .unwrap();

    writer
        .write_event(Event::Start(BytesStart::new("d:sync-level")))
        .unwrap();
    writer.write_event(Event::Text(BytesText::new("1"))).unwrap();
    writer
        .write_event(Event::End(BytesEnd::new("d:sync-level")))
        .unwrap();

    writer
        .write_event(Event::Start(BytesStart::new("d:prop")))
        .unwrap();
    write_empty_element(&mut writer, "d:getetag");
    write_empty_element(&mut writer, "c:calendar-data");
    writer
        .write_event(Event::End(BytesEnd::new("d:prop")))
        .unwrap();

    writer
        .write_event(Event::End(BytesEnd::new("d:sync-collection")))
        .unwrap();

    into_string(writer)
}

/// Extracts the current-user-principal href from a PROPFIND response.
pub fn parse_principal_href(xml: &str) -> Option<String> {
    parse_nested_href(xml, "current-user-principal")
}

/// Extracts the calendar-home-set href from a PROPFIND response.
pub fn parse_calendar_home_href(xml: &str) -> Option<String> {
    parse_nested_href(xml, "calendar-home-set")
}

/// Extracts the sync-token property from a collection PROPFIND response.
pub fn parse_collection_sync_token(xml: &str) -> Option<String> {
    let mut reader = quick_xml::Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut in_token = false;
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).to_string();
                if local_name(&name) == "sync-token" {
                    in_token = true;
                }
            }
            Ok(Event::End(_)) => in_token = false,
            Ok(Event::Text(e)) if in_token => {
                return Some(e.unescape().unwrap_or_default().to_string());
            }
            Ok(Event::Eof) => break,
            Err(_) => break,
            _ => {}
        }
        buf.clear();
    }

    None
}

/// Finds the first href nested inside the named property element.
fn parse_nested_href(xml: &str, container: &str) -> Option<String> {
    let mut reader = quick_xml::Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut in_container = false;
    let mut in_href = false;
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).to_string();
                match local_name(&name) {
                    l if l == container => in_container = true,
                    "href" if in_container => in_href = true,
                    _ => {}
                }
            }
            Ok(Event::End(e)) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).to_string();
                match local_name(&name) {
                    l if l == container => in_container = false,
                    "href" => in_href = false,
                    _ => {}
                }
            }
            Ok(Event::Text(e)) if in_href => {
                return Some(e.unescape().unwrap_or_default().to_string());
            }
            Ok(Event::Eof) => break,
            Err(_) => break,
            _ => {}
        }
        buf.clear();
    }

    None
}

/// Parses a calendar-listing PROPFIND response.
///
/// Only collections whose resourcetype includes `calendar` are returned.
pub fn parse_calendars_response(xml: &str) -> Vec<DiscoveredCalendar> {
    let mut calendars = Vec::new();

    let mut reader = quick_xml::Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut current_href: Option<String> = None;
    let mut current_displayname: Option<String> = None;
    let mut is_calendar = false;
    let mut can_write = false;
    let mut supports_sync = false;
    let mut in_privilege_set = false;
    let mut in_report_set = false;
    let mut current_element: Option<String> = None;
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).to_string();
                match local_name(&name) {
                    "response" => {
                        current_href = None;
                        current_displayname = None;
                        is_calendar = false;
                        can_write = false;
                        supports_sync = false;
                    }
                    "href" | "displayname" => {
                        current_element = Some(local_name(&name).to_string());
                    }
                    "calendar" if !in_report_set => is_calendar = true,
                    "current-user-privilege-set" => in_privilege_set = true,
                    "supported-report-set" => in_report_set = true,
                    "write" | "all" if in_privilege_set => can_write = true,
                    "sync-collection" if in_report_set => supports_sync = true,
                    _ => {}
                }
            }
            Ok(Event::End(e)) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).to_string();
                match local_name(&name) {
                    "response" => {
                        if is_calendar && let Some(href) = current_href.take() {
                            calendars.push(DiscoveredCalendar {
                                href,
                                display_name: current_displayname.take(),
                                can_write,
                                supports_sync_token: supports_sync,
                            });
                        }
                    }
                    "current-user-privilege-set" => in_privilege_set = false,
                    "supported-report-set" => in_report_set = false,
                    _ => {}
                }
                current_element = None;
            }
            Ok(Event::Text(e)) => {
                if let Some(ref elem) = current_element {
                    let text = e.unescape().unwrap_or_default().to_string();
                    match elem.as_str() {
                        // The first href in a response names the collection;
                        // later hrefs belong to nested properties.
                        "href" => {
                            if current_href.is_none() {
                                current_href = Some(text);
                            }
                        }
                        "displayname" => current_displayname = Some(text),
                        _ => {}
                    }
                }
            }
            Ok(Event::Eof) => break,
            Err(_) => break,
            _ => {}
        }
        buf.clear();
    }

    calendars
}

/// Parses a REPORT multistatus response (calendar-query or sync-collection).
///
/// Responses carrying calendar data become [`EventEntry`] values; responses
/// with a 404 status are removals; a top-level sync-token is captured when
/// present.
pub fn parse_report_response(xml: &str) -> ReportOutcome {
    let mut outcome = ReportOutcome::default();

    let mut reader = quick_xml::Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut current_href: Option<String> = None;
    let mut current_etag: Option<String> = None;
    let mut current_data: Option<String> = None;
    let mut current_gone = false;
    let mut in_response = false;
    let mut current_element: Option<String> = None;
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).to_string();
                match local_name(&name) {
                    "response" => {
                        in_response = true;
                        current_href = None;
                        current_etag = None;
                        current_data = None;
                        current_gone = false;
                    }
                    "href" | "getetag" | "calendar-data" | "status" | "sync-token" => {
                        current_element = Some(local_name(&name).to_string());
                    }
                    _ => {}
                }
            }
            Ok(Event::End(e)) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).to_string();
                if local_name(&name) == "response" && in_response {
                    if let Some(href) = current_href.take() {
                        // A 404 propstat may sit next to a 200 one for a
                        // missing property; data present means not removed.
                        if let Some(data) = current_data.take() {
                            outcome.entries.push(EventEntry {
                                href,
                                etag: current_etag.take(),
                                data,
                            });
                        } else if current_gone {
                            outcome.removed.push(href);
                        }
                    }
                    in_response = false;
                }
                current_element = None;
            }
            Ok(Event::Text(e)) => {
                let text = e.unescape().unwrap_or_default().to_string();
                record_report_text(
                    &current_element,
                    in_response,
                    text,
                    &mut current_href,
                    &mut current_etag,
                    &mut current_data,
                    &mut current_gone,
                    &mut outcome.sync_token,
                );
            }
            Ok(Event::CData(e)) => {
                let text = String::from_utf8_lossy(&e).to_string();
                record_report_text(
                    &current_element,
                    in_response,
                    text,
                    &mut current_href,
                    &mut current_etag,
                    &mut current_data,
                    &mut current_gone,
                    &mut outcome.sync_token,
                );
            }
            Ok(Event::Eof) => break,
            Err(_) => break,
            _ => {}
        }
        buf.clear();
    }

    outcome
}

#[allow(clippy::too_many_arguments)]
fn record_report_text(
    current_element: &Option<String>,
    in_response: bool,
    text: String,
    href: &mut Option<String>,
    etag: &mut Option<String>,
    data: &mut Option<String>,
    gone: &mut bool,
    sync_token: &mut Option<String>,
) {
    let Some(elem) = current_element.as_deref() else {
        return;
    };
    match elem {
        "href" if in_response => *href = Some(text),
        "getetag" => *etag = Some(text.trim_matches('"').to_string()),
        "calendar-data" => *data = Some(text),
        "status" => {
            if text.contains("404") {
                *gone = true;
            }
        }
        // The collection-level token sits outside any response element.
        "sync-token" if !in_response => *sync_token = Some(text),
        _ => {}
    }
}

/// Helper to write an empty XML element.
fn write_empty_element(writer: &mut Writer<Cursor<Vec<u8>>>, name: &str) {
    writer
        .write_event(Event::Empty(BytesStart::new(name)))
        .unwrap();
}

fn into_string(writer: Writer<Cursor<Vec<u8>>>) -> String {
    String::from_utf8(writer.into_inner().into_inner()).unwrap()
}

/// Extracts the local name from a potentially namespaced element name.
fn local_name(name: &str) -> &str {
    name.rsplit(':').next().unwrap_or(name)
}

/// Formats a datetime for CalDAV time-range filters (UTC basic format).
fn format_caldav_datetime(dt: DateTime<Utc>) -> String {
    dt.format("%Y%m%dT%H%M%SZ").to_string()
}
