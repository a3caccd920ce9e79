//! CalDAV calendar provider.
//!
//! Implements [`CalendarProvider`](crate::provider::CalendarProvider)
//! against CalDAV servers:
//!
//! - HTTP Basic and Digest authentication
//! - discovery handshake (well-known resource, principal, calendar home)
//!   with a capability profile table for recognized hosts
//! - calendar-query full listings and sync-collection incremental listings
//! - etag-guarded PUT/DELETE writes
//! - iCalendar codec with exact TEXT escaping round-trips

pub mod auth;
pub mod client;
pub mod config;
pub mod ics;
pub mod provider;
pub mod xml;

pub use config::CalDavConfig;
pub use provider::{CalDavProvider, ServerProfile, detect_profile};
