//! Core types: time, canonical events, timezone service, buffer calculator

pub mod buffer;
pub mod error;
pub mod event;
pub mod time;
pub mod timezone;
pub mod tracing;

pub use buffer::{
    BufferPreference, BufferStrategy, BufferTuning, BufferWindow, ScheduleContext, calculate_buffer,
};
pub use error::{TimezoneError, ValidationError};
pub use event::{
    AppointmentKind, Attendee, CanonicalEvent, EventStatus, ResponseStatus,
};
pub use time::{EventTime, TimeWindow};
pub use timezone::{ZoneGuess, ZoneSignals, detect_zone, expand_local_occurrences, from_utc, parse_zone, to_utc};
pub use tracing::{TracingConfig, TracingError, TracingOutputFormat, init_tracing};
