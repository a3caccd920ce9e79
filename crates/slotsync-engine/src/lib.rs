//! The timeslot engine: availability windows, atomic booking, recurrence
//! expansion, and conflict detection/resolution.
//!
//! [`TimeslotService`] is the upward operation surface; [`conflict`] holds
//! the detector/resolver stack including the enrichment decorator; the
//! in-memory [`store`] implementations stand in for the persistence
//! collaborator.

pub mod appointment;
pub mod collaborators;
pub mod conflict;
pub mod error;
pub mod recurrence;
pub mod service;
pub mod store;
pub mod timeslot;

pub use appointment::{Appointment, AppointmentStatus};
pub use collaborators::{AuditEntry, AuditSink, Notification, Notifier, NoopNotifier, TracingAuditSink};
pub use conflict::{
    BaseConflictEngine, BufferSide, Conflict, ConflictEngine, ConflictKind, ConflictState,
    EnrichedConflictEngine, ItemSource, Resolution, ResolutionAction, ResolutionStrategy,
    ResolverConfig, ScheduleItem, Severity, Suggestion, detect_conflicts,
};
pub use error::{EngineError, EngineResult, ErrorPayload};
pub use recurrence::ExpansionOutcome;
pub use service::{
    BookingRequest, BulkError, BulkOutcome, ListFilter, NewTimeslot, Page, TimeslotService,
    TimeslotUpdate,
};
pub use store::{AppointmentStore, TimeslotStore};
pub use timeslot::{RecurrenceRule, Timeslot, TimeslotStatus};
