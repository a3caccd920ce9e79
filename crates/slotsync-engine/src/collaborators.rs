//! Narrow interfaces to external collaborators.
//!
//! Notification delivery and audit logging live outside this engine; the
//! service talks to them through fire-and-forget traits. Failures on the
//! other side never affect engine operations.

use chrono::{DateTime, Utc};
use uuid::Uuid;

/// A schedule change worth telling participants about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    /// A slot was booked into an appointment.
    SlotBooked {
        /// The booked timeslot.
        timeslot_id: Uuid,
        /// The created appointment.
        appointment_id: Uuid,
        /// The slot owner.
        owner: String,
    },
    /// An appointment was cancelled and its slot released.
    BookingCancelled {
        /// The cancelled appointment.
        appointment_id: Uuid,
        /// The slot owner.
        owner: String,
    },
    /// A scheduling conflict was detected.
    ConflictDetected {
        /// The conflict id.
        conflict_id: Uuid,
        /// The affected owner.
        owner: String,
    },
}

/// Fire-and-forget notification dispatcher.
pub trait Notifier: Send + Sync {
    /// Dispatches a notification. Must not block or fail the caller.
    fn notify(&self, notification: Notification);
}

/// One audit record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditEntry {
    /// The acting identity.
    pub actor: String,
    /// The operation name.
    pub action: &'static str,
    /// The affected entity id.
    pub entity_id: String,
    /// When it happened.
    pub at: DateTime<Utc>,
}

/// Fire-and-forget audit logger.
pub trait AuditSink: Send + Sync {
    /// Records an entry. Must not block or fail the caller.
    fn record(&self, entry: AuditEntry);
}

/// A notifier that drops everything.
#[derive(Debug, Default)]
pub struct NoopNotifier;

impl Notifier for NoopNotifier {
    fn notify(&self, _notification: Notification) {}
}

/// An audit sink that only traces.
#[derive(Debug, Default)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn record(&self, entry: AuditEntry) {
        tracing::info!(
            actor = %entry.actor,
            action = entry.action,
            entity = %entry.entity_id,
            "audit"
        );
    }
}
