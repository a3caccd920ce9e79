//! The upward operation surface of the timeslot engine.
//!
//! Requests and outcomes are structured serde types; every error carries a
//! machine-readable kind. Bulk creation is partial-success: good items go
//! through, bad ones come back in a per-item error list.

use std::sync::Arc;

use chrono::{NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use slotsync_core::{
    AppointmentKind, BufferPreference, BufferTuning, ScheduleContext, calculate_buffer,
};

use crate::appointment::{Appointment, AppointmentStatus};
use crate::collaborators::{AuditEntry, AuditSink, Notification, Notifier, NoopNotifier, TracingAuditSink};
use crate::error::{EngineError, EngineResult, ErrorPayload};
use crate::recurrence::{ExpansionOutcome, instantiate, occurrence_dates};
use crate::store::{AppointmentStore, TimeslotStore};
use crate::timeslot::{RecurrenceRule, Timeslot, TimeslotStatus, validate_interval};

/// Request to create one timeslot.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewTimeslot {
    /// The owning actor.
    pub owner: String,
    /// The date the slot sits on.
    pub date: NaiveDate,
    /// Start time (minute granularity).
    pub start: NaiveTime,
    /// End time (minute granularity).
    pub end: NaiveTime,
    /// The kind of appointment offered.
    #[serde(default)]
    pub kind: AppointmentKind,
    /// Booking capacity.
    pub max_bookings: u32,
    /// Recurrence rule for later expansion.
    #[serde(default)]
    pub recurrence: RecurrenceRule,
}

/// Partial update of a timeslot.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeslotUpdate {
    /// New date.
    pub date: Option<NaiveDate>,
    /// New start time.
    pub start: Option<NaiveTime>,
    /// New end time.
    pub end: Option<NaiveTime>,
    /// New status.
    pub status: Option<TimeslotStatus>,
    /// New capacity.
    pub max_bookings: Option<u32>,
}

impl TimeslotUpdate {
    fn touches_interval(&self) -> bool {
        self.date.is_some() || self.start.is_some() || self.end.is_some()
    }
}

/// Filters for listing timeslots.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListFilter {
    /// The owner whose slots to list.
    pub owner: String,
    /// Earliest date (inclusive).
    pub from: Option<NaiveDate>,
    /// Latest date (inclusive).
    pub to: Option<NaiveDate>,
    /// Status filter.
    pub status: Option<TimeslotStatus>,
    /// Kind filter.
    pub kind: Option<AppointmentKind>,
    /// Pagination offset.
    #[serde(default)]
    pub offset: usize,
    /// Page size; unset means everything.
    pub limit: Option<usize>,
}

/// One page of results.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    /// The page items.
    pub items: Vec<T>,
    /// Total matches before pagination.
    pub total: usize,
    /// The applied offset.
    pub offset: usize,
}

/// Per-item failure in a bulk operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkError {
    /// Index of the failed request.
    pub index: usize,
    /// The structured error.
    pub error: ErrorPayload,
}

/// Partial-success outcome of a bulk create.
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkOutcome {
    /// Successfully created slots.
    pub created: Vec<Timeslot>,
    /// Failures, one per rejected request.
    pub errors: Vec<BulkError>,
}

/// Request to book a timeslot.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingRequest {
    /// The slot to reserve.
    pub timeslot_id: Uuid,
    /// Participant identities.
    #[serde(default)]
    pub participants: Vec<String>,
    /// Free-text purpose.
    pub purpose: Option<String>,
    /// Appointment kind; defaults to the slot's kind.
    pub kind: Option<AppointmentKind>,
    /// Buffer preference; no padding when absent.
    pub buffer: Option<BufferPreference>,
}

/// The timeslot engine service.
pub struct TimeslotService {
    slots: Arc<TimeslotStore>,
    appointments: Arc<AppointmentStore>,
    notifier: Arc<dyn Notifier>,
    audit: Arc<dyn AuditSink>,
    buffer_tuning: BufferTuning,
}

impl TimeslotService {
    /// Creates a service over the given stores with no-op collaborators.
    pub fn new(slots: Arc<TimeslotStore>, appointments: Arc<AppointmentStore>) -> Self {
        Self {
            slots,
            appointments,
            notifier: Arc::new(NoopNotifier),
            audit: Arc::new(TracingAuditSink),
            buffer_tuning: BufferTuning::default(),
        }
    }

    /// Builder: attach a notifier.
    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    /// Builder: attach an audit sink.
    pub fn with_audit(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = audit;
        self
    }

    /// Builder: replace the buffer tuning.
    pub fn with_buffer_tuning(mut self, tuning: BufferTuning) -> Self {
        self.buffer_tuning = tuning;
        self
    }

    /// Creates a timeslot.
    ///
    /// # Errors
    ///
    /// Validation errors for bad intervals or past start times, an overlap
    /// error when a non-cancelled slot of the same owner/date collides.
    pub async fn create(&self, request: NewTimeslot) -> EngineResult<Timeslot> {
        let now = Utc::now();
        let slot = Timeslot::new(
            &request.owner,
            request.date,
            request.start,
            request.end,
            request.kind,
            request.max_bookings,
            now,
        )?
        .with_recurrence(request.recurrence);

        if slot.start_instant() < now {
            return Err(EngineError::validation(
                "start",
                "start must not be in the past",
            ));
        }

        self.check_overlap(&slot, None).await?;

        self.slots.insert(slot.clone()).await;
        self.record(&slot.owner, "timeslot.create", slot.id);
        debug!(timeslot = %slot.id, owner = %slot.owner, "created timeslot");
        Ok(slot)
    }

    /// Creates many timeslots, succeeding item by item.
    pub async fn bulk_create(&self, requests: Vec<NewTimeslot>) -> BulkOutcome {
        let mut outcome = BulkOutcome::default();
        for (index, request) in requests.into_iter().enumerate() {
            match self.create(request).await {
                Ok(slot) => outcome.created.push(slot),
                Err(e) => outcome.errors.push(BulkError {
                    index,
                    error: e.to_payload(),
                }),
            }
        }
        info!(
            created = outcome.created.len(),
            failed = outcome.errors.len(),
            "bulk create finished"
        );
        outcome
    }

    /// Fetches one timeslot.
    pub async fn get(&self, id: Uuid) -> EngineResult<Timeslot> {
        self.slots.get(id).await
    }

    /// Lists an owner's slots with filters and pagination.
    pub async fn list(&self, filter: ListFilter) -> Page<Timeslot> {
        let mut slots = self.slots.by_owner(&filter.owner).await;
        slots.retain(|s| {
            filter.from.is_none_or(|from| s.date >= from)
                && filter.to.is_none_or(|to| s.date <= to)
                && filter.status.is_none_or(|status| s.status == status)
                && filter.kind.is_none_or(|kind| s.kind == kind)
        });
        slots.sort_by_key(|s| (s.date, s.start, s.id));

        let total = slots.len();
        let items: Vec<Timeslot> = slots
            .into_iter()
            .skip(filter.offset)
            .take(filter.limit.unwrap_or(usize::MAX))
            .collect();

        Page {
            items,
            total,
            offset: filter.offset,
        }
    }

    /// Updates a timeslot.
    ///
    /// A booked slot may only transition toward cancellation; its interval
    /// is never edited directly. Interval changes re-run the overlap check
    /// excluding the slot itself.
    pub async fn update(&self, id: Uuid, update: TimeslotUpdate) -> EngineResult<Timeslot> {
        let mut slot = self.slots.get(id).await?;

        if slot.status == TimeslotStatus::Booked
            && (update.touches_interval() || update.max_bookings.is_some())
        {
            return Err(EngineError::invalid_transition(
                "a booked timeslot can only be cancelled",
            ));
        }

        if let Some(status) = update.status {
            if !slot.status.can_transition_to(status) {
                return Err(EngineError::invalid_transition(format!(
                    "cannot move a {:?} timeslot to {:?}",
                    slot.status, status
                )));
            }
            slot.status = status;
        }

        if let Some(max_bookings) = update.max_bookings {
            if max_bookings < slot.current_bookings {
                return Err(EngineError::validation(
                    "max_bookings",
                    "cannot drop below current bookings",
                ));
            }
            if max_bookings == 0 {
                return Err(EngineError::validation(
                    "max_bookings",
                    "must accept at least one booking",
                ));
            }
            slot.max_bookings = max_bookings;
        }

        if update.touches_interval() {
            slot.date = update.date.unwrap_or(slot.date);
            slot.start = update.start.unwrap_or(slot.start);
            slot.end = update.end.unwrap_or(slot.end);
            validate_interval(slot.start, slot.end)?;
            self.check_overlap(&slot, Some(id)).await?;
        }

        self.slots.replace(slot.clone()).await?;
        self.record(&slot.owner, "timeslot.update", slot.id);
        Ok(slot)
    }

    /// Deletes a timeslot. Rejected while booked.
    pub async fn delete(&self, id: Uuid) -> EngineResult<()> {
        let slot = self.slots.get(id).await?;
        if slot.status == TimeslotStatus::Booked {
            return Err(EngineError::invalid_transition(
                "cannot delete a booked timeslot; cancel it first",
            ));
        }
        self.slots.remove(id).await?;
        self.record(&slot.owner, "timeslot.delete", id);
        Ok(())
    }

    /// Books a timeslot into an appointment.
    ///
    /// The reservation is an atomic compare-and-set; a lost race surfaces
    /// as a definitive unavailable error.
    pub async fn book(&self, request: BookingRequest) -> EngineResult<Appointment> {
        let slot = self.slots.reserve(request.timeslot_id).await?;
        let window = slot.window();
        let kind = request.kind.unwrap_or(slot.kind);

        let buffer = request.buffer.as_ref().map(|pref| {
            calculate_buffer(
                &window,
                kind,
                pref,
                &self.buffer_tuning,
                &ScheduleContext::default(),
            )
        });

        let appointment = Appointment {
            id: Uuid::new_v4(),
            timeslot_id: slot.id,
            owner: slot.owner.clone(),
            participants: request.participants,
            purpose: request.purpose,
            kind,
            status: AppointmentStatus::Scheduled,
            start: window.start,
            end: window.end,
            buffer,
            created_at: Utc::now(),
        };
        self.appointments.insert(appointment.clone()).await;

        self.notifier.notify(Notification::SlotBooked {
            timeslot_id: slot.id,
            appointment_id: appointment.id,
            owner: slot.owner.clone(),
        });
        self.record(&slot.owner, "appointment.book", appointment.id);
        info!(timeslot = %slot.id, appointment = %appointment.id, "booked");
        Ok(appointment)
    }

    /// Cancels an appointment and releases its slot.
    pub async fn cancel_booking(&self, appointment_id: Uuid) -> EngineResult<Appointment> {
        let mut appointment = self.appointments.get(appointment_id).await?;
        if !appointment.is_active() {
            return Err(EngineError::invalid_transition(
                "appointment is not active",
            ));
        }

        appointment.status = AppointmentStatus::Cancelled;
        self.appointments.replace(appointment.clone()).await?;
        self.slots.release(appointment.timeslot_id).await?;

        self.notifier.notify(Notification::BookingCancelled {
            appointment_id,
            owner: appointment.owner.clone(),
        });
        self.record(&appointment.owner, "appointment.cancel", appointment_id);
        Ok(appointment)
    }

    /// Fetches one appointment.
    pub async fn get_appointment(&self, id: Uuid) -> EngineResult<Appointment> {
        self.appointments.get(id).await
    }

    /// Expands a recurring slot into bounded instances up to `horizon`.
    ///
    /// Candidates colliding with an existing slot are skipped and counted,
    /// never a batch failure.
    pub async fn expand_recurrence(
        &self,
        parent_id: Uuid,
        horizon: NaiveDate,
    ) -> EngineResult<ExpansionOutcome> {
        let parent = self.slots.get(parent_id).await?;
        let dates = occurrence_dates(&parent.recurrence, parent.date, horizon);

        let mut outcome = ExpansionOutcome::default();
        for date in dates {
            let instance = instantiate(&parent, date);
            match self.check_overlap(&instance, None).await {
                Ok(()) => {
                    self.slots.insert(instance.clone()).await;
                    outcome.created.push(instance);
                }
                Err(EngineError::Overlap { .. }) => outcome.skipped += 1,
                Err(e) => return Err(e),
            }
        }

        info!(
            parent = %parent_id,
            created = outcome.created.len(),
            skipped = outcome.skipped,
            "expanded recurrence"
        );
        self.record(&parent.owner, "timeslot.expand", parent_id);
        Ok(outcome)
    }

    /// Overlap check against the owner's non-cancelled slots on the date.
    async fn check_overlap(&self, slot: &Timeslot, exclude: Option<Uuid>) -> EngineResult<()> {
        let existing = self.slots.active_on(&slot.owner, slot.date).await;
        for other in existing {
            if Some(other.id) == exclude {
                continue;
            }
            if slot.overlaps(&other) {
                return Err(EngineError::overlap(
                    format!(
                        "timeslot {}-{} collides with an existing slot",
                        slot.start, slot.end
                    ),
                    Some(other.id.to_string()),
                ));
            }
        }
        Ok(())
    }

    fn record(&self, actor: &str, action: &'static str, entity: Uuid) {
        self.audit.record(AuditEntry {
            actor: actor.to_string(),
            action,
            entity_id: entity.to_string(),
            at: Utc::now(),
        });
    }
}
