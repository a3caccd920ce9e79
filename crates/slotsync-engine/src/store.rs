//! In-memory stores for timeslots and appointments.
//!
//! These are the engine's implementation of the persistence collaborator:
//! explicit, passed-in values with no global state, safe for concurrent
//! use. The booking reservation is a compare-and-set executed entirely
//! under the store lock, so the losing side of a race gets a definitive
//! unavailable error and never a double-booked slot.

use std::collections::HashMap;

use chrono::NaiveDate;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use crate::appointment::Appointment;
use crate::error::{EngineError, EngineResult};
use crate::timeslot::{Timeslot, TimeslotStatus};

/// Keyed in-memory timeslot store.
#[derive(Default)]
pub struct TimeslotStore {
    slots: RwLock<HashMap<Uuid, Timeslot>>,
}

impl TimeslotStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a slot.
    pub async fn insert(&self, slot: Timeslot) {
        let mut slots = self.slots.write().await;
        slots.insert(slot.id, slot);
    }

    /// Fetches a slot by id.
    pub async fn get(&self, id: Uuid) -> EngineResult<Timeslot> {
        let slots = self.slots.read().await;
        slots
            .get(&id)
            .cloned()
            .ok_or_else(|| EngineError::not_found("timeslot", id))
    }

    /// Returns every slot of an owner, unsorted.
    pub async fn by_owner(&self, owner: &str) -> Vec<Timeslot> {
        let slots = self.slots.read().await;
        slots.values().filter(|s| s.owner == owner).cloned().collect()
    }

    /// Returns the non-cancelled slots of an owner on a date, used for
    /// overlap checks.
    pub async fn active_on(&self, owner: &str, date: NaiveDate) -> Vec<Timeslot> {
        let slots = self.slots.read().await;
        slots
            .values()
            .filter(|s| s.owner == owner && s.date == date && s.is_active())
            .cloned()
            .collect()
    }

    /// Replaces a slot wholesale. The caller has already validated the
    /// transition.
    pub async fn replace(&self, slot: Timeslot) -> EngineResult<()> {
        let mut slots = self.slots.write().await;
        match slots.get_mut(&slot.id) {
            Some(existing) => {
                *existing = slot;
                Ok(())
            }
            None => Err(EngineError::not_found("timeslot", slot.id)),
        }
    }

    /// Removes a slot.
    pub async fn remove(&self, id: Uuid) -> EngineResult<Timeslot> {
        let mut slots = self.slots.write().await;
        slots
            .remove(&id)
            .ok_or_else(|| EngineError::not_found("timeslot", id))
    }

    /// Atomically reserves one booking on a slot.
    ///
    /// The compare-and-set condition is
    /// `status == Available && current_bookings < max_bookings`, evaluated
    /// and applied under the write lock. A slot that fills up flips to
    /// `Booked` in the same step.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Unavailable`] when the condition does not
    /// hold - including when a concurrent caller won the last seat.
    pub async fn reserve(&self, id: Uuid) -> EngineResult<Timeslot> {
        let mut slots = self.slots.write().await;
        let slot = slots
            .get_mut(&id)
            .ok_or_else(|| EngineError::not_found("timeslot", id))?;

        if !slot.can_book() {
            return Err(EngineError::unavailable(
                "timeslot is not available for booking",
            ));
        }

        slot.current_bookings += 1;
        if slot.current_bookings >= slot.max_bookings {
            slot.status = TimeslotStatus::Booked;
        }
        debug!(
            timeslot = %id,
            bookings = slot.current_bookings,
            max = slot.max_bookings,
            "reserved booking"
        );
        Ok(slot.clone())
    }

    /// Releases one booking, reopening a fully booked slot.
    pub async fn release(&self, id: Uuid) -> EngineResult<Timeslot> {
        let mut slots = self.slots.write().await;
        let slot = slots
            .get_mut(&id)
            .ok_or_else(|| EngineError::not_found("timeslot", id))?;

        if slot.current_bookings == 0 {
            return Err(EngineError::invalid_transition(
                "timeslot has no bookings to release",
            ));
        }

        slot.current_bookings -= 1;
        if slot.status == TimeslotStatus::Booked {
            slot.status = TimeslotStatus::Available;
        }
        Ok(slot.clone())
    }

    /// Number of stored slots.
    pub async fn len(&self) -> usize {
        self.slots.read().await.len()
    }

    /// True when the store is empty.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

/// Keyed in-memory appointment store.
#[derive(Default)]
pub struct AppointmentStore {
    appointments: RwLock<HashMap<Uuid, Appointment>>,
}

impl AppointmentStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts an appointment.
    pub async fn insert(&self, appointment: Appointment) {
        let mut appointments = self.appointments.write().await;
        appointments.insert(appointment.id, appointment);
    }

    /// Fetches an appointment by id.
    pub async fn get(&self, id: Uuid) -> EngineResult<Appointment> {
        let appointments = self.appointments.read().await;
        appointments
            .get(&id)
            .cloned()
            .ok_or_else(|| EngineError::not_found("appointment", id))
    }

    /// Returns every appointment of an owner.
    pub async fn by_owner(&self, owner: &str) -> Vec<Appointment> {
        let appointments = self.appointments.read().await;
        appointments
            .values()
            .filter(|a| a.owner == owner)
            .cloned()
            .collect()
    }

    /// Replaces an appointment wholesale.
    pub async fn replace(&self, appointment: Appointment) -> EngineResult<()> {
        let mut appointments = self.appointments.write().await;
        match appointments.get_mut(&appointment.id) {
            Some(existing) => {
                *existing = appointment;
                Ok(())
            }
            None => Err(EngineError::not_found("appointment", appointment.id)),
        }
    }
}
