//! Conflict detection and resolution.
//!
//! Appointments, synced events and timeslots are flattened into
//! [`ScheduleItem`]s, scanned pairwise per owner by the detector, and fed
//! to a resolution strategy. The enriched engine decorates the base one
//! with travel analysis and preference prediction; enrichment failures
//! degrade the result, they never fail detection.
//!
//! A conflict moves Detected → Suggested → {Resolved, Dismissed}.

pub mod alternatives;
pub mod detector;
pub mod resolver;

pub use alternatives::{BusinessHours, ScoredSlot, SlotSearchConfig, find_alternative_slots};
pub use detector::{detect_conflicts, detect_travel_conflicts};
pub use resolver::{
    BaseConflictEngine, ConflictEngine, EnrichedConflictEngine, EnrichmentError,
    PredictedPreference, PreferencePredictor, Resolution, ResolutionAction, ResolutionStrategy,
    ResolverConfig, TravelEstimator,
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use slotsync_core::{AppointmentKind, BufferWindow, CanonicalEvent, TimeWindow};

use crate::appointment::Appointment;
use crate::error::{EngineError, EngineResult};

/// Where a schedule item originated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemSource {
    /// A locally booked appointment.
    Appointment,
    /// An event pulled from a remote calendar.
    SyncedEvent,
}

/// A schedule entry in the unified form the detector scans.
#[derive(Debug, Clone, PartialEq)]
pub struct ScheduleItem {
    /// Stable identifier (appointment id or event uid).
    pub id: String,
    /// The owning calendar.
    pub owner: String,
    /// The core interval.
    pub window: TimeWindow,
    /// The computed padding, when one applies.
    pub buffer: Option<BufferWindow>,
    /// Appointment kind.
    pub kind: AppointmentKind,
    /// Origin of the item.
    pub source: ItemSource,
    /// Location text, used by travel analysis.
    pub location: Option<String>,
    /// Cancelled items never conflict.
    pub cancelled: bool,
    /// Creation instant for deterministic precedence.
    pub created_at: DateTime<Utc>,
}

impl ScheduleItem {
    /// Builds an item from an appointment.
    pub fn from_appointment(appointment: &Appointment) -> Self {
        Self {
            id: appointment.id.to_string(),
            owner: appointment.owner.clone(),
            window: appointment.window(),
            buffer: appointment.buffer.clone(),
            kind: appointment.kind,
            source: ItemSource::Appointment,
            location: None,
            cancelled: !appointment.is_active(),
            created_at: appointment.created_at,
        }
    }

    /// Builds an item from a synced canonical event.
    pub fn from_event(event: &CanonicalEvent) -> Self {
        Self {
            id: event.uid.clone(),
            owner: event.calendar_id.clone(),
            window: event.window(),
            buffer: None,
            kind: AppointmentKind::General,
            source: ItemSource::SyncedEvent,
            location: event.location.clone(),
            cancelled: event.is_cancelled(),
            created_at: event.last_modified.unwrap_or(event.window().start),
        }
    }

    /// The buffer-extended interval, or the core one without a buffer.
    pub fn effective_window(&self) -> TimeWindow {
        self.buffer
            .as_ref()
            .map(|b| b.effective_window())
            .unwrap_or(self.window)
    }

    /// Duration of the core interval in minutes.
    pub fn duration_minutes(&self) -> i64 {
        self.window.duration_minutes()
    }
}

/// Which side of a buffer was infringed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BufferSide {
    Before,
    After,
}

/// What kind of conflict was detected.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum ConflictKind {
    /// Core intervals intersect.
    TimeOverlap,
    /// An interval enters another's padding without touching its core.
    BufferViolation {
        /// The infringed side of the buffer.
        side: BufferSide,
    },
    /// The gap between adjacent meetings is shorter than the travel time.
    TravelInfeasible {
        /// Estimated travel minutes between the locations.
        required_minutes: i64,
        /// The actual gap in minutes.
        available_minutes: i64,
    },
}

/// Conflict severity, derived from overlap minutes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl Severity {
    /// The severity band for an overlap length: up to 5 minutes low, up to
    /// 15 medium, beyond that high.
    pub fn for_overlap_minutes(minutes: i64) -> Self {
        if minutes <= 5 {
            Self::Low
        } else if minutes <= 15 {
            Self::Medium
        } else {
            Self::High
        }
    }

    /// One band lower; padding infringements rank below core overlaps of
    /// the same length.
    pub fn demoted(self) -> Self {
        match self {
            Self::High => Self::Medium,
            Self::Medium | Self::Low => Self::Low,
        }
    }
}

/// Resolution state machine: Detected → Suggested → {Resolved, Dismissed}.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictState {
    #[default]
    Detected,
    Suggested,
    Resolved,
    Dismissed,
}

/// A proposed move for one of the conflicting items.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Suggestion {
    /// The item to move.
    pub item_id: String,
    /// The proposed interval.
    pub window: TimeWindow,
    /// Ranking score, higher is better.
    pub score: f64,
}

/// A detected scheduling conflict.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conflict {
    /// Unique identifier.
    pub id: Uuid,
    /// What was detected.
    pub kind: ConflictKind,
    /// How bad it is.
    pub severity: Severity,
    /// The affected owner.
    pub owner: String,
    /// The earlier item (by start, then id).
    pub first: String,
    /// The later item.
    pub second: String,
    /// Length of the offending intersection in minutes.
    pub overlap_minutes: i64,
    /// Proposed resolutions, filled by a resolver.
    #[serde(default)]
    pub suggestions: Vec<Suggestion>,
    /// Resolution state.
    #[serde(default)]
    pub state: ConflictState,
}

impl Conflict {
    /// Creates a freshly detected conflict.
    pub fn new(
        kind: ConflictKind,
        severity: Severity,
        owner: impl Into<String>,
        first: impl Into<String>,
        second: impl Into<String>,
        overlap_minutes: i64,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            severity,
            owner: owner.into(),
            first: first.into(),
            second: second.into(),
            overlap_minutes,
            suggestions: Vec::new(),
            state: ConflictState::Detected,
        }
    }

    /// Moves Detected → Suggested.
    pub fn mark_suggested(&mut self) -> EngineResult<()> {
        self.transition(ConflictState::Detected, ConflictState::Suggested)
    }

    /// Moves Suggested → Resolved.
    pub fn mark_resolved(&mut self) -> EngineResult<()> {
        self.transition(ConflictState::Suggested, ConflictState::Resolved)
    }

    /// Moves Suggested → Dismissed.
    pub fn mark_dismissed(&mut self) -> EngineResult<()> {
        self.transition(ConflictState::Suggested, ConflictState::Dismissed)
    }

    fn transition(&mut self, from: ConflictState, to: ConflictState) -> EngineResult<()> {
        if self.state != from {
            return Err(EngineError::invalid_transition(format!(
                "conflict is {:?}, cannot move to {:?}",
                self.state, to
            )));
        }
        self.state = to;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severity_bands() {
        assert_eq!(Severity::for_overlap_minutes(0), Severity::Low);
        assert_eq!(Severity::for_overlap_minutes(5), Severity::Low);
        assert_eq!(Severity::for_overlap_minutes(6), Severity::Medium);
        assert_eq!(Severity::for_overlap_minutes(15), Severity::Medium);
        assert_eq!(Severity::for_overlap_minutes(16), Severity::High);
    }

    #[test]
    fn severity_demotion() {
        assert_eq!(Severity::High.demoted(), Severity::Medium);
        assert_eq!(Severity::Medium.demoted(), Severity::Low);
        assert_eq!(Severity::Low.demoted(), Severity::Low);
    }

    #[test]
    fn state_machine_happy_paths() {
        let mut conflict = Conflict::new(
            ConflictKind::TimeOverlap,
            Severity::Medium,
            "alice",
            "a",
            "b",
            10,
        );

        conflict.mark_suggested().unwrap();
        assert_eq!(conflict.state, ConflictState::Suggested);
        conflict.mark_resolved().unwrap();
        assert_eq!(conflict.state, ConflictState::Resolved);
    }

    #[test]
    fn invalid_transitions_are_rejected() {
        let mut conflict = Conflict::new(
            ConflictKind::TimeOverlap,
            Severity::Low,
            "alice",
            "a",
            "b",
            3,
        );

        // Cannot resolve or dismiss before suggesting.
        assert!(conflict.mark_resolved().is_err());
        assert!(conflict.mark_dismissed().is_err());

        conflict.mark_suggested().unwrap();
        conflict.mark_dismissed().unwrap();
        // Terminal states stay put.
        assert!(conflict.mark_suggested().is_err());
        assert!(conflict.mark_resolved().is_err());
    }
}
