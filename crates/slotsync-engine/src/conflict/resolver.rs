//! Conflict resolution strategies.
//!
//! [`BaseConflictEngine`] implements the detector/resolver interface with
//! the four strategies; [`EnrichedConflictEngine`] decorates any engine
//! with travel analysis and learned-preference prediction. Enrichment
//! failures are logged and degrade to the inner engine's behavior - core
//! detection errors are never swallowed.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use slotsync_core::TimeWindow;

use super::alternatives::{SlotSearchConfig, find_alternative_slots};
use super::detector::{detect_conflicts, detect_travel_conflicts};
use super::{Conflict, ScheduleItem};
use tracing::{debug, warn};

/// How detected conflicts get resolved.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionStrategy {
    /// Attach suggestions only; the user decides.
    #[default]
    UserChoice,
    /// Deterministic precedence: the earlier-created item keeps its slot.
    PriorityBased,
    /// The earlier item wins; the later one is shifted forward.
    TimeBased,
    /// Apply a confident predicted preference, else the best alternative,
    /// else fall back to priority.
    Automatic,
}

/// Resolver configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolverConfig {
    /// The active strategy.
    pub strategy: ResolutionStrategy,
    /// Minimum confidence for applying a predicted preference.
    pub confidence_threshold: f64,
    /// Parameters for the alternative-slot search.
    pub search: SlotSearchConfig,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            strategy: ResolutionStrategy::UserChoice,
            confidence_threshold: 0.75,
            search: SlotSearchConfig::default(),
        }
    }
}

/// What a resolver decided.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "action")]
pub enum ResolutionAction {
    /// Suggestions were attached; no move applied.
    Suggest,
    /// Move the item to the window.
    Reschedule {
        /// The item to move.
        item_id: String,
        /// The target interval.
        window: TimeWindow,
    },
    /// No viable alternative; the winner keeps the slot, the displaced
    /// item needs manual handling.
    KeepFirst {
        /// The item keeping its slot.
        winner: String,
        /// The item left without one.
        displaced: String,
    },
}

/// The outcome of resolving one conflict.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Resolution {
    /// The resolved conflict.
    pub conflict_id: Uuid,
    /// The strategy that produced this outcome.
    pub strategy: ResolutionStrategy,
    /// The decided action.
    pub action: ResolutionAction,
}

/// An error from an enrichment stage (travel lookup, preference
/// prediction). Never escalates past a log line.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct EnrichmentError {
    message: String,
}

impl EnrichmentError {
    /// Creates an enrichment error.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Estimates travel time between two locations.
pub trait TravelEstimator: Send + Sync {
    /// Travel minutes from one location text to another.
    fn travel_minutes(&self, from: &str, to: &str) -> Result<i64, EnrichmentError>;
}

/// A predicted rescheduling preference with its confidence.
#[derive(Debug, Clone, PartialEq)]
pub struct PredictedPreference {
    /// The item the user would move.
    pub item_id: String,
    /// Where they would move it.
    pub window: TimeWindow,
    /// Prediction confidence in `[0, 1]`.
    pub confidence: f64,
}

/// Predicts how a user would resolve a conflict.
pub trait PreferencePredictor: Send + Sync {
    /// Predicts a preferred resolution for the conflict.
    fn predict(
        &self,
        conflict: &Conflict,
        items: &[ScheduleItem],
    ) -> Result<PredictedPreference, EnrichmentError>;
}

/// The detector/resolver interface; the enriched engine implements the
/// same one, so callers never care which they hold.
pub trait ConflictEngine: Send + Sync {
    /// Detects conflicts over a merged item set.
    fn detect(&self, items: &[ScheduleItem]) -> Vec<Conflict>;

    /// Resolves one conflict, attaching suggestions and advancing its
    /// state. `search_from` anchors the forward slot search.
    fn resolve(
        &self,
        conflict: &mut Conflict,
        items: &[ScheduleItem],
        search_from: DateTime<Utc>,
    ) -> Resolution;
}

/// The base engine: overlap/buffer detection plus the four strategies.
#[derive(Debug, Default)]
pub struct BaseConflictEngine {
    config: ResolverConfig,
}

impl BaseConflictEngine {
    /// Creates an engine with the given configuration.
    pub fn new(config: ResolverConfig) -> Self {
        Self { config }
    }

    fn find<'a>(items: &'a [ScheduleItem], id: &str) -> Option<&'a ScheduleItem> {
        items.iter().find(|i| i.id == id)
    }

    /// Deterministic precedence: earlier creation wins, id as tie-break.
    fn priority_winner<'a>(
        a: &'a ScheduleItem,
        b: &'a ScheduleItem,
    ) -> (&'a ScheduleItem, &'a ScheduleItem) {
        if (a.created_at, &a.id) <= (b.created_at, &b.id) {
            (a, b)
        } else {
            (b, a)
        }
    }

    fn resolve_with_loser(
        &self,
        conflict: &mut Conflict,
        items: &[ScheduleItem],
        winner: &ScheduleItem,
        loser: &ScheduleItem,
        search_from: DateTime<Utc>,
    ) -> ResolutionAction {
        let slots = find_alternative_slots(loser, items, search_from, &self.config.search);
        conflict.suggestions = slots
            .iter()
            .cloned()
            .map(|s| s.into_suggestion(&loser.id))
            .collect();
        let _ = conflict.mark_suggested();

        match slots.first() {
            Some(best) => {
                let _ = conflict.mark_resolved();
                ResolutionAction::Reschedule {
                    item_id: loser.id.clone(),
                    window: best.window,
                }
            }
            None => ResolutionAction::KeepFirst {
                winner: winner.id.clone(),
                displaced: loser.id.clone(),
            },
        }
    }
}

impl ConflictEngine for BaseConflictEngine {
    fn detect(&self, items: &[ScheduleItem]) -> Vec<Conflict> {
        detect_conflicts(items)
    }

    fn resolve(
        &self,
        conflict: &mut Conflict,
        items: &[ScheduleItem],
        search_from: DateTime<Utc>,
    ) -> Resolution {
        let first = Self::find(items, &conflict.first);
        let second = Self::find(items, &conflict.second);

        let action = match (first, second) {
            (Some(first), Some(second)) => match self.config.strategy {
                ResolutionStrategy::UserChoice => {
                    // Suggestions for the later item; the user picks.
                    let slots =
                        find_alternative_slots(second, items, search_from, &self.config.search);
                    conflict.suggestions = slots
                        .into_iter()
                        .map(|s| s.into_suggestion(&second.id))
                        .collect();
                    let _ = conflict.mark_suggested();
                    ResolutionAction::Suggest
                }
                ResolutionStrategy::PriorityBased => {
                    let (winner, loser) = Self::priority_winner(first, second);
                    self.resolve_with_loser(conflict, items, winner, loser, search_from)
                }
                ResolutionStrategy::TimeBased | ResolutionStrategy::Automatic => {
                    // The earlier item keeps its slot. Without a predictor
                    // the automatic strategy is the alternative search with
                    // a priority fallback, which this already is.
                    let (winner, loser) = if first.window.start <= second.window.start {
                        (first, second)
                    } else {
                        (second, first)
                    };
                    self.resolve_with_loser(conflict, items, winner, loser, search_from)
                }
            },
            _ => {
                warn!(conflict = %conflict.id, "conflicting items missing from the set");
                let _ = conflict.mark_suggested();
                ResolutionAction::Suggest
            }
        };

        Resolution {
            conflict_id: conflict.id,
            strategy: self.config.strategy,
            action,
        }
    }
}

/// Decorator adding travel analysis and preference prediction to any
/// engine.
pub struct EnrichedConflictEngine {
    inner: Box<dyn ConflictEngine>,
    travel: Option<Box<dyn TravelEstimator>>,
    predictor: Option<Box<dyn PreferencePredictor>>,
    confidence_threshold: f64,
}

impl EnrichedConflictEngine {
    /// Wraps an engine without any enrichment attached.
    pub fn new(inner: Box<dyn ConflictEngine>) -> Self {
        Self {
            inner,
            travel: None,
            predictor: None,
            confidence_threshold: ResolverConfig::default().confidence_threshold,
        }
    }

    /// Builder: attach a travel estimator.
    pub fn with_travel(mut self, travel: Box<dyn TravelEstimator>) -> Self {
        self.travel = Some(travel);
        self
    }

    /// Builder: attach a preference predictor.
    pub fn with_predictor(mut self, predictor: Box<dyn PreferencePredictor>) -> Self {
        self.predictor = Some(predictor);
        self
    }

    /// Builder: set the prediction confidence threshold.
    pub fn with_confidence_threshold(mut self, threshold: f64) -> Self {
        self.confidence_threshold = threshold;
        self
    }
}

impl ConflictEngine for EnrichedConflictEngine {
    fn detect(&self, items: &[ScheduleItem]) -> Vec<Conflict> {
        let mut conflicts = self.inner.detect(items);

        if let Some(ref travel) = self.travel {
            // Estimator failures are handled inside the travel pass; the
            // base detection result stands either way.
            conflicts.extend(detect_travel_conflicts(items, travel.as_ref()));
        }

        conflicts
    }

    fn resolve(
        &self,
        conflict: &mut Conflict,
        items: &[ScheduleItem],
        search_from: DateTime<Utc>,
    ) -> Resolution {
        if let Some(ref predictor) = self.predictor {
            match predictor.predict(conflict, items) {
                Ok(prediction) if prediction.confidence >= self.confidence_threshold => {
                    debug!(
                        conflict = %conflict.id,
                        confidence = prediction.confidence,
                        "applying predicted preference"
                    );
                    conflict.suggestions = vec![super::Suggestion {
                        item_id: prediction.item_id.clone(),
                        window: prediction.window,
                        score: prediction.confidence * 100.0,
                    }];
                    let _ = conflict.mark_suggested();
                    let _ = conflict.mark_resolved();
                    return Resolution {
                        conflict_id: conflict.id,
                        strategy: ResolutionStrategy::Automatic,
                        action: ResolutionAction::Reschedule {
                            item_id: prediction.item_id,
                            window: prediction.window,
                        },
                    };
                }
                Ok(prediction) => {
                    debug!(
                        conflict = %conflict.id,
                        confidence = prediction.confidence,
                        "prediction below threshold, delegating"
                    );
                }
                Err(e) => {
                    warn!(conflict = %conflict.id, error = %e, "preference prediction failed, delegating");
                }
            }
        }

        self.inner.resolve(conflict, items, search_from)
    }
}
