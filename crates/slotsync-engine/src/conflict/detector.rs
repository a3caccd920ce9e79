//! Conflict detection over a merged schedule.
//!
//! Items are compared pairwise per owner. Intersecting core intervals are
//! time overlaps; an interval that enters another's padding without
//! touching its core is a buffer violation, tagged with the infringed
//! side. Travel infeasibility is a separate pass driven by an estimator,
//! run only by the enriched engine.

use tracing::debug;

use slotsync_core::TimeWindow;

use super::resolver::TravelEstimator;
use super::{BufferSide, Conflict, ConflictKind, ScheduleItem, Severity};

/// Scans a merged item set for time overlaps and buffer violations.
///
/// The result is deterministic: items are ordered by start instant and id
/// before pairing, and each pair reports at most one conflict.
pub fn detect_conflicts(items: &[ScheduleItem]) -> Vec<Conflict> {
    let mut sorted: Vec<&ScheduleItem> = items.iter().filter(|i| !i.cancelled).collect();
    sorted.sort_by(|a, b| {
        a.window
            .start
            .cmp(&b.window.start)
            .then_with(|| a.id.cmp(&b.id))
    });

    let mut conflicts = Vec::new();
    for (index, first) in sorted.iter().enumerate() {
        for second in &sorted[index + 1..] {
            if first.owner != second.owner {
                continue;
            }
            if let Some(conflict) = check_pair(first, second) {
                conflicts.push(conflict);
            }
        }
    }

    debug!(items = items.len(), conflicts = conflicts.len(), "conflict scan finished");
    conflicts
}

/// Checks one ordered pair. `first` starts no later than `second`.
fn check_pair(first: &ScheduleItem, second: &ScheduleItem) -> Option<Conflict> {
    let core_overlap = first.window.overlap_minutes(&second.window);
    if core_overlap > 0 || first.window.overlaps(&second.window) {
        return Some(Conflict::new(
            ConflictKind::TimeOverlap,
            Severity::for_overlap_minutes(core_overlap),
            &first.owner,
            &first.id,
            &second.id,
            core_overlap,
        ));
    }

    // Cores are disjoint; check whether either item sits in the other's
    // padding.
    buffer_violation(first, second).or_else(|| buffer_violation(second, first))
}

/// A violation of `padded`'s buffer by `intruder`'s core interval.
fn buffer_violation(padded: &ScheduleItem, intruder: &ScheduleItem) -> Option<Conflict> {
    let buffer = padded.buffer.as_ref()?;

    let zones = [
        (buffer.before_zone(padded.window.start), BufferSide::Before),
        (buffer.after_zone(padded.window.end), BufferSide::After),
    ];

    for (zone, side) in zones {
        let Some(zone) = zone else { continue };
        let minutes = zone_overlap(&zone, &intruder.window);
        if minutes > 0 {
            // The first/second ordering stays chronological.
            let (first, second) = if padded.window.start <= intruder.window.start {
                (&padded.id, &intruder.id)
            } else {
                (&intruder.id, &padded.id)
            };
            return Some(Conflict::new(
                ConflictKind::BufferViolation { side },
                Severity::for_overlap_minutes(minutes).demoted(),
                &padded.owner,
                first,
                second,
                minutes,
            ));
        }
    }

    None
}

fn zone_overlap(zone: &TimeWindow, window: &TimeWindow) -> i64 {
    zone.overlap_minutes(window)
}

/// Scans chronologically adjacent items for infeasible travel.
///
/// Runs per owner over items with distinct locations. Estimator failures
/// skip the pair with a log line; travel analysis degrades, it never
/// breaks detection.
pub fn detect_travel_conflicts(
    items: &[ScheduleItem],
    estimator: &dyn TravelEstimator,
) -> Vec<Conflict> {
    let mut sorted: Vec<&ScheduleItem> = items
        .iter()
        .filter(|i| !i.cancelled && i.location.is_some())
        .collect();
    sorted.sort_by(|a, b| {
        a.window
            .start
            .cmp(&b.window.start)
            .then_with(|| a.id.cmp(&b.id))
    });

    let mut conflicts = Vec::new();
    for pair in sorted.windows(2) {
        let (prev, next) = (pair[0], pair[1]);
        if prev.owner != next.owner {
            continue;
        }
        let (from, to) = (
            prev.location.as_deref().unwrap_or_default(),
            next.location.as_deref().unwrap_or_default(),
        );
        if from == to {
            continue;
        }

        let gap = (next.window.start - prev.window.end).num_minutes();
        if gap < 0 {
            // Overlapping items are the overlap detector's business.
            continue;
        }

        let required = match estimator.travel_minutes(from, to) {
            Ok(minutes) => minutes,
            Err(e) => {
                tracing::warn!(from, to, error = %e, "travel estimate failed, skipping pair");
                continue;
            }
        };

        if required > gap {
            let shortfall = required - gap;
            conflicts.push(Conflict::new(
                ConflictKind::TravelInfeasible {
                    required_minutes: required,
                    available_minutes: gap,
                },
                Severity::for_overlap_minutes(shortfall),
                &prev.owner,
                &prev.id,
                &next.id,
                shortfall,
            ));
        }
    }

    conflicts
}
