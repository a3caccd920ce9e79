//! Buffer-time calculation.
//!
//! Computes the padding window around an appointment's core interval. The
//! calculation is a pure function of its inputs: identical inputs always
//! produce identical windows, which the conflict detector relies on.
//!
//! Multipliers and thresholds are not baked into the logic; they live in
//! [`BufferTuning`] so deployments can adjust them without code changes.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Timelike, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::event::AppointmentKind;
use crate::time::TimeWindow;

/// How buffer minutes are derived from an appointment.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BufferStrategy {
    /// Use the configured minutes as-is.
    #[default]
    Fixed,
    /// A fraction of the appointment duration on each side.
    Percentage,
    /// Base minutes scaled by duration band, off-hours and appointment kind.
    Adaptive,
    /// Adaptive, additionally scaled by schedule density and recent overrun.
    Dynamic,
}

/// Per-user buffer preference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BufferPreference {
    /// The strategy to apply.
    pub strategy: BufferStrategy,
    /// Base minutes before the appointment.
    pub before_minutes: u32,
    /// Base minutes after the appointment.
    pub after_minutes: u32,
    /// Duration fraction for the percentage strategy.
    pub percentage: f64,
    /// Lower clamp for each side.
    pub min_minutes: u32,
    /// Upper clamp for each side.
    pub max_minutes: u32,
}

impl Default for BufferPreference {
    fn default() -> Self {
        Self {
            strategy: BufferStrategy::Fixed,
            before_minutes: 10,
            after_minutes: 10,
            percentage: 0.15,
            min_minutes: 0,
            max_minutes: 60,
        }
    }
}

impl BufferPreference {
    /// A fixed-strategy preference with symmetric minutes.
    pub fn fixed(minutes: u32) -> Self {
        Self {
            strategy: BufferStrategy::Fixed,
            before_minutes: minutes,
            after_minutes: minutes,
            ..Default::default()
        }
    }

    /// Builder: set the strategy.
    pub fn with_strategy(mut self, strategy: BufferStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Builder: set the clamp range.
    pub fn with_clamp(mut self, min_minutes: u32, max_minutes: u32) -> Self {
        self.min_minutes = min_minutes;
        self.max_minutes = max_minutes;
        self
    }
}

/// Tunable multipliers and thresholds for the adaptive and dynamic
/// strategies. The defaults are the shipped values; they are configuration,
/// not fixed logic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BufferTuning {
    /// Appointments longer than this (minutes) get the long-meeting factors.
    pub long_meeting_minutes: i64,
    /// Before-side factor for long meetings.
    pub long_before_factor: f64,
    /// After-side factor for long meetings.
    pub long_after_factor: f64,
    /// Appointments shorter than this (minutes) get the short factor.
    pub short_meeting_minutes: i64,
    /// Both-sides factor for short meetings.
    pub short_factor: f64,
    /// Local business hours start (inclusive).
    pub work_start_hour: u32,
    /// Local business hours end; starts strictly after this hour count as
    /// off-hours.
    pub work_end_hour: u32,
    /// Both-sides factor applied outside business hours.
    pub off_hours_factor: f64,
    /// Per-kind multiplier applied to both sides.
    pub kind_factors: HashMap<AppointmentKind, f64>,
    /// Per-kind minimum minutes, applied as a floor on both sides.
    pub kind_minimum_minutes: HashMap<AppointmentKind, u32>,
    /// Density above this shrinks buffers.
    pub dense_threshold: f64,
    /// Factor for dense schedules.
    pub dense_factor: f64,
    /// Density below this grows buffers.
    pub sparse_threshold: f64,
    /// Factor for sparse schedules.
    pub sparse_factor: f64,
    /// Average overrun (minutes) above which the after-buffer grows.
    pub overrun_threshold_minutes: f64,
    /// After-side factor applied when overruns exceed the threshold.
    pub overrun_after_factor: f64,
}

impl Default for BufferTuning {
    fn default() -> Self {
        let mut kind_factors = HashMap::new();
        kind_factors.insert(AppointmentKind::Consultation, 1.2);
        kind_factors.insert(AppointmentKind::Interview, 1.4);
        kind_factors.insert(AppointmentKind::Workshop, 1.3);

        let mut kind_minimum_minutes = HashMap::new();
        kind_minimum_minutes.insert(AppointmentKind::Interview, 10);
        kind_minimum_minutes.insert(AppointmentKind::Workshop, 15);

        Self {
            long_meeting_minutes: 60,
            long_before_factor: 1.5,
            long_after_factor: 1.3,
            short_meeting_minutes: 30,
            short_factor: 0.8,
            work_start_hour: 9,
            work_end_hour: 17,
            off_hours_factor: 1.2,
            kind_factors,
            kind_minimum_minutes,
            dense_threshold: 0.8,
            dense_factor: 0.8,
            sparse_threshold: 0.4,
            sparse_factor: 1.3,
            overrun_threshold_minutes: 10.0,
            overrun_after_factor: 1.5,
        }
    }
}

/// Caller-supplied schedule signals for the dynamic strategy.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScheduleContext {
    /// Fraction of the working day already occupied, in `[0, 1]`.
    pub density: Option<f64>,
    /// Recent average overrun past scheduled end, in minutes.
    pub average_overrun_minutes: Option<f64>,
    /// Zone used to judge off-hours; UTC when absent.
    pub zone: Option<Tz>,
}

/// The computed padding around an appointment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BufferWindow {
    /// Minutes reserved before the core interval.
    pub before_minutes: u32,
    /// Minutes reserved after the core interval.
    pub after_minutes: u32,
    /// Start of the buffer-extended interval.
    pub effective_start: DateTime<Utc>,
    /// End of the buffer-extended interval.
    pub effective_end: DateTime<Utc>,
    /// The strategy that produced this window.
    pub strategy: BufferStrategy,
}

impl BufferWindow {
    /// Returns the buffer-extended interval.
    pub fn effective_window(&self) -> TimeWindow {
        TimeWindow::new(self.effective_start, self.effective_end)
    }

    /// Returns the zone reserved before the core interval, if any.
    pub fn before_zone(&self, core_start: DateTime<Utc>) -> Option<TimeWindow> {
        (self.effective_start < core_start).then(|| TimeWindow::new(self.effective_start, core_start))
    }

    /// Returns the zone reserved after the core interval, if any.
    pub fn after_zone(&self, core_end: DateTime<Utc>) -> Option<TimeWindow> {
        (core_end < self.effective_end).then(|| TimeWindow::new(core_end, self.effective_end))
    }
}

/// Computes the buffer window for an appointment interval.
///
/// Pure: no clocks, no caches, no side effects.
pub fn calculate_buffer(
    window: &TimeWindow,
    kind: AppointmentKind,
    pref: &BufferPreference,
    tuning: &BufferTuning,
    ctx: &ScheduleContext,
) -> BufferWindow {
    let duration = window.duration_minutes();

    let (mut before, mut after) = match pref.strategy {
        BufferStrategy::Fixed => (pref.before_minutes as f64, pref.after_minutes as f64),
        BufferStrategy::Percentage => {
            let side = (duration as f64 * pref.percentage).round();
            (side, side)
        }
        BufferStrategy::Adaptive => adaptive_minutes(window, duration, kind, pref, tuning, ctx),
        BufferStrategy::Dynamic => {
            let (mut b, mut a) = adaptive_minutes(window, duration, kind, pref, tuning, ctx);
            if let Some(density) = ctx.density {
                if density > tuning.dense_threshold {
                    b *= tuning.dense_factor;
                    a *= tuning.dense_factor;
                } else if density < tuning.sparse_threshold {
                    b *= tuning.sparse_factor;
                    a *= tuning.sparse_factor;
                }
            }
            if let Some(overrun) = ctx.average_overrun_minutes
                && overrun > tuning.overrun_threshold_minutes
            {
                a *= tuning.overrun_after_factor;
            }
            (b, a)
        }
    };

    // Kind minimum is a floor, then clamp to the preference range.
    if let Some(&minimum) = tuning.kind_minimum_minutes.get(&kind) {
        before = before.max(minimum as f64);
        after = after.max(minimum as f64);
    }
    let before = (before.round() as u32).clamp(pref.min_minutes, pref.max_minutes);
    let after = (after.round() as u32).clamp(pref.min_minutes, pref.max_minutes);

    BufferWindow {
        before_minutes: before,
        after_minutes: after,
        effective_start: window.start - Duration::minutes(before as i64),
        effective_end: window.end + Duration::minutes(after as i64),
        strategy: pref.strategy,
    }
}

fn adaptive_minutes(
    window: &TimeWindow,
    duration: i64,
    kind: AppointmentKind,
    pref: &BufferPreference,
    tuning: &BufferTuning,
    ctx: &ScheduleContext,
) -> (f64, f64) {
    let mut before = pref.before_minutes as f64;
    let mut after = pref.after_minutes as f64;

    if duration > tuning.long_meeting_minutes {
        before *= tuning.long_before_factor;
        after *= tuning.long_after_factor;
    } else if duration < tuning.short_meeting_minutes {
        before *= tuning.short_factor;
        after *= tuning.short_factor;
    }

    if is_off_hours(window.start, tuning, ctx) {
        before *= tuning.off_hours_factor;
        after *= tuning.off_hours_factor;
    }

    if let Some(&factor) = tuning.kind_factors.get(&kind) {
        before *= factor;
        after *= factor;
    }

    (before, after)
}

/// Off-hours means starting before business hours or strictly after their
/// end, judged in the context zone (UTC when absent).
fn is_off_hours(start: DateTime<Utc>, tuning: &BufferTuning, ctx: &ScheduleContext) -> bool {
    let minute_of_day = match ctx.zone {
        Some(tz) => {
            let local = start.with_timezone(&tz);
            local.hour() * 60 + local.minute()
        }
        None => start.hour() * 60 + start.minute(),
    };
    minute_of_day < tuning.work_start_hour * 60 || minute_of_day > tuning.work_end_hour * 60
}
