//! Pacing for periodic sync passes.
//!
//! The orchestrator itself is request-driven; an embedding service that
//! wants periodic passes uses [`SyncPacing`] to compute the delay until
//! the next one. Jitter spreads simultaneous calendars apart and
//! consecutive failures back the cadence off exponentially.

use std::time::Duration;

/// Cadence configuration for periodic sync passes.
#[derive(Debug, Clone)]
pub struct SyncPacing {
    /// Base interval between passes.
    pub interval: Duration,
    /// Maximum jitter added to the interval, as a fraction in [0, 1].
    pub jitter_fraction: f64,
    /// First backoff step after a failed pass.
    pub initial_backoff: Duration,
    /// Backoff ceiling.
    pub max_backoff: Duration,
    /// Growth factor between backoff steps.
    pub backoff_multiplier: f64,
}

impl Default for SyncPacing {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(300),
            jitter_fraction: 0.1,
            initial_backoff: Duration::from_secs(5),
            max_backoff: Duration::from_secs(300),
            backoff_multiplier: 2.0,
        }
    }
}

impl SyncPacing {
    /// Creates a pacing with the given base interval.
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            ..Default::default()
        }
    }

    /// Builder: set the jitter fraction.
    pub fn with_jitter(mut self, fraction: f64) -> Self {
        self.jitter_fraction = fraction.clamp(0.0, 1.0);
        self
    }

    /// Builder: set the backoff parameters.
    pub fn with_backoff(mut self, initial: Duration, max: Duration, multiplier: f64) -> Self {
        self.initial_backoff = initial;
        self.max_backoff = max;
        self.backoff_multiplier = multiplier;
        self
    }

    /// Delay until the next pass after a clean one, with jitter applied.
    pub fn next_delay(&self) -> Duration {
        let base = self.interval.as_secs_f64();
        let jitter = clock_jitter(base * self.jitter_fraction);
        Duration::from_secs_f64((base + jitter).max(0.0))
    }

    /// Delay until the next pass after `consecutive_failures` failed ones.
    ///
    /// Zero failures means no backoff; each further failure doubles (by the
    /// configured multiplier) up to the ceiling.
    pub fn backoff_delay(&self, consecutive_failures: u32) -> Duration {
        if consecutive_failures == 0 {
            return Duration::ZERO;
        }

        let base = self.initial_backoff.as_secs_f64();
        let factor = self.backoff_multiplier.powi(consecutive_failures as i32 - 1);
        let max = self.max_backoff.as_secs_f64();
        Duration::from_secs_f64((base * factor).min(max))
    }
}

/// Jitter in [-range, range] derived from the clock's subsecond phase.
fn clock_jitter(range: f64) -> f64 {
    use std::time::SystemTime;

    let nanos = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .subsec_nanos();
    let fraction = f64::from(nanos) / 1_000_000_000.0;
    (fraction * 2.0 - 1.0) * range
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn next_delay_stays_within_the_jitter_band() {
        let pacing = SyncPacing::new(Duration::from_secs(60)).with_jitter(0.1);

        let delay = pacing.next_delay();
        assert!(delay.as_secs_f64() >= 54.0);
        assert!(delay.as_secs_f64() <= 66.0);
    }

    #[test]
    fn backoff_grows_and_caps() {
        let pacing = SyncPacing::default().with_backoff(
            Duration::from_secs(5),
            Duration::from_secs(300),
            2.0,
        );

        assert_eq!(pacing.backoff_delay(0), Duration::ZERO);
        assert_eq!(pacing.backoff_delay(1), Duration::from_secs(5));
        assert_eq!(pacing.backoff_delay(2), Duration::from_secs(10));
        assert_eq!(pacing.backoff_delay(3), Duration::from_secs(20));
        assert_eq!(pacing.backoff_delay(12), Duration::from_secs(300));
    }

    #[test]
    fn jitter_fraction_is_clamped() {
        let pacing = SyncPacing::new(Duration::from_secs(10)).with_jitter(4.0);
        assert_eq!(pacing.jitter_fraction, 1.0);
    }
}
