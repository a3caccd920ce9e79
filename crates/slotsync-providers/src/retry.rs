//! Retry with exponential backoff for transient provider failures.
//!
//! Only errors whose code reports `is_retryable()` (timeouts, 5xx, 429,
//! network failures) are retried; terminal errors surface immediately.

use std::future::Future;
use std::time::Duration;

use tracing::{debug, warn};

use crate::error::ProviderResult;

/// Bounded exponential backoff policy.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    /// Delay before the first retry.
    pub initial_backoff: Duration,
    /// Per-retry delay multiplier.
    pub multiplier: f64,
    /// Upper bound on any single delay.
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            initial_backoff: Duration::from_millis(500),
            multiplier: 2.0,
            max_backoff: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Default::default()
        }
    }

    /// Builder: set the attempt bound.
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    /// Builder: set the backoff parameters.
    pub fn with_backoff(mut self, initial: Duration, max: Duration, multiplier: f64) -> Self {
        self.initial_backoff = initial;
        self.max_backoff = max;
        self.multiplier = multiplier;
        self
    }

    /// Delay before retry number `retry` (1-based).
    pub fn backoff_delay(&self, retry: u32) -> Duration {
        if retry == 0 {
            return Duration::ZERO;
        }
        let base = self.initial_backoff.as_secs_f64();
        let delay = base * self.multiplier.powi(retry as i32 - 1);
        Duration::from_secs_f64(delay.min(self.max_backoff.as_secs_f64()))
    }
}

/// Runs `op` under the policy, retrying transient failures.
///
/// # Errors
///
/// Returns the last error once attempts are exhausted, or the first
/// non-retryable error immediately.
pub async fn with_retries<T, F, Fut>(policy: &RetryPolicy, mut op: F) -> ProviderResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = ProviderResult<T>>,
{
    let mut attempt = 1;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_retryable() && attempt < policy.max_attempts => {
                let delay = policy.backoff_delay(attempt);
                debug!(
                    attempt,
                    max_attempts = policy.max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "transient provider error, backing off"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(err) => {
                if err.is_retryable() {
                    warn!(attempts = attempt, error = %err, "retry budget exhausted");
                }
                return Err(err);
            }
        }
    }
}
