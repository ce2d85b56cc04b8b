//! Retrying invocation of external side effects.
//!
//! Machines call out (the close notification) through this envelope so a
//! flaky downstream never wedges an event loop: bounded attempts, bounded
//! backoff, bounded per-attempt time.

use std::future::Future;
use std::time::Duration;

use thiserror::Error;

/// Retry policy configuration.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Total attempts, including the first (0 means "do not even try").
    pub max_attempts: u32,
    /// Delay before the second attempt.
    pub initial_interval: Duration,
    /// Multiplier applied to the delay after each failed attempt.
    pub backoff_coefficient: f64,
    /// Cap on the delay between attempts.
    pub max_interval: Duration,
    /// Per-attempt timeout.
    pub attempt_timeout: Duration,
}

impl RetryPolicy {
    /// The envelope used for close notifications: 1s initial delay, doubling
    /// up to 5 minutes, 5 attempts, 5 minutes per attempt.
    pub fn notification() -> Self {
        Self {
            max_attempts: 5,
            initial_interval: Duration::from_secs(1),
            backoff_coefficient: 2.0,
            max_interval: Duration::from_secs(5 * 60),
            attempt_timeout: Duration::from_secs(5 * 60),
        }
    }

    /// Delay before attempt `attempt + 1`, for a 1-indexed failed `attempt`.
    pub fn delay_after_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }

        let initial_ms = self.initial_interval.as_millis() as f64;
        let max_ms = self.max_interval.as_millis() as f64;
        let delay_ms = (initial_ms * self.backoff_coefficient.powi(attempt as i32 - 1)).min(max_ms);

        Duration::from_millis(delay_ms as u64)
    }
}

/// All attempts failed (or timed out).
#[derive(Debug, Error)]
#[error("operation failed after {attempts} attempts: {last_error}")]
pub struct RetryExhausted {
    pub attempts: u32,
    pub last_error: String,
}

/// Run `op` under `policy`, backing off between failed attempts.
pub async fn run_with_retry<T, E, F, Fut>(policy: &RetryPolicy, mut op: F) -> Result<T, RetryExhausted>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: core::fmt::Display,
{
    let mut last_error = "never attempted".to_string();

    for attempt in 1..=policy.max_attempts {
        match tokio::time::timeout(policy.attempt_timeout, op()).await {
            Ok(Ok(value)) => return Ok(value),
            Ok(Err(e)) => {
                last_error = e.to_string();
            }
            Err(_) => {
                last_error = format!("attempt timed out after {:?}", policy.attempt_timeout);
            }
        }

        if attempt < policy.max_attempts {
            let delay = policy.delay_after_attempt(attempt);
            tracing::warn!(attempt, error = %last_error, ?delay, "attempt failed, backing off");
            tokio::time::sleep(delay).await;
        }
    }

    Err(RetryExhausted {
        attempts: policy.max_attempts,
        last_error,
    })
}
