//! Bounded retry for store writes.
//!
//! Only transient provider failures are retried. Validation, not-found and
//! transition errors surface on the first attempt. Each attempt runs on the
//! blocking pool, so a store waiting on a file lock never holds up the
//! runtime's worker threads.

use std::time::Duration;
use tracing::warn;

use crate::error::PosResult;
use crate::store::run_blocking;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(2),
        }
    }
}

fn deterministic_jitter_ms(seed: u32) -> u64 {
    (u64::from(seed) * 37) % 50
}

impl RetryPolicy {
    /// Single attempt, used where a caller handles failure itself.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Backoff before attempt `attempt + 1` (attempts count from 1).
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(16);
        let bounded = self
            .base_delay
            .saturating_mul(1u32 << exp)
            .min(self.max_delay);
        bounded + Duration::from_millis(deterministic_jitter_ms(attempt))
    }

    pub async fn run<T, F>(&self, operation: &str, op: F) -> PosResult<T>
    where
        T: Send + 'static,
        F: Fn() -> PosResult<T> + Clone + Send + 'static,
    {
        let mut attempt = 1;
        loop {
            match run_blocking(op.clone()).await {
                Ok(value) => return Ok(value),
                Err(err) if err.is_transient() && attempt < self.max_attempts => {
                    let delay = self.delay_after(attempt);
                    warn!(
                        operation,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "Transient store failure, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}
