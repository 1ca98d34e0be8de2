//! Bounded retry with exponential backoff for driver calls.

use std::future::Future;
use std::time::Duration;

use tracing::warn;

use crate::error::OrchResult;

/// Retry budget for a single driver call.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    /// Backoff before the second attempt.
    pub initial_backoff: Duration,
    /// Backoff growth factor per failed attempt.
    pub multiplier: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(250),
            multiplier: 2,
        }
    }
}

impl RetryPolicy {
    /// Run `op` until it succeeds, fails permanently, or the attempt
    /// budget is spent. Only transient errors are retried; a permanent
    /// error propagates immediately, and the last transient error is
    /// returned once the budget runs out.
    pub async fn run<T, F, Fut>(&self, what: &str, mut op: F) -> OrchResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = OrchResult<T>>,
    {
        let mut backoff = self.initial_backoff;
        let mut attempt = 1u32;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(err) if err.is_transient() && attempt < self.max_attempts => {
                    warn!(
                        what,
                        attempt,
                        backoff_ms = backoff.as_millis() as u64,
                        error = %err,
                        "driver call failed, retrying"
                    );
                    tokio::time::sleep(backoff).await;
                    backoff *= self.multiplier;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}
