//! Bounded exponential backoff for backend calls.
//!
//! Both the generation and speech clients share the same policy: retry on
//! any failure up to a configured attempt count, doubling the delay between
//! attempts from a base value up to a fixed ceiling. Retries are bounded by
//! attempt count, not wall-clock time.

use std::future::Future;
use std::time::Duration;

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(10),
        }
    }
}

impl RetryPolicy {
    pub fn with_max_attempts(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            ..Self::default()
        }
    }

    /// Delay slept after the zero-based attempt `attempt` fails.
    fn delay_after(&self, attempt: u32) -> Duration {
        // Cap the shift so a large attempt count cannot overflow.
        let factor = 1u32 << attempt.min(16);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }

    /// Runs `op` until it succeeds or the attempt budget is exhausted.
    ///
    /// The last observed error is returned unchanged once no attempts
    /// remain. A `max_attempts` of zero is treated as one attempt.
    pub async fn run<T, E, F, Fut>(&self, mut op: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        let budget = self.max_attempts.max(1);
        let mut attempt = 0;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(err) => {
                    attempt += 1;
                    if attempt >= budget {
                        return Err(err);
                    }
                    let delay = self.delay_after(attempt - 1);
                    tracing::warn!(
                        attempt,
                        budget,
                        error = %err,
                        "backend call failed, retrying in {:?}",
                        delay
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}
