//! Bounded retry with exponential backoff for outbound store calls.
//!
//! Both the attempt count and the total elapsed wait are capped, so a
//! misbehaving upstream cannot hold a request open indefinitely.

use crate::error::{Result, StoreError};
use std::future::Future;
use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_elapsed: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            base_delay: Duration::from_millis(250),
            max_elapsed: Duration::from_secs(15),
        }
    }
}

impl RetryPolicy {
    /// Delay before the retry following the given 1-based attempt.
    fn backoff(&self, attempt: u32) -> Duration {
        self.base_delay * 2u32.saturating_pow(attempt.saturating_sub(1))
    }

    /// Run `operation`, retrying transient failures until the attempt
    /// or elapsed-time budget is spent. Non-transient errors return
    /// immediately.
    pub async fn run<T, F, Fut>(&self, what: &str, mut operation: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let started = Instant::now();
        let mut attempt = 1u32;
        loop {
            match operation().await {
                Ok(value) => return Ok(value),
                Err(error) if !is_transient(&error) => return Err(error),
                Err(error) => {
                    if attempt >= self.max_attempts || started.elapsed() >= self.max_elapsed {
                        return Err(StoreError::RetriesExhausted {
                            attempts: attempt,
                            last: error.to_string(),
                        });
                    }
                    let delay = self.backoff(attempt);
                    tracing::warn!(
                        target: "store",
                        what,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %error,
                        "transient store failure, backing off"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}

/// Connect-level failures, 429 and 5xx are worth retrying; anything
/// else is the caller's problem.
fn is_transient(error: &StoreError) -> bool {
    match error {
        StoreError::Transport(e) => e.is_connect() || e.is_timeout(),
        StoreError::Status { status, .. } => *status == 429 || *status >= 500,
        _ => false,
    }
}
