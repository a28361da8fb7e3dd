//! Bounded-backoff retry for infrastructure operations.

use std::future::Future;
use std::time::Duration;

use tracing::warn;

use sievegate_stream_core::{StreamError, StreamResult};

/// Retry policy with a bounded attempt budget and exponential backoff.
///
/// Only retryable [`StreamError`]s are retried; once the budget is
/// exhausted the last error is surfaced to the caller, which must not
/// commit the affected offsets.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    budget: u32,
    backoff: Duration,
}

impl RetryPolicy {
    /// A policy allowing `budget` retries with the given base backoff.
    /// The backoff doubles after every failed attempt.
    pub fn new(budget: u32, backoff: Duration) -> Self {
        Self { budget, backoff }
    }

    /// Run `op`, retrying on retryable errors within the budget.
    pub async fn run<T, F, Fut>(&self, what: &str, mut op: F) -> StreamResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = StreamResult<T>>,
    {
        let mut attempt: u32 = 0;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() && attempt < self.budget => {
                    let delay = self.backoff * 2u32.saturating_pow(attempt);
                    attempt += 1;
                    warn!(
                        operation = what,
                        attempt,
                        budget = self.budget,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "operation failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
