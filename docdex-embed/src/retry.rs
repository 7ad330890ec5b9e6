//! Explicit retry/backoff policy shared by remote call sites.
//!
//! Both the embedding provider and the document uploader talk to
//! rate-limited remote services, so the backoff behavior lives in one
//! policy object instead of ad-hoc loops at each call site. Errors opt
//! into retrying by implementing [`Retryable`]; a server-specified
//! retry-after hint always wins over the computed delay.

use std::future::Future;
use std::time::Duration;

/// Classification hook consumed by [`RetryPolicy::run`].
///
/// Implemented by the error types of every remote call site that retries
/// (embedding calls, batch uploads).
pub trait Retryable {
    /// Whether another attempt may succeed.
    fn is_retryable(&self) -> bool;

    /// Server-provided delay hint, if the service sent one.
    fn retry_after(&self) -> Option<Duration> {
        None
    }
}

/// Exponential-backoff retry policy.
///
/// Attempt `n` (1-based) sleeps `base_delay * multiplier^(n-1)` before
/// attempt `n+1`, unless the error carries a retry-after hint, which is
/// used verbatim. `max_attempts` bounds the total number of attempts,
/// including the first.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub multiplier: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
            multiplier: 2,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            multiplier: 2,
        }
    }

    /// Backoff delay after a failed attempt (1-based), ignoring hints.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let factor = self.multiplier.saturating_pow(attempt.saturating_sub(1));
        self.base_delay.saturating_mul(factor)
    }

    /// Run `op` until it succeeds, fails with a non-retryable error, or
    /// exhausts `max_attempts`. The closure receives the 1-based attempt
    /// number. The final error is returned unchanged, so callers can still
    /// distinguish why the operation ultimately failed.
    pub async fn run<T, E, Op, Fut>(&self, mut op: Op) -> Result<T, E>
    where
        E: Retryable + std::fmt::Display,
        Op: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match op(attempt).await {
                Ok(value) => return Ok(value),
                Err(err) if err.is_retryable() && attempt < self.max_attempts => {
                    let delay = err
                        .retry_after()
                        .unwrap_or_else(|| self.delay_for_attempt(attempt));
                    tracing::warn!(
                        "attempt {attempt}/{} failed ({err}), retrying in {delay:?}",
                        self.max_attempts
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(err) => return Err(err),
            }
        }
    }
}
