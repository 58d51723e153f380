//! Bounded retry with exponential backoff.
//!
//! [`retry`] wraps any fallible async operation. The same policy drives job
//! submission and status queries; the success type is a type parameter, so
//! each call site keeps its own return type.

use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::shutdown::ShutdownToken;

/// Retry and backoff settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total number of attempts, including the first one.
    pub max_attempts: u32,
    /// Delay after the first failed attempt.
    pub initial_delay: Duration,
    /// Upper bound for any single delay.
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, initial_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts,
            initial_delay,
            max_delay,
        }
    }
}

/// Computes the wait after a failed attempt.
///
/// Formula: delay = min(initial_delay * 2^attempt, max_delay), where
/// `attempt` is the zero-based index of the attempt that just failed.
pub fn compute_backoff_delay(attempt: u32, policy: &RetryPolicy) -> Duration {
    let factor = 2u32.checked_pow(attempt).unwrap_or(u32::MAX);
    policy
        .initial_delay
        .checked_mul(factor)
        .unwrap_or(policy.max_delay)
        .min(policy.max_delay)
}

/// Why a retried operation gave up.
#[derive(Debug, thiserror::Error)]
pub enum RetryError<E> {
    /// Shutdown was signalled during an attempt or a backoff wait.
    #[error("operation cancelled")]
    Cancelled,
    /// Every attempt failed; carries the last error.
    #[error("max retries exceeded after {attempts} attempts: {last}")]
    Exhausted { attempts: u32, last: E },
}

impl<E> RetryError<E> {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, RetryError::Cancelled)
    }
}

/// Run `op` until it succeeds, the policy runs out of attempts, or `shutdown`
/// fires.
///
/// A `max_attempts` of zero is treated as one attempt.
pub async fn retry<T, E, F, Fut>(
    policy: &RetryPolicy,
    shutdown: &ShutdownToken,
    mut op: F,
) -> Result<T, RetryError<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        if shutdown.is_cancelled() {
            return Err(RetryError::Cancelled);
        }

        let outcome = tokio::select! {
            biased;
            _ = shutdown.cancelled() => return Err(RetryError::Cancelled),
            outcome = op() => outcome,
        };

        let err = match outcome {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };

        if attempt + 1 >= max_attempts {
            return Err(RetryError::Exhausted {
                attempts: max_attempts,
                last: err,
            });
        }

        let delay = compute_backoff_delay(attempt, policy);
        debug!(
            attempt = attempt + 1,
            delay_ms = delay.as_millis() as u64,
            error = %err,
            "retrying operation"
        );

        tokio::select! {
            biased;
            _ = shutdown.cancelled() => return Err(RetryError::Cancelled),
            _ = tokio::time::sleep(delay) => {}
        }
        attempt += 1;
    }
}
