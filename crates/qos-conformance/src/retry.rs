//! Bounded retry around a whole scenario attempt.
//!
//! Absorbs timing flakiness of external processes (start latency, scheduling).
//! Only errors for which [`ConformanceError::is_retryable`] holds are retried;
//! intermediate failures are logged and only the last one is returned,
//! together with the number of attempts spent.

use crate::error::ConformanceError;
use std::future::Future;
use tracing::warn;

/// An outcome plus the number of attempts it took.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attempted<T> {
    pub value: T,
    pub attempts: u32,
}

/// Runs `attempt` up to `max_attempts` times (at least once).
///
/// `attempt` receives the 1-based attempt number and must build everything it
/// needs from scratch.
///
/// # Errors
/// Returns the first non-retryable error, or the last error once the budget
/// is spent, with the attempt count that produced it.
pub async fn retry_on_failure<T, F, Fut>(
    label: &str,
    max_attempts: u32,
    mut attempt: F,
) -> Result<Attempted<T>, Attempted<ConformanceError>>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, ConformanceError>>,
{
    let max_attempts = max_attempts.max(1);
    let mut number = 1;
    loop {
        match attempt(number).await {
            Ok(value) => {
                return Ok(Attempted {
                    value,
                    attempts: number,
                })
            }
            Err(e) if e.is_retryable() && number < max_attempts => {
                warn!(
                    attempt = number,
                    max_attempts, "{label}: attempt failed, retrying: {e}"
                );
                number += 1;
            }
            Err(e) => {
                return Err(Attempted {
                    value: e,
                    attempts: number,
                })
            }
        }
    }
}
