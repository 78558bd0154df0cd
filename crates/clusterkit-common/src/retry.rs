//! Bounded retry with cancellation.
//!
//! Applying a resource to a freshly provisioned cluster fails transiently
//! while API groups register and admission webhooks come up, so every apply
//! runs inside a retry loop. The defaults (six attempts, ten seconds apart)
//! give a slow cluster roughly a minute to settle.
//!
//! # Example
//!
//! ```ignore
//! use clusterkit_common::retry::RetryPolicy;
//!
//! let policy = RetryPolicy::default();
//! let value = policy
//!     .run("apply open-policy-agent", &cancel, || async { apply().await })
//!     .await?;
//! ```

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{error, warn};

use crate::Error;

/// Default number of attempts for one resource
pub const DEFAULT_MAX_ATTEMPTS: u32 = 6;
/// Default pause between attempts
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(10);

/// Errors that the retry loop can classify.
pub trait RetryableError: std::fmt::Display {
    /// Whether another attempt could succeed
    fn is_retryable(&self) -> bool;
    /// Build the error returned when the caller cancels
    fn cancelled(operation: &str) -> Self;
}

impl RetryableError for Error {
    fn is_retryable(&self) -> bool {
        Error::is_retryable(self)
    }

    fn cancelled(operation: &str) -> Self {
        Error::Cancelled {
            operation: operation.to_string(),
        }
    }
}

/// How the delay between attempts evolves
#[derive(Clone, Debug, PartialEq)]
pub enum Backoff {
    /// Same delay before every retry
    Fixed,
    /// Multiply the delay after each failure, capped at `max_delay`
    Exponential {
        /// Factor applied after every failed attempt
        multiplier: f64,
        /// Upper bound on the delay
        max_delay: Duration,
    },
}

/// Retry policy for a single unit of work.
#[derive(Clone, Debug, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts including the first one (minimum 1)
    pub max_attempts: u32,
    /// Delay before the first retry
    pub delay: Duration,
    /// Delay growth strategy
    pub backoff: Backoff,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            delay: DEFAULT_RETRY_DELAY,
            backoff: Backoff::Fixed,
        }
    }
}

impl RetryPolicy {
    /// Fixed-delay policy with the given attempt budget
    pub fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            delay,
            backoff: Backoff::Fixed,
        }
    }

    /// Policy that never retries
    pub fn once() -> Self {
        Self::fixed(1, Duration::ZERO)
    }

    fn next_delay(&self, current: Duration) -> Duration {
        match &self.backoff {
            Backoff::Fixed => current,
            Backoff::Exponential {
                multiplier,
                max_delay,
            } => Duration::from_secs_f64(
                (current.as_secs_f64() * multiplier).min(max_delay.as_secs_f64()),
            ),
        }
    }

    /// Run `operation` until it succeeds, fails with a non-retryable error,
    /// exhausts the attempt budget, or `cancel` fires.
    ///
    /// Returns the last error on exhaustion. Cancellation interrupts both an
    /// in-flight attempt and the pause between attempts.
    pub async fn run<F, Fut, T, E>(
        &self,
        operation_name: &str,
        cancel: &CancellationToken,
        mut operation: F,
    ) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: RetryableError,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut delay = self.delay;
        let mut attempt = 0u32;

        loop {
            attempt += 1;

            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(E::cancelled(operation_name)),
                outcome = operation() => outcome,
            };

            let e = match outcome {
                Ok(value) => return Ok(value),
                Err(e) => e,
            };

            if !e.is_retryable() {
                error!(
                    operation = %operation_name,
                    attempt = attempt,
                    error = %e,
                    "Operation failed with a non-retryable error"
                );
                return Err(e);
            }

            if attempt >= max_attempts {
                error!(
                    operation = %operation_name,
                    attempt = attempt,
                    error = %e,
                    "Operation failed after max retries"
                );
                return Err(e);
            }

            warn!(
                operation = %operation_name,
                attempt = attempt,
                error = %e,
                delay_ms = delay.as_millis(),
                "Operation failed, retrying"
            );

            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(E::cancelled(operation_name)),
                _ = tokio::time::sleep(delay) => {}
            }

            delay = self.next_delay(delay);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn succeeds_immediately() {
        let cancel = CancellationToken::new();
        let result: Result<i32, Error> = RetryPolicy::default()
            .run("op", &cancel, || async { Ok(42) })
            .await;
        assert_eq!(result.unwrap(), 42);
    }

    #[tokio::test(start_paused = true)]
    async fn succeeds_after_transient_failures() {
        let count = Arc::new(AtomicU32::new(0));
        let c = count.clone();
        let cancel = CancellationToken::new();

        let result: Result<&str, Error> = RetryPolicy::default()
            .run("op", &cancel, || {
                let c = c.clone();
                async move {
                    if c.fetch_add(1, Ordering::SeqCst) < 2 {
                        Err(Error::not_found("ConfigMap default/x"))
                    } else {
                        Ok("done")
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), "done");
        assert_eq!(count.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn exhausts_six_attempts_ten_seconds_apart() {
        let count = Arc::new(AtomicU32::new(0));
        let c = count.clone();
        let cancel = CancellationToken::new();
        let start = tokio::time::Instant::now();

        let result: Result<(), Error> = RetryPolicy::default()
            .run("op", &cancel, || {
                let c = c.clone();
                async move {
                    c.fetch_add(1, Ordering::SeqCst);
                    Err(Error::internal("still down"))
                }
            })
            .await;

        assert!(result.is_err());
        assert_eq!(count.load(Ordering::SeqCst), 6);
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_secs(50));
        assert!(elapsed < Duration::from_secs(51));
    }

    #[tokio::test]
    async fn non_retryable_error_stops_immediately() {
        let count = Arc::new(AtomicU32::new(0));
        let c = count.clone();
        let cancel = CancellationToken::new();

        let result: Result<(), Error> = RetryPolicy::default()
            .run("op", &cancel, || {
                let c = c.clone();
                async move {
                    c.fetch_add(1, Ordering::SeqCst);
                    Err(Error::render("opa", "undefined value"))
                }
            })
            .await;

        assert!(matches!(result, Err(Error::Render { .. })));
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_interrupts_the_pause() {
        let count = Arc::new(AtomicU32::new(0));
        let c = count.clone();
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(15)).await;
            trigger.cancel();
        });

        let result: Result<(), Error> = RetryPolicy::default()
            .run("apply", &cancel, || {
                let c = c.clone();
                async move {
                    c.fetch_add(1, Ordering::SeqCst);
                    Err(Error::internal("down"))
                }
            })
            .await;

        assert!(matches!(result, Err(Error::Cancelled { .. })));
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn already_cancelled_token_skips_the_operation() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let count = Arc::new(AtomicU32::new(0));
        let c = count.clone();

        let result: Result<(), Error> = RetryPolicy::default()
            .run("apply", &cancel, || {
                let c = c.clone();
                async move {
                    c.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }
            })
            .await;

        assert!(matches!(result, Err(Error::Cancelled { .. })));
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn exponential_backoff_is_capped() {
        let policy = RetryPolicy {
            max_attempts: 5,
            delay: Duration::from_secs(1),
            backoff: Backoff::Exponential {
                multiplier: 4.0,
                max_delay: Duration::from_secs(10),
            },
        };
        let d = policy.next_delay(Duration::from_secs(1));
        assert_eq!(d, Duration::from_secs(4));
        assert_eq!(policy.next_delay(d), Duration::from_secs(10));
    }

    #[test]
    fn fixed_backoff_keeps_the_delay() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.next_delay(DEFAULT_RETRY_DELAY), DEFAULT_RETRY_DELAY);
    }
}
