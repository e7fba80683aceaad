//! Bounded retry with per-attempt timeouts for upstream calls.
//!
//! Each upstream call carries its own timeout. The attempt guard here sits
//! above them and is sized for every call one attempt makes.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tracing::warn;

use crate::error::{MigrationError, MigrationResult, UpstreamFault, UpstreamService};

/// Sequential upstream calls in one attempt: role assumption, the directory
/// call, and the profile read that follows it.
pub const CALLS_PER_ATTEMPT: u32 = 3;

const ATTEMPT_GUARD_MARGIN: Duration = Duration::from_millis(250);

/// Retry behavior for legacy directory calls.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// Delay before the first retry.
    pub initial_delay: Duration,
    /// Upper bound on any single delay.
    pub max_delay: Duration,
    /// Multiplier for exponential backoff.
    pub backoff_multiplier: f64,
    /// Whether to add up to 25% jitter to delays.
    pub jitter: bool,
    /// Guard over one whole attempt, not a single call.
    pub attempt_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 1,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(1),
            backoff_multiplier: 2.0,
            jitter: true,
            attempt_timeout: attempt_budget(Duration::from_secs(2)),
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    #[must_use]
    pub fn no_retry(attempt_timeout: Duration) -> Self {
        Self {
            max_retries: 0,
            attempt_timeout,
            ..Self::default()
        }
    }

    /// Size the attempt guard for [`CALLS_PER_ATTEMPT`] calls of at most
    /// `call_timeout` each.
    #[must_use]
    pub fn with_call_timeout(mut self, call_timeout: Duration) -> Self {
        self.attempt_timeout = attempt_budget(call_timeout);
        self
    }

    /// Delay before retry number `attempt + 1` (0-indexed).
    pub fn calculate_delay(&self, attempt: u32) -> Duration {
        let base_delay = self.initial_delay.as_millis() as f64
            * self.backoff_multiplier.powi(attempt as i32);

        let delay_ms = base_delay.min(self.max_delay.as_millis() as f64);

        let final_delay = if self.jitter {
            let jitter_factor = 1.0 + rand::thread_rng().gen_range(0.0..0.25);
            delay_ms * jitter_factor
        } else {
            delay_ms
        };

        Duration::from_millis(final_delay as u64)
    }

    /// Run `operation` until it succeeds, fails permanently, or the retry
    /// budget is spent.
    ///
    /// An attempt exceeding `attempt_timeout` is abandoned and counts as
    /// `UpstreamUnavailable(Timeout)` for `service`.
    pub async fn execute<F, Fut, T>(
        &self,
        service: UpstreamService,
        mut operation: F,
    ) -> MigrationResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = MigrationResult<T>>,
    {
        let mut attempt = 0;
        loop {
            let result = match tokio::time::timeout(self.attempt_timeout, operation()).await {
                Ok(result) => result,
                Err(_) => Err(MigrationError::upstream(service, UpstreamFault::Timeout)),
            };

            match result {
                Ok(value) => return Ok(value),
                Err(e) if e.is_transient() && attempt < self.max_retries => {
                    let delay = self.calculate_delay(attempt);
                    warn!(
                        attempt = attempt + 1,
                        max_retries = self.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Retrying after transient upstream error"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// Time one attempt may take when each of its calls uses its full timeout.
pub fn attempt_budget(call_timeout: Duration) -> Duration {
    call_timeout * CALLS_PER_ATTEMPT + ATTEMPT_GUARD_MARGIN
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn fast_policy(max_retries: u32) -> RetryPolicy {
        RetryPolicy {
            max_retries,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(10),
            backoff_multiplier: 2.0,
            jitter: false,
            attempt_timeout: Duration::from_secs(1),
        }
    }

    fn unavailable() -> MigrationError {
        MigrationError::upstream(UpstreamService::Authentication, UpstreamFault::Transport)
    }

    #[tokio::test]
    async fn test_succeeds_first_try() {
        let policy = fast_policy(1);
        let calls = AtomicUsize::new(0);

        let result = policy
            .execute(UpstreamService::Authentication, || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Ok::<_, MigrationError>(42) }
            })
            .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_retries_transient_then_succeeds() {
        let policy = fast_policy(1);
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = calls.clone();

        let result = policy
            .execute(UpstreamService::Authentication, move || {
                let n = calls_clone.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n == 0 {
                        Err(unavailable())
                    } else {
                        Ok("profile")
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), "profile");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_retry_ceiling_is_respected() {
        let policy = fast_policy(1);
        let calls = AtomicUsize::new(0);

        let result: MigrationResult<()> = policy
            .execute(UpstreamService::Authentication, || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(unavailable()) }
            })
            .await;

        assert_eq!(result.unwrap_err(), unavailable());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_permanent_errors_are_not_retried() {
        let policy = fast_policy(3);

        for permanent in [
            MigrationError::InvalidCredentials,
            MigrationError::NotFound,
            MigrationError::IncompleteProfile { attribute: "email" },
        ] {
            let calls = AtomicUsize::new(0);
            let result: MigrationResult<()> = policy
                .execute(UpstreamService::Authentication, || {
                    calls.fetch_add(1, Ordering::SeqCst);
                    let err = permanent.clone();
                    async move { Err(err) }
                })
                .await;
            assert_eq!(result.unwrap_err(), permanent);
            assert_eq!(calls.load(Ordering::SeqCst), 1);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_hung_attempts_time_out_and_count() {
        let policy = RetryPolicy {
            attempt_timeout: Duration::from_secs(2),
            ..fast_policy(1)
        };
        let calls = AtomicUsize::new(0);

        let result: MigrationResult<()> = policy
            .execute(UpstreamService::Lookup, || {
                calls.fetch_add(1, Ordering::SeqCst);
                async {
                    tokio::time::sleep(Duration::from_secs(60)).await;
                    Ok(())
                }
            })
            .await;

        assert_eq!(
            result.unwrap_err(),
            MigrationError::upstream(UpstreamService::Lookup, UpstreamFault::Timeout)
        );
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_attempt_guard_covers_every_call() {
        let policy = RetryPolicy::default().with_call_timeout(Duration::from_millis(1500));
        assert_eq!(policy.attempt_timeout, Duration::from_millis(4750));
        assert_eq!(
            RetryPolicy::default().attempt_timeout,
            Duration::from_millis(6250)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_calls_within_their_budget_finish() {
        let call_timeout = Duration::from_secs(2);
        let policy = fast_policy(1).with_call_timeout(call_timeout);
        let calls = AtomicUsize::new(0);

        // Three sequential calls, each well inside its own timeout.
        let result = policy
            .execute(UpstreamService::Authentication, || {
                calls.fetch_add(1, Ordering::SeqCst);
                async {
                    for _ in 0..CALLS_PER_ATTEMPT {
                        tokio::time::sleep(Duration::from_millis(1900)).await;
                    }
                    Ok::<_, MigrationError>("profile")
                }
            })
            .await;

        assert_eq!(result.unwrap(), "profile");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_calculate_delay_exponential_backoff() {
        let policy = RetryPolicy {
            max_retries: 5,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(10),
            backoff_multiplier: 2.0,
            jitter: false,
            attempt_timeout: Duration::from_secs(1),
        };

        assert_eq!(policy.calculate_delay(0), Duration::from_millis(100));
        assert_eq!(policy.calculate_delay(1), Duration::from_millis(200));
        assert_eq!(policy.calculate_delay(2), Duration::from_millis(400));
    }

    #[test]
    fn test_calculate_delay_respects_max_and_jitter_bound() {
        let policy = RetryPolicy {
            max_retries: 10,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(500),
            backoff_multiplier: 2.0,
            jitter: true,
            attempt_timeout: Duration::from_secs(1),
        };

        let delay = policy.calculate_delay(5);
        assert!(delay >= Duration::from_millis(500));
        assert!(delay <= Duration::from_millis(625));
    }
}
