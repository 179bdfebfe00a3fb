//! Bounded exponential backoff.
//!
//! The executor is oblivious to what it retries: every failure counts against
//! `max_attempts`, and the last failure is handed back exactly as the
//! operation produced it.

use crate::clock::Clock;
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(15),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            max_delay,
        }
    }

    /// Delay slept before attempt `attempt` (0-based). Attempt 0 runs
    /// immediately; attempt `i` waits `min(base * 2^(i-1), max)`.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        let exponent = (attempt - 1).min(31);
        let multiplier = 1_u32 << exponent;
        self.base_delay
            .checked_mul(multiplier)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }
}

/// Run `op` until it succeeds or `policy.max_attempts` attempts have failed.
pub async fn retry_with_backoff<T, E, F, Fut>(
    clock: &dyn Clock,
    policy: &RetryPolicy,
    label: &str,
    mut op: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt: u32 = 0;
    loop {
        match op().await {
            Ok(value) => {
                if attempt > 0 {
                    tracing::info!(label, attempts = attempt + 1, "operation succeeded after retry");
                }
                return Ok(value);
            }
            Err(error) => {
                attempt += 1;
                if attempt >= max_attempts {
                    tracing::warn!(
                        label,
                        attempts = attempt,
                        %error,
                        "operation failed; retry budget exhausted"
                    );
                    return Err(error);
                }
                let delay = policy.delay_for_attempt(attempt);
                tracing::warn!(
                    label,
                    attempt,
                    max_attempts,
                    ?delay,
                    %error,
                    "operation failed; retrying with backoff"
                );
                clock.sleep(delay).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use chrono::Utc;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[derive(Debug, PartialEq, Eq)]
    enum FakeError {
        Timeout(u32),
    }

    impl Display for FakeError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            match self {
                FakeError::Timeout(n) => write!(f, "timeout #{n}"),
            }
        }
    }

    fn policy() -> RetryPolicy {
        RetryPolicy::new(3, Duration::from_secs(1), Duration::from_secs(15))
    }

    #[test]
    fn delay_schedule_doubles_and_caps() {
        let p = policy();
        assert_eq!(p.delay_for_attempt(0), Duration::ZERO);
        assert_eq!(p.delay_for_attempt(1), Duration::from_secs(1));
        assert_eq!(p.delay_for_attempt(2), Duration::from_secs(2));
        assert_eq!(p.delay_for_attempt(3), Duration::from_secs(4));
        assert_eq!(p.delay_for_attempt(4), Duration::from_secs(8));
        assert_eq!(p.delay_for_attempt(5), Duration::from_secs(15));
        assert_eq!(p.delay_for_attempt(60), Duration::from_secs(15));
    }

    #[test]
    fn zero_attempts_is_clamped_to_one() {
        let p = RetryPolicy::new(0, Duration::from_secs(1), Duration::from_secs(2));
        assert_eq!(p.max_attempts, 1);
    }

    #[tokio::test]
    async fn fail_twice_then_succeed_sleeps_one_then_two_seconds() {
        let clock = ManualClock::new(Utc::now());
        let calls = AtomicU32::new(0);

        let result: Result<&str, FakeError> = retry_with_backoff(&clock, &policy(), "test", || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(FakeError::Timeout(n))
                } else {
                    Ok("posted")
                }
            }
        })
        .await;

        assert_eq!(result, Ok("posted"));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(
            clock.sleeps(),
            vec![Duration::from_secs(1), Duration::from_secs(2)]
        );
    }

    #[tokio::test]
    async fn always_failing_operation_runs_exactly_max_attempts_and_keeps_last_error() {
        let clock = ManualClock::new(Utc::now());
        let calls = AtomicU32::new(0);

        let result: Result<(), FakeError> = retry_with_backoff(&clock, &policy(), "test", || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move { Err(FakeError::Timeout(n)) }
        })
        .await;

        assert_eq!(result, Err(FakeError::Timeout(2)));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(
            clock.sleeps(),
            vec![Duration::from_secs(1), Duration::from_secs(2)]
        );
    }

    #[tokio::test]
    async fn first_try_success_never_sleeps() {
        let clock = ManualClock::new(Utc::now());
        let result: Result<u8, FakeError> =
            retry_with_backoff(&clock, &policy(), "test", || async { Ok(7) }).await;
        assert_eq!(result, Ok(7));
        assert!(clock.sleeps().is_empty());
    }
}
