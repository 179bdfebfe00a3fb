//! Quota-guarded backend calls.
//!
//! Quota exhaustion is an expected, recoverable condition: the invoker waits
//! it out and calls again, with no bound on how many times. It is a separate
//! retry axis from the bounded [`retry_with_backoff`](crate::retry) attempts,
//! which only ever see the failures the invoker does not absorb.

use crate::clock::{self, Clock};
use crate::quota::{Metered, QuotaAware, QuotaExceeded, QuotaTracker};
use crate::retry::{self, RetryPolicy};
use chrono::{DateTime, Utc};
use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// Wait applied after a quota-exceeded rejection: until the server-reported
/// reset plus `buffer`, or `fallback` when no reset time was reported.
pub fn quota_wait(
    signal: &QuotaExceeded,
    now: DateTime<Utc>,
    buffer: Duration,
    fallback: Duration,
) -> Duration {
    match signal.reset_at {
        Some(reset_at) => clock::until(now, reset_at) + buffer,
        None => fallback,
    }
}

#[derive(Clone)]
pub struct GuardedInvoker {
    clock: Arc<dyn Clock>,
    tracker: Arc<QuotaTracker>,
    fallback_wait: Duration,
}

impl GuardedInvoker {
    pub fn new(clock: Arc<dyn Clock>, tracker: Arc<QuotaTracker>, fallback_wait: Duration) -> Self {
        Self {
            clock,
            tracker,
            fallback_wait,
        }
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub fn tracker(&self) -> &Arc<QuotaTracker> {
        &self.tracker
    }

    /// Wait for a quota-exceeded rejection, measured against the injected clock.
    pub fn wait_for(&self, signal: &QuotaExceeded) -> Duration {
        quota_wait(
            signal,
            self.clock.now(),
            self.tracker.reset_buffer(),
            self.fallback_wait,
        )
    }

    /// Invoke `op` once per loop iteration until it succeeds or fails with
    /// anything other than quota exhaustion.
    pub async fn call<T, E, F, Fut>(&self, label: &str, mut op: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<Metered<T>, E>>,
        E: QuotaAware + Display,
    {
        let mut quota_waits: u64 = 0;
        loop {
            if let Some(wait) = self.tracker.should_wait_before_call(self.clock.now()).await {
                tracing::info!(
                    label,
                    ?wait,
                    "request budget nearly exhausted; waiting for quota reset"
                );
                self.clock.sleep(wait).await;
            }

            match op().await {
                Ok(metered) => {
                    if let Some(quota) = metered.quota.as_ref() {
                        self.tracker.record_outcome(quota).await;
                    }
                    return Ok(metered.value);
                }
                Err(error) => {
                    let Some(signal) = error.quota_exceeded() else {
                        return Err(error);
                    };
                    if let Some(quota) = signal.quota.as_ref() {
                        self.tracker.record_outcome(quota).await;
                    }
                    quota_waits = quota_waits.saturating_add(1);
                    let wait = self.wait_for(&signal);
                    tracing::warn!(
                        label,
                        quota_waits,
                        ?wait,
                        reset_at = ?signal.reset_at,
                        %error,
                        "quota exceeded; waiting for reset before retrying"
                    );
                    self.clock.sleep(wait).await;
                }
            }
        }
    }

    /// [`call`](Self::call) wrapped in bounded exponential backoff for the
    /// failures the quota loop does not absorb.
    pub async fn call_with_retry<T, E, F, Fut>(
        &self,
        policy: &RetryPolicy,
        label: &str,
        op: F,
    ) -> Result<T, E>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<Metered<T>, E>>,
        E: QuotaAware + Display,
    {
        let op = &op;
        retry::retry_with_backoff(self.clock.as_ref(), policy, label, move || {
            self.call(label, op)
        })
        .await
    }
}
