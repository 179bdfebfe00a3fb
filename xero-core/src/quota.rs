//! Process-wide request budget for a rate-limited backend.

use crate::clock;
use chrono::{DateTime, Utc};
use std::time::Duration;
use tokio::sync::RwLock;

/// Rate-limit metadata reported alongside a completed backend call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QuotaMetadata {
    pub limit: Option<u32>,
    pub remaining: Option<u32>,
    pub reset_at: Option<DateTime<Utc>>,
}

impl QuotaMetadata {
    /// Parse raw header values (`limit`, `remaining`, reset as epoch seconds).
    /// Values that do not parse are treated as absent.
    pub fn from_raw(limit: Option<&str>, remaining: Option<&str>, reset: Option<&str>) -> Self {
        let parse_u32 = |v: Option<&str>| v.and_then(|s| s.trim().parse::<u32>().ok());
        let reset_at = reset
            .and_then(|s| s.trim().parse::<i64>().ok())
            .and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0));
        Self {
            limit: parse_u32(limit),
            remaining: parse_u32(remaining),
            reset_at,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.limit.is_none() && self.remaining.is_none() && self.reset_at.is_none()
    }
}

/// A successful backend result together with the quota metadata its response
/// carried, if any.
#[derive(Debug, Clone)]
pub struct Metered<T> {
    pub value: T,
    pub quota: Option<QuotaMetadata>,
}

impl<T> Metered<T> {
    pub fn new(value: T, quota: Option<QuotaMetadata>) -> Self {
        Self { value, quota }
    }

    pub fn unmetered(value: T) -> Self {
        Self { value, quota: None }
    }
}

/// Details of a quota-exceeded rejection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QuotaExceeded {
    /// Server-reported reset time, when the rejection carried one.
    pub reset_at: Option<DateTime<Utc>>,
    pub quota: Option<QuotaMetadata>,
}

/// Classifies backend failures: `Some` marks a quota-exceeded rejection that is
/// recoverable by waiting, `None` everything else.
pub trait QuotaAware {
    fn quota_exceeded(&self) -> Option<QuotaExceeded>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuotaState {
    pub remaining: u32,
    pub reset_at: DateTime<Utc>,
}

/// Single owner of [`QuotaState`]; shared by reference through `Arc`.
#[derive(Debug)]
pub struct QuotaTracker {
    state: RwLock<QuotaState>,
    reset_buffer: Duration,
}

impl QuotaTracker {
    pub fn new(initial: QuotaState, reset_buffer: Duration) -> Self {
        Self {
            state: RwLock::new(initial),
            reset_buffer,
        }
    }

    /// Conservative starting state: `budget` requests in a window that closes
    /// `window` from `now`.
    pub fn with_budget(
        budget: u32,
        window: Duration,
        now: DateTime<Utc>,
        reset_buffer: Duration,
    ) -> Self {
        Self::new(
            QuotaState {
                remaining: budget,
                reset_at: clock::add_duration(now, window),
            },
            reset_buffer,
        )
    }

    pub fn reset_buffer(&self) -> Duration {
        self.reset_buffer
    }

    pub async fn snapshot(&self) -> QuotaState {
        *self.state.read().await
    }

    /// Pre-emptive check before issuing a request: with at most one request
    /// left and the window still open, wait until the reset (plus buffer).
    pub async fn should_wait_before_call(&self, now: DateTime<Utc>) -> Option<Duration> {
        let state = *self.state.read().await;
        if state.remaining > 1 || state.reset_at <= now {
            return None;
        }
        Some(clock::until(now, state.reset_at) + self.reset_buffer)
    }

    /// Overwrite the state from response metadata. Both `remaining` and
    /// `reset_at` must be present; anything partial is ignored.
    pub async fn record_outcome(&self, metadata: &QuotaMetadata) {
        let (Some(remaining), Some(reset_at)) = (metadata.remaining, metadata.reset_at) else {
            if !metadata.is_empty() {
                tracing::debug!(?metadata, "partial quota metadata ignored");
            }
            return;
        };
        let mut state = self.state.write().await;
        state.remaining = remaining;
        state.reset_at = reset_at;
        tracing::debug!(
            remaining,
            reset_at = %reset_at,
            limit = ?metadata.limit,
            "quota updated"
        );
    }
}
