use chrono::{DateTime, Utc};
use thiserror::Error;
use xero_core::{QuotaAware, QuotaExceeded, QuotaMetadata};

pub type Result<T> = std::result::Result<T, SocialError>;

#[derive(Debug, Error)]
pub enum SocialError {
    /// HTTP 429. `reset_at` comes from `x-rate-limit-reset` when present.
    #[error("rate limited (reset_at={reset_at:?})")]
    RateLimited {
        reset_at: Option<DateTime<Utc>>,
        quota: QuotaMetadata,
    },

    #[error("http status={status} body={body}")]
    Http { status: u16, body: String },

    #[error("network error: {0}")]
    Network(String),

    #[error("unexpected response format: {0}")]
    ResponseFormat(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),
}

impl QuotaAware for SocialError {
    fn quota_exceeded(&self) -> Option<QuotaExceeded> {
        match self {
            Self::RateLimited { reset_at, quota } => Some(QuotaExceeded {
                reset_at: *reset_at,
                quota: Some(*quota),
            }),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for SocialError {
    fn from(e: reqwest::Error) -> Self {
        Self::Network(e.to_string())
    }
}

impl From<serde_json::Error> for SocialError {
    fn from(e: serde_json::Error) -> Self {
        Self::ResponseFormat(e.to_string())
    }
}
