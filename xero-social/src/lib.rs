//! X (Twitter) v2 client for Xerobot.
//!
//! Converts vendor responses into `xero_core` types and classifies failures
//! so the guarded invoker can tell quota exhaustion from everything else.

mod dry_run;
mod error;
mod twitter;

pub use dry_run::DryRunBackend;
pub use error::{Result, SocialError};
pub use twitter::{
    DEFAULT_API_BASE_URL, DEFAULT_MAX_POST_CHARS, TwitterClient, quota_from_headers,
    truncate_chars,
};
