//! Request orchestration core for Xerobot.
//!
//! Backend-agnostic pieces shared by every job: bounded backoff, the process
//! wide quota tracker, quota-guarded calls, and checkpointed mention
//! processing. Nothing here speaks HTTP.

pub mod clock;
mod cursor;
mod error;
mod guard;
mod mentions;
mod quota;
mod retry;
mod traits;
mod types;

pub use clock::{Clock, ManualClock, SystemClock};
pub use cursor::{CURSOR_FILE_NAME, FileCursorStore, MemoryCursorStore};
pub use error::CycleError;
pub use guard::{GuardedInvoker, quota_wait};
pub use mentions::{
    CycleOutcome, CycleReport, DEFAULT_FALLBACK_REPLY, DEFAULT_PROMPT_TEMPLATE, MentionProcessor,
    MentionSettings,
};
pub use quota::{Metered, QuotaAware, QuotaExceeded, QuotaMetadata, QuotaState, QuotaTracker};
pub use retry::{RetryPolicy, retry_with_backoff};
pub use traits::{CursorStore, SocialBackend, TextGenerator};
pub use types::{Mention, MentionId, MentionPage, PostId, PostReceipt};
