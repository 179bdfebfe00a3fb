use crate::quota::{Metered, QuotaAware};
use crate::types::{MentionId, MentionPage, PostReceipt};
use anyhow::Result;
use async_trait::async_trait;
use std::fmt::Display;

/// Rate-limited social backend: posting, replying and reading mentions.
#[async_trait]
pub trait SocialBackend: Send + Sync {
    type Error: QuotaAware + Display + Send + Sync + 'static;

    /// Publish a standalone post. Implementations truncate to the backend's
    /// maximum length.
    async fn post(&self, text: &str) -> std::result::Result<Metered<PostReceipt>, Self::Error>;

    /// Reply to the item identified by `in_reply_to`.
    async fn reply(
        &self,
        text: &str,
        in_reply_to: &MentionId,
    ) -> std::result::Result<Metered<PostReceipt>, Self::Error>;

    /// Mentions strictly after `cursor` (all available when `None`), oldest
    /// first, at most `page_size` of them.
    async fn mentions_after(
        &self,
        cursor: Option<&MentionId>,
        page_size: usize,
    ) -> std::result::Result<Metered<MentionPage>, Self::Error>;
}

/// Text-generation collaborator. Callers never let its failures escape.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String>;
}

/// Durable single-value checkpoint for the mention stream.
#[async_trait]
pub trait CursorStore: Send + Sync {
    /// Last committed id; `None` when nothing has been processed yet.
    async fn load(&self) -> Result<Option<MentionId>>;

    /// Overwrite the committed id.
    async fn store(&self, id: &MentionId) -> Result<()>;
}
