use crate::error::{Result, SocialError};
use crate::twitter::{DEFAULT_MAX_POST_CHARS, truncate_chars};
use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use xero_core::{MentionId, MentionPage, Metered, PostId, PostReceipt, SocialBackend};

/// Backend that logs what it would publish and never touches the network.
/// The mention timeline is always empty.
#[derive(Debug)]
pub struct DryRunBackend {
    max_post_chars: usize,
    next_id: AtomicU64,
}

impl Default for DryRunBackend {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_POST_CHARS)
    }
}

impl DryRunBackend {
    pub fn new(max_post_chars: usize) -> Self {
        Self {
            max_post_chars: max_post_chars.max(1),
            next_id: AtomicU64::new(1),
        }
    }

    fn receipt(&self, text: &str) -> Metered<PostReceipt> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        Metered::unmetered(PostReceipt {
            id: PostId::new(format!("dry-run-{id}")),
            text: text.to_string(),
        })
    }
}

#[async_trait]
impl SocialBackend for DryRunBackend {
    type Error = SocialError;

    async fn post(&self, text: &str) -> Result<Metered<PostReceipt>> {
        let text = truncate_chars(text, self.max_post_chars);
        tracing::info!(%text, "dry run: would post");
        Ok(self.receipt(&text))
    }

    async fn reply(&self, text: &str, in_reply_to: &MentionId) -> Result<Metered<PostReceipt>> {
        let text = truncate_chars(text, self.max_post_chars);
        tracing::info!(%text, in_reply_to = %in_reply_to, "dry run: would reply");
        Ok(self.receipt(&text))
    }

    async fn mentions_after(
        &self,
        cursor: Option<&MentionId>,
        _page_size: usize,
    ) -> Result<Metered<MentionPage>> {
        tracing::debug!(cursor = ?cursor.map(|c| c.as_str()), "dry run: mention timeline is empty");
        Ok(Metered::unmetered(MentionPage::of(Vec::new())))
    }
}
