//! Checkpointed mention processing.
//!
//! One `run_cycle` call is one pass of
//! `LOAD_CURSOR -> FETCH -> (EMPTY | ITERATE) -> DONE`, where every item in
//! `ITERATE` goes through `GENERATE -> REPLY -> COMMIT`. The durable cursor is
//! written after each successful reply, before the next item is touched, so an
//! interruption at any point resumes from the last committed reply.

use crate::clock::Clock;
use crate::error::CycleError;
use crate::guard::GuardedInvoker;
use crate::quota::QuotaAware;
use crate::retry::RetryPolicy;
use crate::traits::{CursorStore, SocialBackend, TextGenerator};
use crate::types::{Mention, MentionId};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

pub const DEFAULT_PROMPT_TEMPLATE: &str =
    "Please provide a brief, friendly response to this tweet: {text}";
pub const DEFAULT_FALLBACK_REPLY: &str =
    "Thanks for reaching out! I'm having trouble putting a reply together right now.";

#[derive(Debug, Clone)]
pub struct MentionSettings {
    /// Upper bound on mentions handled per cycle.
    pub page_size: usize,
    /// Pause after every successful reply.
    pub pacing: Duration,
    /// Prompt sent to the text generator; `{text}` is replaced by the mention body.
    pub prompt_template: String,
    /// Reply used when generation fails or yields nothing.
    pub fallback_reply: String,
    pub retry: RetryPolicy,
}

impl Default for MentionSettings {
    fn default() -> Self {
        Self {
            page_size: 3,
            pacing: Duration::from_secs(60),
            prompt_template: DEFAULT_PROMPT_TEMPLATE.to_string(),
            fallback_reply: DEFAULT_FALLBACK_REPLY.to_string(),
            retry: RetryPolicy::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Nothing new after the cursor.
    Empty,
    Completed,
    /// Another cycle of this processor was still running.
    Overlapped,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleReport {
    pub started_at: DateTime<Utc>,
    pub outcome: CycleOutcome,
    pub cursor_before: Option<MentionId>,
    /// In-memory cursor at the end of the cycle. Equals the durable cursor
    /// unless a commit failed.
    pub cursor_after: Option<MentionId>,
    pub fetched: usize,
    pub replied: Vec<MentionId>,
    pub skipped_seen: usize,
    pub skipped_malformed: usize,
    pub failed: usize,
    pub commit_failures: usize,
}

impl CycleReport {
    fn new(started_at: DateTime<Utc>, outcome: CycleOutcome, cursor: Option<MentionId>) -> Self {
        Self {
            started_at,
            outcome,
            cursor_before: cursor.clone(),
            cursor_after: cursor,
            fetched: 0,
            replied: Vec::new(),
            skipped_seen: 0,
            skipped_malformed: 0,
            failed: 0,
            commit_failures: 0,
        }
    }
}

pub struct MentionProcessor<B: SocialBackend> {
    backend: Arc<B>,
    generator: Arc<dyn TextGenerator>,
    cursor_store: Arc<dyn CursorStore>,
    invoker: GuardedInvoker,
    settings: MentionSettings,
    cycle_lock: Mutex<()>,
}

impl<B: SocialBackend> MentionProcessor<B> {
    pub fn new(
        backend: Arc<B>,
        generator: Arc<dyn TextGenerator>,
        cursor_store: Arc<dyn CursorStore>,
        invoker: GuardedInvoker,
        settings: MentionSettings,
    ) -> Self {
        Self {
            backend,
            generator,
            cursor_store,
            invoker,
            settings,
            cycle_lock: Mutex::new(()),
        }
    }

    pub fn settings(&self) -> &MentionSettings {
        &self.settings
    }

    fn clock(&self) -> &dyn Clock {
        self.invoker.clock().as_ref()
    }

    #[tracing::instrument(level = "info", skip_all)]
    pub async fn run_cycle(&self) -> Result<CycleReport, CycleError> {
        let started_at = self.clock().now();
        let Ok(_cycle) = self.cycle_lock.try_lock() else {
            tracing::warn!("previous mention cycle still running; skipping this one");
            return Ok(CycleReport::new(started_at, CycleOutcome::Overlapped, None));
        };

        let loaded = self
            .cursor_store
            .load()
            .await
            .map_err(|e| CycleError::CursorLoad(e.to_string()))?;
        tracing::info!(cursor = ?loaded.as_deref(), "mention cycle started");

        let page_size = self.settings.page_size.max(1);
        let page = self
            .invoker
            .call_with_retry(&self.settings.retry, "mentions.fetch", || {
                self.backend.mentions_after(loaded.as_ref(), page_size)
            })
            .await
            .map_err(|e| CycleError::Fetch(e.to_string()))?;

        let Some(mut mentions) = page.data else {
            tracing::error!(cursor = ?loaded.as_deref(), "mention fetch returned no data array");
            return Err(CycleError::MalformedPage);
        };

        let mut report = CycleReport::new(started_at, CycleOutcome::Completed, loaded);
        report.fetched = mentions.len();
        if mentions.is_empty() {
            tracing::info!("no new mentions to process");
            report.outcome = CycleOutcome::Empty;
            return Ok(report);
        }

        mentions.sort_by(|a, b| a.valid_id().cmp(&b.valid_id()));
        mentions.truncate(page_size);

        for mention in &mentions {
            self.process_mention(mention, &mut report).await;
        }

        tracing::info!(
            fetched = report.fetched,
            replied = report.replied.len(),
            skipped_seen = report.skipped_seen,
            skipped_malformed = report.skipped_malformed,
            failed = report.failed,
            commit_failures = report.commit_failures,
            cursor = ?report.cursor_after.as_deref(),
            "mention cycle finished"
        );
        Ok(report)
    }

    async fn process_mention(&self, mention: &Mention, report: &mut CycleReport) {
        let Some(id) = mention.valid_id().cloned() else {
            tracing::warn!(raw_id = ?mention.id, "mention without a usable id; skipping");
            report.skipped_malformed += 1;
            return;
        };
        if let Some(cursor) = report.cursor_after.as_ref() {
            if id <= *cursor {
                tracing::debug!(mention_id = %id, cursor = %cursor, "mention already handled");
                report.skipped_seen += 1;
                return;
            }
        }

        let reply_text = self.compose_reply(&id, mention).await;

        let posted = self
            .invoker
            .call_with_retry(&self.settings.retry, "mentions.reply", || {
                self.backend.reply(&reply_text, &id)
            })
            .await;

        match posted {
            Ok(receipt) => {
                tracing::info!(mention_id = %id, reply_id = %receipt.id, "replied to mention");
                report.replied.push(id.clone());
                report.cursor_after = Some(id.clone());
                if let Err(e) = self.cursor_store.store(&id).await {
                    report.commit_failures += 1;
                    tracing::error!(
                        mention_id = %id,
                        error = %e,
                        "cursor commit failed; mention may be fetched again next cycle"
                    );
                }
                self.clock().sleep(self.settings.pacing).await;
            }
            Err(error) => {
                report.failed += 1;
                tracing::error!(mention_id = %id, %error, "failed to reply to mention");
                // The guard waits out every rejection it classifies as
                // quota-exceeded; this catches ones classified so only on the way out.
                if let Some(signal) = error.quota_exceeded() {
                    let wait = self.invoker.wait_for(&signal);
                    tracing::warn!(?wait, "reply rejected by quota; waiting before next mention");
                    self.clock().sleep(wait).await;
                }
            }
        }
    }

    async fn compose_reply(&self, id: &MentionId, mention: &Mention) -> String {
        let prompt = self
            .settings
            .prompt_template
            .replace("{text}", &mention.text);
        match self.generator.generate(&prompt).await {
            Ok(text) if !text.trim().is_empty() => text.trim().to_string(),
            Ok(_) => {
                tracing::warn!(mention_id = %id, "text generator returned nothing; using fallback reply");
                self.settings.fallback_reply.clone()
            }
            Err(e) => {
                tracing::warn!(mention_id = %id, error = %e, "text generation failed; using fallback reply");
                self.settings.fallback_reply.clone()
            }
        }
    }
}
