use crate::compose;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use xero_core::{
    Clock, CycleOutcome, CycleReport, GuardedInvoker, MentionId, MentionProcessor, PostId,
    RetryPolicy, SocialBackend, retry_with_backoff,
};
use xero_feeds::{CoinGeckoClient, CryptoCompareClient};

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "snake_case")]
#[value(rename_all = "snake_case")]
pub enum JobKind {
    TopGainers,
    MarketTrends,
    CryptoNews,
    Mentions,
}

impl JobKind {
    pub const ALL: [JobKind; 4] = [
        JobKind::TopGainers,
        JobKind::MarketTrends,
        JobKind::CryptoNews,
        JobKind::Mentions,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            JobKind::TopGainers => "top_gainers",
            JobKind::MarketTrends => "market_trends",
            JobKind::CryptoNews => "crypto_news",
            JobKind::Mentions => "mentions",
        }
    }
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum JobOutcome {
    Posted {
        post_id: PostId,
        text: String,
    },
    NothingToPost,
    Mentions {
        overlapped: bool,
        fetched: usize,
        replied: Vec<MentionId>,
        failed: usize,
        commit_failures: usize,
        cursor: Option<MentionId>,
    },
}

impl From<CycleReport> for JobOutcome {
    fn from(report: CycleReport) -> Self {
        JobOutcome::Mentions {
            overlapped: report.outcome == CycleOutcome::Overlapped,
            fetched: report.fetched,
            replied: report.replied,
            failed: report.failed,
            commit_failures: report.commit_failures,
            cursor: report.cursor_after,
        }
    }
}

/// What the scheduler drives. One call is one complete job run.
#[async_trait]
pub trait JobRunner: Send + Sync {
    async fn run(&self, kind: JobKind) -> anyhow::Result<JobOutcome>;
}

/// The bot's four jobs over one social backend.
pub struct Bot<B: SocialBackend> {
    backend: Arc<B>,
    invoker: GuardedInvoker,
    retry: RetryPolicy,
    coingecko: CoinGeckoClient,
    cryptocompare: CryptoCompareClient,
    items_per_post: usize,
    mentions: MentionProcessor<B>,
}

impl<B: SocialBackend> Bot<B> {
    pub fn new(
        backend: Arc<B>,
        invoker: GuardedInvoker,
        retry: RetryPolicy,
        coingecko: CoinGeckoClient,
        cryptocompare: CryptoCompareClient,
        mentions: MentionProcessor<B>,
    ) -> Self {
        Self {
            backend,
            invoker,
            retry,
            coingecko,
            cryptocompare,
            items_per_post: 3,
            mentions,
        }
    }

    pub fn with_items_per_post(mut self, items_per_post: usize) -> Self {
        self.items_per_post = items_per_post.max(1);
        self
    }

    fn clock(&self) -> &dyn Clock {
        self.invoker.clock().as_ref()
    }

    async fn publish(&self, text: Option<String>) -> anyhow::Result<JobOutcome> {
        let Some(text) = text else {
            tracing::info!("nothing to post");
            return Ok(JobOutcome::NothingToPost);
        };
        let receipt = self
            .invoker
            .call_with_retry(&self.retry, "social.post", || self.backend.post(&text))
            .await
            .map_err(|e| anyhow::anyhow!("post failed: {e}"))?;
        tracing::info!(post_id = %receipt.id, "posted");
        Ok(JobOutcome::Posted {
            post_id: receipt.id,
            text: receipt.text,
        })
    }

    #[tracing::instrument(level = "info", skip_all)]
    pub async fn top_gainers(&self) -> anyhow::Result<JobOutcome> {
        let limit = self.items_per_post;
        let movers = retry_with_backoff(self.clock(), &self.retry, "feeds.top_gainers", || {
            self.coingecko.top_gainers(limit)
        })
        .await?;
        self.publish(compose::top_gainers(&movers, limit)).await
    }

    #[tracing::instrument(level = "info", skip_all)]
    pub async fn market_trends(&self) -> anyhow::Result<JobOutcome> {
        let overview = retry_with_backoff(self.clock(), &self.retry, "feeds.market_overview", || {
            self.coingecko.market_overview()
        })
        .await?;
        self.publish(compose::market_trends(&overview)).await
    }

    #[tracing::instrument(level = "info", skip_all)]
    pub async fn crypto_news(&self) -> anyhow::Result<JobOutcome> {
        let limit = self.items_per_post;
        let headlines = retry_with_backoff(self.clock(), &self.retry, "feeds.crypto_news", || {
            self.cryptocompare.latest_news(limit)
        })
        .await?;
        self.publish(compose::crypto_news(&headlines, limit)).await
    }

    #[tracing::instrument(level = "info", skip_all)]
    pub async fn reply_to_mentions(&self) -> anyhow::Result<JobOutcome> {
        let report = self.mentions.run_cycle().await?;
        Ok(report.into())
    }
}

#[async_trait]
impl<B: SocialBackend + 'static> JobRunner for Bot<B> {
    async fn run(&self, kind: JobKind) -> anyhow::Result<JobOutcome> {
        match kind {
            JobKind::TopGainers => self.top_gainers().await,
            JobKind::MarketTrends => self.market_trends().await,
            JobKind::CryptoNews => self.crypto_news().await,
            JobKind::Mentions => self.reply_to_mentions().await,
        }
    }
}
