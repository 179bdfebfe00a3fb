//! Process wiring: one quota tracker, one invoker, one bot, shared by every job.

use crate::config::XeroConfig;
use crate::generator::LlmReplyGenerator;
use crate::jobs::{Bot, JobKind, JobRunner};
use crate::scheduler::Scheduler;
use anyhow::Result;
use std::path::PathBuf;
use std::sync::Arc;
use xero_core::{
    Clock, CursorStore, FileCursorStore, GuardedInvoker, MemoryCursorStore, MentionProcessor,
    QuotaTracker, SocialBackend, SystemClock, TextGenerator,
};
use xero_feeds::{CoinGeckoClient, CryptoCompareClient};
use xero_llm::LlmClient;
use xero_social::{DryRunBackend, TwitterClient};

/// Build the job runner for `cfg`, with the live or dry-run backend.
pub async fn build_runner(cfg: &XeroConfig, clock: Arc<dyn Clock>) -> Result<Arc<dyn JobRunner>> {
    let tracker = Arc::new(QuotaTracker::with_budget(
        cfg.quota.default_budget,
        cfg.quota.window(),
        clock.now(),
        cfg.quota.reset_buffer(),
    ));
    let invoker = GuardedInvoker::new(clock, tracker, cfg.quota.fallback_wait());

    let llm = cfg.llm.api_key.as_deref().map(|key| {
        LlmClient::new(key, &cfg.llm.model).with_max_tokens(cfg.llm.max_tokens)
    });
    let generator = LlmReplyGenerator::new(llm);
    if !generator.is_configured() {
        tracing::warn!("no OpenAI API key; mention replies will use the fallback text");
    }
    let generator: Arc<dyn TextGenerator> = Arc::new(generator);

    let file_store = FileCursorStore::in_dir(&cfg.general.state_dir);
    if cfg.general.dry_run {
        // Dry runs read the durable cursor but never advance it.
        let seeded = file_store.load().await?;
        let cursor: Arc<dyn CursorStore> = Arc::new(MemoryCursorStore::new(seeded));
        let backend = Arc::new(DryRunBackend::new(cfg.twitter.max_post_chars));
        tracing::info!("dry run: nothing will be published");
        return Ok(bot(cfg, backend, invoker, generator, cursor));
    }

    let token = cfg
        .twitter
        .access_token
        .as_deref()
        .ok_or_else(|| anyhow::anyhow!("twitter.access_token is required"))?;
    let mut client = TwitterClient::new(token)?
        .with_base_url(cfg.twitter.api_base_url.clone())
        .with_max_post_chars(cfg.twitter.max_post_chars);
    if let Some(user_id) = cfg.twitter.user_id.as_deref() {
        client = client.with_user_id(user_id);
    }
    let cursor: Arc<dyn CursorStore> = Arc::new(file_store);
    Ok(bot(cfg, Arc::new(client), invoker, generator, cursor))
}

fn bot<B: SocialBackend + 'static>(
    cfg: &XeroConfig,
    backend: Arc<B>,
    invoker: GuardedInvoker,
    generator: Arc<dyn TextGenerator>,
    cursor: Arc<dyn CursorStore>,
) -> Arc<dyn JobRunner> {
    let retry = cfg.retry.policy();
    let mentions = MentionProcessor::new(
        backend.clone(),
        generator,
        cursor,
        invoker.clone(),
        cfg.mentions.settings(retry),
    );
    let bot = Bot::new(
        backend,
        invoker,
        retry,
        CoinGeckoClient::new(cfg.feeds.coingecko_base_url.clone()),
        CryptoCompareClient::new(
            cfg.feeds.cryptocompare_base_url.clone(),
            cfg.feeds.cryptocompare_api_key.clone(),
        ),
        mentions,
    )
    .with_items_per_post(cfg.feeds.items_per_post);
    Arc::new(bot)
}

#[tracing::instrument(level = "info", skip_all)]
pub async fn serve(config_path: Option<PathBuf>) -> Result<()> {
    let cfg = XeroConfig::load(config_path).await?;
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let runner = build_runner(&cfg, clock.clone()).await?;
    let scheduler = Scheduler::new(runner, clock);

    let mut spawned = 0_usize;
    for (kind, schedule) in cfg.schedule.enabled() {
        scheduler.spawn_job(kind, schedule.trigger.clone()).await?;
        spawned += 1;
    }
    if spawned == 0 {
        return Err(anyhow::anyhow!("no jobs enabled in [schedule]"));
    }
    tracing::info!(jobs = spawned, dry_run = cfg.general.dry_run, "xerobot started");

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutdown signal received");
    scheduler.shutdown().await;

    let status = scheduler.status().await;
    tracing::info!(status = %serde_json::to_string(&status)?, "final job status");
    Ok(())
}

pub async fn run_once(config_path: Option<PathBuf>, kind: JobKind) -> Result<()> {
    let cfg = XeroConfig::load(config_path).await?;
    let runner = build_runner(&cfg, Arc::new(SystemClock)).await?;
    let outcome = runner.run(kind).await?;
    println!("{}", serde_json::to_string_pretty(&outcome)?);
    Ok(())
}

pub async fn doctor(config_path: Option<PathBuf>) -> Result<()> {
    let cfg = XeroConfig::load(config_path).await?;
    let store = FileCursorStore::in_dir(&cfg.general.state_dir);
    let cursor = store.load().await?;
    let now = chrono::Utc::now();

    println!("config: ok");
    println!("dry_run: {}", cfg.general.dry_run);
    println!("state_dir: {}", cfg.general.state_dir.display());
    println!(
        "cursor: {}",
        cursor.as_deref().unwrap_or("none (all available mentions are new)")
    );
    println!("llm: {} (key configured: {})", cfg.llm.model, cfg.llm.api_key.is_some());
    for kind in JobKind::ALL {
        let schedule = cfg.schedule.get(kind);
        if !schedule.enabled {
            println!("job {kind}: disabled");
            continue;
        }
        let next = schedule.trigger.next_after(now)?;
        match next {
            Some(at) => println!("job {kind}: next run {at}"),
            None => println!("job {kind}: no future occurrences"),
        }
    }
    Ok(())
}

pub async fn show_cursor(config_path: Option<PathBuf>) -> Result<()> {
    let cfg = XeroConfig::load(config_path).await?;
    let store = FileCursorStore::in_dir(&cfg.general.state_dir);
    match store.load().await? {
        Some(id) => println!("{id}"),
        None => println!("none"),
    }
    Ok(())
}
