//! Xerobot configuration loader.
//!
//! TOML file first, then environment overrides, then validation. Every
//! section is optional so a bare environment is enough to run.

use crate::jobs::JobKind;
use crate::scheduler::JobTrigger;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use xero_core::{DEFAULT_FALLBACK_REPLY, DEFAULT_PROMPT_TEMPLATE, MentionSettings, RetryPolicy};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct XeroConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub twitter: TwitterConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub feeds: FeedsConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub quota: QuotaConfig,
    #[serde(default)]
    pub mentions: MentionsConfig,
    #[serde(default)]
    pub schedule: ScheduleConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GeneralConfig {
    /// Directory holding the mention cursor file.
    #[serde(default = "default_state_dir")]
    pub state_dir: PathBuf,
    /// Log posts and replies instead of publishing them.
    #[serde(default)]
    pub dry_run: bool,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            state_dir: default_state_dir(),
            dry_run: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TwitterConfig {
    /// OAuth 2.0 user access token with `tweet.read tweet.write users.read`.
    #[serde(default)]
    pub access_token: Option<String>,
    /// Numeric id of the bot account, used for the mention timeline.
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default = "default_twitter_api_base_url")]
    pub api_base_url: String,
    #[serde(default = "default_max_post_chars")]
    pub max_post_chars: usize,
}

fn default_twitter_api_base_url() -> String {
    xero_social::DEFAULT_API_BASE_URL.to_string()
}

fn default_max_post_chars() -> usize {
    xero_social::DEFAULT_MAX_POST_CHARS
}

impl Default for TwitterConfig {
    fn default() -> Self {
        Self {
            access_token: None,
            user_id: None,
            api_base_url: default_twitter_api_base_url(),
            max_post_chars: default_max_post_chars(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LlmConfig {
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_llm_model")]
    pub model: String,
    #[serde(default = "default_llm_max_tokens")]
    pub max_tokens: u32,
}

fn default_llm_model() -> String {
    xero_llm::DEFAULT_MODEL.to_string()
}

fn default_llm_max_tokens() -> u32 {
    xero_llm::DEFAULT_MAX_TOKENS
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: default_llm_model(),
            max_tokens: default_llm_max_tokens(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct FeedsConfig {
    #[serde(default = "default_coingecko_base_url")]
    pub coingecko_base_url: String,
    #[serde(default = "default_cryptocompare_base_url")]
    pub cryptocompare_base_url: String,
    #[serde(default)]
    pub cryptocompare_api_key: Option<String>,
    #[serde(default = "default_items_per_post")]
    pub items_per_post: usize,
}

fn default_coingecko_base_url() -> String {
    xero_feeds::DEFAULT_COINGECKO_BASE_URL.to_string()
}

fn default_cryptocompare_base_url() -> String {
    xero_feeds::DEFAULT_CRYPTOCOMPARE_BASE_URL.to_string()
}

fn default_items_per_post() -> usize {
    3
}

impl Default for FeedsConfig {
    fn default() -> Self {
        Self {
            coingecko_base_url: default_coingecko_base_url(),
            cryptocompare_base_url: default_cryptocompare_base_url(),
            cryptocompare_api_key: None,
            items_per_post: default_items_per_post(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

fn default_max_attempts() -> u32 {
    3
}

fn default_base_delay_ms() -> u64 {
    1_000
}

fn default_max_delay_ms() -> u64 {
    15_000
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

impl RetryConfig {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.max_attempts,
            Duration::from_millis(self.base_delay_ms),
            Duration::from_millis(self.max_delay_ms),
        )
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct QuotaConfig {
    /// Requests assumed available before the first response reports real numbers.
    #[serde(default = "default_quota_budget")]
    pub default_budget: u32,
    #[serde(default = "default_quota_window_seconds")]
    pub window_seconds: u64,
    /// Added to every wait for a reset, to absorb clock skew.
    #[serde(default = "default_reset_buffer_ms")]
    pub reset_buffer_ms: u64,
    /// Wait after a rejection that reported no reset time.
    #[serde(default = "default_fallback_wait_seconds")]
    pub fallback_wait_seconds: u64,
}

fn default_quota_budget() -> u32 {
    15
}

fn default_quota_window_seconds() -> u64 {
    15 * 60
}

fn default_reset_buffer_ms() -> u64 {
    1_000
}

fn default_fallback_wait_seconds() -> u64 {
    15 * 60
}

impl Default for QuotaConfig {
    fn default() -> Self {
        Self {
            default_budget: default_quota_budget(),
            window_seconds: default_quota_window_seconds(),
            reset_buffer_ms: default_reset_buffer_ms(),
            fallback_wait_seconds: default_fallback_wait_seconds(),
        }
    }
}

impl QuotaConfig {
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_seconds)
    }

    pub fn reset_buffer(&self) -> Duration {
        Duration::from_millis(self.reset_buffer_ms)
    }

    pub fn fallback_wait(&self) -> Duration {
        Duration::from_secs(self.fallback_wait_seconds)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MentionsConfig {
    #[serde(default = "default_page_size")]
    pub page_size: usize,
    #[serde(default = "default_pacing_ms")]
    pub pacing_ms: u64,
    #[serde(default = "default_prompt_template")]
    pub prompt_template: String,
    #[serde(default = "default_fallback_reply")]
    pub fallback_reply: String,
}

fn default_page_size() -> usize {
    3
}

fn default_pacing_ms() -> u64 {
    60_000
}

fn default_prompt_template() -> String {
    DEFAULT_PROMPT_TEMPLATE.to_string()
}

fn default_fallback_reply() -> String {
    DEFAULT_FALLBACK_REPLY.to_string()
}

impl Default for MentionsConfig {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
            pacing_ms: default_pacing_ms(),
            prompt_template: default_prompt_template(),
            fallback_reply: default_fallback_reply(),
        }
    }
}

impl MentionsConfig {
    pub fn settings(&self, retry: RetryPolicy) -> MentionSettings {
        MentionSettings {
            page_size: self.page_size,
            pacing: Duration::from_millis(self.pacing_ms),
            prompt_template: self.prompt_template.clone(),
            fallback_reply: self.fallback_reply.clone(),
            retry,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct JobSchedule {
    #[serde(default = "default_job_enabled")]
    pub enabled: bool,
    pub trigger: JobTrigger,
}

fn default_job_enabled() -> bool {
    true
}

impl JobSchedule {
    fn cron(expression: &str) -> Self {
        Self {
            enabled: true,
            trigger: JobTrigger::Cron {
                expression: expression.to_string(),
            },
        }
    }
}

/// One trigger per job. Cron expressions carry a leading seconds field.
#[derive(Debug, Clone, Deserialize)]
pub struct ScheduleConfig {
    #[serde(default = "default_top_gainers_schedule")]
    pub top_gainers: JobSchedule,
    #[serde(default = "default_market_trends_schedule")]
    pub market_trends: JobSchedule,
    #[serde(default = "default_crypto_news_schedule")]
    pub crypto_news: JobSchedule,
    #[serde(default = "default_mentions_schedule")]
    pub mentions: JobSchedule,
}

fn default_top_gainers_schedule() -> JobSchedule {
    JobSchedule::cron("0 */15 * * * *")
}

fn default_market_trends_schedule() -> JobSchedule {
    JobSchedule::cron("0 0 * * * *")
}

fn default_crypto_news_schedule() -> JobSchedule {
    JobSchedule::cron("0 */30 * * * *")
}

fn default_mentions_schedule() -> JobSchedule {
    JobSchedule::cron("0 */2 * * * *")
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            top_gainers: default_top_gainers_schedule(),
            market_trends: default_market_trends_schedule(),
            crypto_news: default_crypto_news_schedule(),
            mentions: default_mentions_schedule(),
        }
    }
}

impl ScheduleConfig {
    pub fn get(&self, kind: JobKind) -> &JobSchedule {
        match kind {
            JobKind::TopGainers => &self.top_gainers,
            JobKind::MarketTrends => &self.market_trends,
            JobKind::CryptoNews => &self.crypto_news,
            JobKind::Mentions => &self.mentions,
        }
    }

    pub fn enabled(&self) -> impl Iterator<Item = (JobKind, &JobSchedule)> {
        JobKind::ALL
            .into_iter()
            .map(|kind| (kind, self.get(kind)))
            .filter(|(_, schedule)| schedule.enabled)
    }
}

impl XeroConfig {
    /// Load from `path`, or from the default location when `None`. A missing
    /// default file means built-in defaults; a missing explicit file is an error.
    pub async fn load(path: Option<PathBuf>) -> anyhow::Result<Self> {
        let explicit = path.is_some();
        let path = path.unwrap_or_else(default_config_path);
        let mut cfg = match tokio::fs::read_to_string(&path).await {
            Ok(contents) => Self::parse(&contents)
                .map_err(|e| anyhow::anyhow!("parse config {}: {e}", path.display()))?,
            Err(e) if !explicit && e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = %path.display(), "no config file; using defaults");
                Self::default()
            }
            Err(e) => return Err(anyhow::anyhow!("read config {}: {e}", path.display())),
        };

        cfg.apply_env_overrides();
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn parse(contents: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(contents)
    }

    fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|key| std::env::var(key).ok());
    }

    fn apply_overrides_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = var("TWITTER_ACCESS_TOKEN") {
            self.twitter.access_token = Some(v);
        }
        if let Some(v) = var("TWITTER_USER_ID") {
            self.twitter.user_id = Some(v);
        }
        if let Some(v) = var("OPENAI_API_KEY") {
            self.llm.api_key = Some(v);
        }
        if let Some(v) = var("OPENAI_MODEL") {
            self.llm.model = v;
        }
        if let Some(v) = var("CRYPTOCOMPARE_API_KEY") {
            self.feeds.cryptocompare_api_key = Some(v);
        }
        if let Some(v) = var("XEROBOT_STATE_DIR") {
            self.general.state_dir = PathBuf::from(v);
        }
        if let Some(v) = var("XEROBOT_DRY_RUN") {
            self.general.dry_run = matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes");
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.retry.max_attempts == 0 {
            return Err(anyhow::anyhow!("retry.max_attempts must be > 0"));
        }
        if self.retry.base_delay_ms > self.retry.max_delay_ms {
            return Err(anyhow::anyhow!(
                "retry.base_delay_ms must not exceed retry.max_delay_ms"
            ));
        }
        if self.mentions.page_size == 0 {
            return Err(anyhow::anyhow!("mentions.page_size must be > 0"));
        }
        if !self.mentions.prompt_template.contains("{text}") {
            return Err(anyhow::anyhow!(
                "mentions.prompt_template must contain a {{text}} placeholder"
            ));
        }
        if self.mentions.fallback_reply.trim().is_empty() {
            return Err(anyhow::anyhow!("mentions.fallback_reply must not be empty"));
        }
        if self.llm.model.trim().is_empty() {
            return Err(anyhow::anyhow!("llm.model is required"));
        }
        if self.llm.max_tokens == 0 {
            return Err(anyhow::anyhow!("llm.max_tokens must be > 0"));
        }
        if self.twitter.max_post_chars == 0 {
            return Err(anyhow::anyhow!("twitter.max_post_chars must be > 0"));
        }
        if self.feeds.items_per_post == 0 {
            return Err(anyhow::anyhow!("feeds.items_per_post must be > 0"));
        }
        if self.quota.default_budget == 0 {
            return Err(anyhow::anyhow!("quota.default_budget must be > 0"));
        }
        for kind in JobKind::ALL {
            self.schedule
                .get(kind)
                .trigger
                .validate()
                .map_err(|e| anyhow::anyhow!("schedule.{kind}: {e}"))?;
        }
        if !self.general.dry_run {
            if self.twitter.access_token.as_deref().is_none_or(str::is_empty) {
                return Err(anyhow::anyhow!(
                    "twitter.access_token is required unless general.dry_run is set"
                ));
            }
            if self.schedule.mentions.enabled
                && self.twitter.user_id.as_deref().is_none_or(str::is_empty)
            {
                return Err(anyhow::anyhow!(
                    "twitter.user_id is required for the mentions job"
                ));
            }
        }
        Ok(())
    }
}

pub fn default_config_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    Path::new(&home).join(".xerobot").join("config.toml")
}

pub fn default_state_dir() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    Path::new(&home).join(".xerobot").join("state")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn empty_file_yields_documented_defaults() {
        let cfg = XeroConfig::parse("").expect("empty config parses");
        assert_eq!(cfg.retry.policy(), RetryPolicy::default());
        assert_eq!(cfg.quota.default_budget, 15);
        assert_eq!(cfg.quota.window(), Duration::from_secs(900));
        assert_eq!(cfg.mentions.page_size, 3);
        assert_eq!(cfg.mentions.pacing_ms, 60_000);
        assert_eq!(cfg.llm.model, "gpt-3.5-turbo");
        assert_eq!(cfg.llm.max_tokens, 100);
        assert_eq!(cfg.twitter.max_post_chars, 280);
        assert!(matches!(
            &cfg.schedule.mentions.trigger,
            JobTrigger::Cron { expression } if expression == "0 */2 * * * *"
        ));
        assert_eq!(cfg.schedule.enabled().count(), 4);
    }

    #[test]
    fn sections_override_defaults() {
        let cfg = XeroConfig::parse(
            r#"
            [general]
            state_dir = "/var/lib/xerobot"
            dry_run = true

            [quota]
            default_budget = 50

            [mentions]
            pacing_ms = 5000

            [schedule.crypto_news]
            enabled = false
            trigger = { type = "interval", interval_seconds = 600 }
            "#,
        )
        .expect("config parses");

        assert_eq!(cfg.general.state_dir, PathBuf::from("/var/lib/xerobot"));
        assert!(cfg.general.dry_run);
        assert_eq!(cfg.quota.default_budget, 50);
        assert_eq!(
            cfg.mentions.settings(RetryPolicy::default()).pacing,
            Duration::from_secs(5)
        );
        assert!(!cfg.schedule.crypto_news.enabled);
        assert!(matches!(
            cfg.schedule.crypto_news.trigger,
            JobTrigger::Interval {
                interval_seconds: 600
            }
        ));
        let enabled: Vec<JobKind> = cfg.schedule.enabled().map(|(k, _)| k).collect();
        assert!(!enabled.contains(&JobKind::CryptoNews));
        cfg.validate().expect("dry run config is valid without credentials");
    }

    #[test]
    fn env_overrides_apply_after_parsing_and_ignore_blanks() {
        let mut cfg = XeroConfig::parse("[llm]\nmodel = \"gpt-4o-mini\"\n").unwrap();
        cfg.apply_overrides_from(env(&[
            ("TWITTER_ACCESS_TOKEN", "token"),
            ("TWITTER_USER_ID", "12345"),
            ("OPENAI_API_KEY", "sk-test"),
            ("OPENAI_MODEL", "  "),
            ("XEROBOT_STATE_DIR", "/tmp/xerobot"),
            ("XEROBOT_DRY_RUN", "true"),
        ]));

        assert_eq!(cfg.twitter.access_token.as_deref(), Some("token"));
        assert_eq!(cfg.twitter.user_id.as_deref(), Some("12345"));
        assert_eq!(cfg.llm.api_key.as_deref(), Some("sk-test"));
        assert_eq!(cfg.llm.model, "gpt-4o-mini");
        assert_eq!(cfg.general.state_dir, PathBuf::from("/tmp/xerobot"));
        assert!(cfg.general.dry_run);
    }

    #[test]
    fn validation_rejects_bad_values() {
        let live = |extra: &str| {
            let mut cfg = XeroConfig::parse(extra).unwrap();
            cfg.twitter.access_token = Some("token".to_string());
            cfg.twitter.user_id = Some("1".to_string());
            cfg.validate()
        };

        live("").expect("defaults with credentials are valid");
        assert!(live("[retry]\nmax_attempts = 0\n").is_err());
        assert!(live("[mentions]\npage_size = 0\n").is_err());
        assert!(live("[mentions]\nprompt_template = \"no placeholder\"\n").is_err());
        assert!(live("[llm]\nmodel = \"\"\n").is_err());
        let err = live(
            "[schedule.top_gainers]\ntrigger = { type = \"cron\", expression = \"every now and then\" }\n",
        )
        .expect_err("bad cron");
        assert!(err.to_string().contains("schedule.top_gainers"));
        assert!(
            live("[schedule.mentions]\ntrigger = { type = \"interval\", interval_seconds = 0 }\n")
                .is_err()
        );
    }

    #[test]
    fn live_mode_requires_credentials() {
        let cfg = XeroConfig::default();
        let err = cfg.validate().expect_err("no token");
        assert!(err.to_string().contains("access_token"));

        let mut cfg = XeroConfig::default();
        cfg.twitter.access_token = Some("token".to_string());
        let err = cfg.validate().expect_err("no user id");
        assert!(err.to_string().contains("user_id"));

        cfg.schedule.mentions.enabled = false;
        cfg.validate().expect("posting-only bot needs no user id");
    }

    #[tokio::test]
    async fn explicit_missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = XeroConfig::load(Some(dir.path().join("missing.toml")))
            .await
            .expect_err("missing explicit config");
        assert!(err.to_string().contains("read config"));
    }
}
