use crate::error::{self, FeedError, Result};
use crate::types::{CoinMover, MarketOverview};
use serde::Deserialize;
use std::collections::HashMap;

pub const DEFAULT_COINGECKO_BASE_URL: &str = "https://api.coingecko.com/api/v3";

#[derive(Clone)]
pub struct CoinGeckoClient {
    http: reqwest::Client,
    base_url: String,
}

impl Default for CoinGeckoClient {
    fn default() -> Self {
        Self::new(DEFAULT_COINGECKO_BASE_URL)
    }
}

impl CoinGeckoClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http: error::http_client(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// The `limit` coins with the largest 24h gain, best first. Coins without
    /// a reported change are left out.
    #[tracing::instrument(level = "info", skip_all, fields(limit = limit))]
    pub async fn top_gainers(&self, limit: usize) -> Result<Vec<CoinMover>> {
        let limit = limit.clamp(1, 250);
        let per_page = limit.to_string();
        let request = self.http.get(format!("{}/coins/markets", self.base_url)).query(&[
            ("vs_currency", "usd"),
            ("order", "price_change_percentage_24h_desc"),
            ("per_page", per_page.as_str()),
            ("page", "1"),
            ("sparkline", "false"),
        ]);
        let body = error::get_text(request).await?;
        parse_markets(&body, limit)
    }

    #[tracing::instrument(level = "info", skip_all)]
    pub async fn market_overview(&self) -> Result<MarketOverview> {
        let request = self.http.get(format!("{}/global", self.base_url));
        let body = error::get_text(request).await?;
        parse_global(&body)
    }
}

#[derive(Debug, Deserialize)]
struct MarketCoin {
    #[serde(default)]
    name: String,
    #[serde(default)]
    symbol: String,
    #[serde(default)]
    current_price: Option<f64>,
    #[serde(default)]
    price_change_percentage_24h: Option<f64>,
}

fn parse_markets(body: &str, limit: usize) -> Result<Vec<CoinMover>> {
    let coins: Vec<MarketCoin> = serde_json::from_str(body)?;
    let mut movers: Vec<CoinMover> = coins
        .into_iter()
        .filter_map(|c| {
            let change = c.price_change_percentage_24h?;
            Some(CoinMover {
                name: c.name,
                symbol: c.symbol.to_uppercase(),
                price_usd: c.current_price.unwrap_or_default(),
                change_24h_pct: change,
            })
        })
        .collect();
    movers.sort_by(|a, b| b.change_24h_pct.total_cmp(&a.change_24h_pct));
    movers.truncate(limit);
    Ok(movers)
}

#[derive(Debug, Deserialize)]
struct GlobalResponse {
    data: Option<GlobalData>,
}

#[derive(Debug, Deserialize)]
struct GlobalData {
    #[serde(default)]
    total_market_cap: HashMap<String, f64>,
    #[serde(default)]
    market_cap_percentage: HashMap<String, f64>,
}

fn parse_global(body: &str) -> Result<MarketOverview> {
    let parsed: GlobalResponse = serde_json::from_str(body)?;
    let data = parsed
        .data
        .ok_or_else(|| FeedError::ResponseFormat("coingecko global missing data".to_string()))?;
    let total_market_cap_usd = data.total_market_cap.get("usd").copied().ok_or_else(|| {
        FeedError::ResponseFormat("coingecko global missing usd market cap".to_string())
    })?;
    let bitcoin_dominance_pct = data
        .market_cap_percentage
        .get("btc")
        .copied()
        .ok_or_else(|| FeedError::ResponseFormat("coingecko global missing btc share".to_string()))?;
    Ok(MarketOverview {
        total_market_cap_usd,
        bitcoin_dominance_pct,
    })
}
