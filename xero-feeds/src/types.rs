use serde::{Deserialize, Serialize};

/// A coin ranked by 24h price change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoinMover {
    pub name: String,
    /// Upper-cased ticker.
    pub symbol: String,
    pub price_usd: f64,
    pub change_24h_pct: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MarketOverview {
    pub total_market_cap_usd: f64,
    pub bitcoin_dominance_pct: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewsHeadline {
    pub title: String,
    pub url: String,
}
