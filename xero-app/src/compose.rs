//! Post text for the scheduled jobs. Every function returns `None` when there
//! is nothing worth posting.

use std::fmt::Write;
use xero_feeds::{CoinMover, MarketOverview, NewsHeadline};

pub fn top_gainers(movers: &[CoinMover], limit: usize) -> Option<String> {
    if movers.is_empty() || limit == 0 {
        return None;
    }
    let mut text = String::from("🚀 Top Crypto Gainers (24h):\n");
    for (i, coin) in movers.iter().take(limit).enumerate() {
        let _ = writeln!(text, "{}. {}: {:.2}%", i + 1, coin.symbol, coin.change_24h_pct);
    }
    Some(text)
}

pub fn market_trends(overview: &MarketOverview) -> Option<String> {
    if !overview.total_market_cap_usd.is_finite() || overview.total_market_cap_usd <= 0.0 {
        return None;
    }
    Some(format!(
        "🌍 Market Trends:\n- Total Market Cap: ${:.2}T\n- Bitcoin Dominance: {:.1}%",
        overview.total_market_cap_usd / 1e12,
        overview.bitcoin_dominance_pct
    ))
}

pub fn crypto_news(headlines: &[NewsHeadline], limit: usize) -> Option<String> {
    if headlines.is_empty() || limit == 0 {
        return None;
    }
    let mut text = String::from("📰 Latest Crypto News:\n");
    for (i, item) in headlines.iter().take(limit).enumerate() {
        let _ = writeln!(text, "{}. {}\n{}", i + 1, item.title, item.url);
    }
    Some(text)
}
