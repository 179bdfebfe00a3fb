//! Market data and news feeds posted by Xerobot.

mod coingecko;
mod cryptocompare;
mod error;
mod types;

pub use coingecko::{CoinGeckoClient, DEFAULT_COINGECKO_BASE_URL};
pub use cryptocompare::{CryptoCompareClient, DEFAULT_CRYPTOCOMPARE_BASE_URL};
pub use error::{FeedError, Result};
pub use types::{CoinMover, MarketOverview, NewsHeadline};
