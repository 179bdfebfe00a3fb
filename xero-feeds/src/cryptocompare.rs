use crate::error::{self, FeedError, Result};
use crate::types::NewsHeadline;
use serde::Deserialize;

pub const DEFAULT_CRYPTOCOMPARE_BASE_URL: &str = "https://min-api.cryptocompare.com";

#[derive(Clone)]
pub struct CryptoCompareClient {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl CryptoCompareClient {
    pub fn new(base_url: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            http: error::http_client(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.filter(|k| !k.trim().is_empty()),
        }
    }

    /// Newest English headlines, at most `limit`.
    #[tracing::instrument(level = "info", skip_all, fields(limit = limit))]
    pub async fn latest_news(&self, limit: usize) -> Result<Vec<NewsHeadline>> {
        let mut request = self
            .http
            .get(format!("{}/data/v2/news/", self.base_url))
            .query(&[("lang", "EN")]);
        if let Some(key) = self.api_key.as_deref() {
            request = request.query(&[("api_key", key)]);
        }
        let body = error::get_text(request).await?;
        parse_news(&body, limit)
    }
}

#[derive(Debug, Deserialize)]
struct NewsResponse {
    #[serde(rename = "Data", default)]
    data: Option<Vec<NewsItem>>,
    #[serde(rename = "Message", default)]
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct NewsItem {
    #[serde(default)]
    title: String,
    #[serde(default)]
    url: String,
}

fn parse_news(body: &str, limit: usize) -> Result<Vec<NewsHeadline>> {
    let parsed: NewsResponse = serde_json::from_str(body)?;
    let Some(items) = parsed.data else {
        return Err(FeedError::ResponseFormat(format!(
            "cryptocompare news missing Data (message={})",
            parsed.message.unwrap_or_default()
        )));
    };
    let headlines = items
        .into_iter()
        .filter(|item| !item.title.trim().is_empty())
        .take(limit)
        .map(|item| NewsHeadline {
            title: item.title.trim().to_string(),
            url: item.url,
        })
        .collect();
    Ok(headlines)
}
