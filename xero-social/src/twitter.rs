use crate::error::{Result, SocialError};
use async_trait::async_trait;
use reqwest::StatusCode;
use reqwest::header::HeaderMap;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use xero_core::{
    Mention, MentionId, MentionPage, Metered, PostId, PostReceipt, QuotaMetadata, SocialBackend,
};

pub const DEFAULT_API_BASE_URL: &str = "https://api.twitter.com";
pub const DEFAULT_MAX_POST_CHARS: usize = 280;

const HEADER_LIMIT: &str = "x-rate-limit-limit";
const HEADER_REMAINING: &str = "x-rate-limit-remaining";
const HEADER_RESET: &str = "x-rate-limit-reset";
const MENTIONS_PAGE_RESULTS: usize = 100;
/// The timeline only reaches back 800 mentions: 8 full pages.
const MENTIONS_MAX_PAGES: usize = 8;
const MENTION_TWEET_FIELDS: &str = "author_id,conversation_id";
const MENTION_EXPANSIONS: &str = "author_id";

/// Authenticated as a single user with an OAuth 2.0 user access token.
#[derive(Clone)]
pub struct TwitterClient {
    http: reqwest::Client,
    base_url: String,
    access_token: String,
    user_id: Option<String>,
    max_post_chars: usize,
}

impl TwitterClient {
    pub fn new(access_token: &str) -> Result<Self> {
        if access_token.trim().is_empty() {
            return Err(SocialError::InvalidInput("missing access token".to_string()));
        }
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()?;
        Ok(Self {
            http,
            base_url: DEFAULT_API_BASE_URL.to_string(),
            access_token: access_token.trim().to_string(),
            user_id: None,
            max_post_chars: DEFAULT_MAX_POST_CHARS,
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Account whose mention timeline is read.
    pub fn with_user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into().trim().to_string()).filter(|id| !id.is_empty());
        self
    }

    pub fn with_max_post_chars(mut self, max_post_chars: usize) -> Self {
        self.max_post_chars = max_post_chars.max(1);
        self
    }

    pub fn user_id(&self) -> Option<&str> {
        self.user_id.as_deref()
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    #[tracing::instrument(level = "info", skip_all, fields(reply = in_reply_to.is_some()))]
    async fn create_tweet(
        &self,
        text: &str,
        in_reply_to: Option<&MentionId>,
    ) -> Result<Metered<PostReceipt>> {
        let text = truncate_chars(text, self.max_post_chars);
        if text.trim().is_empty() {
            return Err(SocialError::InvalidInput("empty post text".to_string()));
        }
        let body = CreateTweetRequest {
            text: &text,
            reply: in_reply_to.map(|id| CreateTweetReply {
                in_reply_to_tweet_id: id.as_str(),
            }),
        };

        let response = self
            .http
            .post(self.url("/2/tweets"))
            .bearer_auth(&self.access_token)
            .json(&body)
            .send()
            .await?;
        let (quota, body) = read_success(response).await?;

        let parsed: CreateTweetResponse = serde_json::from_str(&body)?;
        let data = parsed.data.ok_or_else(|| {
            SocialError::ResponseFormat(format!("create tweet response missing data: {body}"))
        })?;
        tracing::debug!(post_id = %data.id, "tweet created");
        Ok(Metered::new(
            PostReceipt {
                id: PostId::new(data.id),
                text: data.text.unwrap_or(text),
            },
            quota,
        ))
    }
}

#[async_trait]
impl SocialBackend for TwitterClient {
    type Error = SocialError;

    async fn post(&self, text: &str) -> Result<Metered<PostReceipt>> {
        self.create_tweet(text, None).await
    }

    async fn reply(&self, text: &str, in_reply_to: &MentionId) -> Result<Metered<PostReceipt>> {
        self.create_tweet(text, Some(in_reply_to)).await
    }

    /// Walks every timeline page after `cursor` before cutting the batch: the
    /// API pages newest first, so the oldest unhandled mentions sit on the
    /// last page.
    #[tracing::instrument(level = "info", skip_all, fields(cursor = ?cursor.map(|c| c.as_str())))]
    async fn mentions_after(
        &self,
        cursor: Option<&MentionId>,
        page_size: usize,
    ) -> Result<Metered<MentionPage>> {
        let Some(user_id) = self.user_id.as_deref() else {
            return Err(SocialError::InvalidInput(
                "mention timeline needs a user id".to_string(),
            ));
        };

        let mut collected: Vec<Mention> = Vec::new();
        let mut quota = None;
        let mut pagination_token: Option<String> = None;
        for page_number in 1..=MENTIONS_MAX_PAGES {
            let (page_quota, body) = self
                .fetch_mentions_page(user_id, cursor, pagination_token.as_deref())
                .await?;
            quota = page_quota.or(quota);

            let parsed: MentionsResponse = serde_json::from_str(&body)?;
            let next_token = parsed.next_token();
            let Some(mentions) = parsed.into_mentions() else {
                tracing::warn!(page_number, "mention timeline page without data");
                return Ok(Metered::new(MentionPage::malformed(), quota));
            };
            collected.extend(mentions);

            match next_token {
                Some(token) if page_number < MENTIONS_MAX_PAGES => {
                    pagination_token = Some(token);
                }
                Some(_) => {
                    tracing::warn!(
                        pages = page_number,
                        "mention timeline deeper than the API exposes; starting from the oldest reachable"
                    );
                }
                None => break,
            }
        }

        let page = oldest_first(collected, page_size);
        tracing::debug!(
            fetched = page.data.as_ref().map(Vec::len),
            "mention timeline fetched"
        );
        Ok(Metered::new(page, quota))
    }
}

impl TwitterClient {
    async fn fetch_mentions_page(
        &self,
        user_id: &str,
        cursor: Option<&MentionId>,
        pagination_token: Option<&str>,
    ) -> Result<(Option<QuotaMetadata>, String)> {
        let mut query: Vec<(&str, String)> = vec![
            ("max_results", MENTIONS_PAGE_RESULTS.to_string()),
            ("tweet.fields", MENTION_TWEET_FIELDS.to_string()),
            ("expansions", MENTION_EXPANSIONS.to_string()),
        ];
        if let Some(cursor) = cursor {
            query.push(("since_id", cursor.to_string()));
        }
        if let Some(token) = pagination_token {
            query.push(("pagination_token", token.to_string()));
        }

        let response = self
            .http
            .get(self.url(&format!("/2/users/{user_id}/mentions")))
            .bearer_auth(&self.access_token)
            .query(&query)
            .send()
            .await?;
        read_success(response).await
    }
}

/// Split a response into its quota metadata and body, classifying failures.
async fn read_success(response: reqwest::Response) -> Result<(Option<QuotaMetadata>, String)> {
    let status = response.status();
    let quota = quota_from_headers(response.headers());
    let body = response.text().await?;
    if status.is_success() {
        return Ok((quota, body));
    }
    Err(classify_failure(status, quota, body))
}

fn classify_failure(status: StatusCode, quota: Option<QuotaMetadata>, body: String) -> SocialError {
    if status == StatusCode::TOO_MANY_REQUESTS {
        let quota = quota.unwrap_or_default();
        return SocialError::RateLimited {
            reset_at: quota.reset_at,
            quota,
        };
    }
    SocialError::Http {
        status: status.as_u16(),
        body,
    }
}

/// Rate-limit headers as [`QuotaMetadata`]; `None` when the response carried
/// none of them.
pub fn quota_from_headers(headers: &HeaderMap) -> Option<QuotaMetadata> {
    let header = |name: &str| headers.get(name).and_then(|v| v.to_str().ok());
    let quota = QuotaMetadata::from_raw(
        header(HEADER_LIMIT),
        header(HEADER_REMAINING),
        header(HEADER_RESET),
    );
    (!quota.is_empty()).then_some(quota)
}

/// Cut `text` to at most `max_chars` characters without splitting one.
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}

#[derive(Debug, Serialize)]
struct CreateTweetRequest<'a> {
    text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    reply: Option<CreateTweetReply<'a>>,
}

#[derive(Debug, Serialize)]
struct CreateTweetReply<'a> {
    in_reply_to_tweet_id: &'a str,
}

#[derive(Debug, Deserialize)]
struct CreateTweetResponse {
    #[serde(default)]
    data: Option<CreatedTweet>,
}

#[derive(Debug, Deserialize)]
struct CreatedTweet {
    id: String,
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MentionsResponse {
    #[serde(default)]
    data: Option<Vec<TweetData>>,
    #[serde(default)]
    meta: Option<TimelineMeta>,
}

#[derive(Debug, Deserialize)]
struct TweetData {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    text: String,
    #[serde(default)]
    author_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TimelineMeta {
    #[serde(default)]
    result_count: Option<u64>,
    #[serde(default)]
    next_token: Option<String>,
}

impl MentionsResponse {
    fn next_token(&self) -> Option<String> {
        self.meta
            .as_ref()
            .and_then(|m| m.next_token.clone())
            .filter(|token| !token.is_empty())
    }

    /// The timeline omits `data` entirely when there is nothing new; that is
    /// an empty page only when `meta.result_count` says so.
    fn into_mentions(self) -> Option<Vec<Mention>> {
        let Some(tweets) = self.data else {
            return self
                .meta
                .and_then(|m| m.result_count)
                .is_some_and(|count| count == 0)
                .then(Vec::new);
        };
        Some(
            tweets
                .into_iter()
                .map(|t| Mention {
                    id: t.id.map(MentionId::new),
                    text: t.text,
                    author_id: t.author_id,
                })
                .collect(),
        )
    }
}

/// Sort ascending by id and keep the oldest `page_size`.
fn oldest_first(mut mentions: Vec<Mention>, page_size: usize) -> MentionPage {
    mentions.sort_by(|a, b| a.valid_id().cmp(&b.valid_id()));
    mentions.truncate(page_size.max(1));
    MentionPage::of(mentions)
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;
    use serde_json::json;
    use std::sync::{Arc, Mutex};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    /// Local timeline server: answers each request with the body registered
    /// for its `pagination_token` (`None` for the first page) and records the
    /// request targets.
    async fn timeline_server(
        pages: Vec<(Option<&'static str>, serde_json::Value)>,
    ) -> (String, Arc<Mutex<Vec<String>>>) {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind ephemeral port");
        let base_url = format!("http://{}", listener.local_addr().unwrap());
        let requests = Arc::new(Mutex::new(Vec::new()));
        let seen = requests.clone();

        tokio::spawn(async move {
            while let Ok((mut stream, _)) = listener.accept().await {
                let mut head = Vec::new();
                let mut buf = [0_u8; 1024];
                while !head.windows(4).any(|w| w == b"\r\n\r\n") {
                    let n = stream.read(&mut buf).await.unwrap_or(0);
                    if n == 0 {
                        break;
                    }
                    head.extend_from_slice(&buf[..n]);
                }
                let head = String::from_utf8_lossy(&head).into_owned();
                let target = head.split_whitespace().nth(1).unwrap_or_default().to_string();
                let token = target
                    .split(['?', '&'])
                    .find_map(|pair| pair.strip_prefix("pagination_token="))
                    .map(str::to_string);
                let body = pages
                    .iter()
                    .find(|(page_token, _)| page_token.as_deref() == token.as_deref())
                    .map(|(_, body)| body.to_string())
                    .unwrap_or_else(|| "{}".to_string());
                seen.lock().unwrap().push(target);

                let response = format!(
                    "HTTP/1.1 200 OK\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
                    body.len(),
                    body
                );
                let _ = stream.write_all(response.as_bytes()).await;
                let _ = stream.shutdown().await;
            }
        });
        (base_url, requests)
    }

    fn tweets(ids: &[&str]) -> serde_json::Value {
        ids.iter()
            .map(|id| json!({"id": id, "text": format!("gm {id}")}))
            .collect()
    }

    fn parse(value: serde_json::Value) -> MentionsResponse {
        serde_json::from_value(value).expect("valid mentions payload")
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        assert_eq!(truncate_chars("hello", 280), "hello");
        assert_eq!(truncate_chars("hello", 3), "hel");
        assert_eq!(truncate_chars("🚀🚀🚀", 2), "🚀🚀");
        let long = "x".repeat(300);
        assert_eq!(truncate_chars(&long, DEFAULT_MAX_POST_CHARS).chars().count(), 280);
    }

    #[test]
    fn rate_limit_headers_become_quota_metadata() {
        let mut headers = HeaderMap::new();
        headers.insert(HEADER_LIMIT, HeaderValue::from_static("15"));
        headers.insert(HEADER_REMAINING, HeaderValue::from_static("3"));
        headers.insert(HEADER_RESET, HeaderValue::from_static("1700000000"));

        let quota = quota_from_headers(&headers).expect("quota present");
        assert_eq!(quota.limit, Some(15));
        assert_eq!(quota.remaining, Some(3));
        assert_eq!(quota.reset_at.map(|t| t.timestamp()), Some(1_700_000_000));

        assert!(quota_from_headers(&HeaderMap::new()).is_none());
    }

    #[test]
    fn too_many_requests_is_classified_as_rate_limited() {
        let quota = QuotaMetadata::from_raw(Some("15"), Some("0"), Some("1700000900"));
        let err = classify_failure(StatusCode::TOO_MANY_REQUESTS, Some(quota), String::new());
        match err {
            SocialError::RateLimited { reset_at, quota } => {
                assert_eq!(reset_at.map(|t| t.timestamp()), Some(1_700_000_900));
                assert_eq!(quota.remaining, Some(0));
            }
            other => panic!("expected rate limit, got {other:?}"),
        }

        let bare = classify_failure(StatusCode::TOO_MANY_REQUESTS, None, String::new());
        assert!(matches!(bare, SocialError::RateLimited { reset_at: None, .. }));

        let server = classify_failure(
            StatusCode::SERVICE_UNAVAILABLE,
            None,
            "over capacity".to_string(),
        );
        assert!(matches!(server, SocialError::Http { status: 503, .. }));
    }

    #[test]
    fn mentions_are_sorted_oldest_first_and_cut_to_page_size() {
        let page = parse(json!({
            "data": [
                {"id": "1880172400161222659", "text": "third", "author_id": "7"},
                {"id": "1880172400161222658", "text": "second"},
                {"id": "1880172400161222657", "text": "first"},
                {"id": "1880172400161222660", "text": "fourth"}
            ],
            "meta": {"result_count": 4}
        }))
        .into_mentions()
        .expect("data present");

        let mentions = oldest_first(page, 3).data.expect("data present");
        let texts: Vec<&str> = mentions.iter().map(|m| m.text.as_str()).collect();
        assert_eq!(texts, vec!["first", "second", "third"]);
        assert_eq!(mentions[2].author_id.as_deref(), Some("7"));
    }

    #[tokio::test]
    async fn backlog_spanning_pages_starts_from_the_oldest_mention() {
        let (base_url, requests) = timeline_server(vec![
            (
                None,
                json!({
                    "data": tweets(&["108", "107", "106", "105", "104"]),
                    "meta": {"result_count": 5, "next_token": "p2"}
                }),
            ),
            (
                Some("p2"),
                json!({
                    "data": tweets(&["103", "102", "101"]),
                    "meta": {"result_count": 3}
                }),
            ),
        ])
        .await;
        let client = TwitterClient::new("token")
            .expect("client builds")
            .with_base_url(base_url)
            .with_user_id("1");

        let page = client
            .mentions_after(Some(&MentionId::from("100")), 3)
            .await
            .expect("timeline fetched")
            .value;

        let ids: Vec<&str> = page
            .data
            .as_deref()
            .unwrap_or_default()
            .iter()
            .filter_map(|m| m.valid_id().map(MentionId::as_str))
            .collect();
        assert_eq!(ids, vec!["101", "102", "103"]);

        let requests = requests.lock().unwrap().clone();
        assert_eq!(requests.len(), 2);
        assert!(requests.iter().all(|r| r.starts_with("/2/users/1/mentions?")));
        assert!(requests.iter().all(|r| r.contains("since_id=100")));
        assert!(!requests[0].contains("pagination_token"));
        assert!(requests[1].contains("pagination_token=p2"));
    }

    #[tokio::test]
    async fn malformed_later_page_fails_the_whole_fetch() {
        let (base_url, _) = timeline_server(vec![
            (
                None,
                json!({
                    "data": tweets(&["12", "11"]),
                    "meta": {"result_count": 2, "next_token": "p2"}
                }),
            ),
            (Some("p2"), json!({"errors": [{"title": "oops"}]})),
        ])
        .await;
        let client = TwitterClient::new("token")
            .expect("client builds")
            .with_base_url(base_url)
            .with_user_id("1");

        let page = client
            .mentions_after(None, 3)
            .await
            .expect("request succeeds")
            .value;
        assert_eq!(page.data, None);
    }

    #[test]
    fn next_token_is_read_from_meta() {
        let parsed = parse(json!({
            "data": [{"id": "5", "text": "hi"}],
            "meta": {"result_count": 1, "next_token": "abc"}
        }));
        assert_eq!(parsed.next_token().as_deref(), Some("abc"));
        let blank = parse(json!({"meta": {"result_count": 0, "next_token": ""}}));
        assert_eq!(blank.next_token(), None);
    }

    #[test]
    fn missing_data_with_zero_count_is_an_empty_page() {
        let parsed = parse(json!({"meta": {"result_count": 0}}));
        assert_eq!(parsed.next_token(), None);
        assert_eq!(parsed.into_mentions(), Some(Vec::new()));
    }

    #[test]
    fn missing_data_without_meta_is_malformed() {
        let parsed = parse(json!({"errors": [{"title": "oops"}]}));
        assert_eq!(parsed.into_mentions(), None);
    }

    #[test]
    fn tweets_without_ids_are_kept_for_the_processor_to_skip() {
        let page = parse(json!({
            "data": [{"text": "no id"}, {"id": "12", "text": "ok"}]
        }))
        .into_mentions();
        let mentions = oldest_first(page.expect("data present"), 5)
            .data
            .expect("data present");
        assert_eq!(mentions.len(), 2);
        assert!(mentions[0].valid_id().is_none());
    }

    #[test]
    fn reply_request_nests_in_reply_to_id() {
        let id = MentionId::from("42");
        let body = CreateTweetRequest {
            text: "gm",
            reply: Some(CreateTweetReply {
                in_reply_to_tweet_id: id.as_str(),
            }),
        };
        assert_eq!(
            serde_json::to_value(&body).unwrap(),
            json!({"text": "gm", "reply": {"in_reply_to_tweet_id": "42"}})
        );

        let post = CreateTweetRequest {
            text: "gm",
            reply: None,
        };
        assert_eq!(serde_json::to_value(&post).unwrap(), json!({"text": "gm"}));
    }

    #[test]
    fn client_requires_a_token() {
        assert!(matches!(
            TwitterClient::new(" "),
            Err(SocialError::InvalidInput(_))
        ));
        let client = TwitterClient::new("token")
            .expect("client builds")
            .with_user_id(" ")
            .with_base_url("http://localhost:8080/");
        assert_eq!(client.user_id(), None);
        assert_eq!(client.url("/2/tweets"), "http://localhost:8080/2/tweets");
        assert_eq!(client.with_user_id("123").user_id(), Some("123"));
    }

    #[tokio::test]
    async fn mention_timeline_without_user_id_is_rejected_locally() {
        let client = TwitterClient::new("token")
            .expect("client builds")
            .with_base_url("http://127.0.0.1:9");
        let err = client
            .mentions_after(None, 3)
            .await
            .expect_err("no user id");
        assert!(matches!(err, SocialError::InvalidInput(_)));
    }
}
