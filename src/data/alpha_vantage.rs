//! Alpha Vantage market data client
//! NEWS_SENTIMENT for news, TIME_SERIES_DAILY for prices

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

use super::retry::retry_with_backoff;
use super::validation::{validate_ohlcv, validate_symbol};
use super::{MarketDataProvider, NewsItem, OutputSize, TickerSentiment, OHLCV};
use crate::config::Config;
use crate::errors::{DeskError, DeskResult};

const DEFAULT_BASE_URL: &str = "https://www.alphavantage.co/query";
const PUBLISHED_FORMAT: &str = "%Y%m%dT%H%M%S";
const MAX_RETRIES: usize = 2;

/// Alpha Vantage response structures
#[derive(Debug, Deserialize)]
struct NewsSentimentResponse {
    #[serde(default)]
    feed: Vec<FeedItem>,
}

#[derive(Debug, Deserialize)]
struct FeedItem {
    title: Option<String>,
    url: Option<String>,
    time_published: Option<String>,
    summary: Option<String>,
    source: Option<String>,
    #[serde(default)]
    topics: Vec<TopicEntry>,
    #[serde(default, deserialize_with = "lenient_f64")]
    overall_sentiment_score: f64,
    overall_sentiment_label: Option<String>,
    #[serde(default)]
    ticker_sentiment: Vec<RawTickerSentiment>,
}

#[derive(Debug, Deserialize)]
struct TopicEntry {
    topic: String,
}

#[derive(Debug, Deserialize)]
struct RawTickerSentiment {
    ticker: String,
    #[serde(default, deserialize_with = "lenient_f64")]
    ticker_sentiment_score: f64,
    ticker_sentiment_label: Option<String>,
    #[serde(default, deserialize_with = "lenient_f64")]
    relevance_score: f64,
}

#[derive(Debug, Deserialize)]
struct DailySeriesResponse {
    #[serde(rename = "Time Series (Daily)")]
    series: Option<BTreeMap<String, DailyBar>>,
}

#[derive(Debug, Deserialize)]
struct DailyBar {
    #[serde(rename = "1. open", deserialize_with = "lenient_f64")]
    open: f64,
    #[serde(rename = "2. high", deserialize_with = "lenient_f64")]
    high: f64,
    #[serde(rename = "3. low", deserialize_with = "lenient_f64")]
    low: f64,
    #[serde(rename = "4. close", deserialize_with = "lenient_f64")]
    close: f64,
    #[serde(rename = "5. volume", deserialize_with = "lenient_f64")]
    volume: f64,
}

// Alpha Vantage sends most numbers as strings
fn lenient_f64<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum NumOrString {
        Num(f64),
        Str(String),
    }

    match NumOrString::deserialize(deserializer)? {
        NumOrString::Num(n) => Ok(n),
        NumOrString::Str(s) => s.trim().parse().map_err(serde::de::Error::custom),
    }
}

impl From<RawTickerSentiment> for TickerSentiment {
    fn from(raw: RawTickerSentiment) -> Self {
        Self {
            ticker: raw.ticker,
            sentiment_score: raw.ticker_sentiment_score,
            sentiment_label: raw.ticker_sentiment_label.unwrap_or_else(|| "Neutral".to_string()),
            relevance_score: raw.relevance_score,
        }
    }
}

/// Rate limiter for API calls (token bucket algorithm)
struct RateLimiter {
    tokens: f64,
    max_tokens: f64,
    refill_rate: f64, // tokens per second
    last_refill: Instant,
}

impl RateLimiter {
    fn new(max_tokens: f64, refill_rate: f64) -> Self {
        Self {
            tokens: max_tokens,
            max_tokens,
            refill_rate,
            last_refill: Instant::now(),
        }
    }

    fn refill(&mut self) {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.refill_rate).min(self.max_tokens);
        self.last_refill = now;
    }

    /// Consume a token, returning how long the caller must wait first
    fn reserve(&mut self) -> Duration {
        self.refill();
        self.tokens -= 1.0;
        if self.tokens >= 0.0 {
            Duration::ZERO
        } else {
            Duration::from_secs_f64(-self.tokens / self.refill_rate)
        }
    }
}

/// Check the JSON body for Alpha Vantage error payloads (served with HTTP 200)
pub(crate) fn check_api_error(body: &Value) -> DeskResult<()> {
    if let Some(message) = body.get("Error Message").and_then(Value::as_str) {
        return Err(DeskError::provider(format!("Alpha Vantage: {}", message)));
    }

    if let Some(note) = body.get("Note").and_then(Value::as_str) {
        tracing::warn!("Alpha Vantage note: {}", note);
        return Err(DeskError::RateLimit { retry_after: 60 });
    }

    if let Some(info) = body.get("Information").and_then(Value::as_str) {
        let lowered = info.to_lowercase();
        if lowered.contains("rate limit") || lowered.contains("call frequency") {
            tracing::warn!("Alpha Vantage information: {}", info);
            return Err(DeskError::RateLimit { retry_after: 60 });
        }
        return Err(DeskError::provider(format!("Alpha Vantage: {}", info)));
    }

    Ok(())
}

/// `20240102T143000` becomes `2024-01-02 14:30:00`; anything else is kept verbatim
pub(crate) fn format_published(raw: &str) -> String {
    if raw.is_empty() {
        return "Unknown".to_string();
    }
    NaiveDateTime::parse_from_str(raw, PUBLISHED_FORMAT)
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|_| raw.to_string())
}

/// Convert a NEWS_SENTIMENT body into news items.
/// With `subject`, the per-ticker sentiment for that subject is extracted;
/// without it every ticker sentiment is kept.
pub(crate) fn parse_news_feed(body: Value, subject: Option<&str>, count: usize) -> DeskResult<Vec<NewsItem>> {
    check_api_error(&body)?;
    let response: NewsSentimentResponse = serde_json::from_value(body)?;

    let items = response
        .feed
        .into_iter()
        .take(count)
        .map(|item| {
            let (subject_sentiment, ticker_sentiments) = match subject {
                Some(subject) => (
                    item.ticker_sentiment
                        .into_iter()
                        .find(|ts| ts.ticker.eq_ignore_ascii_case(subject))
                        .map(TickerSentiment::from),
                    Vec::new(),
                ),
                None => (
                    None,
                    item.ticker_sentiment.into_iter().map(TickerSentiment::from).collect(),
                ),
            };

            NewsItem {
                title: item.title.unwrap_or_else(|| "No title".to_string()),
                source: item.source.unwrap_or_else(|| "Unknown".to_string()),
                url: item.url.unwrap_or_default(),
                published: format_published(item.time_published.as_deref().unwrap_or_default()),
                summary: item.summary.unwrap_or_default(),
                topics: item.topics.into_iter().map(|t| t.topic).collect(),
                overall_sentiment_score: item.overall_sentiment_score,
                overall_sentiment_label: item
                    .overall_sentiment_label
                    .unwrap_or_else(|| "Neutral".to_string()),
                subject_sentiment,
                ticker_sentiments,
            }
        })
        .collect();

    Ok(items)
}

/// Convert a TIME_SERIES_DAILY body into bars sorted by ascending date
pub(crate) fn parse_daily_series(body: Value, subject: &str) -> DeskResult<Vec<OHLCV>> {
    check_api_error(&body)?;
    let response: DailySeriesResponse = serde_json::from_value(body)?;

    let series = response
        .series
        .ok_or_else(|| DeskError::provider(format!("No time series data found for {}", subject)))?;

    let mut bars = Vec::with_capacity(series.len());
    for (date, raw) in series {
        let date = match NaiveDate::parse_from_str(&date, "%Y-%m-%d") {
            Ok(date) => date,
            Err(e) => {
                tracing::warn!("Skipping bar with invalid date '{}': {}", date, e);
                continue;
            }
        };

        let bar = OHLCV {
            date,
            open: raw.open,
            high: raw.high,
            low: raw.low,
            close: raw.close,
            volume: raw.volume as i64,
        };

        match validate_ohlcv(&bar) {
            Ok(()) => bars.push(bar),
            Err(e) => tracing::warn!("Skipping invalid bar for {} on {}: {}", subject, date, e),
        }
    }

    // BTreeMap keys are ISO dates, so iteration is already ascending
    Ok(bars)
}

pub struct AlphaVantageClient {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    rate_limiter: Arc<Mutex<RateLimiter>>,
}

impl AlphaVantageClient {
    pub fn new(api_key: impl Into<String>) -> DeskResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent(concat!("newsdesk/", env!("CARGO_PKG_VERSION")))
            .build()?;

        // Free tier: 5 calls per minute, burst of 5
        let rate_limiter = Arc::new(Mutex::new(RateLimiter::new(5.0, 5.0 / 60.0)));

        Ok(Self {
            client,
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            rate_limiter,
        })
    }

    pub fn from_config(config: &Config) -> DeskResult<Self> {
        Self::new(config.alpha_vantage_key()?)
    }

    /// Point the client at another endpoint (proxies, test servers)
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    async fn throttle(&self) {
        let wait = self.rate_limiter.lock().await.reserve();
        if !wait.is_zero() {
            tracing::info!("Rate limit: waiting {:.1}s before making API call", wait.as_secs_f64());
            tokio::time::sleep(wait).await;
        }
    }

    async fn query(&self, params: &[(&str, String)]) -> DeskResult<Value> {
        retry_with_backoff(
            move || async move {
                self.throttle().await;

                let function = params
                    .iter()
                    .find(|(k, _)| *k == "function")
                    .map(|(_, v)| v.as_str())
                    .unwrap_or("unknown");
                tracing::debug!("Alpha Vantage request: function={}", function);

                let response = self
                    .client
                    .get(&self.base_url)
                    .query(params)
                    .query(&[("apikey", self.api_key.as_str())])
                    .send()
                    .await?;

                let status = response.status();
                if status.as_u16() == 429 {
                    return Err(DeskError::RateLimit { retry_after: 60 });
                }
                if !status.is_success() {
                    let error_text = response
                        .text()
                        .await
                        .unwrap_or_else(|_| "Unknown error".to_string());
                    tracing::error!("Alpha Vantage request failed ({}): {}", status, error_text);
                    return Err(DeskError::provider(format!(
                        "Alpha Vantage returned HTTP {}: {}",
                        status.as_u16(),
                        error_text
                    )));
                }

                let body: Value = response.json().await?;
                check_api_error(&body)?;
                Ok(body)
            },
            MAX_RETRIES,
        )
        .await
    }

    fn day_bounds(params: &mut Vec<(&str, String)>, day: Option<NaiveDate>) {
        if let Some(day) = day {
            params.push(("time_from", format!("{}T0000", day.format("%Y%m%d"))));
            params.push(("time_to", format!("{}T2359", day.format("%Y%m%d"))));
        }
    }
}

#[async_trait]
impl MarketDataProvider for AlphaVantageClient {
    async fn fetch_news(&self, subject: &str, count: usize, day: Option<NaiveDate>) -> DeskResult<Vec<NewsItem>> {
        validate_symbol(subject)?;
        tracing::info!("Fetching {} news articles for {}", count, subject);

        // Over-request; some feed items only mention the ticker in passing
        let mut params = vec![
            ("function", "NEWS_SENTIMENT".to_string()),
            ("tickers", subject.to_string()),
            ("limit", (count * 2).to_string()),
        ];
        Self::day_bounds(&mut params, day);

        let body = self.query(&params).await?;
        let items = parse_news_feed(body, Some(subject), count)?;

        tracing::info!("Fetched {} news articles for {}", items.len(), subject);
        Ok(items)
    }

    async fn fetch_market_news(
        &self,
        topics: Option<&str>,
        count: usize,
        day: Option<NaiveDate>,
    ) -> DeskResult<Vec<NewsItem>> {
        tracing::info!("Fetching {} market news articles (topics: {:?})", count, topics);

        let mut params = vec![
            ("function", "NEWS_SENTIMENT".to_string()),
            ("limit", count.to_string()),
        ];
        if let Some(topics) = topics.filter(|t| !t.is_empty()) {
            params.push(("topics", topics.to_string()));
        }
        Self::day_bounds(&mut params, day);

        let body = self.query(&params).await?;
        let items = parse_news_feed(body, None, count)?;

        tracing::info!("Fetched {} market news articles", items.len());
        Ok(items)
    }

    async fn fetch_prices(&self, subject: &str, output_size: OutputSize) -> DeskResult<Vec<OHLCV>> {
        validate_symbol(subject)?;
        tracing::info!("Fetching daily prices for {} ({})", subject, output_size.as_str());

        let params = vec![
            ("function", "TIME_SERIES_DAILY".to_string()),
            ("symbol", subject.to_string()),
            ("outputsize", output_size.as_str().to_string()),
        ];

        let body = self.query(&params).await?;
        let bars = parse_daily_series(body, subject)?;

        tracing::info!("Fetched {} daily bars for {}", bars.len(), subject);
        Ok(bars)
    }
}
