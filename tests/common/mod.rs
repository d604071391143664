//! Shared fakes for integration tests
#![allow(dead_code)]

use async_trait::async_trait;
use chrono::NaiveDate;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Barrier;

use newsdesk::data::{MarketDataProvider, NewsItem, OutputSize, TickerSentiment, OHLCV};
use newsdesk::embeddings::Embedder;
use newsdesk::errors::{DeskError, DeskResult};
use newsdesk::llm::CompletionService;
use newsdesk::orchestrator::DailyAnalysis;
use newsdesk::vector::{AnalysisRecord, InMemoryRecordStore, RecordId, RecordStore, ScoredRecord};

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

/// Letter-frequency embedding; deterministic and never all-zero
pub struct LetterEmbedder;

#[async_trait]
impl Embedder for LetterEmbedder {
    async fn embed(&self, text: &str) -> DeskResult<Vec<f32>> {
        let mut v = vec![0.0f32; 27];
        v[26] = 1.0;
        for c in text.chars().filter(|c| c.is_ascii_alphabetic()) {
            v[(c.to_ascii_lowercase() as u8 - b'a') as usize] += 1.0;
        }
        Ok(v)
    }
}

pub fn memory_store() -> Arc<InMemoryRecordStore> {
    Arc::new(InMemoryRecordStore::new(Arc::new(LetterEmbedder)))
}

/// Replies with the first line of the system prompt (the role line)
pub struct ScriptedCompletion {
    pub calls: AtomicUsize,
    pub fail_role: Option<&'static str>,
    pub barrier: Option<Barrier>,
}

impl ScriptedCompletion {
    pub fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
            fail_role: None,
            barrier: None,
        }
    }

    pub fn failing(role: &'static str) -> Self {
        Self {
            fail_role: Some(role),
            ..Self::new()
        }
    }

    /// Every call waits until `n` calls are in flight at once
    pub fn rendezvous(n: usize) -> Self {
        Self {
            barrier: Some(Barrier::new(n)),
            ..Self::new()
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CompletionService for ScriptedCompletion {
    async fn complete(&self, system: &str, _user: &str, _temperature: f32) -> DeskResult<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(barrier) = &self.barrier {
            barrier.wait().await;
        }
        let role = system.lines().next().unwrap_or_default().to_string();
        match self.fail_role {
            Some(fail) if role.ends_with(fail) => Err(DeskError::completion("model unavailable")),
            _ => Ok(format!("Insight: {}", role)),
        }
    }
}

/// Daily analysis stand-in that writes a canned record per day
pub struct RecordingDaily {
    pub store: Arc<dyn RecordStore>,
    pub days: Mutex<Vec<NaiveDate>>,
    pub produce: bool,
}

impl RecordingDaily {
    pub fn new(store: Arc<dyn RecordStore>, produce: bool) -> Self {
        Self {
            store,
            days: Mutex::new(Vec::new()),
            produce,
        }
    }

    pub fn called_days(&self) -> Vec<NaiveDate> {
        self.days.lock().unwrap().clone()
    }
}

#[async_trait]
impl DailyAnalysis for RecordingDaily {
    async fn run_daily(&self, subject: &str, _article_count: usize, day: NaiveDate) -> DeskResult<bool> {
        self.days.lock().unwrap().push(day);
        if !self.produce {
            return Ok(false);
        }
        let record = AnalysisRecord::daily(subject, day, format!("{} traded quietly on {}", subject, day));
        self.store.append(&record).await?;
        Ok(true)
    }
}

pub fn news_item(title: &str, score: f64) -> NewsItem {
    NewsItem {
        title: title.to_string(),
        source: "Wire".to_string(),
        url: "https://example.com/a".to_string(),
        published: "2024-01-05 09:30:00".to_string(),
        summary: format!("{} summary", title),
        topics: vec!["Earnings".to_string()],
        overall_sentiment_score: score,
        overall_sentiment_label: "Somewhat-Bullish".to_string(),
        subject_sentiment: Some(TickerSentiment {
            ticker: "XYZ".to_string(),
            sentiment_score: score,
            sentiment_label: "Somewhat-Bullish".to_string(),
            relevance_score: 0.8,
        }),
        ticker_sentiments: vec![],
    }
}

pub fn bar(day: NaiveDate, close: f64) -> OHLCV {
    OHLCV {
        date: day,
        open: close - 1.0,
        high: close + 1.0,
        low: close - 2.0,
        close,
        volume: 1_250_000,
    }
}

/// Provider serving fixed news and a fixed price history
pub struct StaticProvider {
    pub news: Vec<NewsItem>,
    pub prices: Vec<OHLCV>,
    pub requested_days: Mutex<Vec<Option<NaiveDate>>>,
    pub market_topics: Mutex<Vec<Option<String>>>,
}

impl StaticProvider {
    pub fn new(news: Vec<NewsItem>, prices: Vec<OHLCV>) -> Self {
        Self {
            news,
            prices,
            requested_days: Mutex::new(Vec::new()),
            market_topics: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl MarketDataProvider for StaticProvider {
    async fn fetch_news(&self, _subject: &str, count: usize, day: Option<NaiveDate>) -> DeskResult<Vec<NewsItem>> {
        self.requested_days.lock().unwrap().push(day);
        Ok(self.news.iter().take(count).cloned().collect())
    }

    async fn fetch_market_news(
        &self,
        topics: Option<&str>,
        count: usize,
        day: Option<NaiveDate>,
    ) -> DeskResult<Vec<NewsItem>> {
        self.requested_days.lock().unwrap().push(day);
        self.market_topics.lock().unwrap().push(topics.map(str::to_string));
        Ok(self.news.iter().take(count).cloned().collect())
    }

    async fn fetch_prices(&self, _subject: &str, _output_size: OutputSize) -> DeskResult<Vec<OHLCV>> {
        Ok(self.prices.clone())
    }
}

/// Daily analysis that errors on some days and hangs on others
pub struct UnreliableDaily {
    pub inner: RecordingDaily,
    pub failing: HashSet<NaiveDate>,
    pub hanging: HashSet<NaiveDate>,
}

impl UnreliableDaily {
    pub fn new(store: Arc<dyn RecordStore>, failing: &[NaiveDate], hanging: &[NaiveDate]) -> Self {
        Self {
            inner: RecordingDaily::new(store, true),
            failing: failing.iter().copied().collect(),
            hanging: hanging.iter().copied().collect(),
        }
    }
}

#[async_trait]
impl DailyAnalysis for UnreliableDaily {
    async fn run_daily(&self, subject: &str, article_count: usize, day: NaiveDate) -> DeskResult<bool> {
        if self.failing.contains(&day) {
            self.inner.days.lock().unwrap().push(day);
            return Err(DeskError::provider("news feed unavailable"));
        }
        if self.hanging.contains(&day) {
            self.inner.days.lock().unwrap().push(day);
            tokio::time::sleep(Duration::from_secs(30)).await;
            return Ok(false);
        }
        self.inner.run_daily(subject, article_count, day).await
    }
}

/// In-memory store that refuses to save reflections
pub struct NoReflectionWrites {
    pub inner: Arc<InMemoryRecordStore>,
}

#[async_trait]
impl RecordStore for NoReflectionWrites {
    async fn append(&self, record: &AnalysisRecord) -> DeskResult<RecordId> {
        if record.kind.is_reflection() {
            return Err(DeskError::persistence("disk full"));
        }
        self.inner.append(record).await
    }

    async fn query_similar(
        &self,
        text: &str,
        subject_filter: Option<&str>,
        limit: usize,
    ) -> DeskResult<Vec<ScoredRecord>> {
        self.inner.query_similar(text, subject_filter, limit).await
    }
}

/// Store whose backend is unreachable
pub struct UnreachableStore;

#[async_trait]
impl RecordStore for UnreachableStore {
    async fn append(&self, _record: &AnalysisRecord) -> DeskResult<RecordId> {
        Err(DeskError::embedding("connection refused"))
    }

    async fn query_similar(
        &self,
        _text: &str,
        _subject_filter: Option<&str>,
        _limit: usize,
    ) -> DeskResult<Vec<ScoredRecord>> {
        Err(DeskError::embedding("connection refused"))
    }
}
