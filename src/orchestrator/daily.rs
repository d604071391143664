//! Daily analysis workflow
//! News + prices -> three LLM passes -> one daily record in the store

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use std::sync::Arc;
use tracing::{info, warn};

use crate::data::{
    format_news_articles, format_price_series, price_change_percent, MarketDataProvider, NewsItem,
    OutputSize, OHLCV,
};
use crate::errors::DeskResult;
use crate::llm::prompts::AnalysisPrompts;
use crate::llm::CompletionService;
use crate::vector::{is_market_topic, normalize_subject, AnalysisRecord, RecordId, RecordStore};

const NO_PRICE_DATA: &str = "No price data available for this target.";

/// Produces and stores one day's analysis for a subject
#[async_trait]
pub trait DailyAnalysis: Send + Sync {
    /// Returns `Ok(true)` once a daily record has been appended, `Ok(false)`
    /// when the provider had nothing to analyse.
    async fn run_daily(&self, subject: &str, article_count: usize, day: NaiveDate) -> DeskResult<bool>;
}

/// Result of one daily analysis
#[derive(Debug, Clone)]
pub struct DailyReport {
    pub subject: String,
    pub day: NaiveDate,
    pub news_summary: String,
    pub price_analysis: String,
    pub final_summary: String,
    pub num_articles: usize,
    pub sentiment_score: Option<f64>,
    pub price_change: Option<f64>,
}

impl DailyReport {
    /// Record persisted for this report
    pub fn to_record(&self) -> AnalysisRecord {
        let mut record = AnalysisRecord::daily(&self.subject, self.day, self.final_summary.clone())
            .with_metadata("num_articles", self.num_articles as u64);
        if let Some(score) = self.sentiment_score {
            record = record.with_metadata("sentiment_score", score);
        }
        if let Some(change) = self.price_change {
            record = record.with_metadata("price_change", change);
        }
        record
    }

    /// Display human-readable summary of the analysis
    pub fn display_summary(&self) {
        println!("\n{}", "=".repeat(80));
        println!("COMPREHENSIVE ANALYSIS: {} ({})", self.subject, self.day);
        println!("{}\n", "=".repeat(80));
        println!("{}", self.final_summary);

        println!("\n{}", "-".repeat(80));
        println!("DETAILED COMPONENT ANALYSES");
        println!("{}\n", "-".repeat(80));

        println!("📰 News Summary ({} articles):", self.num_articles);
        println!("{}", self.news_summary);

        println!("\n📊 Price Analysis:");
        println!("{}", self.price_analysis);

        if let Some(score) = self.sentiment_score {
            println!("\n   Mean sentiment: {:+.4}", score);
        }
        if let Some(change) = self.price_change {
            println!("   Price change: {:+.2}%", change);
        }
    }
}

/// Mean ticker-specific sentiment, falling back to overall article sentiment
pub fn mean_sentiment(news: &[NewsItem]) -> Option<f64> {
    let ticker_scores: Vec<f64> = news
        .iter()
        .filter_map(|n| n.subject_sentiment.as_ref().map(|s| s.sentiment_score))
        .collect();

    let scores = if ticker_scores.is_empty() {
        news.iter().map(|n| n.overall_sentiment_score).collect()
    } else {
        ticker_scores
    };

    if scores.is_empty() {
        None
    } else {
        Some(scores.iter().sum::<f64>() / scores.len() as f64)
    }
}

pub struct DailyAnalysisWorkflow {
    provider: Arc<dyn MarketDataProvider>,
    completion: Arc<dyn CompletionService>,
    store: Arc<dyn RecordStore>,
    temperature: f32,
}

impl DailyAnalysisWorkflow {
    pub fn new(
        provider: Arc<dyn MarketDataProvider>,
        completion: Arc<dyn CompletionService>,
        store: Arc<dyn RecordStore>,
        temperature: f32,
    ) -> Self {
        Self {
            provider,
            completion,
            store,
            temperature,
        }
    }

    /// Run the analysis without persisting. `Ok(None)` when news or prices are missing.
    pub async fn analyze(&self, subject: &str, article_count: usize, day: NaiveDate) -> DeskResult<Option<DailyReport>> {
        let subject = normalize_subject(subject);
        let market_topic = is_market_topic(&subject);
        // Historical days are pinned to that day's news; today takes the latest feed
        let news_day = (day < Utc::now().date_naive()).then_some(day);

        info!("📰 Fetching news for {} ({})", subject, day);
        let news = if market_topic {
            let topic = subject
                .split_once(':')
                .map(|(_, topic)| topic)
                .filter(|topic| !topic.is_empty() && *topic != "general");
            self.provider.fetch_market_news(topic, article_count, news_day).await
        } else {
            self.provider.fetch_news(&subject, article_count, news_day).await
        };

        let news = match news {
            Ok(news) if !news.is_empty() => news,
            Ok(_) => {
                warn!("⚠️  No news articles found for {} on {}", subject, day);
                return Ok(None);
            }
            Err(e) => {
                warn!("⚠️  News unavailable for {}: {}", subject, e);
                return Ok(None);
            }
        };

        let prices: Vec<OHLCV> = if market_topic {
            Vec::new()
        } else {
            info!("📊 Fetching price data for {}", subject);
            let bars = match self.provider.fetch_prices(&subject, OutputSize::Compact).await {
                Ok(bars) => bars,
                Err(e) => {
                    warn!("⚠️  Prices unavailable for {}: {}", subject, e);
                    return Ok(None);
                }
            };
            let bars: Vec<OHLCV> = bars.into_iter().filter(|bar| bar.date <= day).collect();
            if bars.is_empty() {
                warn!("⚠️  No price data found for {} up to {}", subject, day);
                return Ok(None);
            }
            bars
        };

        info!("🤖 Running AI analysis for {}", subject);
        let ticker = (!market_topic).then_some(subject.as_str());
        let (news_summary, price_analysis) = tokio::join!(
            self.summarize_news(&subject, ticker, &news),
            self.analyze_prices(&subject, &prices)
        );
        let final_summary = self.synthesize(&subject, &news_summary, &price_analysis).await;

        Ok(Some(DailyReport {
            num_articles: news.len(),
            sentiment_score: mean_sentiment(&news),
            price_change: price_change_percent(&prices),
            subject,
            day,
            news_summary,
            price_analysis,
            final_summary,
        }))
    }

    /// Append the report's daily record
    pub async fn persist(&self, report: &DailyReport) -> DeskResult<RecordId> {
        let id = self.store.append(&report.to_record()).await?;
        info!("💾 Saved daily analysis for {} ({}) as {}", report.subject, report.day, id);
        Ok(id)
    }

    async fn summarize_news(&self, subject: &str, ticker: Option<&str>, news: &[NewsItem]) -> String {
        let news_text = format_news_articles(news, ticker);
        self.completion
            .complete(
                &AnalysisPrompts::news_analysis_system(),
                &AnalysisPrompts::news_analysis_user(subject, &news_text),
                self.temperature,
            )
            .await
            .unwrap_or_else(|e| format!("Error generating news summary: {}", e))
    }

    async fn analyze_prices(&self, subject: &str, prices: &[OHLCV]) -> String {
        if prices.is_empty() {
            return NO_PRICE_DATA.to_string();
        }
        let price_text = format_price_series(prices, subject);
        self.completion
            .complete(
                &AnalysisPrompts::price_analysis_system(),
                &AnalysisPrompts::price_analysis_user(subject, &price_text, prices.len()),
                self.temperature,
            )
            .await
            .unwrap_or_else(|e| format!("Error generating price analysis: {}", e))
    }

    async fn synthesize(&self, subject: &str, news_summary: &str, price_analysis: &str) -> String {
        self.completion
            .complete(
                &AnalysisPrompts::synthesis_system(),
                &AnalysisPrompts::synthesis_user(subject, news_summary, price_analysis),
                self.temperature,
            )
            .await
            .unwrap_or_else(|e| format!("Error generating final summary: {}", e))
    }
}

#[async_trait]
impl DailyAnalysis for DailyAnalysisWorkflow {
    async fn run_daily(&self, subject: &str, article_count: usize, day: NaiveDate) -> DeskResult<bool> {
        match self.analyze(subject, article_count, day).await? {
            Some(report) => {
                self.persist(&report).await?;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::TickerSentiment;

    fn item(overall: f64, ticker: Option<f64>) -> NewsItem {
        NewsItem {
            title: "t".into(),
            source: "s".into(),
            url: String::new(),
            published: "Unknown".into(),
            summary: String::new(),
            topics: vec![],
            overall_sentiment_score: overall,
            overall_sentiment_label: "Neutral".into(),
            subject_sentiment: ticker.map(|score| TickerSentiment {
                ticker: "XYZ".into(),
                sentiment_score: score,
                sentiment_label: "Neutral".into(),
                relevance_score: 0.5,
            }),
            ticker_sentiments: vec![],
        }
    }

    #[test]
    fn test_mean_sentiment_prefers_ticker_scores() {
        let news = vec![item(0.9, Some(0.2)), item(0.9, Some(0.4)), item(0.9, None)];
        assert!((mean_sentiment(&news).unwrap() - 0.3).abs() < 1e-9);
    }

    #[test]
    fn test_mean_sentiment_falls_back_to_overall() {
        let news = vec![item(0.1, None), item(0.3, None)];
        assert!((mean_sentiment(&news).unwrap() - 0.2).abs() < 1e-9);
        assert_eq!(mean_sentiment(&[]), None);
    }

    #[test]
    fn test_report_record_metadata() {
        let report = DailyReport {
            subject: "XYZ".into(),
            day: NaiveDate::from_ymd_opt(2024, 1, 2).unwrap(),
            news_summary: "n".into(),
            price_analysis: "p".into(),
            final_summary: "final".into(),
            num_articles: 3,
            sentiment_score: Some(0.25),
            price_change: None,
        };

        let record = report.to_record();
        assert_eq!(record.content, "final");
        assert_eq!(record.subject.as_deref(), Some("XYZ"));
        assert_eq!(record.extra_metadata["num_articles"], 3);
        assert_eq!(record.extra_metadata["sentiment_score"], 0.25);
        assert!(!record.extra_metadata.contains_key("price_change"));
    }
}
