//! Data pipeline module for fetching news and prices
//! Provider seam, typed records and data validation

pub mod alpha_vantage;
pub mod format;
pub mod retry;

// Re-export commonly used types
pub use alpha_vantage::AlphaVantageClient;
pub use format::{format_news_articles, format_price_series, price_change_percent, PRICE_WINDOW};

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::errors::DeskResult;

/// Per-ticker sentiment attached to a news article
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TickerSentiment {
    pub ticker: String,
    pub sentiment_score: f64,
    pub sentiment_label: String,
    pub relevance_score: f64,
}

/// News article with sentiment analysis
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewsItem {
    pub title: String,
    pub source: String,
    pub url: String,
    /// `YYYY-MM-DD HH:MM:SS` when parsable, otherwise the raw provider stamp
    pub published: String,
    pub summary: String,
    pub topics: Vec<String>,
    pub overall_sentiment_score: f64, // -1.0 to 1.0
    pub overall_sentiment_label: String,
    /// Sentiment for the subject the news was requested for (stock news only)
    pub subject_sentiment: Option<TickerSentiment>,
    /// Every ticker mentioned (market news only)
    pub ticker_sentiments: Vec<TickerSentiment>,
}

/// Daily bar
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OHLCV {
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: i64,
}

/// How much daily history to request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputSize {
    /// Latest 100 sessions
    #[default]
    Compact,
    /// Full history
    Full,
}

impl OutputSize {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutputSize::Compact => "compact",
            OutputSize::Full => "full",
        }
    }
}

/// Market data provider consumed by the daily-analysis workflow
#[async_trait]
pub trait MarketDataProvider: Send + Sync {
    /// News for one ticker. `day` restricts results to that calendar day.
    async fn fetch_news(&self, subject: &str, count: usize, day: Option<NaiveDate>) -> DeskResult<Vec<NewsItem>>;

    /// Broad market news, optionally filtered by provider topics (comma separated)
    async fn fetch_market_news(
        &self,
        topics: Option<&str>,
        count: usize,
        day: Option<NaiveDate>,
    ) -> DeskResult<Vec<NewsItem>>;

    /// Daily bars in ascending date order
    async fn fetch_prices(&self, subject: &str, output_size: OutputSize) -> DeskResult<Vec<OHLCV>>;
}

/// Validation helpers
pub mod validation {
    use super::*;
    use crate::errors::DeskError;

    /// Validate a stock symbol (letters, digits, `.` and `-`, up to 10 chars)
    pub fn validate_symbol(symbol: &str) -> DeskResult<()> {
        if symbol.is_empty() {
            return Err(DeskError::validation_error("symbol", "Symbol cannot be empty"));
        }

        if symbol.len() > 10 {
            return Err(DeskError::validation_error("symbol", "Symbol too long (max 10 chars)"));
        }

        if !symbol
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '-')
        {
            return Err(DeskError::validation_error(
                "symbol",
                "Symbol must contain only letters, digits, '.' or '-'",
            ));
        }

        Ok(())
    }

    /// Validate OHLCV data
    pub fn validate_ohlcv(bar: &OHLCV) -> DeskResult<()> {
        if bar.open <= 0.0 || bar.high <= 0.0 || bar.low <= 0.0 || bar.close <= 0.0 {
            return Err(DeskError::validation_error("price", "Prices must be positive"));
        }

        if bar.volume < 0 {
            return Err(DeskError::validation_error("volume", "Volume cannot be negative"));
        }

        if bar.high < bar.low {
            return Err(DeskError::validation_error("high_low", "High price cannot be less than low price"));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::validation::*;
    use super::*;

    #[test]
    fn test_symbol_validation() {
        assert!(validate_symbol("AAPL").is_ok());
        assert!(validate_symbol("BRK.B").is_ok());
        assert!(validate_symbol("").is_err());
        assert!(validate_symbol("TOOLONGSYMBOL").is_err());
        assert!(validate_symbol("A B").is_err());
    }

    #[test]
    fn test_ohlcv_validation() {
        let mut bar = OHLCV {
            date: NaiveDate::from_ymd_opt(2024, 1, 2).unwrap(),
            open: 100.0,
            high: 105.0,
            low: 99.0,
            close: 104.0,
            volume: 1_000,
        };
        assert!(validate_ohlcv(&bar).is_ok());

        bar.low = 106.0;
        assert!(validate_ohlcv(&bar).is_err());
    }
}
