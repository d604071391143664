//! Render provider data into LLM transcripts

use super::{NewsItem, OHLCV};

/// Sessions included in a price transcript
pub const PRICE_WINDOW: usize = 5;

/// Numbered article listing. `subject` is the ticker the news was requested for.
pub fn format_news_articles(articles: &[NewsItem], subject: Option<&str>) -> String {
    if articles.is_empty() {
        return "No news articles available.".to_string();
    }

    let heading = match subject {
        Some(s) => format!("for {}", s),
        None => "(Market News)".to_string(),
    };

    let mut lines = vec![format!("=== News Articles {} ===\n", heading)];

    for (i, article) in articles.iter().enumerate() {
        lines.push(format!("Article {}:", i + 1));
        lines.push(format!("Title: {}", article.title));
        lines.push(format!("Publisher: {}", article.source));
        lines.push(format!("Published: {}", article.published));
        lines.push(format!("Summary: {}", article.summary));
        lines.push(format!("Topics: {}", article.topics.join(", ")));
        lines.push(format!(
            "Overall Sentiment: {} (Score: {:.4})",
            article.overall_sentiment_label, article.overall_sentiment_score
        ));

        if let Some(ts) = &article.subject_sentiment {
            lines.push(format!(
                "Ticker Sentiment: {} (Score: {:.4})",
                ts.sentiment_label, ts.sentiment_score
            ));
            lines.push(format!("Relevance Score: {:.4}", ts.relevance_score));
        }

        let related: Vec<&str> = article
            .ticker_sentiments
            .iter()
            .take(5)
            .map(|ts| ts.ticker.as_str())
            .collect();
        if !related.is_empty() {
            lines.push(format!("Related Tickers: {}", related.join(", ")));
        }

        lines.push(format!("Link: {}", article.url));
        lines.push(String::new());
    }

    lines.join("\n")
}

/// Most recent sessions first, with the close-to-close change over the window
pub fn format_price_series(bars: &[OHLCV], subject: &str) -> String {
    if bars.is_empty() {
        return format!("No time series data available for {}.", subject);
    }

    let recent = recent_sessions(bars);
    let mut lines = vec![format!("=== Recent Price Data for {} ===\n", subject)];

    for bar in &recent {
        lines.push(format!("Date: {}", bar.date.format("%Y-%m-%d")));
        lines.push(format!("  Open:   ${:.2}", bar.open));
        lines.push(format!("  High:   ${:.2}", bar.high));
        lines.push(format!("  Low:    ${:.2}", bar.low));
        lines.push(format!("  Close:  ${:.2}", bar.close));
        lines.push(format!("  Volume: {}", group_thousands(bar.volume)));
        lines.push(String::new());
    }

    if let (Some(latest), Some(oldest), Some(pct)) =
        (recent.first(), recent.last(), price_change_percent(bars))
    {
        lines.push(format!(
            "Price Change (Last {} days): ${:.2} ({:+.2}%)",
            recent.len(),
            latest.close - oldest.close,
            pct
        ));
    }

    lines.join("\n")
}

/// Percent change from the oldest to the newest close in the formatted window
pub fn price_change_percent(bars: &[OHLCV]) -> Option<f64> {
    let recent = recent_sessions(bars);
    if recent.len() < 2 {
        return None;
    }
    let latest = recent.first()?.close;
    let oldest = recent.last()?.close;
    if oldest == 0.0 {
        return None;
    }
    Some((latest - oldest) / oldest * 100.0)
}

fn recent_sessions(bars: &[OHLCV]) -> Vec<&OHLCV> {
    let mut sorted: Vec<&OHLCV> = bars.iter().collect();
    sorted.sort_by(|a, b| b.date.cmp(&a.date));
    sorted.truncate(PRICE_WINDOW);
    sorted
}

fn group_thousands(value: i64) -> String {
    let digits = value.unsigned_abs().to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    if value < 0 {
        out.insert(0, '-');
    }
    out
}
