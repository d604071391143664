//! Historical search over stored analyses

use chrono::NaiveDate;
use std::sync::Arc;
use tracing::{info, warn};

use crate::vector::{parse_date, RecordStore, SearchHit, DEFAULT_SCAN_LIMIT};

pub struct HistorySearch {
    store: Arc<dyn RecordStore>,
}

impl HistorySearch {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }

    /// Top `top_k` records by similarity to `query`. Store failures yield no hits.
    pub async fn search(&self, query: &str, subject_filter: Option<&str>, top_k: usize) -> Vec<SearchHit> {
        self.search_in_range(query, subject_filter, top_k, None).await
    }

    /// Like [`HistorySearch::search`], keeping only hits dated within the closed `range`
    pub async fn search_in_range(
        &self,
        query: &str,
        subject_filter: Option<&str>,
        top_k: usize,
        range: Option<(NaiveDate, NaiveDate)>,
    ) -> Vec<SearchHit> {
        // Date filtering happens after ranking, so widen the candidate pool
        let limit = match range {
            Some(_) => top_k.max(DEFAULT_SCAN_LIMIT),
            None => top_k,
        };

        let scored = match self.store.query_similar(query, subject_filter, limit).await {
            Ok(scored) => scored,
            Err(e) => {
                warn!(error = %e, "Historical search failed; returning no results");
                return Vec::new();
            }
        };

        let hits: Vec<SearchHit> = scored
            .into_iter()
            .filter(|scored| match range {
                Some((from, to)) => from <= scored.record.date && scored.record.date <= to,
                None => true,
            })
            .take(top_k)
            .map(SearchHit::from)
            .collect();

        info!("Found {} relevant analyses for query '{}'", hits.len(), query);
        hits
    }
}

/// Print hits the way the CLI shows them
pub fn display_hits(subject: &str, query: &str, hits: &[SearchHit]) {
    let banner = "=".repeat(80);
    println!("\n{}\nSEARCHING HISTORICAL ANALYSES: {}\n{}\n", banner, subject, banner);
    println!("Query: {}\n", query);

    if hits.is_empty() {
        println!("⚠️  No historical analyses found for {}", subject);
        println!("💡 Tip: Run daily analysis to build historical data");
        return;
    }

    println!("✅ Found {} relevant analyses:\n", hits.len());
    for (i, hit) in hits.iter().enumerate() {
        let date = hit
            .metadata
            .get("date")
            .and_then(|v| v.as_str())
            .and_then(|d| parse_date(d).ok())
            .map(|d| d.to_string())
            .unwrap_or_else(|| "Unknown".to_string());
        let kind = hit
            .metadata
            .get("analysis_kind")
            .and_then(|v| v.as_str())
            .unwrap_or("daily");

        println!("{}", "-".repeat(80));
        println!("Result {} - {} ({}) - Similarity: {:.3}", i + 1, date, kind, hit.score);
        println!("{}", "-".repeat(80));
        if hit.content.chars().count() > 500 {
            println!("{}...", hit.content.chars().take(500).collect::<String>());
        } else {
            println!("{}", hit.content);
        }
        println!();
    }
}
