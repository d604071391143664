// Semantic record store: append-only analysis records with similarity search
// Backed by PostgreSQL + pgvector in production, in-process for tests

pub mod memory;
mod pgvector_sqlx;
pub mod postgres;
pub mod record;

pub use memory::InMemoryRecordStore;
pub use pgvector_sqlx::PgVector;
pub use postgres::PgRecordStore;
pub use record::{
    is_market_topic, normalize_subject, parse_date, AnalysisKind, AnalysisRecord, RecordId,
    ScoredRecord,
};

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, info};

use crate::errors::DeskResult;

/// Default candidate count for period retrieval
pub const DEFAULT_SCAN_LIMIT: usize = 50;

/// Representative query text used when the caller needs "everything" for a subject
pub fn broad_query_text(subject: Option<&str>) -> String {
    match subject {
        Some(subject) => format!("{} analysis", subject),
        None => "financial analysis".to_string(),
    }
}

/// Append-only persistence of analysis records with similarity retrieval
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Embed `record.content` and persist it with its flattened metadata
    async fn append(&self, record: &AnalysisRecord) -> DeskResult<RecordId>;

    /// Up to `limit` records by descending similarity to `text`.
    /// `subject_filter` is a case-insensitive exact match. No date filtering.
    async fn query_similar(
        &self,
        text: &str,
        subject_filter: Option<&str>,
        limit: usize,
    ) -> DeskResult<Vec<ScoredRecord>>;

    /// Daily records dated within `[start_date, end_date]`, sorted by `(date, subject)`.
    ///
    /// The similarity index has no range scan, so this ranks up to `scan_limit`
    /// candidates against a broad query and filters them locally. Records that
    /// rank below `scan_limit` are silently missed: keep the limit generous
    /// relative to the number of records a window can hold. This is a
    /// precision/recall tradeoff of the index, not a correctness bug. Stores with
    /// a native range index can override this method.
    async fn query_period(
        &self,
        start_date: NaiveDate,
        end_date: NaiveDate,
        subject_filter: Option<&str>,
        scan_limit: usize,
    ) -> DeskResult<Vec<AnalysisRecord>> {
        let query = broad_query_text(subject_filter);
        let candidates = self.query_similar(&query, subject_filter, scan_limit).await?;
        let scanned = candidates.len();

        let mut records: Vec<AnalysisRecord> = candidates
            .into_iter()
            .map(|scored| scored.record)
            .filter(|record| start_date <= record.date && record.date <= end_date)
            .filter(|record| !record.kind.is_reflection())
            .collect();

        records.sort_by(|a, b| {
            a.date
                .cmp(&b.date)
                .then_with(|| a.subject.cmp(&b.subject))
        });

        if scanned == scan_limit {
            debug!(
                scan_limit,
                "Period scan filled its candidate limit; older in-range records may be missed"
            );
        }
        info!(
            scanned,
            matched = records.len(),
            %start_date,
            %end_date,
            "Retrieved period records"
        );
        Ok(records)
    }
}

/// Search result exposed to callers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchHit {
    pub content: String,
    pub metadata: Map<String, Value>,
    pub score: f32,
}

impl From<ScoredRecord> for SearchHit {
    fn from(scored: ScoredRecord) -> Self {
        let mut metadata = scored.record.metadata_map();
        metadata.insert("id".into(), Value::String(scored.id.to_string()));
        Self {
            content: scored.record.content,
            metadata,
            score: scored.score,
        }
    }
}

/// Cosine similarity; zero-length or mismatched vectors score 0
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_broad_query_text() {
        assert_eq!(broad_query_text(Some("NVDA")), "NVDA analysis");
        assert_eq!(broad_query_text(None), "financial analysis");
    }

    #[test]
    fn test_cosine_similarity() {
        assert!((cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-6);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 2.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 2.0]), 0.0);
    }
}
