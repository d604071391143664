//! In-process record store
//! Same contract as the Postgres store, cosine similarity over an append-only Vec

use async_trait::async_trait;
use serde_json::{Map, Value};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::info;

use super::{cosine_similarity, AnalysisRecord, RecordId, RecordStore, ScoredRecord};
use crate::embeddings::Embedder;
use crate::errors::DeskResult;

struct StoredEntry {
    id: RecordId,
    content: String,
    metadata: Map<String, Value>,
    embedding: Vec<f32>,
}

pub struct InMemoryRecordStore {
    embedder: Arc<dyn Embedder>,
    entries: RwLock<Vec<StoredEntry>>,
}

impl InMemoryRecordStore {
    pub fn new(embedder: Arc<dyn Embedder>) -> Self {
        Self {
            embedder,
            entries: RwLock::new(Vec::new()),
        }
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    /// Every stored record in insertion order
    pub async fn records(&self) -> Vec<AnalysisRecord> {
        self.entries
            .read()
            .await
            .iter()
            .filter_map(|entry| AnalysisRecord::from_metadata(entry.content.clone(), &entry.metadata).ok())
            .collect()
    }
}

#[async_trait]
impl RecordStore for InMemoryRecordStore {
    async fn append(&self, record: &AnalysisRecord) -> DeskResult<RecordId> {
        let embedding = self.embedder.embed(&record.content).await?;
        let id = RecordId::new();

        self.entries.write().await.push(StoredEntry {
            id,
            content: record.content.clone(),
            metadata: record.metadata_map(),
            embedding,
        });

        info!(%id, kind = %record.kind, date = %record.date, "Appended record");
        Ok(id)
    }

    async fn query_similar(
        &self,
        text: &str,
        subject_filter: Option<&str>,
        limit: usize,
    ) -> DeskResult<Vec<ScoredRecord>> {
        let query = self.embedder.embed(text).await?;
        let entries = self.entries.read().await;

        let mut scored: Vec<ScoredRecord> = entries
            .iter()
            .filter_map(|entry| {
                let record = AnalysisRecord::from_metadata(entry.content.clone(), &entry.metadata).ok()?;
                if let Some(filter) = subject_filter {
                    if !record.subject_matches(filter) {
                        return None;
                    }
                }
                Some(ScoredRecord {
                    id: entry.id,
                    record,
                    score: cosine_similarity(&query, &entry.embedding),
                })
            })
            .collect();

        scored.sort_by(|a, b| b.score.total_cmp(&a.score));
        scored.truncate(limit);
        Ok(scored)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::DeskError;
    use crate::reflection::PeriodLabel;
    use crate::vector::AnalysisKind;
    use chrono::NaiveDate;

    /// Letter-frequency embedding, enough to make similarity meaningful
    struct LetterEmbedder;

    #[async_trait]
    impl Embedder for LetterEmbedder {
        async fn embed(&self, text: &str) -> DeskResult<Vec<f32>> {
            let mut v = vec![0.0f32; 26];
            for c in text.to_ascii_lowercase().chars().filter(|c| c.is_ascii_lowercase()) {
                v[(c as u8 - b'a') as usize] += 1.0;
            }
            Ok(v)
        }
    }

    struct OfflineEmbedder;

    #[async_trait]
    impl Embedder for OfflineEmbedder {
        async fn embed(&self, _text: &str) -> DeskResult<Vec<f32>> {
            Err(DeskError::embedding("service unreachable"))
        }
    }

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, d).unwrap()
    }

    #[tokio::test]
    async fn test_query_similar_ranks_and_filters_subject() {
        let store = InMemoryRecordStore::new(Arc::new(LetterEmbedder));
        store.append(&AnalysisRecord::daily("AAA", day(1), "zzzz zzzz")).await.unwrap();
        store.append(&AnalysisRecord::daily("AAA", day(2), "apple apple")).await.unwrap();
        store.append(&AnalysisRecord::daily("BBB", day(3), "apple apple")).await.unwrap();

        let hits = store.query_similar("apple", Some("aaa"), 10).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].record.date, day(2));
        assert!(hits[0].score > hits[1].score);

        let limited = store.query_similar("apple", None, 1).await.unwrap();
        assert_eq!(limited.len(), 1);
    }

    #[tokio::test]
    async fn test_query_period_excludes_reflections_and_out_of_range() {
        let store = InMemoryRecordStore::new(Arc::new(LetterEmbedder));
        for d in [1, 2, 3, 9] {
            store.append(&AnalysisRecord::daily("XYZ", day(d), format!("day {}", d))).await.unwrap();
        }
        let reflection = AnalysisRecord::new("weekly", day(3), AnalysisKind::reflection(PeriodLabel::Week, false))
            .with_subject(Some("XYZ"));
        store.append(&reflection).await.unwrap();

        let records = store.query_period(day(1), day(7), Some("XYZ"), 50).await.unwrap();
        let dates: Vec<_> = records.iter().map(|r| r.date).collect();
        assert_eq!(dates, vec![day(1), day(2), day(3)]);
        assert!(records.iter().all(|r| r.kind == AnalysisKind::Daily));
    }

    #[tokio::test]
    async fn test_embedding_failure_surfaces_as_embedding_error() {
        let store = InMemoryRecordStore::new(Arc::new(OfflineEmbedder));
        let err = store
            .append(&AnalysisRecord::daily("XYZ", day(1), "text"))
            .await
            .unwrap_err();
        assert!(matches!(err, DeskError::Embedding { .. }));
        assert!(store.is_empty().await);
    }
}
