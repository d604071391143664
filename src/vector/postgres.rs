//! PostgreSQL + pgvector record store
//! One table, partitioned by collection name, similarity via cosine distance

use async_trait::async_trait;
use serde_json::Value;
use sqlx::{PgPool, Row};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use super::{AnalysisRecord, PgVector, RecordId, RecordStore, ScoredRecord};
use crate::embeddings::Embedder;
use crate::errors::{DeskError, DeskResult};

pub struct PgRecordStore {
    pool: PgPool,
    embedder: Arc<dyn Embedder>,
    collection: String,
}

impl PgRecordStore {
    /// Create a store over an existing pool; verifies the pgvector extension
    pub async fn new(pool: PgPool, embedder: Arc<dyn Embedder>, collection: impl Into<String>) -> DeskResult<Self> {
        sqlx::query("SELECT 1 FROM pg_extension WHERE extname = 'vector'")
            .fetch_optional(&pool)
            .await
            .map_err(|e| DeskError::persistence(format!("Failed to verify pgvector extension: {}", e)))?
            .ok_or_else(|| DeskError::persistence("pgvector extension not found. Please run migrations."))?;

        Ok(Self {
            pool,
            embedder,
            collection: collection.into(),
        })
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// Record count in this collection
    pub async fn count(&self) -> DeskResult<i64> {
        let row = sqlx::query("SELECT COUNT(*) AS total FROM analysis_records WHERE collection = $1")
            .bind(&self.collection)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| DeskError::persistence(format!("Failed to count records: {}", e)))?;

        Ok(row.get("total"))
    }
}

#[async_trait]
impl RecordStore for PgRecordStore {
    async fn append(&self, record: &AnalysisRecord) -> DeskResult<RecordId> {
        let embedding = self.embedder.embed(&record.content).await?;
        let id = RecordId::new();
        let metadata = Value::Object(record.metadata_map());

        sqlx::query(
            r#"
            INSERT INTO analysis_records (
                id, collection, content, subject, analysis_date, analysis_kind, metadata, embedding, created_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(id.0)
        .bind(&self.collection)
        .bind(&record.content)
        .bind(record.subject.as_deref())
        .bind(record.date_string())
        .bind(record.kind.as_metadata_value())
        .bind(metadata)
        .bind(PgVector::new(embedding))
        .bind(record.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| DeskError::persistence(format!("Failed to insert analysis record: {}", e)))?;

        info!(%id, kind = %record.kind, date = %record.date, collection = %self.collection, "Appended record");
        Ok(id)
    }

    async fn query_similar(
        &self,
        text: &str,
        subject_filter: Option<&str>,
        limit: usize,
    ) -> DeskResult<Vec<ScoredRecord>> {
        let embedding = self.embedder.embed(text).await?;

        let rows = sqlx::query(
            r#"
            SELECT
                id,
                content,
                metadata,
                1 - (embedding <=> $1) AS similarity
            FROM analysis_records
            WHERE collection = $2
            AND ($3::TEXT IS NULL OR UPPER(subject) = UPPER($3))
            ORDER BY embedding <=> $1
            LIMIT $4
            "#,
        )
        .bind(PgVector::new(embedding))
        .bind(&self.collection)
        .bind(subject_filter.map(str::trim))
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| DeskError::persistence(format!("Failed to execute similarity search: {}", e)))?;

        let mut results = Vec::with_capacity(rows.len());
        for row in rows {
            let id: Uuid = row.try_get("id")?;
            let content: String = row.try_get("content")?;
            let metadata: Value = row.try_get("metadata")?;
            let similarity: Option<f64> = row.try_get("similarity")?;

            let Some(metadata) = metadata.as_object() else {
                warn!(%id, "Skipping record with non-object metadata");
                continue;
            };

            match AnalysisRecord::from_metadata(content, metadata) {
                Ok(record) => results.push(ScoredRecord {
                    id: RecordId(id),
                    record,
                    score: similarity.unwrap_or(0.0) as f32,
                }),
                Err(e) => warn!(%id, error = %e, "Skipping record with invalid metadata"),
            }
        }

        info!("Found {} similar records", results.len());
        Ok(results)
    }
}
