//! Analysis records persisted in the semantic store
//! Typed replacement for the flat metadata map the store keeps per entry

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use uuid::Uuid;

use crate::errors::{DeskError, DeskResult};
use crate::reflection::PeriodLabel;

/// Metadata keys owned by the record itself; extra metadata may not override them
pub const RESERVED_KEYS: [&str; 5] = ["date", "subject", "analysis_kind", "created_at", "category"];

pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Identifier assigned by the store on append
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RecordId(pub Uuid);

impl RecordId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RecordId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// What produced a record
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnalysisKind {
    Daily,
    Reflection { period: PeriodLabel, portfolio: bool },
    /// Kind string written by something else; kept verbatim
    Other(String),
}

impl AnalysisKind {
    pub fn reflection(period: PeriodLabel, portfolio: bool) -> Self {
        AnalysisKind::Reflection { period, portfolio }
    }

    /// Any reflection variant, including unknown kinds mentioning "reflection"
    pub fn is_reflection(&self) -> bool {
        match self {
            AnalysisKind::Daily => false,
            AnalysisKind::Reflection { .. } => true,
            AnalysisKind::Other(kind) => kind.contains("reflection"),
        }
    }

    pub fn as_metadata_value(&self) -> String {
        match self {
            AnalysisKind::Daily => "daily".to_string(),
            AnalysisKind::Reflection { period, portfolio: false } => format!("reflection_{}", period),
            AnalysisKind::Reflection { period, portfolio: true } => {
                format!("reflection_{}_portfolio", period)
            }
            AnalysisKind::Other(kind) => kind.clone(),
        }
    }

    pub fn parse(value: &str) -> Self {
        if value == "daily" {
            return AnalysisKind::Daily;
        }

        if let Some(rest) = value.strip_prefix("reflection_") {
            let (label, portfolio) = match rest.strip_suffix("_portfolio") {
                Some(label) => (label, true),
                None => (rest, false),
            };
            let period = match label {
                "week" => Some(PeriodLabel::Week),
                "month" => Some(PeriodLabel::Month),
                "quarter" => Some(PeriodLabel::Quarter),
                "custom" => Some(PeriodLabel::Custom),
                _ => None,
            };
            if let Some(period) = period {
                return AnalysisKind::Reflection { period, portfolio };
            }
        }

        AnalysisKind::Other(value.to_string())
    }
}

impl fmt::Display for AnalysisKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_metadata_value())
    }
}

/// True for `market:<topic>` / `topic:<topic>` subjects
pub fn is_market_topic(subject: &str) -> bool {
    subject.starts_with("market:") || subject.starts_with("topic:")
}

/// Upper-case ticker-like subjects; keep macro topics as given
pub fn normalize_subject(subject: &str) -> String {
    let trimmed = subject.trim();
    let ticker_like = !trimmed.is_empty()
        && trimmed.len() <= 10
        && trimmed
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '-');

    if ticker_like && !is_market_topic(trimmed) {
        trimmed.to_ascii_uppercase()
    } else {
        trimmed.to_string()
    }
}

/// One persisted unit of analysis. Never mutated once appended.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisRecord {
    pub content: String,
    pub subject: Option<String>,
    pub date: NaiveDate,
    pub kind: AnalysisKind,
    pub created_at: DateTime<Utc>,
    pub extra_metadata: Map<String, Value>,
}

impl AnalysisRecord {
    pub fn new(content: impl Into<String>, date: NaiveDate, kind: AnalysisKind) -> Self {
        Self {
            content: content.into(),
            subject: None,
            date,
            kind,
            created_at: Utc::now(),
            extra_metadata: Map::new(),
        }
    }

    pub fn daily(subject: &str, date: NaiveDate, content: impl Into<String>) -> Self {
        Self::new(content, date, AnalysisKind::Daily).with_subject(Some(subject))
    }

    pub fn with_subject(mut self, subject: Option<&str>) -> Self {
        self.subject = subject
            .map(normalize_subject)
            .filter(|s| !s.is_empty());
        self
    }

    pub fn with_metadata(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.extra_metadata.insert(key.to_string(), value.into());
        self
    }

    pub fn date_string(&self) -> String {
        self.date.format(DATE_FORMAT).to_string()
    }

    pub fn subject_matches(&self, filter: &str) -> bool {
        self.subject
            .as_deref()
            .is_some_and(|s| s.eq_ignore_ascii_case(filter.trim()))
    }

    /// Flatten every field into the queryable metadata map kept by the store
    pub fn metadata_map(&self) -> Map<String, Value> {
        let mut metadata: Map<String, Value> = self
            .extra_metadata
            .iter()
            .filter(|(key, _)| !RESERVED_KEYS.contains(&key.as_str()))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();

        metadata.insert("date".into(), Value::String(self.date_string()));
        metadata.insert("analysis_kind".into(), Value::String(self.kind.as_metadata_value()));
        metadata.insert("created_at".into(), Value::String(self.created_at.to_rfc3339()));

        if let Some(subject) = &self.subject {
            metadata.insert("subject".into(), Value::String(subject.clone()));
            let category = if is_market_topic(subject) { "macro" } else { "stock" };
            metadata.insert("category".into(), Value::String(category.into()));
        }

        metadata
    }

    /// Rebuild a record from stored content and its flattened metadata
    pub fn from_metadata(content: impl Into<String>, metadata: &Map<String, Value>) -> DeskResult<Self> {
        let date = metadata
            .get("date")
            .and_then(Value::as_str)
            .ok_or_else(|| DeskError::validation_error("date", "missing from record metadata"))?;
        let date = parse_date(date)?;

        let kind = metadata
            .get("analysis_kind")
            .and_then(Value::as_str)
            .map(AnalysisKind::parse)
            .unwrap_or(AnalysisKind::Daily);

        let created_at = metadata
            .get("created_at")
            .and_then(Value::as_str)
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(Utc::now);

        let subject = metadata
            .get("subject")
            .and_then(Value::as_str)
            .map(|s| s.to_string());

        let extra_metadata = metadata
            .iter()
            .filter(|(key, _)| !RESERVED_KEYS.contains(&key.as_str()))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();

        Ok(Self {
            content: content.into(),
            subject,
            date,
            kind,
            created_at,
            extra_metadata,
        })
    }
}

/// Strict `YYYY-MM-DD` parse; the fixed width keeps lexical and calendar order identical
pub fn parse_date(value: &str) -> DeskResult<NaiveDate> {
    if value.len() != 10 {
        return Err(DeskError::validation_error(
            "date".to_string(),
            format!("expected YYYY-MM-DD, got '{}'", value),
        ));
    }
    NaiveDate::parse_from_str(value, DATE_FORMAT).map_err(|e| {
        DeskError::validation_error("date".to_string(), format!("invalid date '{}': {}", value, e))
    })
}

/// Record returned by a similarity query
#[derive(Debug, Clone)]
pub struct ScoredRecord {
    pub id: RecordId,
    pub record: AnalysisRecord,
    /// Higher is more similar
    pub score: f32,
}
