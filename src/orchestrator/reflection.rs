//! Reflection orchestrator
//! RESOLVING_PERIOD -> RETRIEVING -> (BACKFILLING -> RETRIEVING)? -> AGGREGATING -> PERSISTING -> DONE

use chrono::NaiveDate;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use super::daily::DailyAnalysis;
use crate::config::ReflectionConfig;
use crate::errors::{DeskError, DeskResult};
use crate::llm::CompletionService;
use crate::reflection::{AggregationPipeline, PeriodLabel, PeriodWindow, ReflectionBundle};
use crate::vector::{normalize_subject, AnalysisKind, AnalysisRecord, RecordId, RecordStore, DEFAULT_SCAN_LIMIT};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReflectionState {
    ResolvingPeriod,
    Retrieving,
    Backfilling,
    Aggregating,
    Persisting,
    Done,
}

impl fmt::Display for ReflectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ReflectionState::ResolvingPeriod => "RESOLVING_PERIOD",
            ReflectionState::Retrieving => "RETRIEVING",
            ReflectionState::Backfilling => "BACKFILLING",
            ReflectionState::Aggregating => "AGGREGATING",
            ReflectionState::Persisting => "PERSISTING",
            ReflectionState::Done => "DONE",
        };
        f.write_str(name)
    }
}

/// Orchestrator settings
#[derive(Debug, Clone)]
pub struct ReflectionSettings {
    pub scan_limit: usize,
    pub backfill_enabled: bool,
    pub backfill_article_count: usize,
    pub backfill_day_timeout: Duration,
}

impl Default for ReflectionSettings {
    fn default() -> Self {
        Self {
            scan_limit: DEFAULT_SCAN_LIMIT,
            backfill_enabled: true,
            backfill_article_count: 5,
            backfill_day_timeout: Duration::from_secs(180),
        }
    }
}

impl From<&ReflectionConfig> for ReflectionSettings {
    fn from(config: &ReflectionConfig) -> Self {
        Self {
            scan_limit: config.scan_limit.max(1),
            backfill_enabled: config.backfill_enabled,
            backfill_article_count: config.backfill_article_count.max(1),
            backfill_day_timeout: Duration::from_secs(config.backfill_day_timeout_seconds),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackfillOutcome {
    Analyzed,
    NoData,
    Failed(String),
    TimedOut,
}

/// Per-day results of a backfill pass
#[derive(Debug, Clone, Default)]
pub struct BackfillSummary {
    pub days: Vec<(NaiveDate, BackfillOutcome)>,
}

impl BackfillSummary {
    pub fn attempted(&self) -> usize {
        self.days.len()
    }

    pub fn analyzed(&self) -> usize {
        self.days
            .iter()
            .filter(|(_, outcome)| *outcome == BackfillOutcome::Analyzed)
            .count()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReflectionStatus {
    Completed,
    InsufficientData { reason: String },
}

/// Everything a reflection run produced; always returned unless cancelled
#[derive(Debug, Clone)]
pub struct ReflectionReport {
    pub window: PeriodWindow,
    pub status: ReflectionStatus,
    pub bundle: ReflectionBundle,
    pub records_used: usize,
    pub retrievals: usize,
    pub backfill: Option<BackfillSummary>,
    pub saved: Option<RecordId>,
    pub persist_error: Option<String>,
    /// Last record-store failure seen while retrieving
    pub retrieval_error: Option<String>,
}

impl ReflectionReport {
    /// Report for a run whose record store could not even be opened
    pub fn store_unavailable(window: PeriodWindow, error: impl fmt::Display) -> Self {
        let error = error.to_string();
        Self {
            window,
            status: ReflectionStatus::InsufficientData {
                reason: format!("No analyses available: record store unavailable ({})", error),
            },
            bundle: ReflectionBundle::empty(),
            records_used: 0,
            retrievals: 0,
            backfill: None,
            saved: None,
            persist_error: None,
            retrieval_error: Some(error),
        }
    }

    /// Display human-readable summary of the reflection
    pub fn display_summary(&self) {
        let banner = "=".repeat(80);
        let heading = match &self.window.subject {
            Some(subject) => format!("PERIODIC REFLECTION: {} ({})", subject, self.window.period_label),
            None => format!("PERIODIC PORTFOLIO REFLECTION ({})", self.window.period_label),
        };
        println!("\n{}\n{}\n{}\n", banner, heading, banner);
        println!("📅 Date Range: {}", self.window);

        if let Some(backfill) = &self.backfill {
            println!(
                "🔄 Backfill: {} of {} days analyzed",
                backfill.analyzed(),
                backfill.attempted()
            );
        }

        if let Some(err) = &self.retrieval_error {
            println!("⚠️  Record store error: {}", err);
        }

        if let ReflectionStatus::InsufficientData { reason } = &self.status {
            println!("⚠️  {}", reason);
            if self.window.subject.is_none() {
                println!("💡 Tip: Run daily analysis for a subject to build historical data");
            }
            return;
        }

        println!("✅ Found {} daily analyses", self.records_used);
        println!("\n{}\n{}\n{}", banner, self.bundle.period_info, banner);

        for section in &self.bundle.sections {
            println!("\n{}\n{}\n{}\n", banner, section.kind.title(), banner);
            println!("{}", section.content);
        }

        match (&self.saved, &self.persist_error) {
            (Some(id), _) => println!("\n✅ Reflection saved ({})", id),
            (None, Some(err)) => println!("\n⚠️  Could not save reflection: {}", err),
            (None, None) => {}
        }
    }
}

async fn cancellable<T>(cancel: &CancellationToken, fut: impl Future<Output = T>) -> DeskResult<T> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(DeskError::Cancelled),
        out = fut => Ok(out),
    }
}

pub struct ReflectionOrchestrator {
    store: Arc<dyn RecordStore>,
    pipeline: AggregationPipeline,
    daily: Option<Arc<dyn DailyAnalysis>>,
    settings: ReflectionSettings,
}

impl ReflectionOrchestrator {
    pub fn new(
        store: Arc<dyn RecordStore>,
        completion: Arc<dyn CompletionService>,
        temperature: f32,
        settings: ReflectionSettings,
    ) -> Self {
        Self {
            store,
            pipeline: AggregationPipeline::new(completion, temperature),
            daily: None,
            settings,
        }
    }

    /// Enable backfill through the given daily-analysis workflow
    pub fn with_daily_analysis(mut self, daily: Arc<dyn DailyAnalysis>) -> Self {
        self.daily = Some(daily);
        self
    }

    /// Run one reflection ending at `now`.
    ///
    /// Store, completion and backfill failures degrade the report instead of
    /// failing the run. The only error is [`DeskError::Cancelled`], in which
    /// case nothing has been persisted.
    pub async fn reflect(
        &self,
        subject: Option<&str>,
        label: PeriodLabel,
        explicit_days: Option<u32>,
        now: NaiveDate,
        cancel: &CancellationToken,
    ) -> DeskResult<ReflectionReport> {
        let subject = subject.map(normalize_subject).filter(|s| !s.is_empty());

        let mut state = ReflectionState::ResolvingPeriod;
        let window = PeriodWindow::resolve(label, explicit_days, now).for_subject(subject.clone());
        let mut records: Vec<AnalysisRecord> = Vec::new();
        let mut retrievals = 0;
        let mut backfill = None;
        let mut bundle = ReflectionBundle::empty();
        let mut status = ReflectionStatus::Completed;
        let mut records_used = 0;
        let mut saved = None;
        let mut persist_error = None;
        let mut retrieval_error: Option<String> = None;

        while state != ReflectionState::Done {
            if cancel.is_cancelled() {
                warn!(state = %state, "Reflection cancelled");
                return Err(DeskError::Cancelled);
            }
            info!(state = %state, subject = ?subject, period = %label, "Reflection state");

            state = match state {
                ReflectionState::ResolvingPeriod => {
                    info!("📅 Date Range: {}", window);
                    ReflectionState::Retrieving
                }
                ReflectionState::Retrieving => {
                    records = match self.retrieve(&window, cancel).await? {
                        Ok(records) => records,
                        Err(e) => {
                            retrieval_error = Some(e.to_string());
                            Vec::new()
                        }
                    };
                    retrievals += 1;

                    let insufficient = if !records.is_empty() {
                        None
                    } else if retrievals > 1 {
                        Some("Still no analyses found after backfill")
                    } else if subject.is_none() {
                        Some("Insufficient data: backfill is unsupported without a subject")
                    } else if !self.settings.backfill_enabled || self.daily.is_none() {
                        Some("No analyses found in this period and backfill is disabled")
                    } else {
                        None
                    };

                    match insufficient {
                        Some(reason) => {
                            let reason = match &retrieval_error {
                                Some(e) => format!("{} (record store query failed: {})", reason, e),
                                None => reason.to_string(),
                            };
                            status = ReflectionStatus::InsufficientData { reason };
                            ReflectionState::Done
                        }
                        None if records.is_empty() => ReflectionState::Backfilling,
                        None => ReflectionState::Aggregating,
                    }
                }
                ReflectionState::Backfilling => {
                    // Only reachable with a subject and a daily workflow
                    if let (Some(subject), Some(daily)) = (subject.as_deref(), self.daily.as_ref()) {
                        backfill = Some(self.backfill(daily.as_ref(), subject, &window, cancel).await?);
                    }
                    ReflectionState::Retrieving
                }
                ReflectionState::Aggregating => {
                    records_used = records.len();
                    bundle = self
                        .pipeline
                        .run(std::mem::take(&mut records), &window, cancel)
                        .await?;
                    ReflectionState::Persisting
                }
                ReflectionState::Persisting => {
                    match self.persist(&bundle, &window).await {
                        Ok(id) => saved = Some(id),
                        Err(e) => {
                            error!(error = %e, "Could not save reflection");
                            persist_error = Some(e.to_string());
                        }
                    }
                    ReflectionState::Done
                }
                ReflectionState::Done => ReflectionState::Done,
            };
        }

        info!(state = %ReflectionState::Done, status = ?status, retrievals, "Reflection finished");

        Ok(ReflectionReport {
            window,
            status,
            bundle,
            records_used,
            retrievals,
            backfill,
            saved,
            persist_error,
            retrieval_error,
        })
    }

    /// Outer error is cancellation only; a store failure is handed back as the inner error
    async fn retrieve(
        &self,
        window: &PeriodWindow,
        cancel: &CancellationToken,
    ) -> DeskResult<DeskResult<Vec<AnalysisRecord>>> {
        let query = self.store.query_period(
            window.start_date,
            window.end_date,
            window.subject.as_deref(),
            self.settings.scan_limit,
        );

        match cancellable(cancel, query).await? {
            Ok(records) => {
                info!("🔍 Retrieved {} historical analyses", records.len());
                Ok(Ok(records))
            }
            Err(e) => {
                warn!(error = %e, "Period retrieval failed; treating as no data");
                Ok(Err(e))
            }
        }
    }

    /// Serial, one day at a time, each bounded by the per-day timeout
    async fn backfill(
        &self,
        daily: &dyn DailyAnalysis,
        subject: &str,
        window: &PeriodWindow,
        cancel: &CancellationToken,
    ) -> DeskResult<BackfillSummary> {
        let days = window.backfill_days();
        info!("🔄 Backfilling {} days for {}", days.len(), subject);

        let mut summary = BackfillSummary::default();
        for day in days {
            let run = timeout(
                self.settings.backfill_day_timeout,
                daily.run_daily(subject, self.settings.backfill_article_count, day),
            );

            let outcome = match cancellable(cancel, run).await? {
                Ok(Ok(true)) => BackfillOutcome::Analyzed,
                Ok(Ok(false)) => {
                    warn!(%day, "No data to analyze for {}", subject);
                    BackfillOutcome::NoData
                }
                Ok(Err(e)) => {
                    warn!(%day, error = %e, "Daily analysis failed; continuing");
                    BackfillOutcome::Failed(e.to_string())
                }
                Err(_) => {
                    warn!(
                        %day,
                        timeout_seconds = self.settings.backfill_day_timeout.as_secs(),
                        "Daily analysis timed out; continuing"
                    );
                    BackfillOutcome::TimedOut
                }
            };
            summary.days.push((day, outcome));
        }

        info!(
            "Backfill complete: {} of {} days analyzed",
            summary.analyzed(),
            summary.attempted()
        );
        Ok(summary)
    }

    async fn persist(&self, bundle: &ReflectionBundle, window: &PeriodWindow) -> DeskResult<RecordId> {
        let coverage = &bundle.coverage;
        let store_subject = window.subject.clone().or_else(|| match coverage.subjects.as_slice() {
            [only] => Some(only.clone()),
            _ => None,
        });
        let portfolio = store_subject.is_none();

        let mut record = AnalysisRecord::new(
            bundle.combined_content(window.period_label),
            window.end_date,
            AnalysisKind::reflection(window.period_label, portfolio),
        )
        .with_subject(store_subject.as_deref())
        .with_metadata("period_start", window.start_date.to_string())
        .with_metadata("period_end", window.end_date.to_string())
        .with_metadata("num_days_analyzed", coverage.record_count as u64)
        .with_metadata("day_count", coverage.day_count as u64)
        .with_metadata("section_count", bundle.sections.len() as u64);

        if portfolio {
            record = record
                .with_metadata("num_subjects", coverage.subjects.len() as u64)
                .with_metadata(
                    "subjects",
                    coverage.subjects.iter().take(10).cloned().collect::<Vec<_>>().join(","),
                );
        } else {
            record = record.with_metadata("num_subjects", 1u64);
        }

        info!("💾 Saving {} reflection", record.kind);
        self.store.append(&record).await
    }
}
