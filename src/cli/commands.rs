use anyhow::Result;
use chrono::NaiveDate;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use newsdesk::data::AlphaVantageClient;
use newsdesk::db::Database;
use newsdesk::embeddings::EmbeddingClient;
use newsdesk::errors::DeskError;
use newsdesk::llm::LLMClient;
use newsdesk::orchestrator::history::display_hits;
use newsdesk::orchestrator::{
    DailyAnalysisWorkflow, HistorySearch, ReflectionOrchestrator, ReflectionReport, ReflectionSettings,
};
use newsdesk::vector::{normalize_subject, PgRecordStore, RecordStore};
use newsdesk::{Config, PeriodLabel, PeriodWindow};

/// Open the database and the pgvector-backed record store
async fn open_store(config: &Config) -> Result<Arc<dyn RecordStore>> {
    let db = Database::new(
        config.database_url()?,
        config.database.max_connections,
        config.database.min_connections,
    )
    .await?;
    db.health_check().await?;

    let embedder = Arc::new(EmbeddingClient::from_config(config)?);
    let store: Arc<dyn RecordStore> =
        Arc::new(PgRecordStore::new(db.pool, embedder, config.reflection.collection.clone()).await?);
    Ok(store)
}

async fn completion_client(config: &Config) -> Arc<LLMClient> {
    let llm = LLMClient::from_config(config);
    match llm.check_connectivity().await {
        Ok(true) => {}
        _ => warn!(
            "⚠️  Ollama not reachable at {}; analyses will contain error placeholders",
            config.llm.ollama_url
        ),
    }
    Arc::new(llm)
}

/// Run the daily analysis for one subject and day
pub async fn analyze(
    config: &Config,
    subject: &str,
    articles: usize,
    date: Option<NaiveDate>,
    save: bool,
    cancel: &CancellationToken,
) -> Result<()> {
    let subject = normalize_subject(subject);
    let day = date.unwrap_or_else(|| config.get_effective_date());
    info!("🔍 Starting daily analysis for {} ({})", subject, day);

    let store = open_store(config).await?;
    let provider = Arc::new(AlphaVantageClient::from_config(config)?);
    let completion = completion_client(config).await;
    let workflow = DailyAnalysisWorkflow::new(provider, completion, store, config.llm.temperature);

    let report = tokio::select! {
        biased;
        _ = cancel.cancelled() => return Err(DeskError::Cancelled.into()),
        report = workflow.analyze(&subject, articles, day) => report?,
    };

    let Some(report) = report else {
        println!("\n⚠️  No data available to analyze {} on {}", subject, day);
        return Ok(());
    };

    report.display_summary();

    if save {
        let id = workflow.persist(&report).await?;
        println!("\n✅ Analysis saved ({})", id);
    }
    Ok(())
}

/// Reflect over a period of stored analyses
pub async fn reflect(
    config: &Config,
    subject: Option<&str>,
    period: &str,
    days: Option<u32>,
    backfill: bool,
    cancel: &CancellationToken,
) -> Result<()> {
    let label = PeriodLabel::parse(period);
    let now = config.get_effective_date();

    // An unreachable store still yields a (degraded) report
    let store = match open_store(config).await {
        Ok(store) => store,
        Err(e) => {
            warn!(error = %e, "Record store unavailable; reporting insufficient data");
            let window = PeriodWindow::resolve(label, days, now)
                .for_subject(subject.map(normalize_subject).filter(|s| !s.is_empty()));
            ReflectionReport::store_unavailable(window, format!("{:#}", e)).display_summary();
            return Ok(());
        }
    };
    let completion = completion_client(config).await;

    let mut settings = ReflectionSettings::from(&config.reflection);
    settings.backfill_enabled &= backfill;

    let mut orchestrator = ReflectionOrchestrator::new(
        store.clone(),
        completion.clone(),
        config.llm.temperature,
        settings.clone(),
    );

    // Backfill needs market data; without a key the reflection runs on what is stored
    if settings.backfill_enabled && subject.is_some() {
        match AlphaVantageClient::from_config(config) {
            Ok(provider) => {
                let daily = DailyAnalysisWorkflow::new(
                    Arc::new(provider),
                    completion,
                    store,
                    config.llm.temperature,
                );
                orchestrator = orchestrator.with_daily_analysis(Arc::new(daily));
            }
            Err(e) => warn!("⚠️  Backfill unavailable: {}", e),
        }
    }

    let report = orchestrator.reflect(subject, label, days, now, cancel).await?;
    report.display_summary();
    Ok(())
}

/// Semantic search over stored analyses
pub async fn search(
    config: &Config,
    subject: Option<&str>,
    query: &str,
    limit: usize,
    range: Option<(NaiveDate, NaiveDate)>,
) -> Result<()> {
    let subject = subject.map(normalize_subject);
    let store = open_store(config).await?;
    let history = HistorySearch::new(store);

    let hits = history
        .search_in_range(query, subject.as_deref(), limit.max(1), range)
        .await;

    display_hits(subject.as_deref().unwrap_or("all subjects"), query, &hits);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_reflect_without_database_still_reports() {
        let config = Config::default();
        assert!(config.database.url.is_none());

        let result = reflect(&config, Some("xyz"), "week", None, true, &CancellationToken::new()).await;

        assert!(result.is_ok());
    }

    #[test]
    fn test_store_unavailable_report_explains_failure() {
        let window = PeriodWindow::resolve(
            PeriodLabel::Week,
            None,
            NaiveDate::from_ymd_opt(2024, 1, 7).unwrap(),
        );
        let report = ReflectionReport::store_unavailable(window, "DATABASE_URL is required but not set");

        match &report.status {
            newsdesk::orchestrator::ReflectionStatus::InsufficientData { reason } => {
                assert!(reason.contains("DATABASE_URL"))
            }
            other => panic!("unexpected status {:?}", other),
        }
        assert!(report.saved.is_none());
        assert_eq!(report.bundle.generated_count(), 0);
    }
}
