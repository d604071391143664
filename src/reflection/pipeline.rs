//! Aggregation pipeline
//! One shared transcript fanned out to five independent synthesis tasks

use chrono::NaiveDate;
use futures::future::join_all;
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::period::{PeriodLabel, PeriodWindow};
use crate::errors::{DeskError, DeskResult};
use crate::llm::prompts::AnalysisPrompts;
use crate::llm::CompletionService;
use crate::vector::AnalysisRecord;

/// Section text used when there was nothing to reflect on
pub const NO_DATA_SECTION: &str = "No summaries found for analysis";
/// `period_info` used when there was nothing to reflect on
pub const NO_DATA_PERIOD_INFO: &str = "No data available";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SectionKind {
    PatternAnalysis,
    SentimentEvolution,
    KeyEvents,
    InvestmentThesis,
    RiskAssessment,
}

impl SectionKind {
    /// Report order
    pub const ALL: [SectionKind; 5] = [
        SectionKind::PatternAnalysis,
        SectionKind::SentimentEvolution,
        SectionKind::KeyEvents,
        SectionKind::InvestmentThesis,
        SectionKind::RiskAssessment,
    ];

    pub fn key(&self) -> &'static str {
        match self {
            SectionKind::PatternAnalysis => "pattern_analysis",
            SectionKind::SentimentEvolution => "sentiment_evolution",
            SectionKind::KeyEvents => "key_events",
            SectionKind::InvestmentThesis => "investment_thesis",
            SectionKind::RiskAssessment => "risk_assessment",
        }
    }

    /// Header used in reports
    pub fn title(&self) -> &'static str {
        match self {
            SectionKind::PatternAnalysis => "PATTERN ANALYSIS",
            SectionKind::SentimentEvolution => "SENTIMENT EVOLUTION",
            SectionKind::KeyEvents => "KEY EVENTS",
            SectionKind::InvestmentThesis => "INVESTMENT THESIS",
            SectionKind::RiskAssessment => "RISK ASSESSMENT",
        }
    }

    /// Analyst role named in the system prompt
    pub fn role(&self) -> &'static str {
        match self {
            SectionKind::PatternAnalysis => "PATTERN ANALYST",
            SectionKind::SentimentEvolution => "SENTIMENT ANALYST",
            SectionKind::KeyEvents => "EVENTS ANALYST",
            SectionKind::InvestmentThesis => "INVESTMENT STRATEGIST",
            SectionKind::RiskAssessment => "RISK ANALYST",
        }
    }

    fn focus(&self) -> &'static str {
        match self {
            SectionKind::PatternAnalysis => AnalysisPrompts::PATTERN_FOCUS,
            SectionKind::SentimentEvolution => AnalysisPrompts::SENTIMENT_FOCUS,
            SectionKind::KeyEvents => AnalysisPrompts::EVENTS_FOCUS,
            SectionKind::InvestmentThesis => AnalysisPrompts::THESIS_FOCUS,
            SectionKind::RiskAssessment => AnalysisPrompts::RISK_FOCUS,
        }
    }
}

impl fmt::Display for SectionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SectionStatus {
    Generated,
    Failed { error: String },
    NoData,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReflectionSection {
    pub kind: SectionKind,
    pub content: String,
    pub status: SectionStatus,
}

impl ReflectionSection {
    pub fn is_generated(&self) -> bool {
        self.status == SectionStatus::Generated
    }
}

/// What the input records actually covered
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PeriodCoverage {
    pub first_date: Option<NaiveDate>,
    pub last_date: Option<NaiveDate>,
    /// Distinct dates
    pub day_count: usize,
    pub record_count: usize,
    /// Distinct subjects, sorted
    pub subjects: Vec<String>,
}

impl PeriodCoverage {
    fn from_records(records: &[AnalysisRecord]) -> Self {
        let dates: BTreeSet<NaiveDate> = records.iter().map(|r| r.date).collect();
        let subjects: BTreeSet<String> = records.iter().filter_map(|r| r.subject.clone()).collect();

        Self {
            first_date: dates.iter().next().copied(),
            last_date: dates.iter().next_back().copied(),
            day_count: dates.len(),
            record_count: records.len(),
            subjects: subjects.into_iter().collect(),
        }
    }

    /// Human-readable description, derived from the data found rather than the window requested
    pub fn describe(&self, subject: Option<&str>) -> String {
        let bound = |d: Option<NaiveDate>| d.map(|d| d.to_string()).unwrap_or_else(|| "Unknown".to_string());
        let range = format!(
            "Period: {} to {} ({} days)",
            bound(self.first_date),
            bound(self.last_date),
            self.day_count
        );

        match subject {
            Some(subject) => format!("{} for {}", range, subject),
            None => {
                let mut listed = self.subjects.iter().take(5).cloned().collect::<Vec<_>>().join(", ");
                if self.subjects.len() > 5 {
                    listed.push_str(&format!(" and {} others", self.subjects.len() - 5));
                }
                format!("{} across {} subjects: {}", range, self.subjects.len(), listed)
            }
        }
    }
}

/// The five generated sections plus a description of the period covered
#[derive(Debug, Clone, PartialEq)]
pub struct ReflectionBundle {
    pub period_info: String,
    pub coverage: PeriodCoverage,
    pub sections: Vec<ReflectionSection>,
}

impl ReflectionBundle {
    /// Bundle for an empty input: every section is the no-data sentinel
    pub fn empty() -> Self {
        Self {
            period_info: NO_DATA_PERIOD_INFO.to_string(),
            coverage: PeriodCoverage::default(),
            sections: SectionKind::ALL
                .iter()
                .map(|kind| ReflectionSection {
                    kind: *kind,
                    content: NO_DATA_SECTION.to_string(),
                    status: SectionStatus::NoData,
                })
                .collect(),
        }
    }

    pub fn section(&self, kind: SectionKind) -> Option<&ReflectionSection> {
        self.sections.iter().find(|s| s.kind == kind)
    }

    pub fn generated_count(&self) -> usize {
        self.sections.iter().filter(|s| s.is_generated()).count()
    }

    pub fn failed_count(&self) -> usize {
        self.sections
            .iter()
            .filter(|s| matches!(s.status, SectionStatus::Failed { .. }))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.coverage.record_count == 0
    }

    /// Document persisted for the reflection
    pub fn combined_content(&self, label: PeriodLabel) -> String {
        let mut content = format!(
            "PERIODIC REFLECTION ({})\n{}\n",
            label.as_str().to_uppercase(),
            self.period_info
        );
        for section in &self.sections {
            content.push_str(&format!("\n## {}\n{}\n", section.kind.title(), section.content));
        }
        content
    }
}

/// Transcript shared by every synthesis task
pub fn build_transcript(records: &[AnalysisRecord]) -> String {
    records
        .iter()
        .map(|record| {
            format!(
                "Date: {} | Subject: {}\n{}",
                record.date_string(),
                record.subject.as_deref().unwrap_or("N/A"),
                record.content
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

pub struct AggregationPipeline {
    completion: Arc<dyn CompletionService>,
    temperature: f32,
}

impl AggregationPipeline {
    pub fn new(completion: Arc<dyn CompletionService>, temperature: f32) -> Self {
        Self {
            completion,
            temperature,
        }
    }

    /// Synthesize the five sections from `records`.
    ///
    /// Records outside `window` or of a reflection kind are dropped before
    /// anything else happens. A failing section degrades to an error
    /// placeholder without affecting the others. The only error returned is
    /// [`DeskError::Cancelled`].
    pub async fn run(
        &self,
        records: Vec<AnalysisRecord>,
        window: &PeriodWindow,
        cancel: &CancellationToken,
    ) -> DeskResult<ReflectionBundle> {
        let received = records.len();
        let mut records: Vec<AnalysisRecord> = records
            .into_iter()
            .filter(|r| window.contains(r.date) && !r.kind.is_reflection())
            .collect();

        if records.len() < received {
            warn!(
                dropped = received - records.len(),
                window = %window,
                "Dropped reflection inputs outside the window or of reflection kind"
            );
        }

        if records.is_empty() {
            info!("No records to aggregate; returning no-data bundle");
            return Ok(ReflectionBundle::empty());
        }

        records.sort_by(|a, b| a.date.cmp(&b.date).then_with(|| a.subject.cmp(&b.subject)));

        let coverage = PeriodCoverage::from_records(&records);
        let period_info = coverage.describe(window.subject.as_deref());
        let transcript = build_transcript(&records);
        let target = window.subject.as_deref().unwrap_or("the portfolio");
        let period = window.period_label.as_str();

        info!(
            records = records.len(),
            days = coverage.day_count,
            "Aggregating {} sections",
            SectionKind::ALL.len()
        );

        let tasks = SectionKind::ALL
            .iter()
            .map(|kind| self.generate(*kind, target, period, &transcript));

        let sections = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                warn!("Aggregation cancelled; discarding partial sections");
                return Err(DeskError::Cancelled);
            }
            sections = join_all(tasks) => sections,
        };

        let bundle = ReflectionBundle {
            period_info,
            coverage,
            sections,
        };
        info!(
            generated = bundle.generated_count(),
            failed = bundle.failed_count(),
            "Aggregation complete"
        );
        Ok(bundle)
    }

    async fn generate(&self, kind: SectionKind, target: &str, period: &str, transcript: &str) -> ReflectionSection {
        let system = AnalysisPrompts::reflection_system(kind.role(), kind.focus(), target, period);
        let user = AnalysisPrompts::reflection_user(target, period, transcript);

        match self.completion.complete(&system, &user, self.temperature).await {
            Ok(content) => ReflectionSection {
                kind,
                content,
                status: SectionStatus::Generated,
            },
            Err(e) => {
                warn!(section = %kind, error = %e, "Section generation failed");
                ReflectionSection {
                    kind,
                    content: format!("Error: {}", e),
                    status: SectionStatus::Failed { error: e.to_string() },
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vector::AnalysisKind;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, d).unwrap()
    }

    fn window(subject: Option<&str>) -> PeriodWindow {
        PeriodWindow::resolve(PeriodLabel::Week, None, date(8)).for_subject(subject.map(String::from))
    }

    /// Echoes the role line so tests can tell sections apart
    struct RoleEcho {
        calls: AtomicUsize,
        fail_role: Option<&'static str>,
    }

    impl RoleEcho {
        fn new(fail_role: Option<&'static str>) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                fail_role,
            }
        }
    }

    #[async_trait]
    impl CompletionService for RoleEcho {
        async fn complete(&self, system: &str, _user: &str, _temperature: f32) -> DeskResult<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let role = system.lines().next().unwrap_or_default().to_string();
            match self.fail_role {
                Some(fail) if role.ends_with(fail) => Err(DeskError::completion("quota exhausted")),
                _ => Ok(role),
            }
        }
    }

    #[test]
    fn test_period_info_for_subject() {
        let records = vec![
            AnalysisRecord::daily("XYZ", date(3), "c"),
            AnalysisRecord::daily("XYZ", date(1), "a"),
            AnalysisRecord::daily("XYZ", date(1), "b"),
        ];
        let coverage = PeriodCoverage::from_records(&records);
        assert_eq!(
            coverage.describe(Some("XYZ")),
            "Period: 2024-01-01 to 2024-01-03 (2 days) for XYZ"
        );
        assert_eq!(coverage.record_count, 3);
    }

    #[test]
    fn test_period_info_for_portfolio_truncates_subjects() {
        let records: Vec<AnalysisRecord> = ["AA", "BB", "CC", "DD", "EE", "FF", "GG"]
            .iter()
            .map(|s| AnalysisRecord::daily(s, date(2), "x"))
            .collect();
        let coverage = PeriodCoverage::from_records(&records);
        assert_eq!(
            coverage.describe(None),
            "Period: 2024-01-02 to 2024-01-02 (1 days) across 7 subjects: AA, BB, CC, DD, EE and 2 others"
        );
    }

    #[test]
    fn test_transcript_format() {
        let records = vec![
            AnalysisRecord::daily("xyz", date(1), "first"),
            AnalysisRecord::new("second", date(2), AnalysisKind::Daily),
        ];
        assert_eq!(
            build_transcript(&records),
            "Date: 2024-01-01 | Subject: XYZ\nfirst\n\nDate: 2024-01-02 | Subject: N/A\nsecond"
        );
    }

    #[tokio::test]
    async fn test_empty_input_skips_completion() {
        let completion = Arc::new(RoleEcho::new(None));
        let pipeline = AggregationPipeline::new(completion.clone(), 0.3);

        let bundle = pipeline
            .run(Vec::new(), &window(Some("XYZ")), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(bundle, ReflectionBundle::empty());
        assert!(bundle.sections.iter().all(|s| s.content == NO_DATA_SECTION));
        assert_eq!(completion.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_out_of_window_and_reflection_records_are_dropped() {
        let completion = Arc::new(RoleEcho::new(None));
        let pipeline = AggregationPipeline::new(completion.clone(), 0.3);
        let records = vec![
            AnalysisRecord::daily("XYZ", date(20), "future"),
            AnalysisRecord::new("old reflection", date(3), AnalysisKind::reflection(PeriodLabel::Week, false))
                .with_subject(Some("XYZ")),
        ];

        let bundle = pipeline
            .run(records, &window(Some("XYZ")), &CancellationToken::new())
            .await
            .unwrap();

        assert!(bundle.is_empty());
        assert_eq!(completion.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_one_failing_section_is_isolated() {
        let completion = Arc::new(RoleEcho::new(Some("RISK ANALYST")));
        let pipeline = AggregationPipeline::new(completion.clone(), 0.3);
        let records = vec![AnalysisRecord::daily("XYZ", date(2), "steady")];

        let bundle = pipeline
            .run(records, &window(Some("XYZ")), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(completion.calls.load(Ordering::SeqCst), 5);
        assert_eq!(bundle.generated_count(), 4);
        assert_eq!(bundle.failed_count(), 1);

        let risk = bundle.section(SectionKind::RiskAssessment).unwrap();
        assert!(risk.content.starts_with("Error: "));
        let pattern = bundle.section(SectionKind::PatternAnalysis).unwrap();
        assert!(pattern.content.ends_with("PATTERN ANALYST"));
    }

    #[tokio::test]
    async fn test_cancelled_run_returns_error() {
        let pipeline = AggregationPipeline::new(Arc::new(RoleEcho::new(None)), 0.3);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = pipeline
            .run(vec![AnalysisRecord::daily("XYZ", date(2), "x")], &window(Some("XYZ")), &cancel)
            .await;

        assert!(matches!(result, Err(DeskError::Cancelled)));
    }

    #[test]
    fn test_combined_content_layout() {
        let mut bundle = ReflectionBundle::empty();
        bundle.period_info = "Period: 2024-01-01 to 2024-01-03 (3 days) for XYZ".into();
        let content = bundle.combined_content(PeriodLabel::Week);

        assert!(content.starts_with("PERIODIC REFLECTION (WEEK)\nPeriod: 2024-01-01"));
        for kind in SectionKind::ALL {
            assert!(content.contains(&format!("## {}", kind.title())));
        }
    }
}
