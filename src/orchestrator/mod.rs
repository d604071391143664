//! Orchestrator module for coordinating analysis pipelines
//! Daily analysis, periodic reflection and historical search

pub mod daily;
pub mod history;
pub mod reflection;

// Re-export main orchestrators
pub use daily::{DailyAnalysis, DailyAnalysisWorkflow, DailyReport};
pub use history::HistorySearch;
pub use reflection::{
    BackfillOutcome, BackfillSummary, ReflectionOrchestrator, ReflectionReport, ReflectionSettings,
    ReflectionState, ReflectionStatus,
};
