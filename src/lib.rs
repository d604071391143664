// Newsdesk - Financial news research desk
// Daily news + price analysis per subject, stored as embedded records, with
// periodic multi-perspective reflections over the stored history.

#![cfg_attr(not(test), deny(clippy::unwrap_used))]

pub mod config;
pub mod data;
pub mod db;
pub mod embeddings;
pub mod errors;
pub mod llm;
pub mod orchestrator;
pub mod reflection;
pub mod vector;

// Re-export commonly used items
pub use config::Config;
pub use data::{MarketDataProvider, NewsItem, OHLCV};
pub use errors::{DeskError, DeskResult};
pub use orchestrator::{DailyAnalysisWorkflow, HistorySearch, ReflectionOrchestrator};
pub use reflection::{PeriodLabel, PeriodWindow};
