//! Periodic reflection: date windows and the five-section aggregation pipeline

pub mod period;
pub mod pipeline;

pub use period::{PeriodLabel, PeriodWindow, MAX_PERIOD_DAYS};
pub use pipeline::{
    AggregationPipeline, PeriodCoverage, ReflectionBundle, ReflectionSection, SectionKind,
    SectionStatus, NO_DATA_PERIOD_INFO, NO_DATA_SECTION,
};
