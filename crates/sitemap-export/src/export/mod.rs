//! The export pipeline: projection, batching, the countries sitemap and
//! orchestration of whole runs.

pub mod batcher;
pub mod countries;
pub mod orchestrator;
pub mod projector;

pub use batcher::PartitionedBatcher;
pub use countries::{write_country_sitemap, CountryLookup, ObservedCountries, COUNTRIES_TYPE};
pub use orchestrator::{
    ExportOrchestrator, ExportRun, ExportSummary, NoProgress, Progress, RunPhase, RunSettings,
    SkipCounts, TargetReport,
};
pub use projector::{Projected, RecordProjector, SkipReason};
