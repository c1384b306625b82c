//! Core domain types for sparsebench.
//!
//! Holds the data model shared by the load engine and the CLI: per-query
//! results, paired comparison records, run configurations, the statistics
//! aggregator and the application configuration file.

pub mod config;
pub mod error;
pub mod ids;
pub mod record;
pub mod run_config;
pub mod stats;
pub mod target;

pub use config::{AppConfig, ConfigError, LoggingConfig, ReportConfig, TargetConfig, TargetsConfig};
pub use error::{CoreError, CoreResult};
pub use ids::SessionId;
pub use record::{ComparisonRecord, QueryResult, SearchHit, SearchOutcome, SpeedComparison};
pub use run_config::{BenchmarkConfig, ConcurrentConfig, LoadTestConfig, QueryPool, RoundRobin, StressConfig};
pub use stats::{
    aggregate, best_step, median, percentile, BenchmarkSummary, LatencySummary, LoadTestStats,
    StressReport, StressStepResult,
};
pub use target::{TargetDescriptor, TargetSlot};
