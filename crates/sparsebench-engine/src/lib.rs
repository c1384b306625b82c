//! Concurrent load generation and comparison engine.
//!
//! Drives query streams against two [`QueryExecutor`]s, pairs their results
//! and reduces them to latency and throughput statistics. Runs are started
//! and stopped through a [`RunController`].

pub mod benchmark;
pub mod comparator;
pub mod driver;
pub mod executor;
pub mod limiter;
pub mod metrics;
pub mod mock;
pub mod session;
pub mod signal;
pub mod sink;
pub mod stress;

pub use benchmark::run_benchmark;
pub use comparator::Comparator;
pub use driver::{ConcurrentRun, LoadDriver, LoadRun};
pub use executor::{ExecutorError, ExecutorResult, QueryExecutor};
pub use limiter::ConcurrencyLimiter;
pub use mock::{CallTracker, MockFailure, MockQueryExecutor};
pub use session::{
    RunController, RunHandle, RunKind, RunOutcome, RunRequest, SessionReport, SessionState,
    SessionStatus, SessionStore, TestSession,
};
pub use signal::CancellationSignal;
pub use sink::{CollectingSink, NullSink, Progress, ResultSink, TracingSink};
pub use stress::StressController;
