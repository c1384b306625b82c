//! Progress and result delivery.
//!
//! Drivers report through an explicit [`ResultSink`] parameter. Every method
//! has a no-op default so sinks implement only what they display.

use parking_lot::Mutex;
use serde::Serialize;
use sparsebench_core::{LoadTestStats, StressStepResult};

use crate::session::SessionReport;

/// Completion count of the current run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Progress {
    pub completed: usize,
    /// Planned total, when known up front.
    pub expected: Option<usize>,
}

pub trait ResultSink: Send + Sync {
    /// Called once per completed comparison.
    fn on_progress(&self, _progress: Progress) {}

    /// Called when a load run (or one stress step) has drained.
    fn on_load_complete(&self, _stats: &LoadTestStats) {}

    /// Called after each stress step, before the next one starts.
    fn on_stress_step(&self, _step: &StressStepResult) {}

    /// Called once when a controller-managed session ends.
    fn on_session_finished(&self, _report: &SessionReport) {}
}

/// Discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl ResultSink for NullSink {}

/// Logs through `tracing`: progress at debug, completions at info.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl ResultSink for TracingSink {
    fn on_progress(&self, progress: Progress) {
        tracing::debug!(
            completed = progress.completed,
            expected = ?progress.expected,
            "Comparison completed"
        );
    }

    fn on_load_complete(&self, stats: &LoadTestStats) {
        tracing::info!(
            concurrency = stats.concurrency,
            total = stats.total_queries,
            successful = stats.successful_queries,
            failed = stats.failed_queries,
            achieved_qps = stats.achieved_qps,
            "Load run complete"
        );
    }

    fn on_stress_step(&self, step: &StressStepResult) {
        tracing::info!(
            concurrency = step.concurrency,
            achieved_qps = step.stats.achieved_qps,
            success_rate = step.stats.success_rate(),
            "Stress step complete"
        );
    }

    fn on_session_finished(&self, report: &SessionReport) {
        tracing::info!(
            session_id = %report.id,
            kind = ?report.kind,
            state = ?report.state,
            elapsed_ms = report.elapsed_ms,
            "Session finished"
        );
    }
}

/// Keeps everything it receives; used by tests and by callers that render
/// results after the run.
#[derive(Debug, Default)]
pub struct CollectingSink {
    progress: Mutex<Vec<Progress>>,
    loads: Mutex<Vec<LoadTestStats>>,
    steps: Mutex<Vec<StressStepResult>>,
    sessions: Mutex<Vec<SessionReport>>,
}

impl CollectingSink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn progress(&self) -> Vec<Progress> {
        self.progress.lock().clone()
    }

    pub fn load_stats(&self) -> Vec<LoadTestStats> {
        self.loads.lock().clone()
    }

    pub fn stress_steps(&self) -> Vec<StressStepResult> {
        self.steps.lock().clone()
    }

    pub fn sessions(&self) -> Vec<SessionReport> {
        self.sessions.lock().clone()
    }
}

impl ResultSink for CollectingSink {
    fn on_progress(&self, progress: Progress) {
        self.progress.lock().push(progress);
    }

    fn on_load_complete(&self, stats: &LoadTestStats) {
        self.loads.lock().push(stats.clone());
    }

    fn on_stress_step(&self, step: &StressStepResult) {
        self.steps.lock().push(step.clone());
    }

    fn on_session_finished(&self, report: &SessionReport) {
        self.sessions.lock().push(report.clone());
    }
}
