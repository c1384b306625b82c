//! Test sessions and the run control surface.
//!
//! A [`RunController`] owns an explicit [`SessionStore`]. Each started run
//! gets a session holding its cancellation signal; the session is removed
//! when the run finishes or is stopped.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use sparsebench_core::{
    BenchmarkConfig, BenchmarkSummary, ComparisonRecord, ConcurrentConfig, CoreError, CoreResult,
    LoadTestConfig, SessionId, StressConfig, StressReport,
};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::benchmark::run_benchmark;
use crate::comparator::Comparator;
use crate::driver::{ConcurrentRun, LoadDriver, LoadRun};
use crate::metrics;
use crate::signal::CancellationSignal;
use crate::sink::ResultSink;
use crate::stress::StressController;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    Running,
    Completed,
    Stopped,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RunKind {
    Compare,
    Benchmark,
    MultiThread,
    LoadTest,
    StressTest,
}

impl RunKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Compare => "compare",
            Self::Benchmark => "benchmark",
            Self::MultiThread => "multi-thread",
            Self::LoadTest => "load-test",
            Self::StressTest => "stress-test",
        }
    }
}

/// What a session should run.
#[derive(Debug, Clone)]
pub enum RunRequest {
    Compare { query: String },
    Benchmark(BenchmarkConfig),
    MultiThread(ConcurrentConfig),
    LoadTest(LoadTestConfig),
    StressTest(StressConfig),
}

impl RunRequest {
    #[must_use]
    pub fn kind(&self) -> RunKind {
        match self {
            Self::Compare { .. } => RunKind::Compare,
            Self::Benchmark(_) => RunKind::Benchmark,
            Self::MultiThread(_) => RunKind::MultiThread,
            Self::LoadTest(_) => RunKind::LoadTest,
            Self::StressTest(_) => RunKind::StressTest,
        }
    }

    fn validate(&self) -> CoreResult<()> {
        match self {
            Self::Compare { query } if query.trim().is_empty() => {
                Err(CoreError::invalid_config("query must not be empty"))
            }
            _ => Ok(()),
        }
    }
}

/// Result payload of a finished run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "result", rename_all = "kebab-case")]
pub enum RunOutcome {
    Compare(ComparisonRecord),
    Benchmark(Vec<BenchmarkSummary>),
    MultiThread(ConcurrentRun),
    LoadTest(LoadRun),
    StressTest(StressReport),
}

/// Final account of a session, delivered to the sink and to the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionReport {
    pub id: SessionId,
    pub kind: RunKind,
    pub state: SessionState,
    pub started_at: DateTime<Utc>,
    pub elapsed_ms: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outcome: Option<RunOutcome>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionStatus {
    pub kind: RunKind,
    pub state: SessionState,
    pub elapsed: Duration,
}

#[derive(Debug, Clone)]
pub struct TestSession {
    pub id: SessionId,
    pub kind: RunKind,
    pub state: SessionState,
    pub started_at: DateTime<Utc>,
    started: Instant,
    signal: CancellationSignal,
}

impl TestSession {
    fn new(kind: RunKind) -> Self {
        Self {
            id: SessionId::new(),
            kind,
            state: SessionState::Running,
            started_at: Utc::now(),
            started: Instant::now(),
            signal: CancellationSignal::new(),
        }
    }

    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    #[must_use]
    pub fn signal(&self) -> &CancellationSignal {
        &self.signal
    }
}

/// Registry of running sessions.
#[derive(Debug, Default)]
pub struct SessionStore {
    sessions: RwLock<HashMap<SessionId, TestSession>>,
}

impl SessionStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, session: TestSession) {
        self.sessions.write().insert(session.id, session);
    }

    #[must_use]
    pub fn get(&self, id: SessionId) -> Option<TestSession> {
        self.sessions.read().get(&id).cloned()
    }

    pub fn remove(&self, id: SessionId) -> Option<TestSession> {
        self.sessions.write().remove(&id)
    }

    #[must_use]
    pub fn ids(&self) -> Vec<SessionId> {
        self.sessions.read().keys().copied().collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sessions.read().is_empty()
    }
}

/// Handle to a started run.
#[derive(Debug)]
pub struct RunHandle {
    id: SessionId,
    task: JoinHandle<SessionReport>,
}

impl RunHandle {
    #[must_use]
    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Waits for the run to end, including the drain after a stop.
    pub async fn wait(mut self) -> CoreResult<SessionReport> {
        self.wait_mut().await
    }

    /// Borrowing form of [`wait`](Self::wait), for use inside `select!`.
    ///
    /// Must not be polled again once it has returned.
    pub async fn wait_mut(&mut self) -> CoreResult<SessionReport> {
        let id = self.id;
        (&mut self.task)
            .await
            .map_err(|e| CoreError::internal(format!("session {id} task failed: {e}")))
    }
}

/// Starts, stops and inspects benchmark sessions.
pub struct RunController {
    comparator: Arc<Comparator>,
    store: Arc<SessionStore>,
    sink: Arc<dyn ResultSink>,
}

impl RunController {
    #[must_use]
    pub fn new(comparator: Arc<Comparator>, sink: Arc<dyn ResultSink>) -> Self {
        Self {
            comparator,
            store: Arc::new(SessionStore::new()),
            sink,
        }
    }

    #[must_use]
    pub fn sessions(&self) -> &SessionStore {
        &self.store
    }

    /// Validates `request`, registers a running session and spawns the run.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(&self, request: RunRequest) -> CoreResult<RunHandle> {
        request.validate()?;

        let session = TestSession::new(request.kind());
        let id = session.id;
        let kind = session.kind;
        let started_at = session.started_at;
        let started = session.started;
        let signal = session.signal.clone();
        self.store.insert(session);
        metrics::SESSIONS_ACTIVE.inc();

        tracing::info!(session_id = %id, kind = kind.as_str(), "Session started");

        let comparator = Arc::clone(&self.comparator);
        let store = Arc::clone(&self.store);
        let sink = Arc::clone(&self.sink);

        let task = tokio::spawn(async move {
            // A panic in the run surfaces here as a JoinError.
            let run = {
                let signal = signal.clone();
                let sink = Arc::clone(&sink);
                tokio::spawn(async move { execute(request, comparator, &signal, sink.as_ref()).await })
            };
            let result = run
                .await
                .unwrap_or_else(|e| Err(CoreError::internal(format!("run task failed: {e}"))));
            store.remove(id);
            metrics::SESSIONS_ACTIVE.dec();

            let state = match &result {
                Err(_) => SessionState::Failed,
                Ok(_) if signal.is_cancelled() => SessionState::Stopped,
                Ok(_) => SessionState::Completed,
            };

            let (outcome, error) = match result {
                Ok(outcome) => (Some(outcome), None),
                Err(e) => {
                    tracing::error!(session_id = %id, error = %e, "Session failed");
                    (None, Some(e.to_string()))
                }
            };

            let report = SessionReport {
                id,
                kind,
                state,
                started_at,
                elapsed_ms: started.elapsed().as_secs_f64() * 1000.0,
                outcome,
                error,
            };
            sink.on_session_finished(&report);
            report
        });

        Ok(RunHandle { id, task })
    }

    /// Signals the session to stop and removes it from the store.
    ///
    /// The run stops dispatching, drains in-flight comparisons and then
    /// reports with state `stopped`.
    pub fn stop(&self, id: SessionId) -> CoreResult<()> {
        let session = self
            .store
            .remove(id)
            .ok_or_else(|| CoreError::not_found("session", id.to_string()))?;

        session.signal.cancel();

        tracing::info!(
            session_id = %id,
            kind = session.kind.as_str(),
            state = ?SessionState::Stopped,
            elapsed_ms = session.elapsed().as_secs_f64() * 1000.0,
            "Session stop requested"
        );

        Ok(())
    }

    pub fn status(&self, id: SessionId) -> CoreResult<SessionStatus> {
        let session = self
            .store
            .get(id)
            .ok_or_else(|| CoreError::not_found("session", id.to_string()))?;

        Ok(SessionStatus {
            kind: session.kind,
            state: session.state,
            elapsed: session.elapsed(),
        })
    }
}

async fn execute(
    request: RunRequest,
    comparator: Arc<Comparator>,
    signal: &CancellationSignal,
    sink: &dyn ResultSink,
) -> CoreResult<RunOutcome> {
    let driver = LoadDriver::new(Arc::clone(&comparator));

    match request {
        RunRequest::Compare { query } => Ok(RunOutcome::Compare(comparator.compare(&query).await)),
        RunRequest::Benchmark(config) => Ok(RunOutcome::Benchmark(
            run_benchmark(&comparator, &config, signal, sink).await,
        )),
        RunRequest::MultiThread(config) => driver
            .run_concurrent(&config, signal, sink)
            .await
            .map(RunOutcome::MultiThread),
        RunRequest::LoadTest(config) => driver.run(&config, signal, sink).await.map(RunOutcome::LoadTest),
        RunRequest::StressTest(config) => {
            let steps = StressController::new(driver).run(&config, signal, sink).await?;
            Ok(RunOutcome::StressTest(StressReport::from_steps(steps)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockQueryExecutor;
    use crate::sink::NullSink;

    fn controller() -> RunController {
        let comparator = Comparator::new(
            Arc::new(MockQueryExecutor::new("a", "m")),
            Arc::new(MockQueryExecutor::new("b", "m")),
        );
        RunController::new(Arc::new(comparator), Arc::new(NullSink))
    }

    #[test]
    fn test_store_insert_get_remove() {
        let store = SessionStore::new();
        let session = TestSession::new(RunKind::LoadTest);
        let id = session.id;

        store.insert(session);
        assert_eq!(store.len(), 1);
        assert_eq!(store.get(id).unwrap().state, SessionState::Running);
        assert_eq!(store.ids(), vec![id]);

        assert!(store.remove(id).is_some());
        assert!(store.is_empty());
        assert!(store.get(id).is_none());
    }

    #[tokio::test]
    async fn test_blank_compare_query_rejected_before_start() {
        let controller = controller();
        let err = controller
            .start(RunRequest::Compare { query: "  ".to_string() })
            .unwrap_err();

        assert!(matches!(err, CoreError::InvalidConfig(_)));
        assert!(controller.sessions().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_session() {
        let controller = controller();
        let id = SessionId::new();

        assert!(matches!(controller.stop(id), Err(CoreError::NotFound { .. })));
        assert!(matches!(controller.status(id), Err(CoreError::NotFound { .. })));
    }

    #[test]
    fn test_outcome_json_is_tagged() {
        let report = SessionReport {
            id: SessionId::new(),
            kind: RunKind::Benchmark,
            state: SessionState::Completed,
            started_at: Utc::now(),
            elapsed_ms: 12.5,
            outcome: Some(RunOutcome::Benchmark(Vec::new())),
            error: None,
        };

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["kind"], "benchmark");
        assert_eq!(json["state"], "completed");
        assert_eq!(json["outcome"]["kind"], "benchmark");
        assert!(json.get("error").is_none());
    }
}
