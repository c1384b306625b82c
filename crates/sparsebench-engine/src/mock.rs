use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use rand::Rng;
use sparsebench_core::{SearchHit, SearchOutcome, TargetDescriptor};
use tokio::time::Instant;

use crate::executor::{ExecutorError, ExecutorResult, QueryExecutor};

/// How a [`MockQueryExecutor`] decides to fail a call.
#[derive(Debug, Clone, PartialEq)]
pub enum MockFailure {
    Never,
    Always,
    /// Fails each call with the given probability (0.0-1.0).
    Rate(f64),
    /// Fails every n-th call (1-based), e.g. `EveryNth(4)` fails calls 4, 8, ..
    EveryNth(usize),
}

/// Shared call bookkeeping, so tests can observe one or several mocks together.
#[derive(Debug, Default)]
pub struct CallTracker {
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    calls: AtomicUsize,
    queries: Mutex<Vec<String>>,
    last_started: Mutex<Option<Instant>>,
}

impl CallTracker {
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Calls currently executing.
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Highest number of simultaneously executing calls seen so far.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    /// Number of calls started.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Queries in the order their calls started.
    pub fn queries(&self) -> Vec<String> {
        self.queries.lock().clone()
    }

    /// Start time of the most recent call.
    pub fn last_started(&self) -> Option<Instant> {
        *self.last_started.lock()
    }

    fn enter(&self, query: &str) -> usize {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);
        self.queries.lock().push(query.to_string());
        *self.last_started.lock() = Some(Instant::now());
        call
    }

    fn exit(&self) {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

struct InFlight<'a>(&'a CallTracker);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.exit();
    }
}

/// Mock query executor for testing.
///
/// Sleeps for a fixed latency on the tokio clock and returns a synthetic
/// outcome, so engine tests run without a search deployment and work with
/// paused time.
pub struct MockQueryExecutor {
    descriptor: TargetDescriptor,
    latency: Duration,
    failure: MockFailure,
    panic_on: Option<String>,
    tracker: Arc<CallTracker>,
}

impl MockQueryExecutor {
    /// Default simulated latency (20ms).
    pub const DEFAULT_LATENCY_MS: u64 = 20;
    /// Hits reported per successful query.
    pub const HIT_COUNT: u64 = 3;

    #[must_use]
    pub fn new(name: impl Into<String>, model_id: impl Into<String>) -> Self {
        Self {
            descriptor: TargetDescriptor::new(name, model_id),
            latency: Duration::from_millis(Self::DEFAULT_LATENCY_MS),
            failure: MockFailure::Never,
            panic_on: None,
            tracker: CallTracker::new(),
        }
    }

    #[must_use]
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    #[must_use]
    pub fn with_failure(mut self, failure: MockFailure) -> Self {
        self.failure = failure;
        self
    }

    /// Panics inside `execute` whenever `query` is requested.
    #[must_use]
    pub fn with_panic_on(mut self, query: impl Into<String>) -> Self {
        self.panic_on = Some(query.into());
        self
    }

    /// Records calls into `tracker` instead of a private one.
    #[must_use]
    pub fn with_tracker(mut self, tracker: Arc<CallTracker>) -> Self {
        self.tracker = tracker;
        self
    }

    #[must_use]
    pub fn tracker(&self) -> Arc<CallTracker> {
        Arc::clone(&self.tracker)
    }

    fn should_fail(&self, call: usize) -> bool {
        match self.failure {
            MockFailure::Never => false,
            MockFailure::Always => true,
            MockFailure::Rate(rate) => rand::thread_rng().gen_bool(rate.clamp(0.0, 1.0)),
            MockFailure::EveryNth(n) => n > 0 && call % n == 0,
        }
    }
}

#[async_trait]
impl QueryExecutor for MockQueryExecutor {
    fn descriptor(&self) -> &TargetDescriptor {
        &self.descriptor
    }

    async fn execute(&self, query: &str) -> ExecutorResult<SearchOutcome> {
        let call = self.tracker.enter(query);
        let _in_flight = InFlight(&self.tracker);

        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        if self.panic_on.as_deref() == Some(query) {
            panic!("mock executor asked to panic on query {query:?}");
        }

        if self.should_fail(call) {
            return Err(ExecutorError::Failed(format!(
                "injected failure on call {call} to {}",
                self.descriptor.name
            )));
        }

        Ok(SearchOutcome {
            hit_count: Self::HIT_COUNT,
            top_results: vec![SearchHit::new(
                Some(1.0),
                Some("Mock Play".to_string()),
                Some("MOCK".to_string()),
                &format!("A line about {query}"),
            )],
            degraded: false,
        })
    }
}
