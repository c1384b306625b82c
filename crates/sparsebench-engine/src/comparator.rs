use std::sync::Arc;

use sparsebench_core::{ComparisonRecord, QueryResult, TargetDescriptor, TargetSlot};
use tokio::time::Instant;

use crate::executor::QueryExecutor;
use crate::metrics;

/// Runs one query against both targets at once and pairs the results.
#[derive(Clone)]
pub struct Comparator {
    a: Arc<dyn QueryExecutor>,
    b: Arc<dyn QueryExecutor>,
}

struct InFlightComparison;

impl InFlightComparison {
    fn enter() -> Self {
        metrics::INFLIGHT_COMPARISONS.inc();
        Self
    }
}

impl Drop for InFlightComparison {
    fn drop(&mut self) {
        metrics::INFLIGHT_COMPARISONS.dec();
    }
}

impl Comparator {
    #[must_use]
    pub fn new(a: Arc<dyn QueryExecutor>, b: Arc<dyn QueryExecutor>) -> Self {
        Self { a, b }
    }

    #[must_use]
    pub fn descriptor(&self, slot: TargetSlot) -> &TargetDescriptor {
        self.executor(slot).descriptor()
    }

    fn executor(&self, slot: TargetSlot) -> &dyn QueryExecutor {
        match slot {
            TargetSlot::A => self.a.as_ref(),
            TargetSlot::B => self.b.as_ref(),
        }
    }

    /// Compares the two targets on `query`.
    ///
    /// Never fails as a unit: executor errors end up in the matching
    /// `QueryResult`, timed like successes.
    pub async fn compare(&self, query: &str) -> ComparisonRecord {
        let _in_flight = InFlightComparison::enter();

        let (a, b) = tokio::join!(
            timed(self.executor(TargetSlot::A), query),
            timed(self.executor(TargetSlot::B), query),
        );

        let record = ComparisonRecord::new(query, a, b);

        tracing::trace!(
            query,
            a_ms = record.a.duration_ms,
            b_ms = record.b.duration_ms,
            faster = ?record.comparison.faster,
            "Comparison complete"
        );

        record
    }
}

async fn timed(executor: &dyn QueryExecutor, query: &str) -> QueryResult {
    let target = executor.descriptor();
    let start = Instant::now();
    let outcome = executor.execute(query).await;
    let elapsed = start.elapsed();

    match outcome {
        Ok(outcome) => {
            let status = if outcome.degraded { "degraded" } else { "success" };
            metrics::record_query(&target.name, status, elapsed.as_secs_f64());
            QueryResult::success(target, query, elapsed, outcome)
        }
        Err(e) => {
            metrics::record_query(&target.name, "error", elapsed.as_secs_f64());
            tracing::debug!(target_name = %target.name, query, error = %e, "Query failed");
            QueryResult::failure(target, query, elapsed, e.to_string())
        }
    }
}
