//! Load generation against both targets.
//!
//! [`LoadDriver::run`] keeps a time-boxed stream of comparisons in flight,
//! optionally paced to a target rate. [`LoadDriver::run_concurrent`] runs a
//! fixed batch instead. Both admit work through a [`ConcurrencyLimiter`], so
//! at most `concurrency` comparisons (twice as many executor calls) are
//! pending at any time.

use std::pin::pin;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use sparsebench_core::{ComparisonRecord, ConcurrentConfig, CoreResult, LoadTestConfig, LoadTestStats};
use tokio::task::{JoinError, JoinSet};
use tokio::time::{interval_at, sleep_until, Instant, MissedTickBehavior};

use crate::comparator::Comparator;
use crate::limiter::ConcurrencyLimiter;
use crate::signal::CancellationSignal;
use crate::sink::{Progress, ResultSink};

/// Records and statistics of one load run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoadRun {
    pub records: Vec<ComparisonRecord>,
    pub stats: LoadTestStats,
}

/// Result of a fixed-size concurrent batch; same shape as a load run.
pub type ConcurrentRun = LoadRun;

/// Drives comparisons through a concurrency limiter.
#[derive(Clone)]
pub struct LoadDriver {
    comparator: Arc<Comparator>,
}

struct Completion {
    records: Vec<ComparisonRecord>,
    lost: usize,
    expected: Option<usize>,
}

impl Completion {
    fn new(expected: Option<usize>) -> Self {
        Self {
            records: Vec::new(),
            lost: 0,
            expected,
        }
    }

    fn accept(&mut self, joined: Result<ComparisonRecord, JoinError>, sink: &dyn ResultSink) {
        match joined {
            Ok(record) => self.records.push(record),
            Err(e) => {
                self.lost += 1;
                tracing::warn!(error = %e, "Comparison task did not complete; counted as failed");
            }
        }

        sink.on_progress(Progress {
            completed: self.records.len() + self.lost,
            expected: self.expected,
        });
    }
}

impl LoadDriver {
    #[must_use]
    pub fn new(comparator: Arc<Comparator>) -> Self {
        Self { comparator }
    }

    #[must_use]
    pub fn comparator(&self) -> &Arc<Comparator> {
        &self.comparator
    }

    /// Runs a sustained load test.
    ///
    /// Dispatch stops at the deadline or when `signal` is set, whichever
    /// comes first; both take priority over admission. Admitted comparisons
    /// always drain and are included in the result.
    pub async fn run(
        &self,
        config: &LoadTestConfig,
        signal: &CancellationSignal,
        sink: &dyn ResultSink,
    ) -> CoreResult<LoadRun> {
        let limiter = ConcurrencyLimiter::new(config.concurrency())?;
        let started = Instant::now();
        let deadline = started + config.duration();

        let mut pacer = config.pacing_period().map(|period| {
            let mut pacer = interval_at(started, period);
            pacer.set_missed_tick_behavior(MissedTickBehavior::Delay);
            pacer
        });

        tracing::info!(
            concurrency = config.concurrency(),
            duration_secs = config.duration().as_secs_f64(),
            target_qps = ?config.target_qps(),
            queries = config.queries().len(),
            "Starting load run"
        );

        let mut cancelled = pin!(signal.cancelled());
        let mut queries = config.queries().round_robin();
        let mut tasks = JoinSet::new();
        let mut completion = Completion::new(config.expected_dispatches());
        let mut dispatched = 0usize;

        loop {
            if let Some(pacer) = pacer.as_mut() {
                tokio::select! {
                    biased;
                    _ = &mut cancelled => break,
                    _ = sleep_until(deadline) => break,
                    _ = pacer.tick() => {}
                }
            }

            let permit = tokio::select! {
                biased;
                _ = &mut cancelled => break,
                _ = sleep_until(deadline) => break,
                permit = limiter.acquire() => permit?,
            };

            let Some(query) = queries.next() else { break };
            let query = query.to_string();
            let comparator = Arc::clone(&self.comparator);
            limiter.spawn_admitted(&mut tasks, permit, async move { comparator.compare(&query).await });
            dispatched += 1;

            while let Some(joined) = tasks.try_join_next() {
                completion.accept(joined, sink);
            }
        }

        tracing::debug!(
            dispatched,
            in_flight = tasks.len(),
            cancelled = signal.is_cancelled(),
            "Dispatch stopped, draining"
        );

        while let Some(joined) = tasks.join_next().await {
            completion.accept(joined, sink);
        }

        let stats = LoadTestStats::compute(
            &completion.records,
            completion.lost,
            started.elapsed(),
            config.concurrency(),
        );
        sink.on_load_complete(&stats);

        tracing::info!(
            total = stats.total_queries,
            successful = stats.successful_queries,
            failed = stats.failed_queries,
            achieved_qps = stats.achieved_qps,
            "Load run complete"
        );

        Ok(LoadRun {
            records: completion.records,
            stats,
        })
    }

    /// Runs `total` comparisons, cycling the query pool, at most
    /// `concurrency` at a time.
    ///
    /// Comparisons not yet admitted when `signal` is observed are skipped.
    /// Records come back in completion order; a panicked comparison counts
    /// as failed.
    pub async fn run_concurrent(
        &self,
        config: &ConcurrentConfig,
        signal: &CancellationSignal,
        sink: &dyn ResultSink,
    ) -> CoreResult<ConcurrentRun> {
        let limiter = ConcurrencyLimiter::new(config.concurrency())?;
        let started = Instant::now();

        tracing::info!(
            total = config.total(),
            concurrency = config.concurrency(),
            "Starting concurrent batch"
        );

        let mut tasks = JoinSet::new();
        for query in config.queries().expand(config.total()) {
            let comparator = Arc::clone(&self.comparator);
            let signal = signal.clone();
            limiter.submit(&mut tasks, async move {
                if signal.is_cancelled() {
                    return None;
                }
                Some(comparator.compare(&query).await)
            });
        }

        let mut completion = Completion::new(Some(config.total()));
        let mut skipped = 0usize;
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Some(record)) => completion.accept(Ok(record), sink),
                Ok(None) => skipped += 1,
                Err(e) => completion.accept(Err(e), sink),
            }
        }

        if skipped > 0 {
            tracing::info!(skipped, "Concurrent batch cancelled before all comparisons were admitted");
        }

        let stats = LoadTestStats::compute(
            &completion.records,
            completion.lost,
            started.elapsed(),
            config.concurrency(),
        );
        sink.on_load_complete(&stats);

        Ok(ConcurrentRun {
            records: completion.records,
            stats,
        })
    }
}
