//! Stress sweep termination and best-step selection.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use sparsebench_core::{
    best_step, QueryPool, SearchOutcome, StressConfig, StressReport, StressStepResult, TargetDescriptor,
};
use sparsebench_engine::{
    CancellationSignal, Comparator, ExecutorError, ExecutorResult, LoadDriver, MockQueryExecutor,
    QueryExecutor, ResultSink, StressController,
};

/// Fails a fixed share of calls, switched per sweep step by [`StepCounter`].
struct ScheduledExecutor {
    descriptor: TargetDescriptor,
    /// Failure percentage for each step; later steps reuse the last entry.
    failure_percent: Vec<usize>,
    step: Arc<AtomicUsize>,
    calls: AtomicUsize,
}

#[async_trait]
impl QueryExecutor for ScheduledExecutor {
    fn descriptor(&self) -> &TargetDescriptor {
        &self.descriptor
    }

    async fn execute(&self, _query: &str) -> ExecutorResult<SearchOutcome> {
        tokio::time::sleep(Duration::from_millis(10)).await;

        let step = self.step.load(Ordering::SeqCst).min(self.failure_percent.len() - 1);
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if call % 100 < self.failure_percent[step] {
            return Err(ExecutorError::Status {
                status: 429,
                body: "too many requests".to_string(),
            });
        }

        Ok(SearchOutcome {
            hit_count: 1,
            ..Default::default()
        })
    }
}

struct StepCounter(Arc<AtomicUsize>);

impl ResultSink for StepCounter {
    fn on_stress_step(&self, _step: &StressStepResult) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

fn controller(failure_percent: Vec<usize>, step: Arc<AtomicUsize>) -> StressController {
    let a = ScheduledExecutor {
        descriptor: TargetDescriptor::new("EIS", ".elser-2-elastic"),
        failure_percent,
        step,
        calls: AtomicUsize::new(0),
    };
    let b = MockQueryExecutor::new("ML Node", ".elser-2-elasticsearch").with_latency(Duration::from_millis(10));
    StressController::new(LoadDriver::new(Arc::new(Comparator::new(Arc::new(a), Arc::new(b)))))
}

#[tokio::test(start_paused = true)]
async fn test_sweep_stops_at_first_saturated_step() {
    let step = Arc::new(AtomicUsize::new(0));
    let controller = controller(vec![0, 0, 15], step.clone());
    let config = StressConfig::new(QueryPool::default(), 5, 50, 5, Duration::from_secs(1)).unwrap();

    let steps = controller
        .run(&config, &CancellationSignal::new(), &StepCounter(step.clone()))
        .await
        .unwrap();

    assert_eq!(steps.len(), 3);
    assert_eq!(step.load(Ordering::SeqCst), 3);
    assert_eq!(steps.iter().map(|s| s.concurrency).collect::<Vec<_>>(), vec![5, 10, 15]);
    assert_eq!(steps[0].stats.failed_queries, 0);
    assert_eq!(steps[1].stats.failed_queries, 0);
    assert!(steps[2].stats.exceeds_failure_threshold());

    let report = StressReport::from_steps(steps);
    assert_eq!(report.saturated_at, Some(15));
    assert!(report.best.is_some());
}

#[tokio::test(start_paused = true)]
async fn test_failures_below_threshold_do_not_stop_sweep() {
    let step = Arc::new(AtomicUsize::new(0));
    // 5% of records fail: 5 * 10 < 95.
    let controller = controller(vec![5], step.clone());
    let config = StressConfig::new(QueryPool::default(), 2, 6, 2, Duration::from_secs(1)).unwrap();

    let steps = controller
        .run(&config, &CancellationSignal::new(), &StepCounter(step))
        .await
        .unwrap();

    assert_eq!(steps.len(), 3);
    assert!(steps.iter().all(|s| !s.stats.exceeds_failure_threshold()));
}

#[tokio::test(start_paused = true)]
async fn test_best_step_is_highest_throughput() {
    let step = Arc::new(AtomicUsize::new(0));
    let controller = controller(vec![0], step.clone());
    let config = StressConfig::new(QueryPool::default(), 1, 4, 1, Duration::from_millis(500)).unwrap();

    let steps = controller
        .run(&config, &CancellationSignal::new(), &StepCounter(step))
        .await
        .unwrap();

    // Fixed latency, so throughput grows with concurrency.
    let best = best_step(&steps).unwrap();
    assert_eq!(best.concurrency, 4);
    assert!(steps.windows(2).all(|w| w[0].stats.achieved_qps < w[1].stats.achieved_qps));
}

#[tokio::test(start_paused = true)]
async fn test_cancelled_sweep_stops_between_steps() {
    let step = Arc::new(AtomicUsize::new(0));
    let controller = controller(vec![0], step.clone());
    let config = StressConfig::new(QueryPool::default(), 1, 10, 1, Duration::from_millis(200)).unwrap();
    let signal = CancellationSignal::new();

    let canceller = {
        let signal = signal.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(300)).await;
            signal.cancel();
        })
    };

    let steps = controller.run(&config, &signal, &StepCounter(step)).await.unwrap();
    canceller.await.unwrap();

    assert_eq!(steps.len(), 2);
}
