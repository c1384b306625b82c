use sparsebench_core::{CoreResult, StressConfig, StressStepResult};

use crate::driver::LoadDriver;
use crate::signal::CancellationSignal;
use crate::sink::ResultSink;

/// Escalating concurrency sweep.
///
/// Runs one load step per concurrency level and stops after the first step
/// whose failures exceed 10% of its successes. Picking the best step is left
/// to the caller (see `sparsebench_core::best_step`).
#[derive(Clone)]
pub struct StressController {
    driver: LoadDriver,
}

impl StressController {
    #[must_use]
    pub fn new(driver: LoadDriver) -> Self {
        Self { driver }
    }

    pub async fn run(
        &self,
        config: &StressConfig,
        signal: &CancellationSignal,
        sink: &dyn ResultSink,
    ) -> CoreResult<Vec<StressStepResult>> {
        let mut steps = Vec::new();

        for concurrency in config.concurrency_levels() {
            if signal.is_cancelled() {
                tracing::info!(completed_steps = steps.len(), "Stress sweep cancelled");
                break;
            }

            let step_config = config.step_config(concurrency)?;
            let run = self.driver.run(&step_config, signal, sink).await?;
            let step = StressStepResult {
                concurrency,
                stats: run.stats,
            };

            sink.on_stress_step(&step);
            let saturated = step.stats.exceeds_failure_threshold();
            steps.push(step);

            if saturated {
                tracing::warn!(
                    concurrency,
                    "Failure rate above 10% of successes, stopping stress sweep"
                );
                break;
            }
        }

        Ok(steps)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comparator::Comparator;
    use crate::mock::{MockFailure, MockQueryExecutor};
    use crate::sink::NullSink;
    use sparsebench_core::QueryPool;
    use std::sync::Arc;
    use std::time::Duration;

    fn controller(failure: MockFailure) -> StressController {
        let a = MockQueryExecutor::new("a", "m")
            .with_latency(Duration::from_millis(10))
            .with_failure(failure);
        let b = MockQueryExecutor::new("b", "m").with_latency(Duration::from_millis(10));
        StressController::new(LoadDriver::new(Arc::new(Comparator::new(Arc::new(a), Arc::new(b)))))
    }

    #[tokio::test(start_paused = true)]
    async fn test_healthy_sweep_runs_every_level() {
        let config = StressConfig::new(QueryPool::default(), 2, 6, 2, Duration::from_millis(50)).unwrap();

        let steps = controller(MockFailure::Never)
            .run(&config, &CancellationSignal::new(), &NullSink)
            .await
            .unwrap();

        let levels: Vec<usize> = steps.iter().map(|s| s.concurrency).collect();
        assert_eq!(levels, vec![2, 4, 6]);
        assert!(steps.iter().all(|s| s.stats.failed_queries == 0));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failing_target_stops_after_first_step() {
        let config = StressConfig::new(QueryPool::default(), 2, 10, 2, Duration::from_millis(50)).unwrap();

        let steps = controller(MockFailure::EveryNth(2))
            .run(&config, &CancellationSignal::new(), &NullSink)
            .await
            .unwrap();

        assert_eq!(steps.len(), 1);
        assert!(steps[0].stats.exceeds_failure_threshold());
    }
}
