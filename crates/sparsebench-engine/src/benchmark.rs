use sparsebench_core::{BenchmarkConfig, BenchmarkSummary};

use crate::comparator::Comparator;
use crate::signal::CancellationSignal;
use crate::sink::{Progress, ResultSink};

/// Sequential benchmark: `iterations` back-to-back comparisons per query.
///
/// Stops between comparisons once `signal` is set; a query cut short keeps
/// the iterations it completed, and queries never started are omitted.
pub async fn run_benchmark(
    comparator: &Comparator,
    config: &BenchmarkConfig,
    signal: &CancellationSignal,
    sink: &dyn ResultSink,
) -> Vec<BenchmarkSummary> {
    let expected = Some(config.queries().len() * config.iterations());
    let mut completed = 0;
    let mut summaries = Vec::with_capacity(config.queries().len());

    for query in config.queries().as_slice() {
        let mut records = Vec::with_capacity(config.iterations());

        for _ in 0..config.iterations() {
            if signal.is_cancelled() {
                break;
            }
            records.push(comparator.compare(query).await);
            completed += 1;
            sink.on_progress(Progress { completed, expected });
        }

        if records.is_empty() {
            break;
        }

        let summary = BenchmarkSummary::from_records(query.as_str(), records);
        tracing::info!(
            query = %summary.query,
            avg_a_ms = ?summary.avg_a_ms,
            avg_b_ms = ?summary.avg_b_ms,
            faster = ?summary.faster,
            speedup = ?summary.speedup,
            "Benchmark query complete"
        );
        summaries.push(summary);
    }

    summaries
}
