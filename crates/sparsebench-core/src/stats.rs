//! Statistics aggregation over comparison records.
//!
//! Percentiles use the ceil-rank method on a sorted copy of the samples:
//! `index = ceil(p / 100 * n) - 1`, clamped to `[0, n - 1]`. The median of an
//! even-length sample is the mean of its two middle elements.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::record::{ComparisonRecord, SpeedComparison};
use crate::target::TargetSlot;

/// Latency distribution of one target, in milliseconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LatencySummary {
    pub count: usize,
    pub avg: f64,
    pub min: f64,
    pub max: f64,
    pub median: f64,
    pub p95: f64,
    pub p99: f64,
}

/// Reduces a batch of durations to a summary. Returns `None` for an empty batch.
#[must_use]
pub fn aggregate(durations: &[f64]) -> Option<LatencySummary> {
    if durations.is_empty() {
        return None;
    }

    let sorted = sorted_copy(durations);
    let count = sorted.len();
    let sum: f64 = sorted.iter().sum();

    Some(LatencySummary {
        count,
        avg: sum / count as f64,
        min: sorted[0],
        max: sorted[count - 1],
        median: median_sorted(&sorted),
        p95: percentile_sorted(&sorted, 95.0),
        p99: percentile_sorted(&sorted, 99.0),
    })
}

/// Ceil-rank percentile of `values` (need not be sorted). `p` is in `[0, 100]`.
#[must_use]
pub fn percentile(values: &[f64], p: f64) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(percentile_sorted(&sorted_copy(values), p))
}

#[must_use]
pub fn median(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(median_sorted(&sorted_copy(values)))
}

fn sorted_copy(values: &[f64]) -> Vec<f64> {
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    sorted
}

fn percentile_sorted(sorted: &[f64], p: f64) -> f64 {
    let n = sorted.len();
    let rank = (p * n as f64 / 100.0).ceil() as isize - 1;
    let index = rank.clamp(0, n as isize - 1) as usize;
    sorted[index]
}

fn median_sorted(sorted: &[f64]) -> f64 {
    let n = sorted.len();
    let mid = n / 2;
    if n % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}

/// Statistics of one load run, derived once from its full set of records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoadTestStats {
    pub wall_clock_ms: f64,
    pub concurrency: usize,
    pub total_queries: usize,
    pub successful_queries: usize,
    pub failed_queries: usize,
    /// Completed comparisons per second of measured wall clock.
    pub achieved_qps: f64,
    /// Latency summary of target A over successful records.
    pub a: Option<LatencySummary>,
    /// Latency summary of target B over successful records.
    pub b: Option<LatencySummary>,
}

impl LoadTestStats {
    #[must_use]
    pub fn from_records(records: &[ComparisonRecord], wall_clock: Duration, concurrency: usize) -> Self {
        Self::compute(records, 0, wall_clock, concurrency)
    }

    /// Computes run statistics.
    ///
    /// `unrecorded_failures` counts comparisons that were dispatched but
    /// produced no record (a panicked task); they are failures with no latency.
    #[must_use]
    pub fn compute(
        records: &[ComparisonRecord],
        unrecorded_failures: usize,
        wall_clock: Duration,
        concurrency: usize,
    ) -> Self {
        let successful: Vec<&ComparisonRecord> = records.iter().filter(|r| r.is_success()).collect();
        let successful_queries = successful.len();
        let total_queries = records.len() + unrecorded_failures;
        let failed_queries = total_queries - successful_queries;

        let seconds = wall_clock.as_secs_f64();
        let achieved_qps = if seconds > 0.0 {
            total_queries as f64 / seconds
        } else {
            0.0
        };

        let durations = |slot: TargetSlot| -> Vec<f64> {
            successful.iter().map(|r| r.result(slot).duration_ms).collect()
        };

        Self {
            wall_clock_ms: seconds * 1000.0,
            concurrency,
            total_queries,
            successful_queries,
            failed_queries,
            achieved_qps,
            a: aggregate(&durations(TargetSlot::A)),
            b: aggregate(&durations(TargetSlot::B)),
        }
    }

    #[must_use]
    pub fn summary(&self, slot: TargetSlot) -> Option<&LatencySummary> {
        match slot {
            TargetSlot::A => self.a.as_ref(),
            TargetSlot::B => self.b.as_ref(),
        }
    }

    /// Share of successful comparisons, `0.0` when nothing ran.
    #[must_use]
    pub fn success_rate(&self) -> f64 {
        if self.total_queries == 0 {
            return 0.0;
        }
        self.successful_queries as f64 / self.total_queries as f64
    }

    /// Whether failures exceed 10% of successes (strictly).
    #[must_use]
    pub fn exceeds_failure_threshold(&self) -> bool {
        self.failed_queries * 10 > self.successful_queries
    }
}

/// One step of a stress sweep.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StressStepResult {
    pub concurrency: usize,
    pub stats: LoadTestStats,
}

/// Step with the highest achieved QPS; ties go to the lowest concurrency.
#[must_use]
pub fn best_step(steps: &[StressStepResult]) -> Option<&StressStepResult> {
    steps.iter().max_by(|x, y| {
        x.stats
            .achieved_qps
            .total_cmp(&y.stats.achieved_qps)
            .then_with(|| y.concurrency.cmp(&x.concurrency))
    })
}

/// Caller-side summary of a finished sweep.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StressReport {
    pub steps: Vec<StressStepResult>,
    pub best: Option<StressStepResult>,
    /// Concurrency of the step that tripped the failure threshold, if any.
    pub saturated_at: Option<usize>,
}

impl StressReport {
    #[must_use]
    pub fn from_steps(steps: Vec<StressStepResult>) -> Self {
        let best = best_step(&steps).cloned();
        let saturated_at = steps
            .iter()
            .find(|s| s.stats.exceeds_failure_threshold())
            .map(|s| s.concurrency);

        Self {
            steps,
            best,
            saturated_at,
        }
    }
}

/// Per-query result of the sequential benchmark.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BenchmarkSummary {
    pub query: String,
    pub iterations: usize,
    /// Mean latency of A over its successful iterations.
    pub avg_a_ms: Option<f64>,
    /// Mean latency of B over its successful iterations.
    pub avg_b_ms: Option<f64>,
    pub faster: Option<TargetSlot>,
    pub speedup: Option<f64>,
    pub records: Vec<ComparisonRecord>,
}

impl BenchmarkSummary {
    #[must_use]
    pub fn from_records(query: impl Into<String>, records: Vec<ComparisonRecord>) -> Self {
        let average = |slot: TargetSlot| -> Option<f64> {
            let durations: Vec<f64> = records
                .iter()
                .map(|r| r.result(slot))
                .filter(|r| r.is_success())
                .map(|r| r.duration_ms)
                .collect();
            aggregate(&durations).map(|s| s.avg)
        };

        let avg_a_ms = average(TargetSlot::A);
        let avg_b_ms = average(TargetSlot::B);

        let (faster, speedup) = match (avg_a_ms, avg_b_ms) {
            (Some(a), Some(b)) => {
                let (faster, speedup) = SpeedComparison::rank(a, b);
                (Some(faster), speedup)
            }
            (Some(_), None) => (Some(TargetSlot::A), None),
            (None, Some(_)) => (Some(TargetSlot::B), None),
            (None, None) => (None, None),
        };

        Self {
            query: query.into(),
            iterations: records.len(),
            avg_a_ms,
            avg_b_ms,
            faster,
            speedup,
            records,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{QueryResult, SearchOutcome};
    use crate::target::TargetDescriptor;
    use proptest::prelude::*;

    fn record(a_ms: u64, b_ms: u64, a_ok: bool, b_ok: bool) -> ComparisonRecord {
        let side = |name: &str, ms: u64, ok: bool| {
            let target = TargetDescriptor::new(name, "model");
            let elapsed = Duration::from_millis(ms);
            if ok {
                QueryResult::success(&target, "q", elapsed, SearchOutcome::default())
            } else {
                QueryResult::failure(&target, "q", elapsed, "boom")
            }
        };
        ComparisonRecord::new("q", side("a", a_ms, a_ok), side("b", b_ms, b_ok))
    }

    fn step(concurrency: usize, qps: f64) -> StressStepResult {
        let mut stats = LoadTestStats::from_records(&[], Duration::from_secs(1), concurrency);
        stats.achieved_qps = qps;
        StressStepResult { concurrency, stats }
    }

    #[test]
    fn test_aggregate_empty_is_none() {
        assert_eq!(aggregate(&[]), None);
        assert_eq!(percentile(&[], 95.0), None);
        assert_eq!(median(&[]), None);
    }

    #[test]
    fn test_aggregate_single_sample() {
        let summary = aggregate(&[100.0]).unwrap();
        assert_eq!(summary.count, 1);
        for value in [summary.avg, summary.min, summary.max, summary.median, summary.p95, summary.p99] {
            assert_eq!(value, 100.0);
        }
    }

    #[test]
    fn test_ceil_rank_percentiles() {
        let tens: Vec<f64> = (1..=10).map(|i| f64::from(i) * 10.0).collect();
        assert_eq!(percentile(&tens, 95.0), Some(100.0));
        assert_eq!(percentile(&tens, 50.0), Some(50.0));
        assert_eq!(percentile(&tens, 0.0), Some(10.0));

        let hundred: Vec<f64> = (1..=100).map(f64::from).collect();
        assert_eq!(percentile(&hundred, 95.0), Some(95.0));
        assert_eq!(percentile(&hundred, 99.0), Some(99.0));

        let four = [4.0, 1.0, 3.0, 2.0];
        assert_eq!(percentile(&four, 95.0), Some(4.0));
        assert_eq!(percentile(&four, 25.0), Some(1.0));
        assert_eq!(percentile(&four, 26.0), Some(2.0));
    }

    #[test]
    fn test_median_even_and_odd() {
        assert_eq!(median(&[3.0, 1.0, 2.0]), Some(2.0));
        assert_eq!(median(&[4.0, 1.0, 3.0, 2.0]), Some(2.5));
    }

    #[test]
    fn test_stats_count_successes_only() {
        let records = vec![
            record(10, 20, true, true),
            record(30, 40, true, true),
            record(1, 500, false, true),
        ];
        let stats = LoadTestStats::from_records(&records, Duration::from_secs(2), 4);

        assert_eq!(stats.total_queries, 3);
        assert_eq!(stats.successful_queries, 2);
        assert_eq!(stats.failed_queries, 1);
        assert_eq!(stats.achieved_qps, 1.5);
        assert_eq!(stats.wall_clock_ms, 2000.0);

        let a = stats.a.as_ref().unwrap();
        assert_eq!(a.count, 2);
        assert_eq!(a.avg, 20.0);
        assert_eq!(stats.b.as_ref().unwrap().max, 40.0);
    }

    #[test]
    fn test_stats_with_no_records() {
        let stats = LoadTestStats::from_records(&[], Duration::ZERO, 1);
        assert_eq!(stats.achieved_qps, 0.0);
        assert!(stats.a.is_none());
        assert!(stats.b.is_none());
        assert_eq!(stats.success_rate(), 0.0);

        let json = serde_json::to_value(&stats).unwrap();
        assert!(json["a"].is_null());
    }

    #[test]
    fn test_unrecorded_failures_count_as_failed() {
        let records = vec![record(10, 10, true, true)];
        let stats = LoadTestStats::compute(&records, 2, Duration::from_secs(1), 1);
        assert_eq!(stats.total_queries, 3);
        assert_eq!(stats.failed_queries, 2);
        assert_eq!(stats.a.as_ref().unwrap().count, 1);
    }

    #[test]
    fn test_failure_threshold_is_strict() {
        let mut records: Vec<ComparisonRecord> = (0..10).map(|_| record(5, 5, true, true)).collect();
        records.push(record(5, 5, false, true));
        let at_limit = LoadTestStats::from_records(&records, Duration::from_secs(1), 1);
        assert!(!at_limit.exceeds_failure_threshold());

        records.push(record(5, 5, true, false));
        let over = LoadTestStats::from_records(&records, Duration::from_secs(1), 1);
        assert!(over.exceeds_failure_threshold());
    }

    #[test]
    fn test_best_step_prefers_lowest_concurrency_on_tie() {
        let steps = vec![step(5, 40.0), step(10, 55.0), step(15, 55.0), step(20, 30.0)];
        assert_eq!(best_step(&steps).unwrap().concurrency, 10);
        assert!(best_step(&[]).is_none());
    }

    #[test]
    fn test_stress_report_marks_saturation() {
        let mut saturated = step(15, 12.0);
        saturated.stats.successful_queries = 10;
        saturated.stats.failed_queries = 2;
        let report = StressReport::from_steps(vec![step(5, 10.0), step(10, 20.0), saturated]);

        assert_eq!(report.best.as_ref().unwrap().concurrency, 10);
        assert_eq!(report.saturated_at, Some(15));
    }

    #[test]
    fn test_benchmark_summary() {
        let records = vec![record(100, 50, true, true), record(300, 50, true, true)];
        let summary = BenchmarkSummary::from_records("love", records);

        assert_eq!(summary.iterations, 2);
        assert_eq!(summary.avg_a_ms, Some(200.0));
        assert_eq!(summary.avg_b_ms, Some(50.0));
        assert_eq!(summary.faster, Some(TargetSlot::B));
        assert_eq!(summary.speedup, Some(4.0));
    }

    #[test]
    fn test_benchmark_summary_with_failed_side() {
        let records = vec![record(100, 50, true, false)];
        let summary = BenchmarkSummary::from_records("love", records);
        assert_eq!(summary.avg_b_ms, None);
        assert_eq!(summary.faster, Some(TargetSlot::A));
        assert_eq!(summary.speedup, None);
    }

    proptest! {
        #[test]
        fn prop_summary_is_ordered(samples in prop::collection::vec(0.0f64..10_000.0, 1..200)) {
            let s = aggregate(&samples).unwrap();
            prop_assert_eq!(s.count, samples.len());
            prop_assert!(s.min <= s.median);
            prop_assert!(s.median <= s.max);
            prop_assert!(s.min <= s.p95 && s.p95 <= s.p99 && s.p99 <= s.max);
            prop_assert!(s.min <= s.avg + 1e-9 && s.avg <= s.max + 1e-9);
        }

        #[test]
        fn prop_percentile_is_a_sample(samples in prop::collection::vec(0.0f64..1_000.0, 1..100), p in 0.0f64..=100.0) {
            let value = percentile(&samples, p).unwrap();
            prop_assert!(samples.contains(&value));
        }
    }
}
