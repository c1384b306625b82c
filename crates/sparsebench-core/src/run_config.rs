//! Per-operation run configurations.
//!
//! Each run kind gets one explicit structure, validated once at construction.
//! A configuration that passes `new` is immutable for the lifetime of a run.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};

/// Query pool used when none is given.
pub const DEFAULT_QUERIES: [&str; 5] = ["love", "death", "king", "sword", "night"];

/// Non-empty ordered pool of query strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<String>", into = "Vec<String>")]
pub struct QueryPool {
    queries: Vec<String>,
}

impl QueryPool {
    /// Creates a pool, rejecting an empty pool and blank queries.
    pub fn new<I, S>(queries: I) -> CoreResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let queries: Vec<String> = queries.into_iter().map(Into::into).collect();

        if queries.is_empty() {
            return Err(CoreError::invalid_config("query pool must not be empty"));
        }

        if let Some(position) = queries.iter().position(|q| q.trim().is_empty()) {
            return Err(CoreError::invalid_config(format!(
                "query pool entry {position} is blank"
            )));
        }

        Ok(Self { queries })
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.queries.len()
    }

    /// Always `false`; present for API symmetry with `len`.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.queries.is_empty()
    }

    #[must_use]
    pub fn as_slice(&self) -> &[String] {
        &self.queries
    }

    /// Query at round-robin position `index`.
    #[must_use]
    pub fn get(&self, index: usize) -> &str {
        &self.queries[index % self.queries.len()]
    }

    /// Endless round-robin cursor starting at the first query.
    #[must_use]
    pub fn round_robin(&self) -> RoundRobin<'_> {
        RoundRobin { pool: self, next: 0 }
    }

    /// The first `total` queries of the round-robin sequence.
    #[must_use]
    pub fn expand(&self, total: usize) -> Vec<String> {
        self.round_robin().take(total).map(str::to_string).collect()
    }
}

impl Default for QueryPool {
    fn default() -> Self {
        Self {
            queries: DEFAULT_QUERIES.iter().map(|q| (*q).to_string()).collect(),
        }
    }
}

impl TryFrom<Vec<String>> for QueryPool {
    type Error = CoreError;

    fn try_from(value: Vec<String>) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<QueryPool> for Vec<String> {
    fn from(value: QueryPool) -> Self {
        value.queries
    }
}

/// Deterministic round-robin selection over a [`QueryPool`].
#[derive(Debug, Clone)]
pub struct RoundRobin<'a> {
    pool: &'a QueryPool,
    next: usize,
}

impl<'a> Iterator for RoundRobin<'a> {
    type Item = &'a str;

    fn next(&mut self) -> Option<Self::Item> {
        let query = self.pool.get(self.next);
        self.next = (self.next + 1) % self.pool.len();
        Some(query)
    }
}

fn validate_concurrency(name: &str, value: usize) -> CoreResult<()> {
    if value == 0 {
        return Err(CoreError::invalid_config(format!("{name} must be >= 1")));
    }
    Ok(())
}

fn validate_duration(name: &str, value: Duration) -> CoreResult<()> {
    if value.is_zero() {
        return Err(CoreError::invalid_config(format!("{name} must be > 0")));
    }
    Ok(())
}

/// Validates a target rate and returns the dispatch period it implies.
///
/// Rates whose period rounds to zero or does not fit a `Duration` are rejected.
fn validate_qps(value: Option<f64>) -> CoreResult<Option<Duration>> {
    let Some(qps) = value else {
        return Ok(None);
    };

    if !qps.is_finite() || qps <= 0.0 {
        return Err(CoreError::invalid_config(format!(
            "target_qps must be a positive number, got {qps}"
        )));
    }

    match Duration::try_from_secs_f64(1.0 / qps) {
        Ok(period) if !period.is_zero() => Ok(Some(period)),
        _ => Err(CoreError::invalid_config(format!(
            "target_qps {qps} is out of range: dispatch period must be between 1ns and Duration::MAX"
        ))),
    }
}

/// Time-boxed sustained load against both targets.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadTestConfig {
    queries: QueryPool,
    duration: Duration,
    concurrency: usize,
    target_qps: Option<f64>,
    pacing_period: Option<Duration>,
}

impl LoadTestConfig {
    pub const DEFAULT_DURATION: Duration = Duration::from_secs(30);
    pub const DEFAULT_CONCURRENCY: usize = 10;

    /// Validates and freezes a load test configuration.
    ///
    /// `target_qps = None` dispatches as fast as the concurrency ceiling admits.
    pub fn new(
        queries: QueryPool,
        duration: Duration,
        concurrency: usize,
        target_qps: Option<f64>,
    ) -> CoreResult<Self> {
        validate_duration("duration", duration)?;
        validate_concurrency("concurrency", concurrency)?;
        let pacing_period = validate_qps(target_qps)?;

        Ok(Self {
            queries,
            duration,
            concurrency,
            target_qps,
            pacing_period,
        })
    }

    #[must_use]
    pub fn queries(&self) -> &QueryPool {
        &self.queries
    }

    #[must_use]
    pub fn duration(&self) -> Duration {
        self.duration
    }

    #[must_use]
    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    #[must_use]
    pub fn target_qps(&self) -> Option<f64> {
        self.target_qps
    }

    /// Delay between dispatches (`1000 / qps` ms) when a rate is configured.
    #[must_use]
    pub fn pacing_period(&self) -> Option<Duration> {
        self.pacing_period
    }

    /// Number of dispatches a paced run aims for; unknown when unpaced.
    #[must_use]
    pub fn expected_dispatches(&self) -> Option<usize> {
        self.target_qps
            .map(|qps| (qps * self.duration.as_secs_f64()).ceil() as usize)
    }
}

/// Escalating concurrency sweep made of fixed-duration load steps.
#[derive(Debug, Clone, PartialEq)]
pub struct StressConfig {
    queries: QueryPool,
    start_concurrency: usize,
    max_concurrency: usize,
    step: usize,
    step_duration: Duration,
    target_qps: Option<f64>,
}

impl StressConfig {
    pub const DEFAULT_START: usize = 5;
    pub const DEFAULT_MAX: usize = 50;
    pub const DEFAULT_STEP: usize = 5;
    pub const DEFAULT_STEP_DURATION: Duration = Duration::from_secs(10);

    pub fn new(
        queries: QueryPool,
        start_concurrency: usize,
        max_concurrency: usize,
        step: usize,
        step_duration: Duration,
    ) -> CoreResult<Self> {
        validate_concurrency("start_concurrency", start_concurrency)?;
        validate_concurrency("step", step)?;
        validate_duration("step_duration", step_duration)?;

        if max_concurrency < start_concurrency {
            return Err(CoreError::invalid_config(format!(
                "max_concurrency ({max_concurrency}) must be >= start_concurrency ({start_concurrency})"
            )));
        }

        Ok(Self {
            queries,
            start_concurrency,
            max_concurrency,
            step,
            step_duration,
            target_qps: None,
        })
    }

    /// Paces every step at `qps` instead of running unbounded.
    pub fn with_target_qps(mut self, qps: f64) -> CoreResult<Self> {
        validate_qps(Some(qps))?;
        self.target_qps = Some(qps);
        Ok(self)
    }

    #[must_use]
    pub fn queries(&self) -> &QueryPool {
        &self.queries
    }

    #[must_use]
    pub fn start_concurrency(&self) -> usize {
        self.start_concurrency
    }

    #[must_use]
    pub fn max_concurrency(&self) -> usize {
        self.max_concurrency
    }

    #[must_use]
    pub fn step(&self) -> usize {
        self.step
    }

    #[must_use]
    pub fn step_duration(&self) -> Duration {
        self.step_duration
    }

    /// Concurrency ceilings of each step: `start, start + step, ..` up to `max`.
    pub fn concurrency_levels(&self) -> impl Iterator<Item = usize> {
        (self.start_concurrency..=self.max_concurrency).step_by(self.step)
    }

    /// Load configuration for the step running at `concurrency`.
    pub fn step_config(&self, concurrency: usize) -> CoreResult<LoadTestConfig> {
        LoadTestConfig::new(
            self.queries.clone(),
            self.step_duration,
            concurrency,
            self.target_qps,
        )
    }
}

/// Fixed number of comparisons run through the concurrency limiter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConcurrentConfig {
    queries: QueryPool,
    total: usize,
    concurrency: usize,
}

impl ConcurrentConfig {
    pub const DEFAULT_TOTAL: usize = 50;

    pub fn new(queries: QueryPool, total: usize, concurrency: usize) -> CoreResult<Self> {
        validate_concurrency("total", total)?;
        validate_concurrency("concurrency", concurrency)?;

        Ok(Self {
            queries,
            total,
            concurrency,
        })
    }

    #[must_use]
    pub fn queries(&self) -> &QueryPool {
        &self.queries
    }

    #[must_use]
    pub fn total(&self) -> usize {
        self.total
    }

    #[must_use]
    pub fn concurrency(&self) -> usize {
        self.concurrency
    }
}

/// Sequential per-query benchmark.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BenchmarkConfig {
    queries: QueryPool,
    iterations: usize,
}

impl BenchmarkConfig {
    pub const DEFAULT_ITERATIONS: usize = 5;

    pub fn new(queries: QueryPool, iterations: usize) -> CoreResult<Self> {
        validate_concurrency("iterations", iterations)?;
        Ok(Self {
            queries,
            iterations,
        })
    }

    #[must_use]
    pub fn queries(&self) -> &QueryPool {
        &self.queries
    }

    #[must_use]
    pub fn iterations(&self) -> usize {
        self.iterations
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pool(queries: &[&str]) -> QueryPool {
        QueryPool::new(queries.iter().copied()).unwrap()
    }

    #[test]
    fn test_round_robin_order() {
        let pool = pool(&["a", "b", "c"]);
        let picked: Vec<&str> = pool.round_robin().take(7).collect();
        assert_eq!(picked, vec!["a", "b", "c", "a", "b", "c", "a"]);
    }

    #[test]
    fn test_single_query_pool_repeats() {
        let pool = pool(&["only"]);
        assert_eq!(pool.expand(3), vec!["only", "only", "only"]);
    }

    #[test]
    fn test_empty_pool_rejected() {
        let err = QueryPool::new(Vec::<String>::new()).unwrap_err();
        assert!(matches!(err, CoreError::InvalidConfig(_)));

        assert!(QueryPool::new(["love", "  "]).is_err());
    }

    #[test]
    fn test_pool_deserialization_validates() {
        let pool: QueryPool = serde_json::from_str(r#"["x", "y"]"#).unwrap();
        assert_eq!(pool.len(), 2);

        assert!(serde_json::from_str::<QueryPool>("[]").is_err());
    }

    #[test]
    fn test_load_config_validation() {
        let queries = QueryPool::default();

        assert!(LoadTestConfig::new(queries.clone(), Duration::ZERO, 1, None).is_err());
        assert!(LoadTestConfig::new(queries.clone(), Duration::from_secs(1), 0, None).is_err());
        assert!(LoadTestConfig::new(queries.clone(), Duration::from_secs(1), 1, Some(0.0)).is_err());
        assert!(LoadTestConfig::new(queries.clone(), Duration::from_secs(1), 1, Some(f64::NAN)).is_err());
        assert!(LoadTestConfig::new(queries, Duration::from_secs(1), 1, Some(20.0)).is_ok());
    }

    #[test]
    fn test_pacing_period() {
        let config =
            LoadTestConfig::new(QueryPool::default(), Duration::from_secs(2), 4, Some(20.0)).unwrap();
        assert_eq!(config.pacing_period(), Some(Duration::from_millis(50)));
        assert_eq!(config.expected_dispatches(), Some(40));

        let unpaced = LoadTestConfig::new(QueryPool::default(), Duration::from_secs(2), 4, None).unwrap();
        assert_eq!(unpaced.pacing_period(), None);
        assert_eq!(unpaced.expected_dispatches(), None);
    }

    #[test]
    fn test_extreme_rates_rejected() {
        let queries = QueryPool::default();

        // Period rounds down to 0ns.
        let err = LoadTestConfig::new(queries.clone(), Duration::from_secs(1), 1, Some(1e10)).unwrap_err();
        assert!(matches!(err, CoreError::InvalidConfig(_)));

        // Period overflows Duration.
        let err = LoadTestConfig::new(queries.clone(), Duration::from_secs(1), 1, Some(1e-20)).unwrap_err();
        assert!(matches!(err, CoreError::InvalidConfig(_)));

        let stress = StressConfig::new(queries.clone(), 1, 2, 1, Duration::from_secs(1)).unwrap();
        assert!(stress.clone().with_target_qps(1e10).is_err());
        assert!(stress.with_target_qps(1e-20).is_err());

        let fast = LoadTestConfig::new(queries.clone(), Duration::from_secs(1), 1, Some(1e9)).unwrap();
        assert!(fast.pacing_period().unwrap() > Duration::ZERO);

        let slow = LoadTestConfig::new(queries, Duration::from_secs(1), 1, Some(1e-6)).unwrap();
        let period = slow.pacing_period().unwrap();
        assert!((period.as_secs_f64() - 1_000_000.0).abs() < 1.0);
    }

    #[test]
    fn test_stress_levels() {
        let config =
            StressConfig::new(QueryPool::default(), 5, 20, 5, Duration::from_secs(1)).unwrap();
        assert_eq!(config.concurrency_levels().collect::<Vec<_>>(), vec![5, 10, 15, 20]);

        let uneven =
            StressConfig::new(QueryPool::default(), 2, 9, 3, Duration::from_secs(1)).unwrap();
        assert_eq!(uneven.concurrency_levels().collect::<Vec<_>>(), vec![2, 5, 8]);
    }

    #[test]
    fn test_stress_validation() {
        let queries = QueryPool::default();
        assert!(StressConfig::new(queries.clone(), 10, 5, 5, Duration::from_secs(1)).is_err());
        assert!(StressConfig::new(queries.clone(), 5, 10, 0, Duration::from_secs(1)).is_err());
        assert!(StressConfig::new(queries.clone(), 0, 10, 5, Duration::from_secs(1)).is_err());
        assert!(StressConfig::new(queries, 5, 10, 5, Duration::ZERO).is_err());
    }

    #[test]
    fn test_concurrent_and_benchmark_validation() {
        assert!(ConcurrentConfig::new(QueryPool::default(), 0, 4).is_err());
        assert!(ConcurrentConfig::new(QueryPool::default(), 10, 0).is_err());
        assert!(BenchmarkConfig::new(QueryPool::default(), 0).is_err());
        assert!(BenchmarkConfig::new(QueryPool::default(), 3).is_ok());
    }
}
