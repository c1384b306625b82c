//! Prometheus metrics for benchmark runs.
//!
//! Registered in the default registry; the CLI can dump them after a run.

use lazy_static::lazy_static;
use prometheus::{
    register_counter_vec, register_histogram_vec, register_int_gauge, CounterVec, Encoder,
    HistogramVec, IntGauge, TextEncoder,
};

lazy_static! {
    /// Executor calls by target name and status (success, degraded, error)
    pub static ref QUERIES_TOTAL: CounterVec = register_counter_vec!(
        "sparsebench_queries_total",
        "Total executor calls by target and status",
        &["target", "status"]
    )
    .unwrap();

    /// Executor call latency distribution (seconds)
    pub static ref QUERY_DURATION_SECONDS: HistogramVec = register_histogram_vec!(
        "sparsebench_query_duration_seconds",
        "Executor call latency in seconds",
        &["target"],
        vec![0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]
    )
    .unwrap();

    /// Comparisons currently executing
    pub static ref INFLIGHT_COMPARISONS: IntGauge = register_int_gauge!(
        "sparsebench_inflight_comparisons",
        "Comparisons currently executing"
    )
    .unwrap();

    /// Sessions registered in run controllers
    pub static ref SESSIONS_ACTIVE: IntGauge = register_int_gauge!(
        "sparsebench_sessions_active",
        "Test sessions currently running"
    )
    .unwrap();
}

/// Records one executor call.
pub fn record_query(target: &str, status: &str, seconds: f64) {
    QUERIES_TOTAL.with_label_values(&[target, status]).inc();
    QUERY_DURATION_SECONDS
        .with_label_values(&[target])
        .observe(seconds);
}

/// Exports all metrics in Prometheus text format.
pub fn export_prometheus() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();

    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .unwrap_or_else(|e| {
            tracing::error!("Failed to encode metrics: {}", e);
        });

    String::from_utf8(buffer).unwrap_or_else(|e| {
        tracing::error!("Failed to convert metrics to UTF-8: {}", e);
        String::from("# Error encoding metrics\n")
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_query() {
        record_query("metrics-test", "success", 0.042);
        record_query("metrics-test", "error", 1.5);

        let counter = QUERIES_TOTAL.with_label_values(&["metrics-test", "success"]);
        assert!(counter.get() >= 1.0);

        let metrics = prometheus::gather();
        assert!(metrics
            .iter()
            .any(|m| m.get_name() == "sparsebench_query_duration_seconds"));
    }

    #[test]
    fn test_export_contains_gauges() {
        INFLIGHT_COMPARISONS.inc();
        INFLIGHT_COMPARISONS.dec();
        SESSIONS_ACTIVE.get();

        let text = export_prometheus();
        assert!(text.contains("sparsebench_inflight_comparisons"));
        assert!(text.contains("sparsebench_sessions_active"));
    }
}
