//! Per-query results and paired comparison records.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::target::{TargetDescriptor, TargetSlot};

/// Maximum characters of document text kept in a hit summary.
pub const SNIPPET_MAX_CHARS: usize = 100;

/// Summary of one search hit, as shown in comparison reports.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    /// Relevance score reported by the target, if any.
    pub score: Option<f64>,
    /// Document title (play name in the sample corpus).
    pub title: Option<String>,
    /// Speaker field of the sample corpus.
    pub speaker: Option<String>,
    /// Leading part of the matched text.
    pub snippet: String,
}

impl SearchHit {
    #[must_use]
    pub fn new(score: Option<f64>, title: Option<String>, speaker: Option<String>, text: &str) -> Self {
        Self {
            score,
            title,
            speaker,
            snippet: truncate_snippet(text),
        }
    }
}

/// Cuts `text` to [`SNIPPET_MAX_CHARS`] characters, marking the cut with `...`.
#[must_use]
pub fn truncate_snippet(text: &str) -> String {
    match text.char_indices().nth(SNIPPET_MAX_CHARS) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}

/// What a query executor returns for a successful search.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchOutcome {
    /// Total number of matching documents.
    pub hit_count: u64,
    /// Top-N hit summaries.
    pub top_results: Vec<SearchHit>,
    /// Served by a fallback lexical query instead of the sparse-embedding query.
    #[serde(default)]
    pub degraded: bool,
}

/// Result of one query against one target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryResult {
    pub target: String,
    pub model_id: String,
    pub query: String,
    /// Wall-clock latency of the executor call in milliseconds.
    pub duration_ms: f64,
    pub hit_count: u64,
    pub top_results: Vec<SearchHit>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub degraded: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl QueryResult {
    /// Builds the result of a successful executor call.
    #[must_use]
    pub fn success(target: &TargetDescriptor, query: &str, elapsed: Duration, outcome: SearchOutcome) -> Self {
        Self {
            target: target.name.clone(),
            model_id: target.model_id.clone(),
            query: query.to_string(),
            duration_ms: duration_ms(elapsed),
            hit_count: outcome.hit_count,
            top_results: outcome.top_results,
            degraded: outcome.degraded,
            error: None,
        }
    }

    /// Builds the result of a failed executor call. Hits are always zero.
    #[must_use]
    pub fn failure(target: &TargetDescriptor, query: &str, elapsed: Duration, error: impl Into<String>) -> Self {
        Self {
            target: target.name.clone(),
            model_id: target.model_id.clone(),
            query: query.to_string(),
            duration_ms: duration_ms(elapsed),
            hit_count: 0,
            top_results: Vec::new(),
            degraded: false,
            error: Some(error.into()),
        }
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

fn duration_ms(elapsed: Duration) -> f64 {
    elapsed.as_nanos() as f64 / 1_000_000.0
}

/// Derived speed comparison between the two sides of a record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpeedComparison {
    /// Faster target; `None` only when both sides failed.
    pub faster: Option<TargetSlot>,
    /// Absolute latency difference in milliseconds.
    pub time_difference_ms: f64,
    /// `max / min` latency; only when both sides succeeded with non-zero latency.
    pub speedup: Option<f64>,
}

impl SpeedComparison {
    /// Compares two results. A failed side never wins against a successful one.
    #[must_use]
    pub fn between(a: &QueryResult, b: &QueryResult) -> Self {
        let time_difference_ms = (a.duration_ms - b.duration_ms).abs();

        match (a.is_success(), b.is_success()) {
            (true, true) => {
                let (faster, speedup) = Self::rank(a.duration_ms, b.duration_ms);
                Self {
                    faster: Some(faster),
                    time_difference_ms,
                    speedup,
                }
            }
            (true, false) => Self {
                faster: Some(TargetSlot::A),
                time_difference_ms,
                speedup: None,
            },
            (false, true) => Self {
                faster: Some(TargetSlot::B),
                time_difference_ms,
                speedup: None,
            },
            (false, false) => Self {
                faster: None,
                time_difference_ms,
                speedup: None,
            },
        }
    }

    /// Ranks two latencies. Equal latencies resolve to [`TargetSlot::A`] with a
    /// speedup of exactly 1.0; a zero latency yields no speedup.
    #[must_use]
    pub fn rank(a_ms: f64, b_ms: f64) -> (TargetSlot, Option<f64>) {
        let faster = if b_ms < a_ms { TargetSlot::B } else { TargetSlot::A };
        let speedup = if a_ms > 0.0 && b_ms > 0.0 {
            Some(a_ms.max(b_ms) / a_ms.min(b_ms))
        } else {
            None
        };
        (faster, speedup)
    }
}

/// Paired results for one query issued against both targets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonRecord {
    pub query: String,
    pub a: QueryResult,
    pub b: QueryResult,
    pub comparison: SpeedComparison,
}

impl ComparisonRecord {
    #[must_use]
    pub fn new(query: impl Into<String>, a: QueryResult, b: QueryResult) -> Self {
        let comparison = SpeedComparison::between(&a, &b);
        Self {
            query: query.into(),
            a,
            b,
            comparison,
        }
    }

    /// A record succeeds only when neither side carries an error.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.a.is_success() && self.b.is_success()
    }

    #[must_use]
    pub fn result(&self, slot: TargetSlot) -> &QueryResult {
        match slot {
            TargetSlot::A => &self.a,
            TargetSlot::B => &self.b,
        }
    }
}
