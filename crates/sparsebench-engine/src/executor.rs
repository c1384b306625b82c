use std::time::Duration;

use async_trait::async_trait;
use sparsebench_core::{SearchOutcome, TargetDescriptor};
use thiserror::Error;

/// Error returned by a query executor for one search call.
///
/// These never abort a run: the comparator folds them into the
/// corresponding `QueryResult`.
#[derive(Debug, Clone, Error)]
pub enum ExecutorError {
    /// Connection, DNS or TLS failure.
    #[error("Transport error: {0}")]
    Transport(String),

    /// Target answered with a non-success status.
    #[error("Target returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// Response body could not be interpreted.
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// No response within the configured timeout.
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    /// Injected or otherwise unclassified failure.
    #[error("Query failed: {0}")]
    Failed(String),
}

/// Result type for executor calls.
pub type ExecutorResult<T> = Result<T, ExecutorError>;

/// Capability to run one search against one target.
///
/// Implementations are shared across all queries of a run and must be safe
/// to call concurrently. Connection pooling is their concern.
#[async_trait]
pub trait QueryExecutor: Send + Sync {
    /// Identity of the target this executor talks to.
    fn descriptor(&self) -> &TargetDescriptor;

    /// Run `query` against the target.
    ///
    /// # Errors
    ///
    /// Returns an error if the search could not be completed.
    async fn execute(&self, query: &str) -> ExecutorResult<SearchOutcome>;
}
