//! Bounded concurrency for comparison tasks.

use std::future::Future;
use std::sync::Arc;

use futures::future::join_all;
use sparsebench_core::{CoreError, CoreResult};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinSet;

/// FIFO-fair limiter admitting at most `ceiling` tasks at once.
///
/// Nothing is ever rejected: excess work queues for a permit in submission
/// order.
#[derive(Debug, Clone)]
pub struct ConcurrencyLimiter {
    semaphore: Arc<Semaphore>,
    ceiling: usize,
}

impl ConcurrencyLimiter {
    pub fn new(ceiling: usize) -> CoreResult<Self> {
        if ceiling == 0 {
            return Err(CoreError::invalid_config("concurrency must be >= 1"));
        }

        Ok(Self {
            semaphore: Arc::new(Semaphore::new(ceiling)),
            ceiling,
        })
    }

    #[must_use]
    pub fn ceiling(&self) -> usize {
        self.ceiling
    }

    /// Tasks currently holding a permit.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.ceiling - self.semaphore.available_permits()
    }

    /// Waits for admission.
    pub async fn acquire(&self) -> CoreResult<OwnedSemaphorePermit> {
        Arc::clone(&self.semaphore)
            .acquire_owned()
            .await
            .map_err(|_| CoreError::internal("concurrency limiter closed"))
    }

    /// Runs `task` once admitted, releasing the permit when it finishes.
    pub async fn run<F>(&self, task: F) -> CoreResult<F::Output>
    where
        F: Future,
    {
        let _permit = self.acquire().await?;
        Ok(task.await)
    }

    /// Runs every task on the current task, at most `ceiling` at a time.
    ///
    /// Results come back in submission order.
    pub async fn run_all<I, F>(&self, tasks: I) -> CoreResult<Vec<F::Output>>
    where
        I: IntoIterator<Item = F>,
        F: Future,
    {
        join_all(tasks.into_iter().map(|task| self.run(task)))
            .await
            .into_iter()
            .collect()
    }

    /// Spawns `task` into `join_set`; it queues for a permit before running.
    pub fn submit<F>(&self, join_set: &mut JoinSet<F::Output>, task: F)
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        let semaphore = Arc::clone(&self.semaphore);
        join_set.spawn(async move {
            // The semaphore is never closed, so `ok()` only discards an impossible error.
            let _permit = semaphore.acquire_owned().await.ok();
            task.await
        });
    }

    /// Spawns an already admitted `task`; `permit` is held until it finishes.
    pub fn spawn_admitted<F>(&self, join_set: &mut JoinSet<F::Output>, permit: OwnedSemaphorePermit, task: F)
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        join_set.spawn(async move {
            let output = task.await;
            drop(permit);
            output
        });
    }
}
