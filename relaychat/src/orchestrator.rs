//! Fixed-size worker pool for crypto work, with a polling bounded wait.
//!
//! Work is a blocking closure producing bytes or a [`CryptoError`]. Each
//! submission becomes a tokio task that first takes a pool permit and then
//! runs the closure on the blocking thread pool, so at most `size` closures
//! run at once regardless of how many are queued.
//!
//! Errors raised by the closure are stored in the handle and only surface
//! when the result is read ([`TaskHandle::join`] or [`BoundedWait::wait`]);
//! polling for completion never observes them.
//!
//! There is no cancellation. A task that outlives its bounded wait keeps
//! running; its eventual outcome is logged and discarded.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use tokio::sync::Semaphore;
use tokio::task::JoinHandle;

use crate::crypto::CryptoError;

/// Default polling interval for [`BoundedWait`].
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Default total wait for [`BoundedWait`].
pub const DEFAULT_MAX_WAIT: Duration = Duration::from_secs(300);

/// Default number of concurrently running work items.
pub const DEFAULT_POOL_SIZE: usize = 10;

/// Errors that can occur when reading a task's outcome.
#[derive(Debug, thiserror::Error)]
pub enum TaskError {
    /// The bounded wait elapsed before the task completed.
    #[error("task {task_id} did not complete within {waited:?}")]
    Timeout {
        /// Pool-assigned task identifier.
        task_id: u64,
        /// Total time spent waiting.
        waited: Duration,
    },
    /// The work itself failed.
    #[error(transparent)]
    Crypto(#[from] CryptoError),
    /// The work panicked or its task was aborted.
    #[error("task {0} panicked")]
    Panicked(u64),
    /// The pool was shut down before the work could start.
    #[error("worker pool closed")]
    PoolClosed,
}

/// Fixed-size pool that runs blocking work items.
#[derive(Clone)]
pub struct WorkerPool {
    permits: Arc<Semaphore>,
    size: usize,
    next_id: Arc<AtomicU64>,
}

impl WorkerPool {
    /// Create a pool running at most `size` work items at once (minimum 1).
    #[must_use]
    pub fn new(size: usize) -> Self {
        let size = size.max(1);
        Self {
            permits: Arc::new(Semaphore::new(size)),
            size,
            next_id: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Maximum number of concurrently running work items.
    #[must_use]
    pub const fn size(&self) -> usize {
        self.size
    }

    /// Number of idle workers right now.
    #[must_use]
    pub fn idle(&self) -> usize {
        self.permits.available_permits()
    }

    /// Enqueue `work` and return immediately with a handle to its outcome.
    ///
    /// Must be called from within a tokio runtime.
    pub fn submit<F>(&self, work: F) -> TaskHandle
    where
        F: FnOnce() -> Result<Vec<u8>, CryptoError> + Send + 'static,
    {
        let task_id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let permits = Arc::clone(&self.permits);
        let join = tokio::spawn(async move {
            let _permit = permits
                .acquire_owned()
                .await
                .map_err(|_| TaskError::PoolClosed)?;
            tracing::trace!(task_id, "worker started");
            let outcome = tokio::task::spawn_blocking(work)
                .await
                .map_err(|_| TaskError::Panicked(task_id))?;
            outcome.map_err(TaskError::from)
        });
        TaskHandle { task_id, join }
    }

    /// Stop accepting new work. Queued items that have not started fail
    /// with [`TaskError::PoolClosed`]; running items finish normally.
    pub fn close(&self) {
        self.permits.close();
    }
}

impl Default for WorkerPool {
    fn default() -> Self {
        Self::new(DEFAULT_POOL_SIZE)
    }
}

/// Handle to the eventual outcome of a submitted work item.
pub struct TaskHandle {
    task_id: u64,
    join: JoinHandle<Result<Vec<u8>, TaskError>>,
}

impl TaskHandle {
    /// Pool-assigned identifier, for logging.
    #[must_use]
    pub const fn id(&self) -> u64 {
        self.task_id
    }

    /// Returns `true` once the work has completed, successfully or not.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Wait for the outcome without any bound.
    ///
    /// # Errors
    ///
    /// Returns the work's own [`CryptoError`] (wrapped), or
    /// [`TaskError::Panicked`] / [`TaskError::PoolClosed`].
    pub async fn join(self) -> Result<Vec<u8>, TaskError> {
        let task_id = self.task_id;
        self.join
            .await
            .unwrap_or(Err(TaskError::Panicked(task_id)))
    }

    /// Let the work run to completion in the background, logging and
    /// discarding its outcome.
    fn detach(self) {
        let task_id = self.task_id;
        tokio::spawn(async move {
            match self.join().await {
                Ok(bytes) => tracing::debug!(
                    task_id,
                    len = bytes.len(),
                    "late task completion discarded"
                ),
                Err(e) => tracing::debug!(task_id, error = %e, "late task failure discarded"),
            }
        });
    }
}

/// Polling wait with a fixed interval and total deadline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoundedWait {
    /// Time between completion checks.
    pub poll_interval: Duration,
    /// Total time budget.
    pub max_wait: Duration,
}

impl Default for BoundedWait {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            max_wait: DEFAULT_MAX_WAIT,
        }
    }
}

impl BoundedWait {
    /// Create a bounded wait.
    #[must_use]
    pub const fn new(poll_interval: Duration, max_wait: Duration) -> Self {
        Self {
            poll_interval,
            max_wait,
        }
    }

    /// Number of poll intervals that fit in the total budget.
    ///
    /// The interval is clamped to at least one millisecond.
    #[must_use]
    pub fn attempts(&self) -> u128 {
        let poll_ms = self.poll_interval.as_millis().max(1);
        self.max_wait.as_millis() / poll_ms
    }

    /// Poll `handle` until it completes or the budget is spent.
    ///
    /// When the budget is smaller than one interval the wait times out
    /// immediately. On timeout the work is left running and its outcome is
    /// discarded when it eventually arrives.
    ///
    /// # Errors
    ///
    /// [`TaskError::Timeout`] if the budget elapsed first; otherwise whatever
    /// the work itself produced (see [`TaskHandle::join`]).
    pub async fn wait(&self, handle: TaskHandle) -> Result<Vec<u8>, TaskError> {
        let started = Instant::now();
        let poll = self.poll_interval.max(Duration::from_millis(1));
        let mut remaining = self.attempts();

        while remaining > 0 && !handle.is_finished() {
            tokio::time::sleep(poll).await;
            remaining -= 1;
        }

        if self.attempts() > 0 && handle.is_finished() {
            return handle.join().await;
        }

        let task_id = handle.id();
        let waited = started.elapsed();
        tracing::warn!(task_id, ?waited, "bounded wait elapsed, task left running");
        handle.detach();
        Err(TaskError::Timeout { task_id, waited })
    }
}
