//! Worker pool for job execution
//!
//! Runs at most `max_concurrency` jobs at a time and shuts down gracefully.

use std::sync::Arc;
use std::time::Duration;

use docket_core::{HandlerRegistry, RetryPolicy};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tokio::sync::{watch, Semaphore};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use super::executor::JobExecutor;
use super::poller::{PollerConfig, PollerError, TaskPoller};
use crate::persistence::{StatusStore, StoreError, TaskQueue};

/// Worker pool configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerPoolConfig {
    /// Unique worker ID (generated if not provided)
    pub worker_id: String,

    /// Maximum concurrent job executions
    pub max_concurrency: usize,

    /// Lease granted on each claim; a job whose worker dies is redelivered
    /// after this window
    #[serde(with = "duration_millis")]
    pub lease_window: Duration,

    /// Poller configuration
    pub poller: PollerConfig,

    /// Graceful shutdown timeout
    #[serde(with = "duration_millis")]
    pub shutdown_timeout: Duration,

    /// Retry policy for status writes and acknowledgements
    pub store_retry: RetryPolicy,

    /// Acknowledge redeliveries of already-terminal tasks without running them
    pub skip_terminal_redelivery: bool,
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        Self {
            worker_id: format!("worker-{}", Uuid::now_v7()),
            max_concurrency: 2,
            lease_window: Duration::from_secs(300),
            poller: PollerConfig::default(),
            shutdown_timeout: Duration::from_secs(30),
            store_retry: RetryPolicy::exponential(),
            skip_terminal_redelivery: false,
        }
    }
}

impl WorkerPoolConfig {
    /// Create a new worker pool configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the worker ID
    pub fn with_worker_id(mut self, id: impl Into<String>) -> Self {
        self.worker_id = id.into();
        self
    }

    /// Set maximum concurrency
    pub fn with_max_concurrency(mut self, max: usize) -> Self {
        self.max_concurrency = max.max(1);
        self
    }

    /// Set the lease window
    pub fn with_lease_window(mut self, lease: Duration) -> Self {
        self.lease_window = lease;
        self
    }

    /// Set poller configuration
    pub fn with_poller(mut self, config: PollerConfig) -> Self {
        self.poller = config;
        self
    }

    /// Set shutdown timeout
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    /// Set the retry policy for store writes
    pub fn with_store_retry(mut self, policy: RetryPolicy) -> Self {
        self.store_retry = policy;
        self
    }

    /// Enable or disable terminal-redelivery skipping
    pub fn with_skip_terminal_redelivery(mut self, skip: bool) -> Self {
        self.skip_terminal_redelivery = skip;
        self
    }
}

/// Worker pool status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerPoolStatus {
    /// Worker is running and accepting jobs
    Running,
    /// Worker is draining (completing current jobs, not claiming new ones)
    Draining,
    /// Worker has stopped
    Stopped,
}

/// Worker pool errors
#[derive(Debug, thiserror::Error)]
pub enum WorkerPoolError {
    /// Store error
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Poller error
    #[error("poller error: {0}")]
    Poller(#[from] PollerError),

    /// Worker already running
    #[error("worker pool is already running")]
    AlreadyRunning,

    /// Shutdown timeout
    #[error("graceful shutdown timed out")]
    ShutdownTimeout,
}

/// Pool of workers consuming the task queue
///
/// Each worker slot is a semaphore permit acquired before claiming, so no
/// more than `max_concurrency` jobs are ever leased by this pool at once.
///
/// # Example
///
/// ```ignore
/// use docket_durable::worker::{WorkerPool, WorkerPoolConfig};
///
/// let config = WorkerPoolConfig::new().with_max_concurrency(2);
/// let pool = WorkerPool::new(store.clone(), store, registry, config);
///
/// pool.start()?;
///
/// // ... later, graceful shutdown
/// pool.shutdown().await?;
/// ```
pub struct WorkerPool {
    queue: Arc<dyn TaskQueue>,
    executor: JobExecutor,
    config: WorkerPoolConfig,
    shutdown_tx: watch::Sender<bool>,
    status: RwLock<WorkerPoolStatus>,
    active_tasks: Arc<Semaphore>,
    poll_handle: Mutex<Option<JoinHandle<()>>>,
}

impl WorkerPool {
    /// Create a new worker pool
    pub fn new(
        queue: Arc<dyn TaskQueue>,
        status: Arc<dyn StatusStore>,
        registry: Arc<HandlerRegistry>,
        config: WorkerPoolConfig,
    ) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        let executor = JobExecutor::new(
            Arc::clone(&queue),
            status,
            registry,
            config.store_retry.clone(),
        )
        .with_skip_terminal_redelivery(config.skip_terminal_redelivery);

        Self {
            queue,
            executor,
            active_tasks: Arc::new(Semaphore::new(config.max_concurrency)),
            config,
            shutdown_tx,
            status: RwLock::new(WorkerPoolStatus::Stopped),
            poll_handle: Mutex::new(None),
        }
    }

    /// Start the worker pool
    #[instrument(skip(self), fields(worker_id = %self.config.worker_id))]
    pub fn start(&self) -> Result<(), WorkerPoolError> {
        {
            let mut status = self.status.write();
            if *status != WorkerPoolStatus::Stopped {
                return Err(WorkerPoolError::AlreadyRunning);
            }
            *status = WorkerPoolStatus::Running;
        }

        info!(
            worker_id = %self.config.worker_id,
            max_concurrency = self.config.max_concurrency,
            lease_ms = self.config.lease_window.as_millis() as u64,
            "Starting worker pool"
        );

        self.shutdown_tx.send_replace(false);
        self.start_poll_loop();
        Ok(())
    }

    /// Shutdown the worker pool gracefully
    ///
    /// Stops claiming, then waits for in-flight jobs. Jobs still running at
    /// the timeout keep their lease and are redelivered after it expires.
    #[instrument(skip(self), fields(worker_id = %self.config.worker_id))]
    pub async fn shutdown(&self) -> Result<(), WorkerPoolError> {
        {
            let mut status = self.status.write();
            if *status == WorkerPoolStatus::Stopped {
                return Ok(());
            }
            *status = WorkerPoolStatus::Draining;
        }

        info!(worker_id = %self.config.worker_id, "Initiating graceful shutdown");
        self.shutdown_tx.send_replace(true);

        let handle = self.poll_handle.lock().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                error!("Poll loop terminated abnormally: {}", e);
            }
        }

        let deadline = tokio::time::Instant::now() + self.config.shutdown_timeout;
        loop {
            let available = self.active_tasks.available_permits();
            if available == self.config.max_concurrency {
                debug!("All jobs completed");
                break;
            }

            if tokio::time::Instant::now() >= deadline {
                warn!(
                    remaining_jobs = self.config.max_concurrency - available,
                    "Shutdown timeout reached"
                );
                *self.status.write() = WorkerPoolStatus::Stopped;
                return Err(WorkerPoolError::ShutdownTimeout);
            }

            tokio::time::sleep(Duration::from_millis(50)).await;
        }

        *self.status.write() = WorkerPoolStatus::Stopped;
        info!(worker_id = %self.config.worker_id, "Worker pool stopped");
        Ok(())
    }

    /// Get current status
    pub fn status(&self) -> WorkerPoolStatus {
        *self.status.read()
    }

    /// Number of jobs currently executing
    pub fn active_count(&self) -> usize {
        self.config.max_concurrency - self.active_tasks.available_permits()
    }

    /// Get the worker ID
    pub fn worker_id(&self) -> &str {
        &self.config.worker_id
    }

    fn start_poll_loop(&self) {
        let executor = self.executor.clone();
        let active_tasks = Arc::clone(&self.active_tasks);
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let mut poller = TaskPoller::new(
            Arc::clone(&self.queue),
            self.config.worker_id.clone(),
            self.config.lease_window,
            self.config.poller.clone(),
            self.shutdown_tx.subscribe(),
        );

        let handle = tokio::spawn(async move {
            loop {
                if poller.is_shutdown() {
                    debug!("Poll loop: shutdown requested");
                    break;
                }

                // Wait for a free slot before claiming, so a claimed job
                // never sits leased without a worker
                let permit = tokio::select! {
                    permit = Arc::clone(&active_tasks).acquire_owned() => match permit {
                        Ok(permit) => permit,
                        Err(_) => break,
                    },
                    _ = shutdown_rx.changed() => break,
                };

                match poller.poll().await {
                    Ok(Some(claimed)) => {
                        let executor = executor.clone();
                        tokio::spawn(async move {
                            let job_id = claimed.id;
                            if let Err(e) = executor.execute(claimed).await {
                                error!(%job_id, "Job left for redelivery: {}", e);
                            }
                            drop(permit);
                        });
                    }
                    Ok(None) => {
                        drop(permit);
                        if poller.wait().await {
                            break;
                        }
                    }
                    Err(PollerError::Shutdown) => break,
                    Err(e) => {
                        drop(permit);
                        debug!("Poll error: {}", e);
                        if poller.wait().await {
                            break;
                        }
                    }
                }
            }

            debug!("Poll loop exited");
        });

        *self.poll_handle.lock() = Some(handle);
    }
}

/// Serde support for Duration as milliseconds
mod duration_millis {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.as_millis().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}
