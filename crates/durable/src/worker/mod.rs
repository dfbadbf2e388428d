//! Worker pool for job execution
//!
//! This module provides:
//! - [`WorkerPool`] - Semaphore-bounded pool with graceful shutdown
//! - [`JobExecutor`] - Runs one claimed job and records its outcome
//! - [`TaskPoller`] - Job claiming with exponential backoff
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────┐
//! │                      WorkerPool                        │
//! │  ┌──────────────┐    acquire permit, then claim        │
//! │  │  TaskPoller  │──────────────────────────┐           │
//! │  └──────────────┘                          ▼           │
//! │  ┌─────────────────────────────────────────────────┐  │
//! │  │        JobExecutor (Semaphore-limited)          │  │
//! │  │  working ─► handler ─► completed/failed ─► ack  │  │
//! │  └─────────────────────────────────────────────────┘  │
//! └───────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```ignore
//! use docket_durable::worker::{WorkerPool, WorkerPoolConfig};
//!
//! let config = WorkerPoolConfig::new()
//!     .with_worker_id("docket-worker-1")
//!     .with_max_concurrency(2);
//!
//! let pool = WorkerPool::new(queue, status_store, registry, config);
//! pool.start()?;
//!
//! // Graceful shutdown
//! pool.shutdown().await?;
//! ```

mod executor;
mod poller;
mod pool;

pub use executor::{JobExecutor, JobOutcome};
pub use poller::{PollerConfig, PollerError, TaskPoller};
pub use pool::{WorkerPool, WorkerPoolConfig, WorkerPoolError, WorkerPoolStatus};
