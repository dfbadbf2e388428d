//! # Durable Task Processing
//!
//! A PostgreSQL-backed task queue, status store, and worker pool for
//! reliable asynchronous task execution.
//!
//! ## Features
//!
//! - **At-least-once delivery**: Claimed jobs are leased; a crashed worker's
//!   job is redelivered once its lease expires
//! - **Non-regressing status**: Status upserts never move a task backwards,
//!   so duplicate and late writes are harmless
//! - **Bounded concurrency**: A worker pool never holds more jobs than it has
//!   free slots
//! - **Store retries**: Status writes and acknowledgements are retried with
//!   exponential backoff before a job is handed back to the queue
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │           Ingestion (publish job, write "queued")           │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │              TaskQueue + StatusStore                         │
//! │  (PostgreSQL: task_queue, task_records)                     │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      WorkerPool                              │
//! │  (claims jobs, runs handlers, records outcomes, acks)       │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod persistence;
pub mod worker;

/// Prelude for common imports
pub mod prelude {
    pub use crate::persistence::{
        ClaimedJob, InMemoryStore, PostgresStore, StatusStore, StoreError, TaskQueue,
    };
    pub use crate::worker::{
        JobExecutor, JobOutcome, PollerConfig, WorkerPool, WorkerPoolConfig, WorkerPoolError,
        WorkerPoolStatus,
    };
}

pub use persistence::{ClaimedJob, InMemoryStore, PostgresStore, StatusStore, StoreError, TaskQueue};
pub use worker::{
    JobExecutor, JobOutcome, PollerConfig, WorkerPool, WorkerPoolConfig, WorkerPoolError,
    WorkerPoolStatus,
};
