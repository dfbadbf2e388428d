//! TaskQueue and StatusStore trait definitions

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use docket_core::{QueuedJob, Retryable, StatusWrite, TaskRecord};
use uuid::Uuid;

/// Error type for store operations
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// Queue job not found
    #[error("job not found: {0}")]
    JobNotFound(Uuid),

    /// The caller's lease was superseded by a later claim
    #[error("lease lost: {0}")]
    LeaseLost(Uuid),

    /// Database error
    #[error("database error: {0}")]
    Database(String),

    /// Backend temporarily unreachable
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl Retryable for StoreError {
    fn is_transient(&self) -> bool {
        matches!(self, StoreError::Database(_) | StoreError::Unavailable(_))
    }
}

/// A job leased to one worker.
#[derive(Debug, Clone, PartialEq)]
pub struct ClaimedJob {
    /// Queue-assigned job id (distinct from the task id)
    pub id: Uuid,
    pub job: QueuedJob,
    /// Delivery count, starting at 1
    pub attempt: u32,
    pub claimed_by: String,
    pub lease_expires_at: DateTime<Utc>,
}

impl ClaimedJob {
    /// Whether an earlier delivery of this job was lost or released
    pub fn is_redelivery(&self) -> bool {
        self.attempt > 1
    }
}

/// Durable at-least-once queue.
///
/// A claimed job is invisible to other claimers until its lease expires or
/// it is released with `fail`. Jobs are never dropped; only `acknowledge`
/// removes a job from circulation.
#[async_trait]
pub trait TaskQueue: Send + Sync {
    /// Durably enqueue a job; returns the queue-assigned job id
    async fn publish(&self, job: QueuedJob) -> Result<Uuid, StoreError>;

    /// Lease the oldest deliverable job, if any.
    ///
    /// Deliverable means pending, or claimed with an expired lease.
    async fn claim(&self, worker_id: &str, lease: Duration)
        -> Result<Option<ClaimedJob>, StoreError>;

    /// Mark a job done; it will not be delivered again.
    ///
    /// Only the current lease holder (same worker and attempt) may
    /// acknowledge; anyone else gets `LeaseLost`.
    async fn acknowledge(&self, claimed: &ClaimedJob) -> Result<(), StoreError>;

    /// Release a claimed job so it becomes deliverable immediately.
    ///
    /// A stale holder gets `LeaseLost` and the current lease is untouched.
    async fn fail(&self, claimed: &ClaimedJob, reason: &str) -> Result<(), StoreError>;
}

/// Keyed store of task records with non-regressing upserts.
#[async_trait]
pub trait StatusStore: Send + Sync {
    /// Apply a write by task id.
    ///
    /// Returns `false` when the write was ignored because it would lower the
    /// status of an existing record. Ignored writes are not errors.
    async fn upsert(&self, write: StatusWrite) -> Result<bool, StoreError>;

    /// Read a record; absent ids are `Ok(None)`
    async fn get(&self, task_id: Uuid) -> Result<Option<TaskRecord>, StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(StoreError::Database("connection reset".into()).is_transient());
        assert!(StoreError::Unavailable("down".into()).is_transient());
        assert!(!StoreError::Serialization("bad json".into()).is_transient());
        assert!(!StoreError::JobNotFound(Uuid::nil()).is_transient());
        assert!(!StoreError::LeaseLost(Uuid::nil()).is_transient());
    }
}
