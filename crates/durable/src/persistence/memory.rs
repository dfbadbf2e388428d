//! In-memory implementation of TaskQueue and StatusStore for testing

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use docket_core::{QueuedJob, StatusWrite, TaskRecord, TaskStatus};
use parking_lot::RwLock;
use tokio::time::Instant;
use uuid::Uuid;

use super::store::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum JobState {
    Pending,
    Claimed,
}

/// Internal queue entry
struct JobEntry {
    seq: u64,
    job: QueuedJob,
    state: JobState,
    attempt: u32,
    claimed_by: Option<String>,
    /// Monotonic deadline so tests can drive leases with paused time
    lease_deadline: Option<Instant>,
}

impl JobEntry {
    fn is_deliverable(&self, now: Instant) -> bool {
        match self.state {
            JobState::Pending => true,
            JobState::Claimed => self.lease_deadline.is_some_and(|d| d <= now),
        }
    }

    fn is_held_by(&self, claimed: &ClaimedJob) -> bool {
        self.state == JobState::Claimed
            && self.attempt == claimed.attempt
            && self.claimed_by.as_deref() == Some(claimed.claimed_by.as_str())
    }
}

/// In-memory implementation of TaskQueue and StatusStore
///
/// This is primarily for testing and for running without a database. It
/// provides the same semantics as the PostgreSQL implementation, but all
/// state is lost when the process exits. Acknowledged jobs are dropped from
/// the queue and only counted.
///
/// # Example
///
/// ```
/// use docket_durable::InMemoryStore;
///
/// let store = InMemoryStore::new();
/// assert_eq!(store.pending_count(), 0);
/// ```
pub struct InMemoryStore {
    jobs: RwLock<HashMap<Uuid, JobEntry>>,
    records: RwLock<HashMap<Uuid, TaskRecord>>,
    seq: AtomicU64,
    acknowledged: AtomicUsize,
    unavailable: AtomicBool,
    failing_upserts: AtomicU32,
    failing_gets: AtomicU32,
}

impl InMemoryStore {
    /// Create a new in-memory store
    pub fn new() -> Self {
        Self {
            jobs: RwLock::new(HashMap::new()),
            records: RwLock::new(HashMap::new()),
            seq: AtomicU64::new(0),
            acknowledged: AtomicUsize::new(0),
            unavailable: AtomicBool::new(false),
            failing_upserts: AtomicU32::new(0),
            failing_gets: AtomicU32::new(0),
        }
    }

    /// Get the number of pending (never claimed or released) jobs
    pub fn pending_count(&self) -> usize {
        self.count_jobs(JobState::Pending)
    }

    /// Get the number of jobs currently leased
    pub fn claimed_count(&self) -> usize {
        self.count_jobs(JobState::Claimed)
    }

    /// Get the number of acknowledged jobs
    pub fn acknowledged_count(&self) -> usize {
        self.acknowledged.load(Ordering::SeqCst)
    }

    /// Get the number of task records
    pub fn record_count(&self) -> usize {
        self.records.read().len()
    }

    /// Get the number of records in a given status
    pub fn count_by_status(&self, status: TaskStatus) -> usize {
        self.records
            .read()
            .values()
            .filter(|r| r.status == status)
            .count()
    }

    /// Simulate an outage: every operation fails with `Unavailable`
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Make the next `n` upserts fail with a transient error
    pub fn fail_next_upserts(&self, n: u32) {
        self.failing_upserts.store(n, Ordering::SeqCst);
    }

    /// Make the next `n` record reads fail with a transient error
    pub fn fail_next_gets(&self, n: u32) {
        self.failing_gets.store(n, Ordering::SeqCst);
    }

    fn count_jobs(&self, state: JobState) -> usize {
        self.jobs.read().values().filter(|j| j.state == state).count()
    }

    fn check_available(&self) -> Result<(), StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("in-memory store offline".to_string()));
        }
        Ok(())
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TaskQueue for InMemoryStore {
    async fn publish(&self, job: QueuedJob) -> Result<Uuid, StoreError> {
        self.check_available()?;

        let job_id = Uuid::now_v7();
        let seq = self.seq.fetch_add(1, Ordering::SeqCst);
        self.jobs.write().insert(
            job_id,
            JobEntry {
                seq,
                job,
                state: JobState::Pending,
                attempt: 0,
                claimed_by: None,
                lease_deadline: None,
            },
        );
        Ok(job_id)
    }

    async fn claim(
        &self,
        worker_id: &str,
        lease: Duration,
    ) -> Result<Option<ClaimedJob>, StoreError> {
        self.check_available()?;

        let now = Instant::now();
        let mut jobs = self.jobs.write();

        let Some((job_id, entry)) = jobs
            .iter_mut()
            .filter(|(_, entry)| entry.is_deliverable(now))
            .min_by_key(|(_, entry)| entry.seq)
        else {
            return Ok(None);
        };

        entry.state = JobState::Claimed;
        entry.attempt += 1;
        entry.claimed_by = Some(worker_id.to_string());
        entry.lease_deadline = Some(now + lease);

        let lease_expires_at = Utc::now()
            + chrono::Duration::from_std(lease).unwrap_or_else(|_| chrono::Duration::zero());

        Ok(Some(ClaimedJob {
            id: *job_id,
            job: entry.job.clone(),
            attempt: entry.attempt,
            claimed_by: worker_id.to_string(),
            lease_expires_at,
        }))
    }

    async fn acknowledge(&self, claimed: &ClaimedJob) -> Result<(), StoreError> {
        self.check_available()?;

        let mut jobs = self.jobs.write();
        let entry = jobs
            .get(&claimed.id)
            .ok_or(StoreError::JobNotFound(claimed.id))?;
        if !entry.is_held_by(claimed) {
            return Err(StoreError::LeaseLost(claimed.id));
        }
        jobs.remove(&claimed.id);
        self.acknowledged.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn fail(&self, claimed: &ClaimedJob, _reason: &str) -> Result<(), StoreError> {
        self.check_available()?;

        let mut jobs = self.jobs.write();
        let entry = jobs
            .get_mut(&claimed.id)
            .ok_or(StoreError::JobNotFound(claimed.id))?;
        if !entry.is_held_by(claimed) {
            return Err(StoreError::LeaseLost(claimed.id));
        }
        entry.state = JobState::Pending;
        entry.claimed_by = None;
        entry.lease_deadline = None;
        Ok(())
    }
}

#[async_trait]
impl StatusStore for InMemoryStore {
    async fn upsert(&self, write: StatusWrite) -> Result<bool, StoreError> {
        self.check_available()?;

        let injected = self
            .failing_upserts
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        if injected.is_ok() {
            return Err(StoreError::Database("injected upsert failure".to_string()));
        }

        let mut records = self.records.write();
        match write.apply(records.get(&write.task_id), Utc::now()) {
            Some(record) => {
                records.insert(write.task_id, record);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn get(&self, task_id: Uuid) -> Result<Option<TaskRecord>, StoreError> {
        self.check_available()?;

        let injected = self
            .failing_gets
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        if injected.is_ok() {
            return Err(StoreError::Database("injected get failure".to_string()));
        }
        Ok(self.records.read().get(&task_id).cloned())
    }
}
