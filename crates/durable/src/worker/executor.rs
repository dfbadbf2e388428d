//! Job execution
//!
//! Runs one claimed job through the handler registry and records the
//! outcome. A job is acknowledged only after its terminal status is stored;
//! if that write fails the job is released so another delivery can finish it.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use docket_core::{retry, HandlerError, HandlerRegistry, RetryPolicy, StatusWrite};
use futures::FutureExt;
use tracing::{debug, error, info, instrument, warn};

use super::pool::WorkerPoolError;
use crate::persistence::{ClaimedJob, StatusStore, StoreError, TaskQueue};

/// What happened to a claimed job
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobOutcome {
    /// Handler produced output; record is `completed`
    Completed,
    /// Handler failed or panicked; record is `failed`
    Failed,
    /// Redelivery of a job whose record was already terminal
    Skipped,
}

/// Executes claimed jobs against a registry and the stores
#[derive(Clone)]
pub struct JobExecutor {
    queue: Arc<dyn TaskQueue>,
    status: Arc<dyn StatusStore>,
    registry: Arc<HandlerRegistry>,
    store_retry: RetryPolicy,
    skip_terminal_redelivery: bool,
}

impl JobExecutor {
    pub fn new(
        queue: Arc<dyn TaskQueue>,
        status: Arc<dyn StatusStore>,
        registry: Arc<HandlerRegistry>,
        store_retry: RetryPolicy,
    ) -> Self {
        Self {
            queue,
            status,
            registry,
            store_retry,
            skip_terminal_redelivery: false,
        }
    }

    /// Acknowledge redeliveries of already-terminal tasks without re-running
    /// the handler
    pub fn with_skip_terminal_redelivery(mut self, skip: bool) -> Self {
        self.skip_terminal_redelivery = skip;
        self
    }

    /// Process one claimed job to completion.
    ///
    /// Errors mean the job was not acknowledged and will be delivered again.
    #[instrument(
        skip(self, claimed),
        fields(
            job_id = %claimed.id,
            task_id = %claimed.job.task_id,
            kind = %claimed.job.kind,
            correlation_id = %claimed.job.correlation_id,
            attempt = claimed.attempt
        )
    )]
    pub async fn execute(&self, claimed: ClaimedJob) -> Result<JobOutcome, WorkerPoolError> {
        let job = &claimed.job;

        if self.skip_terminal_redelivery && claimed.is_redelivery() {
            match self.status.get(job.task_id).await {
                Ok(Some(record)) if record.status.is_terminal() => {
                    info!(status = %record.status, "Task already terminal, skipping redelivery");
                    self.acknowledge(&claimed).await?;
                    return Ok(JobOutcome::Skipped);
                }
                Ok(_) => {}
                Err(e) => warn!(error = %e, "Redelivery check failed; running job"),
            }
        }

        if let Err(e) = self.write_status(StatusWrite::working(job)).await {
            self.release(&claimed, "working status write failed").await;
            return Err(e.into());
        }

        let run = AssertUnwindSafe(self.registry.execute(job.kind, &job.payload)).catch_unwind();
        let (write, outcome) = match run.await {
            Ok(Ok(output)) => match serde_json::to_value(&output) {
                Ok(value) => {
                    debug!(provider = %output.provider, "Handler completed");
                    (StatusWrite::completed(job, value), JobOutcome::Completed)
                }
                Err(e) => (
                    StatusWrite::failed(job, format!("unserializable output: {}", e)),
                    JobOutcome::Failed,
                ),
            },
            Ok(Err(e)) => {
                warn!(error = %e, "Handler failed");
                (StatusWrite::failed(job, e.to_string()), JobOutcome::Failed)
            }
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                error!(panic = %message, "Handler panicked");
                (
                    StatusWrite::failed(job, HandlerError::Aborted(message).to_string()),
                    JobOutcome::Failed,
                )
            }
        };

        if let Err(e) = self.write_status(write).await {
            self.release(&claimed, "terminal status write failed").await;
            return Err(e.into());
        }

        self.acknowledge(&claimed).await?;
        info!(outcome = ?outcome, "Job finished");
        Ok(outcome)
    }

    async fn write_status(&self, write: StatusWrite) -> Result<bool, StoreError> {
        let status = &self.status;
        let applied = retry(&self.store_retry, "status_upsert", move || {
            status.upsert(write.clone())
        })
        .await?;

        if !applied {
            debug!("Status write ignored, record already further along");
        }
        Ok(applied)
    }

    async fn acknowledge(&self, claimed: &ClaimedJob) -> Result<(), StoreError> {
        let queue = &self.queue;
        retry(&self.store_retry, "queue_acknowledge", move || {
            queue.acknowledge(claimed)
        })
        .await
        .inspect_err(|e| match e {
            StoreError::LeaseLost(_) => {
                warn!("Lease was taken over by another worker; leaving the job to it")
            }
            _ => error!(error = %e, "Failed to acknowledge job; it will be redelivered"),
        })
    }

    async fn release(&self, claimed: &ClaimedJob, reason: &str) {
        if let Err(e) = self.queue.fail(claimed, reason).await {
            // The lease still expires, so the job is redelivered either way
            warn!(error = %e, reason, "Failed to release job");
        }
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
