// Task ingestion and status lookup
//
// The HTTP tier never executes work: it validates, publishes a job to the
// queue, records `queued`, and hands back a handle.

use std::sync::Arc;

use docket_core::{
    retry, QueuedJob, RetryPolicy, StatusWrite, TaskHandle, TaskKind, TaskRecord,
    ValidationError,
};
use docket_durable::{StatusStore, StoreError, TaskQueue};
use serde_json::Value;
use tracing::{info, instrument, warn};
use uuid::Uuid;

/// Errors surfaced by the task service
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    /// The request was rejected before anything was written
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// The queue or status store could not be reached
    #[error(transparent)]
    Store(#[from] StoreError),
}

pub struct TaskService {
    queue: Arc<dyn TaskQueue>,
    status: Arc<dyn StatusStore>,
    retry: RetryPolicy,
}

impl TaskService {
    pub fn new(queue: Arc<dyn TaskQueue>, status: Arc<dyn StatusStore>, retry: RetryPolicy) -> Self {
        Self {
            queue,
            status,
            retry,
        }
    }

    /// Check an ingestion body of the form `{ kind, payload? }`.
    ///
    /// Returns the parsed kind and the validated payload.
    pub fn validate_request(body: &Value) -> Result<(TaskKind, Value), ValidationError> {
        let kind = body
            .get("kind")
            .and_then(Value::as_str)
            .ok_or(ValidationError::MissingKind)?
            .parse::<TaskKind>()?;
        let payload = kind.validate_payload(body.get("payload"))?;
        Ok((kind, payload))
    }

    /// Accept a task for asynchronous execution
    #[instrument(skip_all, fields(correlation_id = %correlation_id))]
    pub async fn submit(&self, body: &Value, correlation_id: &str) -> Result<TaskHandle, ServiceError> {
        let (kind, payload) = Self::validate_request(body)?;

        let job = QueuedJob {
            task_id: Uuid::now_v7(),
            kind,
            payload,
            correlation_id: correlation_id.to_string(),
        };

        let queue = &self.queue;
        let job_id = retry(&self.retry, "publish", || queue.publish(job.clone())).await?;

        // The job is already durable; a missing record is created by the
        // worker's first status write.
        let status = &self.status;
        if let Err(e) = retry(&self.retry, "record_queued", || {
            status.upsert(StatusWrite::queued(&job))
        })
        .await
        {
            warn!(task_id = %job.task_id, error = %e, "Queued status not recorded");
        }

        info!(task_id = %job.task_id, %job_id, kind = %kind, "Task accepted");

        Ok(TaskHandle {
            id: job.task_id,
            correlation_id: job.correlation_id,
        })
    }

    /// Latest record for a task
    pub async fn get(&self, task_id: Uuid) -> Result<Option<TaskRecord>, ServiceError> {
        let status = &self.status;
        Ok(retry(&self.retry, "get_status", || status.get(task_id)).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docket_core::TaskStatus;
    use docket_durable::InMemoryStore;
    use serde_json::json;

    fn service(store: &Arc<InMemoryStore>) -> TaskService {
        TaskService::new(store.clone(), store.clone(), RetryPolicy::no_retry())
    }

    #[test]
    fn test_validate_request() {
        let (kind, payload) =
            TaskService::validate_request(&json!({"kind": "checklist", "payload": {"topic": "launch"}}))
                .unwrap();
        assert_eq!(kind, TaskKind::Checklist);
        assert_eq!(payload, json!({"topic": "launch"}));

        assert_eq!(
            TaskService::validate_request(&json!({"payload": {}})).unwrap_err(),
            ValidationError::MissingKind
        );
        assert_eq!(
            TaskService::validate_request(&json!({"kind": 7})).unwrap_err(),
            ValidationError::MissingKind
        );
        assert_eq!(
            TaskService::validate_request(&json!({"kind": "unknown_kind", "payload": {}})).unwrap_err(),
            ValidationError::UnknownKind("unknown_kind".to_string())
        );
        assert!(matches!(
            TaskService::validate_request(&json!({"kind": "summarize"})).unwrap_err(),
            ValidationError::MissingPayload(TaskKind::Summarize)
        ));
    }

    #[tokio::test]
    async fn test_submit_publishes_and_records_queued() {
        let store = Arc::new(InMemoryStore::new());
        let handle = service(&store)
            .submit(&json!({"kind": "summarize", "payload": {"text": "hello"}}), "corr-1")
            .await
            .unwrap();

        assert_eq!(handle.correlation_id, "corr-1");
        assert_eq!(store.pending_count(), 1);

        let record = store.get(handle.id).await.unwrap().unwrap();
        assert_eq!(record.status, TaskStatus::Queued);
        assert_eq!(record.kind, TaskKind::Summarize);
        assert_eq!(record.correlation_id, "corr-1");
    }

    #[tokio::test]
    async fn test_invalid_request_has_no_side_effects() {
        let store = Arc::new(InMemoryStore::new());
        let err = service(&store)
            .submit(&json!({"kind": "unknown_kind", "payload": {}}), "corr")
            .await
            .unwrap_err();

        assert!(matches!(err, ServiceError::Validation(_)));
        assert_eq!(store.pending_count(), 0);
        assert_eq!(store.record_count(), 0);
    }

    #[tokio::test]
    async fn test_unavailable_store_fails_submit() {
        let store = Arc::new(InMemoryStore::new());
        store.set_unavailable(true);
        let err = service(&store)
            .submit(&json!({"kind": "checklist", "payload": {"topic": "x"}}), "corr")
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Store(StoreError::Unavailable(_))));
    }

    #[tokio::test]
    async fn test_get_unknown_is_none() {
        let store = Arc::new(InMemoryStore::new());
        assert!(service(&store).get(Uuid::now_v7()).await.unwrap().is_none());
    }
}
