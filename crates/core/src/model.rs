// Task model
//
// Wire types use camelCase field names because they are part of the public
// HTTP contract (`correlationId`, `updatedAt`).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::ValidationError;

/// Request header carrying the caller's tracing token.
pub const CORRELATION_HEADER: &str = "x-correlation-id";

// ============================================================================
// TaskKind
// ============================================================================

/// The kinds of work the subsystem accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    Summarize,
    DraftEmail,
    Checklist,
    ExtractContacts,
}

impl TaskKind {
    pub const ALL: [TaskKind; 4] = [
        TaskKind::Summarize,
        TaskKind::DraftEmail,
        TaskKind::Checklist,
        TaskKind::ExtractContacts,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskKind::Summarize => "summarize",
            TaskKind::DraftEmail => "draft_email",
            TaskKind::Checklist => "checklist",
            TaskKind::ExtractContacts => "extract_contacts",
        }
    }

    /// Name of the payload field that carries the input text.
    fn input_field(&self) -> &'static str {
        match self {
            TaskKind::Summarize | TaskKind::ExtractContacts => "text",
            TaskKind::DraftEmail | TaskKind::Checklist => "topic",
        }
    }

    /// Validate a payload against the schema for this kind.
    ///
    /// Payloads must be JSON objects whose input field (`text` or `topic`)
    /// is a non-blank string. Extra fields are kept untouched.
    pub fn validate_payload(&self, payload: Option<&Value>) -> Result<Value, ValidationError> {
        let payload = match payload {
            None | Some(Value::Null) => return Err(ValidationError::MissingPayload(*self)),
            Some(p) => p,
        };

        let object = payload
            .as_object()
            .ok_or_else(|| ValidationError::invalid(*self, "payload must be an object"))?;

        let field = self.input_field();
        match object.get(field) {
            Some(Value::String(s)) if !s.trim().is_empty() => Ok(payload.clone()),
            Some(Value::String(_)) => Err(ValidationError::invalid(
                *self,
                format!("`{}` must not be empty", field),
            )),
            Some(_) => Err(ValidationError::invalid(
                *self,
                format!("`{}` must be a string", field),
            )),
            None => Err(ValidationError::invalid(
                *self,
                format!("`{}` is required", field),
            )),
        }
    }
}

impl std::fmt::Display for TaskKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TaskKind {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TaskKind::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| ValidationError::UnknownKind(s.to_string()))
    }
}

// ============================================================================
// TaskStatus
// ============================================================================

/// Lifecycle state of a task record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Queued,
    Working,
    Completed,
    Failed,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Queued => "queued",
            TaskStatus::Working => "working",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed)
    }

    /// Ordering used to reject regressing writes.
    ///
    /// Both terminal states share a rank so a redelivered execution may
    /// replace one terminal outcome with another.
    pub fn rank(&self) -> u8 {
        match self {
            TaskStatus::Queued => 0,
            TaskStatus::Working => 1,
            TaskStatus::Completed | TaskStatus::Failed => 2,
        }
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TaskStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "queued" => Ok(TaskStatus::Queued),
            "working" => Ok(TaskStatus::Working),
            "completed" => Ok(TaskStatus::Completed),
            "failed" => Ok(TaskStatus::Failed),
            other => Err(format!("unknown task status: {}", other)),
        }
    }
}

// ============================================================================
// Records and jobs
// ============================================================================

/// Persisted outcome of a task, as returned by the status endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct TaskRecord {
    pub id: Uuid,
    pub kind: TaskKind,
    pub status: TaskStatus,
    /// Handler output, present only when `completed`
    #[cfg_attr(feature = "openapi", schema(value_type = Option<Object>))]
    pub result: Option<Value>,
    /// Failure reason, present only when `failed`
    pub error: Option<String>,
    pub correlation_id: String,
    pub updated_at: DateTime<Utc>,
}

/// Handle returned synchronously by ingestion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct TaskHandle {
    pub id: Uuid,
    pub correlation_id: String,
}

/// Output of a task handler.
///
/// `provider` tells callers whether the output is authoritative or came
/// from the local fallback (`"fallback"`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct TaskOutput {
    pub provider: String,
    pub model: String,
    pub output: String,
    /// Why the fallback was used after a primary failure
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

/// Durable envelope published to the queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueuedJob {
    pub task_id: Uuid,
    pub kind: TaskKind,
    pub payload: Value,
    pub correlation_id: String,
}

/// An upsert-by-id against the status store.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusWrite {
    pub task_id: Uuid,
    pub kind: TaskKind,
    pub correlation_id: String,
    pub status: TaskStatus,
    pub result: Option<Value>,
    pub error: Option<String>,
}

impl StatusWrite {
    fn for_job(job: &QueuedJob, status: TaskStatus) -> Self {
        Self {
            task_id: job.task_id,
            kind: job.kind,
            correlation_id: job.correlation_id.clone(),
            status,
            result: None,
            error: None,
        }
    }

    pub fn queued(job: &QueuedJob) -> Self {
        Self::for_job(job, TaskStatus::Queued)
    }

    pub fn working(job: &QueuedJob) -> Self {
        Self::for_job(job, TaskStatus::Working)
    }

    pub fn completed(job: &QueuedJob, result: Value) -> Self {
        Self {
            result: Some(result),
            ..Self::for_job(job, TaskStatus::Completed)
        }
    }

    pub fn failed(job: &QueuedJob, error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            ..Self::for_job(job, TaskStatus::Failed)
        }
    }

    /// Compute the record that results from applying this write.
    ///
    /// Returns `None` when the write would lower the status rank of an
    /// existing record. `kind` and `correlation_id` stay as first written,
    /// and `updated_at` never moves backwards.
    pub fn apply(&self, existing: Option<&TaskRecord>, now: DateTime<Utc>) -> Option<TaskRecord> {
        match existing {
            Some(current) if self.status.rank() < current.status.rank() => None,
            Some(current) => Some(TaskRecord {
                id: current.id,
                kind: current.kind,
                status: self.status,
                result: self.result.clone(),
                error: self.error.clone(),
                correlation_id: current.correlation_id.clone(),
                updated_at: now.max(current.updated_at),
            }),
            None => Some(TaskRecord {
                id: self.task_id,
                kind: self.kind,
                status: self.status,
                result: self.result.clone(),
                error: self.error.clone(),
                correlation_id: self.correlation_id.clone(),
                updated_at: now,
            }),
        }
    }
}
