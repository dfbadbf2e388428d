// Error types for ingestion validation and handler execution

use thiserror::Error;

use crate::model::TaskKind;

/// Rejections raised while validating an ingestion request.
///
/// These are never retried and surface to the caller as a 4xx.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// `kind` is absent or not a string
    #[error("Invalid body: {{ kind: string; payload?: object }} required")]
    MissingKind,

    /// `kind` is not one of the known task kinds
    #[error("Unknown task kind: {0}")]
    UnknownKind(String),

    /// The kind requires a payload and none was given
    #[error("Missing payload for task kind {0}")]
    MissingPayload(TaskKind),

    /// The payload does not match the schema for its kind
    #[error("Invalid payload for task kind {kind}: {reason}")]
    InvalidPayload { kind: TaskKind, reason: String },
}

impl ValidationError {
    pub fn invalid(kind: TaskKind, reason: impl Into<String>) -> Self {
        ValidationError::InvalidPayload {
            kind,
            reason: reason.into(),
        }
    }
}

/// Failures that end a task in the `failed` state.
///
/// Primary-capability errors never show up here: they are absorbed by the
/// fallback strategy. Only unrecoverable conditions for a given payload do.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HandlerError {
    /// No handler is registered for the kind
    #[error("no handler registered for task kind: {0}")]
    NotRegistered(TaskKind),

    /// The payload cannot be processed by this handler
    #[error("unprocessable payload: {0}")]
    Unprocessable(String),

    /// The handler panicked or aborted
    #[error("handler aborted: {0}")]
    Aborted(String),
}
