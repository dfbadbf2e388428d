// Task Handler Registry
//
// Maps each TaskKind to a strategy. The registry is built once at startup
// and is read-only afterwards; workers share it behind an Arc.
//
// Design: the primary capability is looked up once (configured or not) when
// the registry is built; whether a given call falls back is decided per
// invocation.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, warn};

use crate::capability::{GenerationError, TextGenerator};
use crate::error::HandlerError;
use crate::fallback;
use crate::model::{TaskKind, TaskOutput};
use crate::retry::{retry, RetryPolicy};

/// Executable capability for one task kind.
#[async_trait]
pub trait TaskHandler: Send + Sync {
    async fn run(&self, payload: &Value) -> Result<TaskOutput, HandlerError>;
}

// ============================================================================
// GenerativeHandler
// ============================================================================

/// Calls the primary generator and degrades to the local fallback.
///
/// The fallback is a single guaranteed attempt, not another retry of the
/// primary. Transient primary errors are retried first under `retry`.
pub struct GenerativeHandler {
    kind: TaskKind,
    primary: Option<Arc<dyn TextGenerator>>,
    retry: RetryPolicy,
    call_timeout: Duration,
}

impl GenerativeHandler {
    pub fn new(
        kind: TaskKind,
        primary: Option<Arc<dyn TextGenerator>>,
        retry: RetryPolicy,
        call_timeout: Duration,
    ) -> Self {
        Self {
            kind,
            primary,
            retry,
            call_timeout,
        }
    }

    /// Build the user prompt sent to the primary capability
    pub fn prompt(kind: TaskKind, payload: &Value) -> String {
        let input = fallback::source_text(payload);
        let instruction = match kind {
            TaskKind::Summarize => "Summarize briefly:",
            TaskKind::DraftEmail => "Draft a short, professional email about:",
            TaskKind::Checklist => "Create a concise checklist for:",
            TaskKind::ExtractContacts => "Extract any contacts (name, email, phone) from:",
        };
        format!("{}\n\n{}", instruction, input)
    }
}

#[async_trait]
impl TaskHandler for GenerativeHandler {
    async fn run(&self, payload: &Value) -> Result<TaskOutput, HandlerError> {
        let Some(primary) = self.primary.as_ref() else {
            debug!(kind = %self.kind, "Primary capability unconfigured, using fallback");
            return Ok(fallback::run(self.kind, payload, None));
        };

        let prompt = Self::prompt(self.kind, payload);
        let prompt = prompt.as_str();
        let call_timeout = self.call_timeout;

        let result = retry(&self.retry, "primary_generate", move || async move {
            match tokio::time::timeout(call_timeout, primary.generate(prompt)).await {
                Ok(result) => result,
                Err(_) => Err(GenerationError::Timeout(call_timeout)),
            }
        })
        .await;

        match result {
            Ok(output) => Ok(TaskOutput {
                provider: primary.provider().to_string(),
                model: primary.model().to_string(),
                output,
                note: None,
            }),
            Err(e) => {
                warn!(kind = %self.kind, provider = primary.provider(), error = %e, "Primary capability failed, using fallback");
                Ok(fallback::run(self.kind, payload, Some(e.to_string())))
            }
        }
    }
}

// ============================================================================
// HandlerRegistry
// ============================================================================

/// Registry of task handlers keyed by kind
#[derive(Default, Clone)]
pub struct HandlerRegistry {
    handlers: HashMap<TaskKind, Arc<dyn TaskHandler>>,
}

impl HandlerRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with a GenerativeHandler for every known kind.
    ///
    /// Pass `None` as `primary` when no credential is configured; every task
    /// then completes through the fallback.
    pub fn generative(
        primary: Option<Arc<dyn TextGenerator>>,
        retry: RetryPolicy,
        call_timeout: Duration,
    ) -> Self {
        let mut registry = Self::new();
        for kind in TaskKind::ALL {
            registry.register(
                kind,
                Arc::new(GenerativeHandler::new(
                    kind,
                    primary.clone(),
                    retry.clone(),
                    call_timeout,
                )),
            );
        }
        registry
    }

    /// Register (or replace) the handler for a kind
    pub fn register(&mut self, kind: TaskKind, handler: Arc<dyn TaskHandler>) {
        self.handlers.insert(kind, handler);
    }

    /// Builder-style registration
    pub fn with_handler(mut self, kind: TaskKind, handler: Arc<dyn TaskHandler>) -> Self {
        self.register(kind, handler);
        self
    }

    pub fn has_handler(&self, kind: TaskKind) -> bool {
        self.handlers.contains_key(&kind)
    }

    pub fn get(&self, kind: TaskKind) -> Option<Arc<dyn TaskHandler>> {
        self.handlers.get(&kind).cloned()
    }

    /// Look up the handler for `kind` and run it
    pub async fn execute(&self, kind: TaskKind, payload: &Value) -> Result<TaskOutput, HandlerError> {
        let handler = self.get(kind).ok_or(HandlerError::NotRegistered(kind))?;
        handler.run(payload).await
    }
}
