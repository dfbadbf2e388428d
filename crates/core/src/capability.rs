// Primary generative capability
//
// Provider crates (docket-anthropic) implement TextGenerator; core has no
// knowledge of specific providers. The registry only sees this trait.

use async_trait::async_trait;
use thiserror::Error;

use crate::retry::Retryable;

/// Errors raised by a primary capability call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GenerationError {
    /// Request could not be sent or the connection dropped
    #[error("transport error: {0}")]
    Transport(String),

    /// The call exceeded its time budget
    #[error("request timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// Provider answered with a non-success status
    #[error("provider error: {status} {body}")]
    Status { status: u16, body: String },

    /// Response body could not be interpreted
    #[error("invalid provider response: {0}")]
    Decode(String),

    /// No credential or endpoint is configured
    #[error("primary capability is not configured")]
    Unconfigured,
}

impl Retryable for GenerationError {
    fn is_transient(&self) -> bool {
        match self {
            GenerationError::Transport(_) | GenerationError::Timeout(_) => true,
            GenerationError::Status { status, .. } => *status >= 500,
            GenerationError::Decode(_) | GenerationError::Unconfigured => false,
        }
    }
}

/// A text-generation backend.
///
/// Implementations must be stateless with respect to tasks and have no side
/// effects beyond the call itself.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Provider tag recorded in task results (e.g. "anthropic")
    fn provider(&self) -> &str;

    /// Model identifier recorded in task results
    fn model(&self) -> &str;

    /// Generate a completion for a single user prompt
    async fn generate(&self, prompt: &str) -> Result<String, GenerationError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(GenerationError::Transport("reset".into()).is_transient());
        assert!(GenerationError::Timeout(std::time::Duration::from_secs(1)).is_transient());
        assert!(GenerationError::Status {
            status: 529,
            body: "overloaded".into()
        }
        .is_transient());

        assert!(!GenerationError::Status {
            status: 401,
            body: "bad key".into()
        }
        .is_transient());
        assert!(!GenerationError::Decode("eof".into()).is_transient());
        assert!(!GenerationError::Unconfigured.is_transient());
    }
}
