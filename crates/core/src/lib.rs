// Docket Core
//
// Storage-agnostic building blocks shared by the server tier and the workers:
// - Task model (kinds, statuses, records, queued jobs) and ingestion validation
// - TextGenerator trait for the primary generative capability
// - HandlerRegistry mapping each kind to a strategy with a local fallback
// - RetryPolicy / retry() for bounded exponential backoff
// - Telemetry initialization

pub mod capability;
pub mod error;
pub mod fallback;
pub mod model;
pub mod registry;
pub mod retry;
pub mod telemetry;

pub use capability::{GenerationError, TextGenerator};
pub use error::{HandlerError, ValidationError};
pub use model::{
    QueuedJob, StatusWrite, TaskHandle, TaskKind, TaskOutput, TaskRecord, TaskStatus,
    CORRELATION_HEADER,
};
pub use registry::{GenerativeHandler, HandlerRegistry, TaskHandler};
pub use retry::{retry, RetryPolicy, Retryable};
