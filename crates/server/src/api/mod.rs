// HTTP API for the docket server

pub mod common;
pub mod correlation;
pub mod health;
pub mod tasks;

pub use common::{ErrorResponse, HealthResponse, NotFoundResponse, SubmitTaskRequest};
pub use correlation::CorrelationId;
