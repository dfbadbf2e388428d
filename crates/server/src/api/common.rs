// Common DTOs for the public API
//
// These types are shared across multiple API endpoints.

use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// Standard error response for API endpoints.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    /// Error message describing what went wrong.
    pub error: String,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
        }
    }

    /// Convert to axum response tuple
    pub fn into_response(self, status: StatusCode) -> (StatusCode, Json<Self>) {
        (status, Json(self))
    }
}

/// Returned by lookups for an unknown task id.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct NotFoundResponse {
    #[schema(example = "Not found")]
    pub error: String,
    /// The id as given in the request path
    pub id: String,
}

impl NotFoundResponse {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            error: "Not found".to_string(),
            id: id.into(),
        }
    }
}

/// Body accepted by `POST /tasks`.
///
/// Handlers read the raw JSON so that malformed bodies get a uniform
/// `{ error }` response; this type only documents the shape.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SubmitTaskRequest {
    /// One of `summarize`, `draft_email`, `checklist`, `extract_contacts`
    #[schema(example = "summarize")]
    pub kind: String,
    /// `{ "text": ... }` for summarize and extract_contacts,
    /// `{ "topic": ... }` for draft_email and checklist
    #[schema(value_type = Object, example = json!({"text": "Quarterly results were strong."}))]
    pub payload: Option<serde_json::Value>,
}

/// Body returned by `GET /healthz`.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct HealthResponse {
    pub ok: bool,
    pub name: String,
    /// Seconds since the process started
    pub uptime: f64,
    pub version: String,
}
