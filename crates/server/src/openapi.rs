// OpenAPI specification generation
//
// Shared by the API server (for Swagger UI) and the export-openapi binary
// (for static spec generation).

use crate::api;
use docket_core::{TaskHandle, TaskKind, TaskOutput, TaskRecord, TaskStatus};
use utoipa::OpenApi;

/// OpenAPI documentation for the Docket API
#[derive(OpenApi)]
#[openapi(
    paths(
        api::tasks::submit_task,
        api::tasks::get_task,
        api::health::health,
    ),
    components(
        schemas(
            TaskRecord, TaskHandle, TaskKind, TaskStatus, TaskOutput,
            api::ErrorResponse, api::NotFoundResponse,
            api::SubmitTaskRequest, api::HealthResponse,
        )
    ),
    tags(
        (name = "tasks", description = "Task ingestion and status endpoints"),
        (name = "health", description = "Liveness endpoint")
    ),
    info(
        title = "Docket API",
        description = "Accepts tasks for asynchronous execution and reports their status"
    )
)]
pub struct ApiDoc;

impl ApiDoc {
    /// Generate the OpenAPI spec as a pretty-printed JSON string
    pub fn to_json() -> Result<String, serde_json::Error> {
        Self::openapi().to_pretty_json()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spec_lists_task_paths() {
        let json: serde_json::Value = serde_json::from_str(&ApiDoc::to_json().unwrap()).unwrap();
        assert!(json["paths"]["/tasks"]["post"].is_object());
        assert!(json["paths"]["/tasks/{id}"]["get"].is_object());
        assert!(json["paths"]["/healthz"]["get"].is_object());
        assert!(json["components"]["schemas"]["TaskRecord"].is_object());
    }
}
