// Task ingestion and status HTTP routes

use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Extension, Json, Router,
};
use docket_core::{TaskHandle, TaskRecord};
use serde_json::Value;
use uuid::Uuid;

use super::common::{ErrorResponse, NotFoundResponse, SubmitTaskRequest};
use super::correlation::CorrelationId;
use crate::service::{ServiceError, TaskService};

/// App state for task routes
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<TaskService>,
}

impl AppState {
    pub fn new(service: Arc<TaskService>) -> Self {
        Self { service }
    }
}

/// Create task routes
pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/tasks", post(submit_task))
        .route("/tasks/:id", get(get_task))
        .with_state(state)
}

/// POST /tasks - Accept a task for asynchronous execution
#[utoipa::path(
    post,
    path = "/tasks",
    request_body = SubmitTaskRequest,
    params(
        ("x-correlation-id" = Option<String>, Header, description = "Caller tracing token; generated when absent")
    ),
    responses(
        (status = 202, description = "Task accepted", body = TaskHandle),
        (status = 400, description = "Invalid body, unknown kind or invalid payload", body = ErrorResponse),
        (status = 413, description = "Body exceeds the size limit", body = ErrorResponse),
        (status = 503, description = "Queue or status store unavailable", body = ErrorResponse)
    ),
    tag = "tasks"
)]
pub async fn submit_task(
    State(state): State<AppState>,
    Extension(correlation): Extension<CorrelationId>,
    body: Result<Json<Value>, JsonRejection>,
) -> Response {
    let Json(body) = match body {
        Ok(body) => body,
        Err(rejection) => {
            let status = match rejection.status() {
                StatusCode::PAYLOAD_TOO_LARGE => StatusCode::PAYLOAD_TOO_LARGE,
                _ => StatusCode::BAD_REQUEST,
            };
            return ErrorResponse::new(rejection.body_text())
                .into_response(status)
                .into_response();
        }
    };

    match state.service.submit(&body, correlation.as_str()).await {
        Ok(handle) => (StatusCode::ACCEPTED, Json(handle)).into_response(),
        Err(ServiceError::Validation(e)) => ErrorResponse::new(e.to_string())
            .into_response(StatusCode::BAD_REQUEST)
            .into_response(),
        Err(ServiceError::Store(e)) => {
            tracing::error!("Failed to enqueue task: {}", e);
            ErrorResponse::new("Task store unavailable")
                .into_response(StatusCode::SERVICE_UNAVAILABLE)
                .into_response()
        }
    }
}

/// GET /tasks/{id} - Get the latest record for a task
#[utoipa::path(
    get,
    path = "/tasks/{id}",
    params(
        ("id" = String, Path, description = "Task ID")
    ),
    responses(
        (status = 200, description = "Task found", body = TaskRecord),
        (status = 404, description = "Task not found", body = NotFoundResponse),
        (status = 503, description = "Status store unavailable", body = ErrorResponse)
    ),
    tag = "tasks"
)]
pub async fn get_task(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    // Ids that are not UUIDs cannot exist
    let Ok(task_id) = Uuid::parse_str(&id) else {
        return (StatusCode::NOT_FOUND, Json(NotFoundResponse::new(id))).into_response();
    };

    match state.service.get(task_id).await {
        Ok(Some(record)) => Json(record).into_response(),
        Ok(None) => (StatusCode::NOT_FOUND, Json(NotFoundResponse::new(id))).into_response(),
        Err(e) => {
            tracing::error!("Failed to get task: {}", e);
            ErrorResponse::new("Task store unavailable")
                .into_response(StatusCode::SERVICE_UNAVAILABLE)
                .into_response()
        }
    }
}
