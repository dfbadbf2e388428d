// HTTP client wrapper for the Docket API
//
// Every call goes through the retry coordinator. Connection failures,
// timeouts and 5xx responses are retried; 4xx responses, malformed URLs
// and undecodable bodies fail fast.

use std::time::Duration;

use docket_core::{retry, RetryPolicy, Retryable, TaskHandle, TaskKind, TaskRecord, CORRELATION_HEADER};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

use crate::api::HealthResponse;

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Not found")]
    NotFound,

    #[error("Invalid response body: {0}")]
    Decode(String),

    #[error("Task {id} not finished after {waited:?}")]
    DeadlineExceeded { id: Uuid, waited: Duration },
}

impl Retryable for ClientError {
    fn is_transient(&self) -> bool {
        match self {
            ClientError::Http(e) => {
                e.is_connect() || e.is_timeout() || e.is_request() || e.is_body()
            }
            ClientError::Api { status, .. } => *status >= 500,
            ClientError::NotFound | ClientError::Decode(_) | ClientError::DeadlineExceeded { .. } => {
                false
            }
        }
    }
}

pub struct TaskClient {
    base_url: String,
    http: reqwest::Client,
    retry: RetryPolicy,
}

impl TaskClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http: reqwest::Client::new(),
            retry: RetryPolicy::exponential(),
        }
    }

    pub fn with_retry(mut self, policy: RetryPolicy) -> Self {
        self.retry = policy;
        self
    }

    /// POST /tasks
    pub async fn submit(
        &self,
        kind: TaskKind,
        payload: Value,
        correlation_id: Option<&str>,
    ) -> Result<TaskHandle, ClientError> {
        let url = format!("{}/tasks", self.base_url);
        let body = json!({ "kind": kind, "payload": payload });

        let (url, body) = (&url, &body);
        retry(&self.retry, "submit_task", move || async move {
            let mut request = self.http.post(url).json(body);
            if let Some(id) = correlation_id {
                request = request.header(CORRELATION_HEADER, id);
            }
            self.handle_response(request.send().await?).await
        })
        .await
    }

    /// GET /tasks/{id}
    pub async fn get_task(&self, id: Uuid) -> Result<TaskRecord, ClientError> {
        let url = format!("{}/tasks/{}", self.base_url, id);
        let url = &url;
        retry(&self.retry, "get_task", move || async move {
            self.handle_response(self.http.get(url).send().await?).await
        })
        .await
    }

    /// GET /healthz
    pub async fn health(&self) -> Result<HealthResponse, ClientError> {
        let url = format!("{}/healthz", self.base_url);
        let url = &url;
        retry(&self.retry, "health", move || async move {
            self.handle_response(self.http.get(url).send().await?).await
        })
        .await
    }

    /// Poll until the task is terminal or `deadline` has passed.
    ///
    /// A 404 while polling is treated as "not recorded yet".
    pub async fn wait_for_completion(
        &self,
        id: Uuid,
        interval: Duration,
        deadline: Duration,
    ) -> Result<TaskRecord, ClientError> {
        let started = tokio::time::Instant::now();
        loop {
            match self.get_task(id).await {
                Ok(record) if record.status.is_terminal() => return Ok(record),
                Ok(record) => debug!(task_id = %id, status = %record.status, "Task not finished"),
                Err(ClientError::NotFound) => debug!(task_id = %id, "Task not recorded yet"),
                Err(e) => return Err(e),
            }

            if started.elapsed() + interval > deadline {
                return Err(ClientError::DeadlineExceeded {
                    id,
                    waited: started.elapsed(),
                });
            }
            tokio::time::sleep(interval).await;
        }
    }

    async fn handle_response<T: DeserializeOwned>(
        &self,
        response: reqwest::Response,
    ) -> Result<T, ClientError> {
        let status = response.status();

        if status == StatusCode::NOT_FOUND {
            return Err(ClientError::NotFound);
        }

        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(ClientError::Api {
                status: status.as_u16(),
                message,
            });
        }

        response.json().await.map_err(|e| {
            if e.is_decode() {
                ClientError::Decode(e.to_string())
            } else {
                ClientError::Http(e)
            }
        })
    }
}
