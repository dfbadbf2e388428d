// Correlation id middleware
//
// Every request carries a correlation id: the caller's `x-correlation-id`
// header when present, otherwise a fresh UUID. The id is stored as a request
// extension and echoed on the response.

use axum::extract::Request;
use axum::http::HeaderValue;
use axum::middleware::Next;
use axum::response::Response;
use docket_core::CORRELATION_HEADER;
use uuid::Uuid;

/// Correlation id attached to the current request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorrelationId(pub String);

impl CorrelationId {
    fn from_request(request: &Request) -> Self {
        let supplied = request
            .headers()
            .get(CORRELATION_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty());

        match supplied {
            Some(id) => Self(id.to_string()),
            None => Self(Uuid::new_v4().to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

pub async fn correlation_id(mut request: Request, next: Next) -> Response {
    let correlation = CorrelationId::from_request(&request);
    request.extensions_mut().insert(correlation.clone());

    let mut response = next.run(request).await;
    if let Ok(value) = HeaderValue::from_str(correlation.as_str()) {
        response.headers_mut().insert(CORRELATION_HEADER, value);
    }
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::Body, middleware, routing::get, Extension, Router};
    use tower::ServiceExt;

    fn app() -> Router {
        Router::new()
            .route(
                "/echo",
                get(|Extension(c): Extension<CorrelationId>| async move { c.0 }),
            )
            .layer(middleware::from_fn(correlation_id))
    }

    #[tokio::test]
    async fn test_supplied_id_is_echoed() {
        let response = app()
            .oneshot(
                Request::builder()
                    .uri("/echo")
                    .header(CORRELATION_HEADER, "abc-123")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.headers()[CORRELATION_HEADER], "abc-123");
    }

    #[tokio::test]
    async fn test_missing_id_is_generated() {
        let response = app()
            .oneshot(Request::builder().uri("/echo").body(Body::empty()).unwrap())
            .await
            .unwrap();

        let id = response.headers()[CORRELATION_HEADER].to_str().unwrap();
        assert!(Uuid::parse_str(id).is_ok());
    }
}
