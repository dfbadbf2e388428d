// Docket Server Library
// Decision: Shared library for binaries (API server, smoke test, OpenAPI export)

pub mod api;
pub mod client;
pub mod config;
pub mod openapi;
pub mod runtime;
pub mod service;

use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::http::{header, HeaderValue, Method};
use axum::{middleware, Router};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::api::health::HealthState;
use crate::openapi::ApiDoc;
use crate::service::TaskService;

pub use client::{ClientError, TaskClient};
pub use config::{ConfigError, ServerConfig};
pub use runtime::TaskRuntime;

/// Build the full HTTP application
///
/// `/healthz` and Swagger UI are never prefixed; task routes are nested
/// under `config.api_prefix`.
pub fn build_app(service: Arc<TaskService>, config: &ServerConfig) -> Router {
    let api_routes = api::tasks::routes(api::tasks::AppState::new(service));

    let app = Router::new()
        .merge(api::health::routes(HealthState::new(&config.service_name)))
        .merge(build_router_with_prefix(api_routes, &config.api_prefix))
        .merge(SwaggerUi::new("/swagger-ui").url("/api-doc/openapi.json", ApiDoc::openapi()));

    let cors_origins: Vec<HeaderValue> = config
        .cors_origins
        .iter()
        .filter_map(|origin| origin.parse().ok())
        .collect();

    // Add CORS layer only if origins are configured
    let app = if !cors_origins.is_empty() {
        app.layer(
            CorsLayer::new()
                .allow_origin(AllowOrigin::list(cors_origins))
                .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
                .allow_headers([
                    header::CONTENT_TYPE,
                    header::ACCEPT,
                    header::ORIGIN,
                    header::HeaderName::from_static(docket_core::CORRELATION_HEADER),
                ])
                .expose_headers([header::HeaderName::from_static(
                    docket_core::CORRELATION_HEADER,
                )]),
        )
    } else {
        app
    };

    app.layer(DefaultBodyLimit::max(config.body_limit))
        .layer(middleware::from_fn(api::correlation::correlation_id))
        .layer(TraceLayer::new_for_http())
}

/// Build router with optional API prefix
pub fn build_router_with_prefix<S: Clone + Send + Sync + 'static>(
    api_routes: Router<S>,
    api_prefix: &str,
) -> Router<S> {
    if api_prefix.is_empty() {
        api_routes
    } else {
        Router::new().nest(api_prefix, api_routes)
    }
}
