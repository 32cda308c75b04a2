//! API routes.

use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use metrics_exporter_prometheus::PrometheusHandle;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::services::ServeDir;

use crate::handlers::{
    build_timeline, create_job, get_job, health, job_request_schema, list_jobs, merge_audio,
    render_preview,
};
use crate::metrics::{metrics_middleware, PathLabels};
use crate::middleware::{cors_layer, request_id, request_logging};
use crate::state::AppState;

/// Create the API router.
pub fn create_router(state: AppState, metrics_handle: Option<PrometheusHandle>) -> Router {
    let job_routes = Router::new()
        .route("/jobs", post(create_job).get(list_jobs))
        .route("/jobs/:job_id", get(get_job))
        .route("/schema/job-request", get(job_request_schema));

    let tool_routes = Router::new()
        .route("/audio/merge", post(merge_audio))
        .route("/audio/timeline", post(build_timeline))
        .route("/audio/preview", post(render_preview));

    let health_routes = Router::new()
        .route("/health", get(health))
        .route("/healthz", get(health));

    // Metrics endpoint (if enabled)
    let metrics_routes = if let Some(handle) = metrics_handle {
        Router::new().route("/metrics", get(move || async move { handle.render() }))
    } else {
        Router::new()
    };

    // Rendered files under the public prefix; a bare "/" cannot be nested
    let output_prefix = match state.outputs().public_prefix().trim_end_matches('/') {
        "" => "/outputs".to_string(),
        prefix => prefix.to_string(),
    };
    let outputs = ServeDir::new(state.outputs().dir());

    Router::new()
        .nest("/api", job_routes.merge(tool_routes))
        .merge(health_routes)
        .merge(metrics_routes)
        .nest_service(&output_prefix, outputs)
        .layer(RequestBodyLimitLayer::new(state.config.max_body_size))
        .layer(middleware::from_fn_with_state(
            PathLabels::new(&output_prefix),
            metrics_middleware,
        ))
        .layer(middleware::from_fn(request_logging))
        .layer(middleware::from_fn(request_id))
        .layer(cors_layer(&state.config.cors_origins))
        .with_state(state)
}
