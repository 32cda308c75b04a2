//! Prometheus metrics for the API server.

use axum::body::Body;
use axum::extract::State;
use axum::http::{Request, Response};
use axum::middleware::Next;
use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use regex::Regex;
use std::sync::LazyLock;
use std::time::Instant;

/// Install the Prometheus recorder. Job engine metrics recorded by the
/// worker crate are exported through the same handle.
pub fn init_metrics() -> Result<PrometheusHandle, BuildError> {
    PrometheusBuilder::new().install_recorder()
}

/// Metric names as constants for consistency.
pub mod names {
    pub const HTTP_REQUESTS_TOTAL: &str = "reel_http_requests_total";
    pub const HTTP_REQUEST_DURATION_SECONDS: &str = "reel_http_request_duration_seconds";
    pub const HTTP_REQUESTS_IN_FLIGHT: &str = "reel_http_requests_in_flight";
}

/// Record an HTTP request under an already bounded path label.
pub fn record_http_request(method: &str, path_label: &str, status: u16, duration_secs: f64) {
    let labels = [
        ("method", method.to_string()),
        ("path", path_label.to_string()),
        ("status", status.to_string()),
    ];

    counter!(names::HTTP_REQUESTS_TOTAL, &labels).increment(1);
    histogram!(names::HTTP_REQUEST_DURATION_SECONDS, &labels).record(duration_secs);
}

static UUID_SEGMENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{12}").unwrap()
});

/// Maps request paths to a bounded set of metric labels.
#[derive(Debug, Clone)]
pub struct PathLabels {
    /// Output prefix without a trailing slash, e.g. `/outputs`
    output_prefix: String,
}

impl PathLabels {
    pub fn new(output_prefix: &str) -> Self {
        Self {
            output_prefix: output_prefix.trim_end_matches('/').to_string(),
        }
    }

    /// Output files collapse to `<prefix>/:file`, ids to `:id`, and any other
    /// 404 to `unmatched`.
    pub fn label(&self, path: &str, status: u16) -> String {
        let under_outputs = path
            .strip_prefix(&self.output_prefix)
            .is_some_and(|rest| rest.starts_with('/'));
        if under_outputs {
            return format!("{}/:file", self.output_prefix);
        }
        if status == 404 {
            return "unmatched".to_string();
        }
        UUID_SEGMENT.replace_all(path, ":id").into_owned()
    }
}

/// Metrics middleware for HTTP requests.
pub async fn metrics_middleware(
    State(labels): State<PathLabels>,
    request: Request<Body>,
    next: Next,
) -> Response<Body> {
    let method = request.method().to_string();
    let path = request.uri().path().to_string();
    let start = Instant::now();

    gauge!(names::HTTP_REQUESTS_IN_FLIGHT).increment(1.0);
    let response = next.run(request).await;
    gauge!(names::HTTP_REQUESTS_IN_FLIGHT).decrement(1.0);

    let status = response.status().as_u16();
    record_http_request(
        &method,
        &labels.label(&path, status),
        status,
        start.elapsed().as_secs_f64(),
    );

    response
}
