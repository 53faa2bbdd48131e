//! Prometheus metrics for ricebox.
//!
//! Installs a global Prometheus recorder using `metrics-exporter-prometheus`,
//! defines metric name constants, provides a Tower-compatible middleware for
//! HTTP RED metrics, and exposes the `/metrics` endpoint handler.

use axum::http::{Request, StatusCode};
use axum::response::{IntoResponse, Response};
use metrics::{counter, describe_counter, describe_histogram, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::OnceLock;
use std::time::Instant;

// -- Metric name constants ----------------------------------------------------

/// Total HTTP requests (counter). Labels: method, path, status.
pub const HTTP_REQUESTS_TOTAL: &str = "ricebox_http_requests_total";

/// HTTP request duration in seconds (histogram). Labels: method, path.
pub const HTTP_REQUEST_DURATION_SECONDS: &str = "ricebox_http_request_duration_seconds";

/// Total storage operations (counter). Labels: operation, status.
pub const STORAGE_OPERATIONS_TOTAL: &str = "ricebox_storage_operations_total";

/// Total image transforms (counter). Labels: format, status.
pub const IMAGE_TRANSFORMS_TOTAL: &str = "ricebox_image_transforms_total";

/// Total bytes accepted through upload endpoints (counter).
pub const UPLOAD_BYTES_TOTAL: &str = "ricebox_upload_bytes_total";

// -- Global recorder installation ---------------------------------------------

/// Singleton handle to the Prometheus recorder.
static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Install the global Prometheus metrics recorder.  Returns the existing
/// handle if one is already installed.
pub fn init_metrics() -> anyhow::Result<&'static PrometheusHandle> {
    if let Some(handle) = PROMETHEUS_HANDLE.get() {
        return Ok(handle);
    }
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| anyhow::anyhow!("failed to install Prometheus recorder: {e}"))?;
    Ok(PROMETHEUS_HANDLE.get_or_init(|| handle))
}

/// Register metric descriptions with the global recorder. Call once after
/// `init_metrics()`.
pub fn describe_metrics() {
    describe_counter!(HTTP_REQUESTS_TOTAL, "Total HTTP requests");
    describe_histogram!(
        HTTP_REQUEST_DURATION_SECONDS,
        "HTTP request duration in seconds"
    );
    describe_counter!(STORAGE_OPERATIONS_TOTAL, "Total storage operations by type");
    describe_counter!(IMAGE_TRANSFORMS_TOTAL, "Total image transforms by output format");
    describe_counter!(UPLOAD_BYTES_TOTAL, "Total bytes accepted by upload endpoints");
}

/// Count one storage call.
pub fn record_storage_op(operation: &'static str, ok: bool) {
    let status = if ok { "ok" } else { "error" };
    counter!(STORAGE_OPERATIONS_TOTAL, "operation" => operation, "status" => status).increment(1);
}

/// Count one image transform attempt.
pub fn record_transform(format: &'static str, ok: bool) {
    let status = if ok { "ok" } else { "error" };
    counter!(IMAGE_TRANSFORMS_TOTAL, "format" => format, "status" => status).increment(1);
}

/// Count bytes accepted by an upload.
pub fn record_upload_bytes(size: usize) {
    counter!(UPLOAD_BYTES_TOTAL).increment(size as u64);
}

// -- Metrics middleware -------------------------------------------------------

/// Axum middleware that records HTTP RED metrics for every request.
///
/// Excludes `/metrics` from self-instrumentation to avoid feedback loops.
/// Must be the outermost layer so it captures the full request lifecycle.
pub async fn metrics_middleware(
    req: Request<axum::body::Body>,
    next: axum::middleware::Next,
) -> Response {
    let method = req.method().to_string();
    let path = route_template(req.uri().path());

    if req.uri().path() == "/metrics" {
        return next.run(req).await;
    }

    let start = Instant::now();
    let response = next.run(req).await;
    let duration = start.elapsed().as_secs_f64();
    let status = response.status().as_u16().to_string();

    counter!(HTTP_REQUESTS_TOTAL, "method" => method.clone(), "path" => path, "status" => status).increment(1);
    histogram!(HTTP_REQUEST_DURATION_SECONDS, "method" => method, "path" => path).record(duration);

    response
}

// -- Path normalization -------------------------------------------------------

/// Paths reported verbatim.
const FIXED_PATHS: &[&str] = &[
    "/",
    "/healthz",
    "/metrics",
    "/openapi.json",
    "/__diag/ping",
    "/__diag/version",
    "/__diag/gcs/head",
    "/__diag/upload",
    "/__diag/time",
    "/__diag/multipart",
    "/api/upload",
    "/api/foods",
    "/api/foods/popular",
    "/api/foods/all",
    "/api/drinks",
];

/// Map an actual request path to a route template for metric labels.
///
/// Object keys and record ids would otherwise explode label cardinality.
///
/// Examples:
/// - `/healthz` -> `/healthz`
/// - `/uploads/foods/1-rice.jpg` -> `/uploads/{key}`
/// - `/img/foods/1-rice.jpg` -> `/img/{key}`
/// - `/api/foods/abc` -> `/api/foods/{id}`
/// - anything else -> `/other`
fn route_template(path: &str) -> &'static str {
    if let Some(fixed) = FIXED_PATHS.iter().find(|p| **p == path) {
        return fixed;
    }
    if path.starts_with("/uploads/") {
        "/uploads/{key}"
    } else if path.starts_with("/img/") {
        "/img/{key}"
    } else if path.starts_with("/api/foods/") {
        "/api/foods/{id}"
    } else if path.starts_with("/api/drinks/") {
        "/api/drinks/{id}"
    } else {
        "/other"
    }
}

// -- Metrics endpoint handler -------------------------------------------------

/// `GET /metrics` -- Render Prometheus exposition format text.
pub async fn metrics_handler() -> Response {
    match PROMETHEUS_HANDLE.get() {
        Some(handle) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4")],
            handle.render(),
        )
            .into_response(),
        None => (StatusCode::NOT_FOUND, "metrics disabled").into_response(),
    }
}

// -- Tests --------------------------------------------------------------------
