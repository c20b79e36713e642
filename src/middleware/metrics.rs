// ============================================================================
// Prometheus metrics
// ============================================================================
//
// HTTP:        orderdesk_http_request_duration_seconds, orderdesk_http_requests_total
// Warehouse:   orderdesk_scans_total{outcome}, orderdesk_documents_rendered_total{kind}
// Settlements: orderdesk_liquidation_rows_total{result}, orderdesk_liquidation_jobs_total{status}
// Security:    orderdesk_auth_failures_total{reason}
//
// Scraped from GET /metrics.
//
// ============================================================================

use axum::{
    extract::Request,
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
};
use lazy_static::lazy_static;
use prometheus::{
    register_counter_vec, register_histogram_vec, CounterVec, Encoder, HistogramVec, TextEncoder,
};
use std::time::Instant;

lazy_static! {
    pub static ref HTTP_REQUEST_DURATION: HistogramVec = register_histogram_vec!(
        "orderdesk_http_request_duration_seconds",
        "HTTP request latency in seconds",
        &["method", "path", "status"],
        vec![0.005, 0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]
    )
    .unwrap();

    pub static ref HTTP_REQUESTS_TOTAL: CounterVec = register_counter_vec!(
        "orderdesk_http_requests_total",
        "Total number of HTTP requests",
        &["method", "path", "status"]
    )
    .unwrap();

    pub static ref AUTH_FAILURES_TOTAL: CounterVec = register_counter_vec!(
        "orderdesk_auth_failures_total",
        "Failed login attempts by reason",
        &["reason"]
    )
    .unwrap();

    /// matched / ambiguous / suggested / no_match / rejected
    pub static ref SCANS_TOTAL: CounterVec = register_counter_vec!(
        "orderdesk_scans_total",
        "Item scans by outcome",
        &["outcome"]
    )
    .unwrap();

    pub static ref DOCUMENTS_RENDERED_TOTAL: CounterVec = register_counter_vec!(
        "orderdesk_documents_rendered_total",
        "PDF documents rendered by kind",
        &["kind"]
    )
    .unwrap();

    pub static ref LIQUIDATION_ROWS_TOTAL: CounterVec = register_counter_vec!(
        "orderdesk_liquidation_rows_total",
        "Settlement rows processed by reconciliation result",
        &["result"]
    )
    .unwrap();

    pub static ref LIQUIDATION_JOBS_TOTAL: CounterVec = register_counter_vec!(
        "orderdesk_liquidation_jobs_total",
        "Finished liquidation jobs by final status",
        &["status"]
    )
    .unwrap();
}

/// `/api/orders/6f1c...` -> `/api/orders/:id`, keeps label cardinality bounded.
fn normalize_path(path: &str) -> String {
    let normalized: Vec<&str> = path
        .split('/')
        .filter(|segment| !segment.is_empty())
        .map(|segment| {
            if uuid::Uuid::parse_str(segment).is_ok() || segment.parse::<i64>().is_ok() {
                ":id"
            } else {
                segment
            }
        })
        .collect();

    format!("/{}", normalized.join("/"))
}

pub async fn metrics_middleware(request: Request, next: Next) -> Response {
    let start = Instant::now();
    let method = request.method().clone();
    let path = normalize_path(request.uri().path());

    let response = next.run(request).await;

    let status = response.status().as_u16().to_string();
    HTTP_REQUEST_DURATION
        .with_label_values(&[method.as_str(), &path, &status])
        .observe(start.elapsed().as_secs_f64());
    HTTP_REQUESTS_TOTAL
        .with_label_values(&[method.as_str(), &path, &status])
        .inc();

    response
}

pub async fn metrics_handler() -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let mut buffer = vec![];

    match encoder.encode(&prometheus::gather(), &mut buffer) {
        Ok(_) => (
            StatusCode::OK,
            [(axum::http::header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            buffer,
        ),
        Err(e) => {
            tracing::error!("Failed to encode metrics: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                [(axum::http::header::CONTENT_TYPE, "text/plain; version=0.0.4")],
                b"metrics unavailable".to_vec(),
            )
        }
    }
}

pub fn record_auth_failure(reason: &str) {
    AUTH_FAILURES_TOTAL.with_label_values(&[reason]).inc();
    tracing::warn!(target: "security", reason = %reason, "Authentication failure recorded");
}

pub fn record_scan(outcome: &str) {
    SCANS_TOTAL.with_label_values(&[outcome]).inc();
}

pub fn record_document(kind: &str) {
    DOCUMENTS_RENDERED_TOTAL.with_label_values(&[kind]).inc();
}

pub fn record_liquidation_rows(result: &str, count: u64) {
    LIQUIDATION_ROWS_TOTAL.with_label_values(&[result]).inc_by(count as f64);
}

pub fn record_liquidation_job(status: &str) {
    LIQUIDATION_JOBS_TOTAL.with_label_values(&[status]).inc();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_metrics_endpoint() {
        record_scan("matched");
        let response = metrics_handler().await.into_response();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[test]
    fn test_normalize_path() {
        assert_eq!(normalize_path("/api/liquidations/42"), "/api/liquidations/:id");
        assert_eq!(
            normalize_path("/api/orders/550e8400-e29b-41d4-a716-446655440000/items"),
            "/api/orders/:id/items"
        );
        assert_eq!(normalize_path("/api/auth/login"), "/api/auth/login");
    }

    #[test]
    fn test_counters_increment() {
        let before = SCANS_TOTAL.with_label_values(&["no_match"]).get();
        record_scan("no_match");
        assert_eq!(SCANS_TOTAL.with_label_values(&["no_match"]).get(), before + 1.0);
    }
}
