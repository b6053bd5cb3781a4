//! Prometheus scrape endpoint and metric descriptions.

use axum::extract::State;
use axum::http::{StatusCode, header};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use metrics::Unit;
use metrics_exporter_prometheus::PrometheusHandle;

const PROMETHEUS_TEXT: &str = "text/plain; version=0.0.4; charset=utf-8";

pub fn router(handle: PrometheusHandle) -> Router {
    Router::new()
        .route("/metrics", get(render))
        .with_state(handle)
}

/// Registers help text for the saga and bus metrics. Call once after the
/// recorder is installed.
pub fn describe() {
    metrics::describe_counter!("saga_checkouts_total", "Checkout sagas started");
    metrics::describe_counter!(
        "saga_outcomes_total",
        "Checkout sagas that reported an outcome, by outcome"
    );
    metrics::describe_counter!(
        "saga_timeouts_total",
        "Checkouts that gave up waiting for an outcome"
    );
    metrics::describe_counter!(
        "saga_compensations_total",
        "Stock reservations rolled back after a failed item"
    );
    metrics::describe_counter!(
        "saga_compensation_failures_total",
        "Refunds or stock restores that could not be applied"
    );
    metrics::describe_gauge!("saga_pending", "Sagas waiting for an outcome on this instance");
    metrics::describe_histogram!(
        "saga_checkout_duration_seconds",
        Unit::Seconds,
        "Time from publishing PAY to receiving the outcome"
    );
    metrics::describe_counter!(
        "bus_messages_published_total",
        "Saga messages published, by topic"
    );
}

/// GET /metrics
pub async fn render(State(handle): State<PrometheusHandle>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, PROMETHEUS_TEXT)],
        handle.render(),
    )
}
