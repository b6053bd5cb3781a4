//! Health check endpoint.

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;

use crate::config::ServiceKind;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: &'static str,
}

pub fn router(service: ServiceKind) -> Router {
    Router::new()
        .route("/health", get(check))
        .with_state(service)
}

/// GET /health: returns the status of this service.
pub async fn check(State(service): State<ServiceKind>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        service: service.as_str(),
    })
}
