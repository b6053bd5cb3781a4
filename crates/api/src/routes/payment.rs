//! Payment status endpoint. Payments themselves are made by the checkout
//! saga.

use axum::extract::{Path, State};
use axum::routing::get;
use axum::{Json, Router};
use common::OrderId;
use serde::Serialize;
use state_store::StateStore;

use crate::error::ApiError;

#[derive(Serialize)]
pub struct PaymentStatusResponse {
    pub paid: bool,
}

pub fn router<S: StateStore>(store: S) -> Router {
    Router::new()
        .route("/payment/status/{order_id}", get(status::<S>))
        .with_state(store)
}

/// GET /payment/status/{order_id}: 404 if the order was never paid.
pub async fn status<S: StateStore>(
    State(store): State<S>,
    Path(order_id): Path<String>,
) -> Result<Json<PaymentStatusResponse>, ApiError> {
    let order_id = OrderId::new(order_id);
    let payment = store
        .find_payment(&order_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("no payment for order {order_id}")))?;
    Ok(Json(PaymentStatusResponse {
        paid: payment.is_paid(),
    }))
}
