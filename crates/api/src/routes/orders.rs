//! Order CRUD and checkout endpoints.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use common::{ItemId, OrderId, UserId};
use saga::{OrderGateway, PriceLookup};
use serde::Serialize;
use state_store::StateStore;

use crate::error::ApiError;

/// Shared state of the order service.
pub struct OrderState<S> {
    pub store: S,
    pub gateway: OrderGateway<S>,
    pub catalog: Arc<dyn PriceLookup>,
}

// -- Response types --

#[derive(Serialize)]
pub struct OrderCreatedResponse {
    pub order_id: String,
}

#[derive(Serialize)]
pub struct OrderResponse {
    pub order_id: String,
    pub user_id: String,
    pub items: Vec<String>,
    pub paid: bool,
    pub total_cost: i64,
}

pub fn router<S: StateStore>(state: Arc<OrderState<S>>) -> Router {
    Router::new()
        .route("/orders/create/{user_id}", post(create::<S>))
        .route("/orders/remove/{order_id}", delete(remove::<S>))
        .route("/orders/find/{order_id}", get(find::<S>))
        .route("/orders/additem/{order_id}/{item_id}", post(add_item::<S>))
        .route(
            "/orders/removeitem/{order_id}/{item_id}",
            delete(remove_item::<S>),
        )
        .route("/orders/checkout/{order_id}", post(checkout::<S>))
        .with_state(state)
}

// -- Handlers --

/// POST /orders/create/{user_id}: creates an empty order.
#[tracing::instrument(skip(state))]
pub async fn create<S: StateStore>(
    State(state): State<Arc<OrderState<S>>>,
    Path(user_id): Path<String>,
) -> Result<(StatusCode, Json<OrderCreatedResponse>), ApiError> {
    let order = state.store.create_order(&UserId::new(user_id)).await?;
    tracing::info!(order_id = %order.id, user_id = %order.user_id, "order created");
    Ok((
        StatusCode::CREATED,
        Json(OrderCreatedResponse {
            order_id: order.id.to_string(),
        }),
    ))
}

/// DELETE /orders/remove/{order_id}
pub async fn remove<S: StateStore>(
    State(state): State<Arc<OrderState<S>>>,
    Path(order_id): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.store.remove_order(&OrderId::new(order_id)).await?;
    Ok(StatusCode::OK)
}

/// GET /orders/find/{order_id}
pub async fn find<S: StateStore>(
    State(state): State<Arc<OrderState<S>>>,
    Path(order_id): Path<String>,
) -> Result<Json<OrderResponse>, ApiError> {
    let order = state.store.find_order(&OrderId::new(order_id)).await?;
    Ok(Json(OrderResponse {
        order_id: order.id.to_string(),
        user_id: order.user_id.to_string(),
        items: order.items.ids().map(ToString::to_string).collect(),
        paid: order.paid,
        total_cost: order.cost,
    }))
}

/// POST /orders/additem/{order_id}/{item_id}: records the item at its
/// current stock price.
#[tracing::instrument(skip(state))]
pub async fn add_item<S: StateStore>(
    State(state): State<Arc<OrderState<S>>>,
    Path((order_id, item_id)): Path<(String, String)>,
) -> Result<StatusCode, ApiError> {
    let order_id = OrderId::new(order_id);
    let item_id = ItemId::new(item_id);

    // Missing order wins over missing item.
    state.store.find_order(&order_id).await?;
    let price = state.catalog.price(&item_id).await?;
    state.store.add_item(&order_id, item_id, price).await?;
    Ok(StatusCode::OK)
}

/// DELETE /orders/removeitem/{order_id}/{item_id}
#[tracing::instrument(skip(state))]
pub async fn remove_item<S: StateStore>(
    State(state): State<Arc<OrderState<S>>>,
    Path((order_id, item_id)): Path<(String, String)>,
) -> Result<StatusCode, ApiError> {
    state
        .store
        .remove_item(&OrderId::new(order_id), &ItemId::new(item_id))
        .await?;
    Ok(StatusCode::OK)
}

/// POST /orders/checkout/{order_id}: runs the checkout saga.
///
/// 200 on success, 400 when a step rejects the order, 404 for an unknown
/// order, 500 on infrastructure failure or timeout.
#[tracing::instrument(skip(state))]
pub async fn checkout<S: StateStore>(
    State(state): State<Arc<OrderState<S>>>,
    Path(order_id): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.gateway.checkout(&OrderId::new(order_id)).await?;
    Ok(StatusCode::OK)
}
