//! Stock item endpoints.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use common::ItemId;
use serde::Serialize;
use state_store::StateStore;

use crate::error::ApiError;
use crate::routes::users::non_negative;

#[derive(Serialize)]
pub struct ItemCreatedResponse {
    pub item_id: String,
}

#[derive(Serialize)]
pub struct ItemResponse {
    pub stock: i64,
    pub price: i64,
}

pub fn router<S: StateStore>(store: S) -> Router {
    Router::new()
        .route("/stock/find/{item_id}", get(find::<S>))
        .route("/stock/subtract/{item_id}/{number}", post(subtract::<S>))
        .route("/stock/add/{item_id}/{number}", post(add::<S>))
        .route("/stock/item/create/{price}", post(create_item::<S>))
        .with_state(store)
}

/// GET /stock/find/{item_id}
pub async fn find<S: StateStore>(
    State(store): State<S>,
    Path(item_id): Path<String>,
) -> Result<Json<ItemResponse>, ApiError> {
    let item = store.find_item(&ItemId::new(item_id)).await?;
    Ok(Json(ItemResponse {
        stock: item.quantity,
        price: item.price,
    }))
}

/// POST /stock/subtract/{item_id}/{number}: 400 if stock is insufficient.
#[tracing::instrument(skip(store))]
pub async fn subtract<S: StateStore>(
    State(store): State<S>,
    Path((item_id, number)): Path<(String, i64)>,
) -> Result<StatusCode, ApiError> {
    let number = non_negative(number)?;
    store.subtract_stock(&ItemId::new(item_id), number).await?;
    Ok(StatusCode::OK)
}

/// POST /stock/add/{item_id}/{number}
#[tracing::instrument(skip(store))]
pub async fn add<S: StateStore>(
    State(store): State<S>,
    Path((item_id, number)): Path<(String, i64)>,
) -> Result<StatusCode, ApiError> {
    let number = non_negative(number)?;
    store.add_stock(&ItemId::new(item_id), number).await?;
    Ok(StatusCode::OK)
}

/// POST /stock/item/create/{price}: creates an item with no stock.
pub async fn create_item<S: StateStore>(
    State(store): State<S>,
    Path(price): Path<i64>,
) -> Result<(StatusCode, Json<ItemCreatedResponse>), ApiError> {
    let price = non_negative(price)?;
    let item = store.create_item(price).await?;
    tracing::info!(item_id = %item.id, price, "stock item created");
    Ok((
        StatusCode::CREATED,
        Json(ItemCreatedResponse {
            item_id: item.id.to_string(),
        }),
    ))
}
