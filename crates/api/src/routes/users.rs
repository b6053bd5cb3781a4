//! User account and credit endpoints.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use common::UserId;
use serde::Serialize;
use state_store::StateStore;

use crate::error::ApiError;

#[derive(Serialize)]
pub struct UserCreatedResponse {
    pub user_id: String,
}

#[derive(Serialize)]
pub struct UserResponse {
    pub user_id: String,
    pub credit: i64,
}

#[derive(Serialize)]
pub struct CreditResponse {
    pub credit: i64,
}

pub fn router<S: StateStore>(store: S) -> Router {
    Router::new()
        .route("/users/create", post(create::<S>))
        .route("/users/remove/{user_id}", delete(remove::<S>))
        .route("/users/find/{user_id}", get(find::<S>))
        .route("/users/credit/{user_id}", get(credit::<S>))
        .route(
            "/users/credit/subtract/{user_id}/{amount}",
            post(subtract_credit::<S>),
        )
        .route("/users/credit/add/{user_id}/{amount}", post(add_credit::<S>))
        .with_state(store)
}

pub(crate) fn non_negative(amount: i64) -> Result<i64, ApiError> {
    if amount < 0 {
        return Err(ApiError::BadRequest(format!(
            "amount must not be negative: {amount}"
        )));
    }
    Ok(amount)
}

/// POST /users/create: creates a user with zero credit.
pub async fn create<S: StateStore>(
    State(store): State<S>,
) -> Result<(StatusCode, Json<UserCreatedResponse>), ApiError> {
    let user = store.create_user().await?;
    tracing::info!(user_id = %user.id, "user created");
    Ok((
        StatusCode::CREATED,
        Json(UserCreatedResponse {
            user_id: user.id.to_string(),
        }),
    ))
}

/// DELETE /users/remove/{user_id}
pub async fn remove<S: StateStore>(
    State(store): State<S>,
    Path(user_id): Path<String>,
) -> Result<StatusCode, ApiError> {
    store.remove_user(&UserId::new(user_id)).await?;
    Ok(StatusCode::OK)
}

/// GET /users/find/{user_id}
pub async fn find<S: StateStore>(
    State(store): State<S>,
    Path(user_id): Path<String>,
) -> Result<Json<UserResponse>, ApiError> {
    let user = store.find_user(&UserId::new(user_id)).await?;
    Ok(Json(UserResponse {
        user_id: user.id.to_string(),
        credit: user.credit,
    }))
}

/// GET /users/credit/{user_id}
pub async fn credit<S: StateStore>(
    State(store): State<S>,
    Path(user_id): Path<String>,
) -> Result<Json<CreditResponse>, ApiError> {
    let user = store.find_user(&UserId::new(user_id)).await?;
    Ok(Json(CreditResponse {
        credit: user.credit,
    }))
}

/// POST /users/credit/subtract/{user_id}/{amount}: 400 if the balance is
/// too low.
#[tracing::instrument(skip(store))]
pub async fn subtract_credit<S: StateStore>(
    State(store): State<S>,
    Path((user_id, amount)): Path<(String, i64)>,
) -> Result<StatusCode, ApiError> {
    let amount = non_negative(amount)?;
    store.subtract_credit(&UserId::new(user_id), amount).await?;
    Ok(StatusCode::OK)
}

/// POST /users/credit/add/{user_id}/{amount}
#[tracing::instrument(skip(store))]
pub async fn add_credit<S: StateStore>(
    State(store): State<S>,
    Path((user_id, amount)): Path<(String, i64)>,
) -> Result<StatusCode, ApiError> {
    let amount = non_negative(amount)?;
    store.add_credit(&UserId::new(user_id), amount).await?;
    Ok(StatusCode::OK)
}
