//! API error types with HTTP response mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use saga::{CatalogError, ErrorClass, SagaError};
use state_store::StoreError;

/// API-level error type that maps to HTTP responses.
#[derive(Debug)]
pub enum ApiError {
    /// Resource not found.
    NotFound(String),
    /// Bad request from the client.
    BadRequest(String),
    /// Persistence error.
    Store(StoreError),
    /// Checkout saga error.
    Saga(SagaError),
    /// Internal server error.
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Store(err) => store_error_to_response(err),
            ApiError::Saga(err) => saga_error_to_response(err),
            ApiError::Internal(msg) => {
                tracing::error!(error = %msg, "internal server error");
                (StatusCode::INTERNAL_SERVER_ERROR, msg)
            }
        };

        let body = serde_json::json!({ "error": message });
        (status, axum::Json(body)).into_response()
    }
}

fn store_error_to_response(err: StoreError) -> (StatusCode, String) {
    if err.is_not_found() {
        (StatusCode::NOT_FOUND, err.to_string())
    } else if err.is_rule_violation() {
        (StatusCode::BAD_REQUEST, err.to_string())
    } else {
        tracing::error!(error = %err, "store error");
        (StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
    }
}

fn saga_error_to_response(err: SagaError) -> (StatusCode, String) {
    match err.class() {
        ErrorClass::NotFound => (StatusCode::NOT_FOUND, err.to_string()),
        ErrorClass::BadRequest => (StatusCode::BAD_REQUEST, err.to_string()),
        ErrorClass::Internal => {
            tracing::error!(error = %err, "checkout failed");
            (StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        ApiError::Store(err)
    }
}

impl From<SagaError> for ApiError {
    fn from(err: SagaError) -> Self {
        ApiError::Saga(err)
    }
}

impl From<CatalogError> for ApiError {
    fn from(err: CatalogError) -> Self {
        ApiError::Saga(err.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::OrderId;

    fn status(err: ApiError) -> StatusCode {
        err.into_response().status()
    }

    #[test]
    fn test_store_errors() {
        assert_eq!(
            status(ApiError::Store(StoreError::NotFound {
                entity: "user",
                id: "u1".into()
            })),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status(ApiError::Store(StoreError::InsufficientCredit {
                user_id: "u1".into(),
                available: 1,
                requested: 2,
            })),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status(ApiError::Store(StoreError::Corrupt("bad".into()))),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_saga_errors() {
        let order_id = OrderId::new("o1");
        assert_eq!(
            status(SagaError::OrderNotFound(order_id.clone()).into()),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status(SagaError::Rejected(order_id.clone()).into()),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status(
                SagaError::Timeout {
                    order_id,
                    after: std::time::Duration::from_secs(1)
                }
                .into()
            ),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
