use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use crate::domain::aggregates::{CartError, OrderError, ReturnError, SettlementError};
use crate::error::EcommerceError;

/// Error body: `{"ok": false, "error": "..."}`.
#[derive(Debug)]
pub struct ApiError(pub EcommerceError);

pub type ApiResult<T> = Result<T, ApiError>;

impl<E> From<E> for ApiError
where
    E: Into<EcommerceError>,
{
    fn from(e: E) -> Self { Self(e.into()) }
}

pub fn status_for(e: &EcommerceError) -> StatusCode {
    match e {
        EcommerceError::NotFound { .. } => StatusCode::NOT_FOUND,
        EcommerceError::InsufficientStock { .. } | EcommerceError::Conflict(_) => StatusCode::CONFLICT,
        EcommerceError::Unauthorized => StatusCode::UNAUTHORIZED,
        EcommerceError::Forbidden(_) => StatusCode::FORBIDDEN,
        EcommerceError::Cart(CartError::InsufficientStock { .. }) => StatusCode::CONFLICT,
        EcommerceError::Cart(CartError::ItemNotFound) => StatusCode::NOT_FOUND,
        EcommerceError::Order(OrderError::InvalidTransition { .. })
        | EcommerceError::Settlement(SettlementError::InvalidTransition { .. })
        | EcommerceError::Return(ReturnError::AlreadyResolved) => StatusCode::CONFLICT,
        EcommerceError::Storage(_) | EcommerceError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        _ => StatusCode::BAD_REQUEST,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = status_for(&self.0);
        let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!(error = %self.0, "request failed");
            "Internal error".to_string()
        } else {
            self.0.to_string()
        };
        (status, Json(json!({ "ok": false, "error": message }))).into_response()
    }
}
