use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;

use stockflow_auth::AuthError;
use stockflow_core::DomainError;
use stockflow_infra::StoreError;

/// Everything a handler can fail with.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Store(#[from] StoreError),

    /// Unknown user or wrong password; deliberately not told apart.
    #[error("invalid username or password")]
    InvalidLogin,

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<DomainError> for ApiError {
    fn from(err: DomainError) -> Self {
        ApiError::Store(StoreError::Domain(err))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::Auth(AuthError::Unauthenticated) => json_error(
                StatusCode::UNAUTHORIZED,
                "unauthenticated",
                "missing bearer token",
            ),
            ApiError::Auth(AuthError::InvalidCredential) => json_error(
                StatusCode::FORBIDDEN,
                "invalid_credential",
                "invalid or expired token",
            ),
            ApiError::Auth(e @ AuthError::Forbidden { .. }) => {
                json_error(StatusCode::FORBIDDEN, "forbidden", e.to_string())
            }
            ApiError::Store(StoreError::Domain(e)) => domain_error_to_response(e),
            ApiError::Store(StoreError::Transient(msg)) => {
                tracing::warn!(error = %msg, "transient store failure");
                json_error(
                    StatusCode::SERVICE_UNAVAILABLE,
                    "transient",
                    "temporary store failure, retry the request",
                )
            }
            ApiError::Store(StoreError::Backend(msg)) => {
                tracing::error!(error = %msg, "store failure");
                json_error(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "store_error",
                    "internal store failure",
                )
            }
            ApiError::InvalidLogin => json_error(
                StatusCode::UNAUTHORIZED,
                "invalid_login",
                "invalid username or password",
            ),
            ApiError::Internal(msg) => {
                tracing::error!(error = %msg, "internal error");
                json_error(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "internal error",
                )
            }
        }
    }
}

pub fn domain_error_to_response(err: DomainError) -> Response {
    match err {
        DomainError::Validation(msg) => json_error(StatusCode::BAD_REQUEST, "validation_error", msg),
        DomainError::NotFound(what) => {
            json_error(StatusCode::NOT_FOUND, "not_found", format!("{what} not found"))
        }
        DomainError::Conflict(msg) => json_error(StatusCode::CONFLICT, "conflict", msg),
        DomainError::Forbidden(msg) => json_error(StatusCode::FORBIDDEN, "forbidden", msg),
        DomainError::InsufficientStock {
            available,
            requested,
        } => (
            StatusCode::UNPROCESSABLE_ENTITY,
            axum::Json(json!({
                "error": "insufficient_stock",
                "message": format!(
                    "insufficient stock: available {available}, requested {requested}"
                ),
                "available": available,
                "requested": requested,
            })),
        )
            .into_response(),
    }
}

pub fn json_error(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
) -> Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}
