//! Unified service error type
//!
//! `AppError` carries both business-rule outcomes (conflict, insufficient
//! balance, ...) and infrastructure failures (sqlx, reqwest, jwt). Business
//! kinds map to their HTTP status at the API boundary; everything else is
//! logged and collapsed to 500.

use std::time::Duration;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("not found")]
    NotFound,

    #[error("already exists")]
    AlreadyExists,

    #[error("conflict with existing resource")]
    Conflict,

    #[error("invalid login or password")]
    InvalidCredentials,

    #[error("invalid order number")]
    InvalidOrderNumber,

    #[error("insufficient balance")]
    InsufficientBalance,

    /// Version column mismatch on a balance update. Handled by the
    /// optimistic retry loops in the service layer, never user-visible.
    #[error("optimistic lock conflict")]
    OptimisticLock,

    /// Accrual system backpressure. Handled by the reconciliation worker.
    #[error("rate limited, retry after {retry_after:?}")]
    RateLimited { retry_after: Duration },

    #[error("operation cancelled")]
    Cancelled,

    #[error("malformed request: {0}")]
    InvalidRequest(&'static str),

    #[error("storage error: {0}")]
    Storage(#[from] sqlx::Error),

    #[error("accrual request failed: {0}")]
    Accrual(#[from] reqwest::Error),

    #[error("token error: {0}")]
    Token(#[from] jsonwebtoken::errors::Error),

    #[error("password hash error: {0}")]
    PasswordHash(#[from] bcrypt::BcryptError),

    #[error("{0}")]
    Internal(String),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::AlreadyExists | AppError::Conflict => StatusCode::CONFLICT,
            AppError::InvalidCredentials => StatusCode::UNAUTHORIZED,
            AppError::InvalidOrderNumber => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::InsufficientBalance => StatusCode::PAYMENT_REQUIRED,
            AppError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            // NotFound included: a missing row behind an authenticated
            // endpoint is an internal consistency failure, not a 404.
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!(error = %self, "request failed");
            return (status, Json(json!({ "error": "internal server error" }))).into_response();
        }
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn business_kinds_map_to_their_status() {
        assert_eq!(AppError::AlreadyExists.status(), StatusCode::CONFLICT);
        assert_eq!(AppError::Conflict.status(), StatusCode::CONFLICT);
        assert_eq!(AppError::InvalidCredentials.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            AppError::InvalidOrderNumber.status(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            AppError::InsufficientBalance.status(),
            StatusCode::PAYMENT_REQUIRED
        );
        assert_eq!(
            AppError::InvalidRequest("bad").status(),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn internal_kinds_collapse_to_500() {
        assert_eq!(
            AppError::NotFound.status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            AppError::OptimisticLock.status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            AppError::RateLimited {
                retry_after: Duration::from_secs(1)
            }
            .status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            AppError::Cancelled.status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
