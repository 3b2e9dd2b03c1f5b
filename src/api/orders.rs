//! Order upload and listing handlers
//!
//! POST /api/user/orders — raw digit-string body, 202 on acceptance, 200
//! when this user already uploaded the number
//! GET  /api/user/orders — the user's orders, newest upload first

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::{Extension, Json};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

use crate::auth::AuthUser;
use crate::domain::{Order, OrderStatus};
use crate::error::AppError;
use crate::state::AppState;

#[derive(Serialize)]
pub struct OrderResponse {
    number: String,
    status: OrderStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    accrual: Option<Decimal>,
    uploaded_at: DateTime<Utc>,
}

impl From<Order> for OrderResponse {
    fn from(order: Order) -> Self {
        Self {
            number: order.number,
            status: order.status,
            accrual: order.accrual,
            uploaded_at: order.uploaded_at,
        }
    }
}

pub async fn upload(
    State(state): State<AppState>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
    body: String,
) -> Result<Response, AppError> {
    let number = body.trim();
    if number.is_empty() {
        return Err(AppError::InvalidRequest("empty order number"));
    }

    match state.service.upload_order(user_id, number).await {
        Ok(()) => Ok(StatusCode::ACCEPTED.into_response()),
        // this user already uploaded the number; idempotent success
        Err(AppError::AlreadyExists) => Ok(StatusCode::OK.into_response()),
        Err(err) => Err(err),
    }
}

pub async fn list(
    State(state): State<AppState>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
) -> Result<Response, AppError> {
    let orders = state.service.list_orders(user_id).await?;
    if orders.is_empty() {
        return Ok(StatusCode::NO_CONTENT.into_response());
    }

    let body: Vec<OrderResponse> = orders.into_iter().map(OrderResponse::from).collect();
    Ok(Json(body).into_response())
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;

    use super::*;

    fn order(accrual: Option<Decimal>) -> Order {
        Order {
            number: "2377225624".into(),
            user_id: 1,
            status: if accrual.is_some() {
                OrderStatus::Processed
            } else {
                OrderStatus::New
            },
            accrual,
            uploaded_at: "2026-07-01T10:00:00Z".parse().unwrap(),
            processed_at: None,
        }
    }

    #[test]
    fn serializes_processed_order_with_accrual() {
        let value = serde_json::to_value(OrderResponse::from(order(Some(dec!(500))))).unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "number": "2377225624",
                "status": "PROCESSED",
                "accrual": 500.0,
                "uploaded_at": "2026-07-01T10:00:00Z",
            })
        );
    }

    #[test]
    fn omits_absent_accrual() {
        let value = serde_json::to_value(OrderResponse::from(order(None))).unwrap();
        assert_eq!(value["status"], "NEW");
        assert!(value.get("accrual").is_none());
    }
}
