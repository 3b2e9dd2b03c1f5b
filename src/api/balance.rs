//! Balance, withdraw, and withdrawal-history handlers
//!
//! GET  /api/user/balance          — current and withdrawn totals
//! POST /api/user/balance/withdraw — spend points against an order number
//! GET  /api/user/withdrawals      — spending history, newest first

use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::{Extension, Json};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::auth::AuthUser;
use crate::domain::Withdrawal;
use crate::error::AppError;
use crate::state::AppState;

#[derive(Serialize)]
pub struct BalanceResponse {
    current: Decimal,
    withdrawn: Decimal,
}

#[derive(Deserialize)]
pub struct WithdrawRequest {
    order: String,
    sum: Decimal,
}

#[derive(Serialize)]
pub struct WithdrawalResponse {
    order: String,
    sum: Decimal,
    processed_at: DateTime<Utc>,
}

impl From<Withdrawal> for WithdrawalResponse {
    fn from(w: Withdrawal) -> Self {
        Self {
            order: w.order_number,
            sum: w.amount,
            processed_at: w.processed_at,
        }
    }
}

pub async fn get(
    State(state): State<AppState>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
) -> Result<Json<BalanceResponse>, AppError> {
    let acc = state.service.get_balance(user_id).await?;
    Ok(Json(BalanceResponse {
        current: acc.current,
        withdrawn: acc.withdrawn_total,
    }))
}

pub async fn withdraw(
    State(state): State<AppState>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
    body: Bytes,
) -> Result<StatusCode, AppError> {
    let req: WithdrawRequest = serde_json::from_slice(&body)
        .map_err(|_| AppError::InvalidRequest("expected JSON body with order and sum"))?;
    if req.sum <= Decimal::ZERO {
        return Err(AppError::InvalidRequest("sum must be positive"));
    }

    state.service.withdraw(user_id, &req.order, req.sum).await?;
    Ok(StatusCode::OK)
}

pub async fn withdrawals(
    State(state): State<AppState>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
) -> Result<Response, AppError> {
    let withdrawals = state.service.list_withdrawals(user_id).await?;
    if withdrawals.is_empty() {
        return Ok(StatusCode::NO_CONTENT.into_response());
    }

    let body: Vec<WithdrawalResponse> = withdrawals
        .into_iter()
        .map(WithdrawalResponse::from)
        .collect();
    Ok(Json(body).into_response())
}
