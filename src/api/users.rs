//! Registration and login handlers
//!
//! POST /api/user/register — create user, issue token
//! POST /api/user/login    — check credentials, issue token
//!
//! Both return 200 with the token in the `Authorization` header and a
//! `token` cookie, so clients can pick either transport.

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use serde::Deserialize;

use crate::auth::TOKEN_COOKIE;
use crate::error::AppError;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct CredentialsRequest {
    login: String,
    password: String,
}

pub async fn register(State(state): State<AppState>, body: Bytes) -> Result<Response, AppError> {
    let req = parse_credentials(&body)?;
    let user_id = state.service.register(req.login.trim(), &req.password).await?;
    let token = state.tokens.issue(user_id)?;
    authorized_response(&token)
}

pub async fn login(State(state): State<AppState>, body: Bytes) -> Result<Response, AppError> {
    let req = parse_credentials(&body)?;
    let user_id = state.service.login(req.login.trim(), &req.password).await?;
    let token = state.tokens.issue(user_id)?;
    authorized_response(&token)
}

fn parse_credentials(body: &[u8]) -> Result<CredentialsRequest, AppError> {
    let req: CredentialsRequest = serde_json::from_slice(body)
        .map_err(|_| AppError::InvalidRequest("expected JSON body with login and password"))?;
    if req.login.trim().is_empty() || req.password.is_empty() {
        return Err(AppError::InvalidRequest("login and password are required"));
    }
    Ok(req)
}

fn authorized_response(token: &str) -> Result<Response, AppError> {
    let mut response = StatusCode::OK.into_response();

    let bearer = HeaderValue::from_str(&format!("Bearer {token}"))
        .map_err(|err| AppError::Internal(format!("invalid token header: {err}")))?;
    response.headers_mut().insert(header::AUTHORIZATION, bearer);

    let cookie = HeaderValue::from_str(&format!(
        "{TOKEN_COOKIE}={token}; Path=/; HttpOnly; SameSite=Strict"
    ))
    .map_err(|err| AppError::Internal(format!("invalid token cookie: {err}")))?;
    response.headers_mut().insert(header::SET_COOKIE, cookie);

    Ok(response)
}
