//! Request authentication middleware
//!
//! Accepts the token from the `token` cookie or an `Authorization: Bearer`
//! header (cookie wins). A valid token puts [`AuthUser`] into the request
//! extensions; anything else is a 401.

use axum::extract::{Request, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use crate::state::AppState;

pub const TOKEN_COOKIE: &str = "token";

/// Identity of the authenticated caller, set by [`require_auth`].
#[derive(Debug, Clone, Copy)]
pub struct AuthUser(pub i64);

pub async fn require_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, Response> {
    let token =
        extract_token(request.headers()).ok_or_else(|| unauthorized("missing auth token"))?;

    let user_id = state.tokens.validate(&token).map_err(|err| {
        tracing::debug!(error = %err, "token validation failed");
        unauthorized("invalid or expired token")
    })?;

    request.extensions_mut().insert(AuthUser(user_id));
    Ok(next.run(request).await)
}

pub(crate) fn extract_token(headers: &HeaderMap) -> Option<String> {
    if let Some(cookies) = headers.get(header::COOKIE).and_then(|v| v.to_str().ok()) {
        for pair in cookies.split(';') {
            if let Some((name, value)) = pair.trim().split_once('=') {
                if name == TOKEN_COOKIE && !value.is_empty() {
                    return Some(value.to_string());
                }
            }
        }
    }

    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::to_string)
}

fn unauthorized(message: &str) -> Response {
    (StatusCode::UNAUTHORIZED, Json(json!({ "error": message }))).into_response()
}

#[cfg(test)]
mod tests {
    use axum::http::HeaderValue;

    use super::*;

    fn headers(entries: &[(header::HeaderName, &str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in entries {
            map.insert(name.clone(), HeaderValue::from_str(value).unwrap());
        }
        map
    }

    #[test]
    fn reads_bearer_header() {
        let map = headers(&[(header::AUTHORIZATION, "Bearer abc.def.ghi")]);
        assert_eq!(extract_token(&map).as_deref(), Some("abc.def.ghi"));
    }

    #[test]
    fn reads_token_cookie() {
        let map = headers(&[(header::COOKIE, "theme=dark; token=abc.def.ghi")]);
        assert_eq!(extract_token(&map).as_deref(), Some("abc.def.ghi"));
    }

    #[test]
    fn cookie_wins_over_header() {
        let map = headers(&[
            (header::COOKIE, "token=from-cookie"),
            (header::AUTHORIZATION, "Bearer from-header"),
        ]);
        assert_eq!(extract_token(&map).as_deref(), Some("from-cookie"));
    }

    #[test]
    fn ignores_empty_cookie_and_malformed_header() {
        let map = headers(&[
            (header::COOKIE, "token="),
            (header::AUTHORIZATION, "Basic dXNlcjpwdw=="),
        ]);
        assert_eq!(extract_token(&map), None);
        assert_eq!(extract_token(&HeaderMap::new()), None);
    }
}
