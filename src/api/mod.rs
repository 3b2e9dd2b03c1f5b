//! HTTP API routes

pub mod balance;
pub mod health;
pub mod orders;
pub mod users;

use axum::extract::DefaultBodyLimit;
use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use tower_http::compression::CompressionLayer;
use tower_http::decompression::RequestDecompressionLayer;
use tower_http::trace::TraceLayer;

use crate::auth::require_auth;
use crate::state::AppState;

/// Builds the combined router.
pub fn router(state: AppState) -> Router {
    let public = Router::new()
        .route("/api/user/register", post(users::register))
        .route("/api/user/login", post(users::login));

    let protected = Router::new()
        .route(
            "/api/user/orders",
            post(orders::upload)
                .get(orders::list)
                // order numbers are short digit strings
                .layer(DefaultBodyLimit::max(64)),
        )
        .route("/api/user/balance", get(balance::get))
        .route("/api/user/balance/withdraw", post(balance::withdraw))
        .route("/api/user/withdrawals", get(balance::withdrawals))
        .layer(middleware::from_fn_with_state(state.clone(), require_auth));

    Router::new()
        .route("/health", get(health::health))
        .merge(public)
        .merge(protected)
        .layer(RequestDecompressionLayer::new())
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
