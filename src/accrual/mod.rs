//! HTTP client for the external accrual calculation system
//!
//! One endpoint: `GET {base}/api/orders/{number}`. Three meaningful
//! answers: the calculation state (200), "never heard of it" (204), and
//! backpressure (429 with an optional Retry-After).

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header, StatusCode};
use rust_decimal::Decimal;
use serde::Deserialize;

use crate::error::AppError;

/// Fallback backoff when a 429 carries no usable Retry-After header.
const DEFAULT_RETRY_AFTER: Duration = Duration::from_secs(60);

/// Calculation status as reported by the accrual system. Anything the
/// calculator may invent later lands in `Unknown`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RemoteStatus {
    Registered,
    Processing,
    Invalid,
    Processed,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AccrualOrder {
    #[serde(default)]
    pub order: String,
    pub status: RemoteStatus,
    #[serde(default)]
    pub accrual: Option<Decimal>,
}

/// Seam for the accrual upstream; `None` means the order is not registered
/// with the calculator (yet).
#[async_trait]
pub trait AccrualApi: Send + Sync {
    async fn order_accrual(&self, number: &str) -> Result<Option<AccrualOrder>, AppError>;
}

pub struct AccrualClient {
    base_url: String,
    http: reqwest::Client,
}

impl AccrualClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, AppError> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http,
        })
    }
}

#[async_trait]
impl AccrualApi for AccrualClient {
    async fn order_accrual(&self, number: &str) -> Result<Option<AccrualOrder>, AppError> {
        let url = format!("{}/api/orders/{}", self.base_url, number);
        let response = self.http.get(&url).send().await?;

        match response.status() {
            StatusCode::OK => Ok(Some(response.json::<AccrualOrder>().await?)),
            StatusCode::NO_CONTENT => Ok(None),
            StatusCode::TOO_MANY_REQUESTS => {
                let retry_after = response
                    .headers()
                    .get(header::RETRY_AFTER)
                    .and_then(|value| value.to_str().ok())
                    .and_then(|value| value.trim().parse::<u64>().ok())
                    .map(Duration::from_secs)
                    .unwrap_or(DEFAULT_RETRY_AFTER);
                Err(AppError::RateLimited { retry_after })
            }
            status => Err(AppError::Internal(format!(
                "accrual system responded with unexpected status {status}"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::net::SocketAddr;

    use axum::extract::Path;
    use axum::http::header::RETRY_AFTER;
    use axum::response::{IntoResponse, Response};
    use axum::routing::get;
    use axum::{Json, Router};
    use rust_decimal_macros::dec;
    use serde_json::json;

    use super::*;

    async fn stub_order(Path(number): Path<String>) -> Response {
        match number.as_str() {
            "processed" => Json(json!({
                "order": "processed",
                "status": "PROCESSED",
                "accrual": 500.5,
            }))
            .into_response(),
            "registered" => Json(json!({
                "order": "registered",
                "status": "REGISTERED",
            }))
            .into_response(),
            "queued" => Json(json!({
                "order": "queued",
                "status": "QUEUED",
            }))
            .into_response(),
            "missing" => StatusCode::NO_CONTENT.into_response(),
            "limited" => {
                (StatusCode::TOO_MANY_REQUESTS, [(RETRY_AFTER, "7")]).into_response()
            }
            "limited-silent" => StatusCode::TOO_MANY_REQUESTS.into_response(),
            "limited-garbled" => {
                (StatusCode::TOO_MANY_REQUESTS, [(RETRY_AFTER, "soon")]).into_response()
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR.into_response(),
        }
    }

    async fn spawn_stub() -> SocketAddr {
        let app = Router::new().route("/api/orders/{number}", get(stub_order));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        addr
    }

    async fn client() -> AccrualClient {
        let addr = spawn_stub().await;
        AccrualClient::new(&format!("http://{addr}"), Duration::from_secs(5)).unwrap()
    }

    #[tokio::test]
    async fn decodes_processed_order_with_accrual() {
        let reply = client().await.order_accrual("processed").await.unwrap();
        let order = reply.unwrap();
        assert_eq!(order.status, RemoteStatus::Processed);
        assert_eq!(order.accrual, Some(dec!(500.5)));
    }

    #[tokio::test]
    async fn decodes_order_without_accrual() {
        let reply = client().await.order_accrual("registered").await.unwrap();
        let order = reply.unwrap();
        assert_eq!(order.status, RemoteStatus::Registered);
        assert_eq!(order.accrual, None);
    }

    #[tokio::test]
    async fn unknown_statuses_are_preserved_as_unknown() {
        let reply = client().await.order_accrual("queued").await.unwrap();
        assert_eq!(reply.unwrap().status, RemoteStatus::Unknown);
    }

    #[tokio::test]
    async fn no_content_means_not_registered() {
        let reply = client().await.order_accrual("missing").await.unwrap();
        assert!(reply.is_none());
    }

    #[tokio::test]
    async fn rate_limit_carries_retry_after() {
        let err = client().await.order_accrual("limited").await.unwrap_err();
        assert!(matches!(
            err,
            AppError::RateLimited { retry_after } if retry_after == Duration::from_secs(7)
        ));
    }

    #[tokio::test]
    async fn rate_limit_without_header_defaults_to_a_minute() {
        for number in ["limited-silent", "limited-garbled"] {
            let err = client().await.order_accrual(number).await.unwrap_err();
            assert!(matches!(
                err,
                AppError::RateLimited { retry_after } if retry_after == Duration::from_secs(60)
            ));
        }
    }

    #[tokio::test]
    async fn unexpected_statuses_are_errors() {
        let err = client().await.order_accrual("boom").await.unwrap_err();
        assert!(matches!(err, AppError::Internal(_)));
    }
}
