//! Shared application state

use std::sync::Arc;

use sqlx::PgPool;
use tokio_util::sync::CancellationToken;

use crate::accrual::AccrualClient;
use crate::auth::{PasswordHasher, TokenProvider};
use crate::config::Config;
use crate::db::Transactor;
use crate::domain::SystemClock;
use crate::error::AppError;
use crate::service::{LoyaltyService, ServiceTuning};

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<LoyaltyService>,
    pub tokens: TokenProvider,
}

impl AppState {
    pub fn new(pool: PgPool, config: &Config, shutdown: CancellationToken) -> Result<Self, AppError> {
        let transactor = Arc::new(Transactor::new(pool, config.db_retry, shutdown));

        let accrual = AccrualClient::new(&config.accrual_address, config.accrual_http_timeout)?;

        let service = LoyaltyService::new(
            transactor,
            Arc::new(accrual),
            PasswordHasher::new(config.bcrypt_cost),
            Arc::new(SystemClock),
            ServiceTuning {
                optimistic_retries: config.optimistic_retries,
                batch_size: config.accrual_batch_size,
                max_workers: config.accrual_max_workers,
            },
        );

        Ok(Self {
            service: Arc::new(service),
            tokens: TokenProvider::new(&config.jwt_secret, config.jwt_ttl),
        })
    }
}
