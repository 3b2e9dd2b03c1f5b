//! AccrualWorker — background reconciliation against the accrual system
//!
//! Ticks at a fixed interval and runs one pass per tick. A rate-limited
//! pass backs off for the amount the accrual system asked for before the
//! ticker resumes. Cancel the token to stop.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::error::AppError;
use crate::service::LoyaltyService;

pub struct AccrualWorker {
    service: Arc<LoyaltyService>,
    poll_interval: Duration,
    shutdown: CancellationToken,
}

impl AccrualWorker {
    pub fn new(
        service: Arc<LoyaltyService>,
        poll_interval: Duration,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            service,
            poll_interval,
            shutdown,
        }
    }

    pub async fn run(self) {
        tracing::info!(poll_interval = ?self.poll_interval, "accrual worker started");

        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        ticker.tick().await; // skip the immediate tick

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => {
                    tracing::info!("accrual worker stopped");
                    return;
                }
                _ = ticker.tick() => self.poll().await,
            }
        }
    }

    async fn poll(&self) {
        let outcome = self.service.run_accrual_pass().await;

        if outcome.processed > 0 {
            tracing::debug!(count = outcome.processed, "accrual batch processed");
        }

        match outcome.error {
            None => {}
            Some(AppError::RateLimited { retry_after }) => {
                tracing::warn!(retry_after = ?retry_after, "accrual rate limited, backing off");
                tokio::select! {
                    _ = self.shutdown.cancelled() => {}
                    _ = tokio::time::sleep(retry_after) => {}
                }
            }
            Some(err) => tracing::error!(error = %err, "accrual poll failed"),
        }
    }
}
