//! Balance accounts repository
//!
//! The balance row is the single synchronization point for credits and
//! debits. `update` is guarded by the version column; a stale writer gets
//! [`AppError::OptimisticLock`] and must re-read.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use crate::domain::BalanceAccount;
use crate::error::AppError;

use super::{DbHandle, Transactor};

#[derive(sqlx::FromRow)]
struct BalanceRow {
    user_id: i64,
    current: Decimal,
    withdrawn_total: Decimal,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    version: i64,
}

impl From<BalanceRow> for BalanceAccount {
    fn from(row: BalanceRow) -> Self {
        BalanceAccount {
            user_id: row.user_id,
            current: row.current,
            withdrawn_total: row.withdrawn_total,
            created_at: row.created_at,
            updated_at: row.updated_at,
            version: row.version,
        }
    }
}

pub struct BalanceRepository {
    transactor: Arc<Transactor>,
}

impl BalanceRepository {
    pub fn new(transactor: Arc<Transactor>) -> Self {
        Self { transactor }
    }

    pub async fn create(&self, db: &DbHandle, acc: &BalanceAccount) -> Result<(), AppError> {
        self.transactor
            .with_retry(|| async move {
                let mut conn = db.conn().await?;
                sqlx::query(
                    "INSERT INTO balance_accounts
                         (user_id, current, withdrawn_total, created_at, updated_at, version)
                     VALUES ($1, $2, $3, $4, $5, $6)",
                )
                .bind(acc.user_id)
                .bind(acc.current)
                .bind(acc.withdrawn_total)
                .bind(acc.created_at)
                .bind(acc.updated_at)
                .bind(acc.version)
                .execute(conn.as_conn())
                .await?;
                Ok(())
            })
            .await
    }

    pub async fn find_by_user_id(
        &self,
        db: &DbHandle,
        user_id: i64,
    ) -> Result<BalanceAccount, AppError> {
        let row: BalanceRow = self
            .transactor
            .with_retry(|| async move {
                let mut conn = db.conn().await?;
                sqlx::query_as(
                    "SELECT user_id, current, withdrawn_total, created_at, updated_at, version
                     FROM balance_accounts
                     WHERE user_id = $1",
                )
                .bind(user_id)
                .fetch_optional(conn.as_conn())
                .await?
                .ok_or(AppError::NotFound)
            })
            .await?;

        Ok(row.into())
    }

    /// Persists the account if its version still matches the one it was
    /// read with, then writes the incremented version back into `acc`.
    /// Zero rows updated means a concurrent writer won:
    /// [`AppError::OptimisticLock`].
    pub async fn update(&self, db: &DbHandle, acc: &mut BalanceAccount) -> Result<(), AppError> {
        let snapshot = &*acc;
        let new_version: i64 = self
            .transactor
            .with_retry(|| async move {
                let mut conn = db.conn().await?;
                let updated: Option<(i64,)> = sqlx::query_as(
                    "UPDATE balance_accounts
                     SET current = $1, withdrawn_total = $2, updated_at = $3, version = version + 1
                     WHERE user_id = $4 AND version = $5
                     RETURNING version",
                )
                .bind(snapshot.current)
                .bind(snapshot.withdrawn_total)
                .bind(snapshot.updated_at)
                .bind(snapshot.user_id)
                .bind(snapshot.version)
                .fetch_optional(conn.as_conn())
                .await?;
                updated.map(|(version,)| version).ok_or(AppError::OptimisticLock)
            })
            .await?;

        acc.version = new_version;
        Ok(())
    }
}
