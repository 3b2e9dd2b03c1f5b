//! Withdrawals repository (append-only)

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use crate::domain::Withdrawal;
use crate::error::AppError;

use super::{DbHandle, Transactor};

#[derive(sqlx::FromRow)]
struct WithdrawalRow {
    user_id: i64,
    order_number: String,
    amount: Decimal,
    processed_at: DateTime<Utc>,
}

impl From<WithdrawalRow> for Withdrawal {
    fn from(row: WithdrawalRow) -> Self {
        Withdrawal {
            user_id: row.user_id,
            order_number: row.order_number,
            amount: row.amount,
            processed_at: row.processed_at,
        }
    }
}

pub struct WithdrawalRepository {
    transactor: Arc<Transactor>,
}

impl WithdrawalRepository {
    pub fn new(transactor: Arc<Transactor>) -> Self {
        Self { transactor }
    }

    pub async fn create(&self, db: &DbHandle, withdrawal: &Withdrawal) -> Result<(), AppError> {
        self.transactor
            .with_retry(|| async move {
                let mut conn = db.conn().await?;
                sqlx::query(
                    "INSERT INTO withdrawals (user_id, order_number, amount, processed_at)
                     VALUES ($1, $2, $3, $4)",
                )
                .bind(withdrawal.user_id)
                .bind(&withdrawal.order_number)
                .bind(withdrawal.amount)
                .bind(withdrawal.processed_at)
                .execute(conn.as_conn())
                .await?;
                Ok(())
            })
            .await
    }

    /// All withdrawals of one user, newest first.
    pub async fn list_by_user_id(
        &self,
        db: &DbHandle,
        user_id: i64,
    ) -> Result<Vec<Withdrawal>, AppError> {
        let rows: Vec<WithdrawalRow> = self
            .transactor
            .with_retry(|| async move {
                let mut conn = db.conn().await?;
                Ok(sqlx::query_as(
                    "SELECT user_id, order_number, amount, processed_at
                     FROM withdrawals
                     WHERE user_id = $1
                     ORDER BY processed_at DESC",
                )
                .bind(user_id)
                .fetch_all(conn.as_conn())
                .await?)
            })
            .await?;

        Ok(rows.into_iter().map(Withdrawal::from).collect())
    }
}
