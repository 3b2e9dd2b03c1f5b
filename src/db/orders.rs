//! Orders repository
//!
//! Orders rely on status monotonicity rather than optimistic locking:
//! `update` overwrites by number, and the reconciliation engine only ever
//! submits non-terminal orders.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::{Stream, StreamExt};
use rust_decimal::Decimal;

use crate::domain::{Order, OrderStatus};
use crate::error::AppError;

use super::{is_unique_violation, DbHandle, Transactor};

#[derive(sqlx::FromRow)]
struct OrderRow {
    number: String,
    user_id: i64,
    status: i16,
    accrual: Option<Decimal>,
    uploaded_at: DateTime<Utc>,
    processed_at: Option<DateTime<Utc>>,
}

impl TryFrom<OrderRow> for Order {
    type Error = AppError;

    fn try_from(row: OrderRow) -> Result<Self, Self::Error> {
        Ok(Order {
            status: OrderStatus::try_from(row.status)?,
            number: row.number,
            user_id: row.user_id,
            accrual: row.accrual,
            uploaded_at: row.uploaded_at,
            processed_at: row.processed_at,
        })
    }
}

pub struct OrderRepository {
    transactor: Arc<Transactor>,
}

impl OrderRepository {
    pub fn new(transactor: Arc<Transactor>) -> Self {
        Self { transactor }
    }

    /// Inserts a new order; a duplicate number fails with
    /// [`AppError::AlreadyExists`].
    pub async fn create(&self, db: &DbHandle, order: &Order) -> Result<(), AppError> {
        self.transactor
            .with_retry(|| async move {
                let mut conn = db.conn().await?;
                sqlx::query(
                    "INSERT INTO orders (number, user_id, status, accrual, uploaded_at, processed_at)
                     VALUES ($1, $2, $3, $4, $5, $6)",
                )
                .bind(&order.number)
                .bind(order.user_id)
                .bind(order.status.code())
                .bind(order.accrual)
                .bind(order.uploaded_at)
                .bind(order.processed_at)
                .execute(conn.as_conn())
                .await
                .map_err(|err| {
                    if is_unique_violation(&err) {
                        AppError::AlreadyExists
                    } else {
                        err.into()
                    }
                })?;
                Ok(())
            })
            .await
    }

    pub async fn find_by_number(&self, db: &DbHandle, number: &str) -> Result<Order, AppError> {
        let row: OrderRow = self
            .transactor
            .with_retry(|| async move {
                let mut conn = db.conn().await?;
                sqlx::query_as(
                    "SELECT number, user_id, status, accrual, uploaded_at, processed_at
                     FROM orders
                     WHERE number = $1",
                )
                .bind(number)
                .fetch_optional(conn.as_conn())
                .await?
                .ok_or(AppError::NotFound)
            })
            .await?;

        row.try_into()
    }

    /// All orders of one user, newest upload first.
    pub async fn list_by_user_id(&self, db: &DbHandle, user_id: i64) -> Result<Vec<Order>, AppError> {
        let rows: Vec<OrderRow> = self
            .transactor
            .with_retry(|| async move {
                let mut conn = db.conn().await?;
                Ok(sqlx::query_as(
                    "SELECT number, user_id, status, accrual, uploaded_at, processed_at
                     FROM orders
                     WHERE user_id = $1
                     ORDER BY uploaded_at DESC",
                )
                .bind(user_id)
                .fetch_all(conn.as_conn())
                .await?)
            })
            .await?;

        rows.into_iter().map(Order::try_from).collect()
    }

    /// Up to `limit` orders in any of the given statuses, oldest upload
    /// first so long-pending orders are served fairly.
    pub async fn list_by_statuses(
        &self,
        db: &DbHandle,
        statuses: &[OrderStatus],
        limit: i64,
    ) -> Result<Vec<Order>, AppError> {
        if statuses.is_empty() {
            return Ok(Vec::new());
        }
        let codes: Vec<i16> = statuses.iter().map(|s| s.code()).collect();

        let codes = &codes;
        let rows: Vec<OrderRow> = self
            .transactor
            .with_retry(|| async move {
                let mut conn = db.conn().await?;
                Ok(sqlx::query_as(
                    "SELECT number, user_id, status, accrual, uploaded_at, processed_at
                     FROM orders
                     WHERE status = ANY($1)
                     ORDER BY uploaded_at ASC
                     LIMIT $2",
                )
                .bind(&codes)
                .bind(limit)
                .fetch_all(conn.as_conn())
                .await?)
            })
            .await?;

        rows.into_iter().map(Order::try_from).collect()
    }

    /// Lazy variant of [`list_by_statuses`](Self::list_by_statuses): the
    /// cursor stays open while the caller iterates and closes when the
    /// stream is dropped or exhausted. Always reads from the pool, so rows
    /// can be consumed while other connections write.
    pub fn stream_by_statuses<'a>(
        &'a self,
        statuses: &[OrderStatus],
        limit: i64,
    ) -> impl Stream<Item = Result<Order, AppError>> + 'a {
        let codes: Vec<i16> = statuses.iter().map(|s| s.code()).collect();

        sqlx::query_as::<_, OrderRow>(
            "SELECT number, user_id, status, accrual, uploaded_at, processed_at
             FROM orders
             WHERE status = ANY($1)
             ORDER BY uploaded_at ASC
             LIMIT $2",
        )
        .bind(codes)
        .bind(limit)
        .fetch(self.transactor.pool())
        .map(|row| match row {
            Ok(row) => Order::try_from(row),
            Err(err) => Err(err.into()),
        })
    }

    /// Overwrites status, accrual and processed_at by order number.
    pub async fn update(&self, db: &DbHandle, order: &Order) -> Result<(), AppError> {
        self.transactor
            .with_retry(|| async move {
                let mut conn = db.conn().await?;
                sqlx::query(
                    "UPDATE orders
                     SET status = $1, accrual = $2, processed_at = $3
                     WHERE number = $4",
                )
                .bind(order.status.code())
                .bind(order.accrual)
                .bind(order.processed_at)
                .bind(&order.number)
                .execute(conn.as_conn())
                .await?;
                Ok(())
            })
            .await
    }
}
