//! PostgreSQL storage layer
//!
//! `Transactor` owns the pool and the retry policy; repositories receive a
//! `DbHandle` per call so the same method body runs both inside and outside
//! a transaction (the handle is the unit of work).

pub mod balances;
pub mod orders;
pub mod retry;
pub mod users;
pub mod withdrawals;

use std::future::Future;
use std::sync::Arc;

use sqlx::pool::PoolConnection;
use sqlx::{PgConnection, PgPool, Postgres, Transaction};
use tokio::sync::{Mutex, MutexGuard};
use tokio_util::sync::CancellationToken;

use crate::error::AppError;
use retry::RetryConfig;

/// Cheap-to-clone database handle: either the shared pool or one live
/// transaction. Repositories never care which.
#[derive(Clone)]
pub struct DbHandle {
    inner: HandleInner,
}

#[derive(Clone)]
enum HandleInner {
    Pool(PgPool),
    Tx(Arc<Mutex<Transaction<'static, Postgres>>>),
}

impl DbHandle {
    /// Checks out a connection: a pooled one, or the transaction's.
    pub async fn conn(&self) -> Result<ConnGuard<'_>, AppError> {
        match &self.inner {
            HandleInner::Pool(pool) => Ok(ConnGuard::Pool(pool.acquire().await?)),
            HandleInner::Tx(tx) => Ok(ConnGuard::Tx(tx.lock().await)),
        }
    }

    pub fn in_transaction(&self) -> bool {
        matches!(self.inner, HandleInner::Tx(_))
    }
}

pub enum ConnGuard<'a> {
    Pool(PoolConnection<Postgres>),
    Tx(MutexGuard<'a, Transaction<'static, Postgres>>),
}

impl ConnGuard<'_> {
    pub fn as_conn(&mut self) -> &mut PgConnection {
        match self {
            ConnGuard::Pool(conn) => &mut **conn,
            ConnGuard::Tx(guard) => &mut ***guard,
        }
    }
}

/// Runs units of work against PostgreSQL, retrying transient failures.
pub struct Transactor {
    pool: PgPool,
    retry: RetryConfig,
    shutdown: CancellationToken,
}

impl Transactor {
    pub fn new(pool: PgPool, retry: RetryConfig, shutdown: CancellationToken) -> Self {
        Self {
            pool,
            retry,
            shutdown,
        }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Pool-backed handle for work outside any transaction.
    pub fn handle(&self) -> DbHandle {
        DbHandle {
            inner: HandleInner::Pool(self.pool.clone()),
        }
    }

    /// Retries a single operation under the storage retry policy, without
    /// opening a transaction.
    pub async fn with_retry<T, F, Fut>(&self, op: F) -> Result<T, AppError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, AppError>>,
    {
        retry::retry(&self.retry, &self.shutdown, op).await
    }

    /// Runs `f` inside a transaction: commit on `Ok`, rollback on `Err`.
    /// The whole begin-to-commit unit is retried on transient failures, so
    /// `f` must be safe to re-run (it gets a fresh handle each attempt).
    pub async fn run_in_transaction<T, F, Fut>(&self, f: F) -> Result<T, AppError>
    where
        F: Fn(DbHandle) -> Fut,
        Fut: Future<Output = Result<T, AppError>>,
    {
        let f = &f;
        self.with_retry(|| async move {
            let tx = self.pool.begin().await?;
            let shared = Arc::new(Mutex::new(tx));
            let handle = DbHandle {
                inner: HandleInner::Tx(shared.clone()),
            };

            let result = f(handle).await;

            let tx = Arc::try_unwrap(shared)
                .map_err(|_| {
                    AppError::Internal("transaction handle escaped its unit of work".into())
                })?
                .into_inner();

            match result {
                Ok(value) => {
                    tx.commit().await?;
                    Ok(value)
                }
                Err(err) => {
                    let _ = tx.rollback().await;
                    Err(err)
                }
            }
        })
        .await
    }

    /// Like [`run_in_transaction`](Self::run_in_transaction), but reuses an
    /// already-transactional handle inline (no savepoints): the nested call
    /// joins the outer transaction and the outer caller commits.
    pub async fn run_in_transaction_with<T, F, Fut>(
        &self,
        db: &DbHandle,
        f: F,
    ) -> Result<T, AppError>
    where
        F: Fn(DbHandle) -> Fut,
        Fut: Future<Output = Result<T, AppError>>,
    {
        if db.in_transaction() {
            return f(db.clone()).await;
        }
        self.run_in_transaction(f).await
    }
}

/// True when the error is a PostgreSQL unique-constraint violation.
pub(crate) fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_unique_violation())
}
