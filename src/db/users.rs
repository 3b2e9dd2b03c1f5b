//! Users repository

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::domain::User;
use crate::error::AppError;

use super::{is_unique_violation, DbHandle, Transactor};

#[derive(sqlx::FromRow)]
struct UserRow {
    id: i64,
    login: String,
    password_hash: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<UserRow> for User {
    fn from(row: UserRow) -> Self {
        User {
            id: row.id,
            login: row.login,
            password_hash: row.password_hash,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

pub struct UserRepository {
    transactor: Arc<Transactor>,
}

impl UserRepository {
    pub fn new(transactor: Arc<Transactor>) -> Self {
        Self { transactor }
    }

    /// Inserts the user and writes the store-assigned id back into it.
    /// A taken login fails with [`AppError::AlreadyExists`].
    pub async fn create(&self, db: &DbHandle, user: &mut User) -> Result<(), AppError> {
        let row = &*user;
        let id: i64 = self
            .transactor
            .with_retry(|| async move {
                let mut conn = db.conn().await?;
                let (id,): (i64,) = sqlx::query_as(
                    "INSERT INTO users (login, password_hash, created_at, updated_at)
                     VALUES ($1, $2, $3, $4)
                     RETURNING id",
                )
                .bind(&row.login)
                .bind(&row.password_hash)
                .bind(row.created_at)
                .bind(row.updated_at)
                .fetch_one(conn.as_conn())
                .await
                .map_err(|err| {
                    if is_unique_violation(&err) {
                        AppError::AlreadyExists
                    } else {
                        err.into()
                    }
                })?;
                Ok(id)
            })
            .await?;

        user.id = id;
        Ok(())
    }

    pub async fn find_by_login(&self, db: &DbHandle, login: &str) -> Result<User, AppError> {
        let row: UserRow = self
            .transactor
            .with_retry(|| async move {
                let mut conn = db.conn().await?;
                sqlx::query_as(
                    "SELECT id, login, password_hash, created_at, updated_at
                     FROM users
                     WHERE login = $1",
                )
                .bind(login)
                .fetch_optional(conn.as_conn())
                .await?
                .ok_or(AppError::NotFound)
            })
            .await?;

        Ok(row.into())
    }

    pub async fn find_by_id(&self, db: &DbHandle, id: i64) -> Result<User, AppError> {
        let row: UserRow = self
            .transactor
            .with_retry(|| async move {
                let mut conn = db.conn().await?;
                sqlx::query_as(
                    "SELECT id, login, password_hash, created_at, updated_at
                     FROM users
                     WHERE id = $1",
                )
                .bind(id)
                .fetch_optional(conn.as_conn())
                .await?
                .ok_or(AppError::NotFound)
            })
            .await?;

        Ok(row.into())
    }
}
