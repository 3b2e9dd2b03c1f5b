use chrono::{DateTime, Utc};

/// Registered account holder. The id is assigned by the store on insert;
/// the login never changes afterwards.
#[derive(Debug, Clone)]
pub struct User {
    pub id: i64,
    pub login: String,
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn new(login: String, password_hash: String, now: DateTime<Utc>) -> Self {
        Self {
            id: 0,
            login,
            password_hash,
            created_at: now,
            updated_at: now,
        }
    }
}
