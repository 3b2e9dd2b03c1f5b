//! Password hashing (bcrypt)
//!
//! bcrypt is deliberately slow, so both operations run on the blocking
//! thread pool instead of stalling the async executor.

use crate::error::AppError;

#[derive(Debug, Clone, Copy)]
pub struct PasswordHasher {
    cost: u32,
}

impl PasswordHasher {
    /// Creates a hasher with the given bcrypt cost, clamped to the valid
    /// 4..=31 range.
    pub fn new(cost: u32) -> Self {
        Self {
            cost: cost.clamp(4, 31),
        }
    }

    pub async fn hash(&self, plain: &str) -> Result<String, AppError> {
        let cost = self.cost;
        let plain = plain.to_owned();
        tokio::task::spawn_blocking(move || bcrypt::hash(plain, cost))
            .await
            .map_err(|err| AppError::Internal(format!("hash task failed: {err}")))?
            .map_err(AppError::from)
    }

    /// Constant-time comparison of `plain` against a stored hash. Any
    /// failure (including a malformed hash) reads as a mismatch.
    pub async fn verify(&self, plain: &str, hash: &str) -> bool {
        let plain = plain.to_owned();
        let hash = hash.to_owned();
        tokio::task::spawn_blocking(move || bcrypt::verify(plain, &hash).unwrap_or(false))
            .await
            .unwrap_or(false)
    }
}
