use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use crate::error::AppError;

/// Per-user loyalty account. `version` backs optimistic locking in the
/// store: every successful update increments it by exactly one, and a
/// writer holding a stale version loses.
#[derive(Debug, Clone)]
pub struct BalanceAccount {
    pub user_id: i64,
    pub current: Decimal,
    pub withdrawn_total: Decimal,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub version: i64,
}

impl BalanceAccount {
    /// Fresh zero-balance account, created together with its user.
    pub fn new(user_id: i64, now: DateTime<Utc>) -> Self {
        Self {
            user_id,
            current: Decimal::ZERO,
            withdrawn_total: Decimal::ZERO,
            created_at: now,
            updated_at: now,
            version: 0,
        }
    }

    /// Adds accrued points. Non-positive amounts are ignored.
    pub fn credit(&mut self, amount: Decimal, now: DateTime<Utc>) {
        if amount <= Decimal::ZERO {
            return;
        }
        self.current += amount;
        self.updated_at = now;
    }

    /// Moves `amount` from `current` to `withdrawn_total`. Non-positive
    /// amounts are a no-op; overdrafts fail.
    pub fn withdraw(&mut self, amount: Decimal, now: DateTime<Utc>) -> Result<(), AppError> {
        if amount <= Decimal::ZERO {
            return Ok(());
        }
        if self.current < amount {
            return Err(AppError::InsufficientBalance);
        }
        self.current -= amount;
        self.withdrawn_total += amount;
        self.updated_at = now;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn account(current: Decimal) -> BalanceAccount {
        let mut acc = BalanceAccount::new(1, Utc::now());
        acc.current = current;
        acc
    }

    #[test]
    fn credit_adds_points() {
        let mut acc = account(dec!(0));
        acc.credit(dec!(500), Utc::now());
        assert_eq!(acc.current, dec!(500));
        assert_eq!(acc.withdrawn_total, dec!(0));
    }

    #[test]
    fn credit_ignores_non_positive_amounts() {
        let mut acc = account(dec!(100));
        acc.credit(dec!(0), Utc::now());
        acc.credit(dec!(-10), Utc::now());
        assert_eq!(acc.current, dec!(100));
    }

    #[test]
    fn withdraw_moves_points_to_withdrawn_total() {
        let mut acc = account(dec!(500));
        acc.withdraw(dec!(200), Utc::now()).unwrap();
        assert_eq!(acc.current, dec!(300));
        assert_eq!(acc.withdrawn_total, dec!(200));
    }

    #[test]
    fn withdraw_allows_exactly_current() {
        let mut acc = account(dec!(42.42));
        acc.withdraw(dec!(42.42), Utc::now()).unwrap();
        assert_eq!(acc.current, dec!(0));
        assert_eq!(acc.withdrawn_total, dec!(42.42));
    }

    #[test]
    fn withdraw_rejects_overdraft() {
        let mut acc = account(dec!(100));
        let err = acc.withdraw(dec!(100.01), Utc::now()).unwrap_err();
        assert!(matches!(err, AppError::InsufficientBalance));
        assert_eq!(acc.current, dec!(100));
        assert_eq!(acc.withdrawn_total, dec!(0));
    }

    #[test]
    fn withdraw_ignores_non_positive_amounts() {
        let mut acc = account(dec!(100));
        acc.withdraw(dec!(0), Utc::now()).unwrap();
        acc.withdraw(dec!(-5), Utc::now()).unwrap();
        assert_eq!(acc.current, dec!(100));
    }
}
