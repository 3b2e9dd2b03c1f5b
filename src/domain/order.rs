use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

use crate::error::AppError;

/// Calculation status of an uploaded order. Stored as SMALLINT; INVALID and
/// PROCESSED are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderStatus {
    New,
    Processing,
    Invalid,
    Processed,
}

impl OrderStatus {
    pub fn code(self) -> i16 {
        match self {
            OrderStatus::New => 0,
            OrderStatus::Processing => 1,
            OrderStatus::Invalid => 2,
            OrderStatus::Processed => 3,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, OrderStatus::Invalid | OrderStatus::Processed)
    }
}

impl TryFrom<i16> for OrderStatus {
    type Error = AppError;

    fn try_from(code: i16) -> Result<Self, Self::Error> {
        match code {
            0 => Ok(OrderStatus::New),
            1 => Ok(OrderStatus::Processing),
            2 => Ok(OrderStatus::Invalid),
            3 => Ok(OrderStatus::Processed),
            other => Err(AppError::Internal(format!(
                "unknown order status code {other}"
            ))),
        }
    }
}

/// Order uploaded for points calculation, identified by its number
/// (natural key).
#[derive(Debug, Clone)]
pub struct Order {
    pub number: String,
    pub user_id: i64,
    pub status: OrderStatus,
    pub accrual: Option<Decimal>,
    pub uploaded_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
}

impl Order {
    pub fn new(number: String, user_id: i64, now: DateTime<Utc>) -> Self {
        Self {
            number,
            user_id,
            status: OrderStatus::New,
            accrual: None,
            uploaded_at: now,
            processed_at: None,
        }
    }

    /// The accrual system has registered the order and is calculating.
    pub fn mark_processing(&mut self) {
        self.status = OrderStatus::Processing;
    }

    /// Terminal: the order earned no points.
    pub fn mark_invalid(&mut self, now: DateTime<Utc>) {
        self.status = OrderStatus::Invalid;
        self.accrual = None;
        self.processed_at = Some(now);
    }

    /// Terminal: calculation finished, `accrual` points earned.
    pub fn mark_processed(&mut self, accrual: Decimal, now: DateTime<Utc>) {
        self.status = OrderStatus::Processed;
        self.accrual = Some(accrual);
        self.processed_at = Some(now);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn new_orders_start_pending() {
        let order = Order::new("2377225624".into(), 1, Utc::now());
        assert_eq!(order.status, OrderStatus::New);
        assert!(order.accrual.is_none());
        assert!(order.processed_at.is_none());
        assert!(!order.status.is_terminal());
    }

    #[test]
    fn mark_processed_records_accrual_and_time() {
        let mut order = Order::new("2377225624".into(), 1, Utc::now());
        let now = Utc::now();
        order.mark_processed(dec!(500), now);
        assert_eq!(order.status, OrderStatus::Processed);
        assert_eq!(order.accrual, Some(dec!(500)));
        assert_eq!(order.processed_at, Some(now));
        assert!(order.status.is_terminal());
    }

    #[test]
    fn mark_invalid_clears_accrual() {
        let mut order = Order::new("2377225624".into(), 1, Utc::now());
        order.mark_processed(dec!(10), Utc::now());
        order.mark_invalid(Utc::now());
        assert_eq!(order.status, OrderStatus::Invalid);
        assert!(order.accrual.is_none());
        assert!(order.status.is_terminal());
    }

    #[test]
    fn status_codes_round_trip() {
        for status in [
            OrderStatus::New,
            OrderStatus::Processing,
            OrderStatus::Invalid,
            OrderStatus::Processed,
        ] {
            assert_eq!(OrderStatus::try_from(status.code()).unwrap(), status);
        }
        assert!(OrderStatus::try_from(4).is_err());
    }

    #[test]
    fn statuses_serialize_uppercase() {
        assert_eq!(
            serde_json::to_value(OrderStatus::Processing).unwrap(),
            serde_json::json!("PROCESSING")
        );
    }
}
