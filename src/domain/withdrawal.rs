use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

/// Append-only record of points spent against an order number. The number
/// names what was paid for and need not exist as an uploaded order.
#[derive(Debug, Clone)]
pub struct Withdrawal {
    pub user_id: i64,
    pub order_number: String,
    pub amount: Decimal,
    pub processed_at: DateTime<Utc>,
}
