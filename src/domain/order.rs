//! Order domain entity.
//! One checkout attempt: the held line items, the buyer snapshot and the
//! status that every resolution path competes to move.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::payment::PaymentMethod;

const ORDER_CODE_PREFIX: &str = "ORD";
const ORDER_CODE_LEN: usize = 10;

/// Status of an order. `Paid` and `Canceled` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    Pending,
    Paid,
    Canceled,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "PENDING",
            OrderStatus::Paid => "PAID",
            OrderStatus::Canceled => "CANCELED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, OrderStatus::Pending)
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(OrderStatus::Pending),
            "PAID" => Ok(OrderStatus::Paid),
            "CANCELED" => Ok(OrderStatus::Canceled),
            other => Err(UnknownVariant::new("order status", other)),
        }
    }
}

/// Why an order ended up `CANCELED`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CancelReason {
    User,
    Expired,
    PaymentFailed,
}

impl CancelReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            CancelReason::User => "USER",
            CancelReason::Expired => "EXPIRED",
            CancelReason::PaymentFailed => "PAYMENT_FAILED",
        }
    }
}

impl FromStr for CancelReason {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "USER" => Ok(CancelReason::User),
            "EXPIRED" => Ok(CancelReason::Expired),
            "PAYMENT_FAILED" => Ok(CancelReason::PaymentFailed),
            other => Err(UnknownVariant::new("cancel reason", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind}: {value}")]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}

impl UnknownVariant {
    pub fn new(kind: &'static str, value: &str) -> Self {
        Self {
            kind,
            value: value.to_string(),
        }
    }
}

/// Buyer contact details captured when the order is placed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuyerInfo {
    pub name: String,
    pub phone: String,
    pub email: String,
}

/// A held line. Name and price are copied from the ticket type at creation
/// and never re-read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineItem {
    pub ticket_type_id: Uuid,
    pub ticket_name: String,
    pub unit_price: i64,
    pub quantity: i32,
}

impl LineItem {
    pub fn subtotal(&self) -> Option<i64> {
        self.unit_price.checked_mul(i64::from(self.quantity))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: Uuid,
    pub code: String,
    pub user_id: String,
    pub event_id: Uuid,
    pub buyer: BuyerInfo,
    pub items: Vec<LineItem>,
    pub total_price: i64,
    pub status: OrderStatus,
    pub cancel_reason: Option<CancelReason>,
    pub payment_method: Option<PaymentMethod>,
    pub payment_reference: Option<String>,
    pub created_at: DateTime<Utc>,
    pub expired_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}

impl Order {
    /// Builds a fresh `PENDING` order. Returns `None` when the total overflows.
    pub fn new_pending(
        user_id: String,
        event_id: Uuid,
        buyer: BuyerInfo,
        items: Vec<LineItem>,
        created_at: DateTime<Utc>,
        expired_at: DateTime<Utc>,
    ) -> Option<Self> {
        let total_price = items
            .iter()
            .try_fold(0i64, |acc, item| acc.checked_add(item.subtotal()?))?;
        let id = Uuid::new_v4();

        Some(Self {
            id,
            code: order_code(id),
            user_id,
            event_id,
            buyer,
            items,
            total_price,
            status: OrderStatus::Pending,
            cancel_reason: None,
            payment_method: None,
            payment_reference: None,
            created_at,
            expired_at,
            resolved_at: None,
        })
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expired_at < now
    }

    pub fn total_quantity(&self) -> i64 {
        self.items.iter().map(|i| i64::from(i.quantity)).sum()
    }
}

/// Human-readable code derived from the order id, e.g. `ORD7F3A9C21B0`.
pub fn order_code(id: Uuid) -> String {
    let simple = id.simple().to_string().to_uppercase();
    format!("{}{}", ORDER_CODE_PREFIX, &simple[..ORDER_CODE_LEN])
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn item(price: i64, qty: i32) -> LineItem {
        LineItem {
            ticket_type_id: Uuid::new_v4(),
            ticket_name: "VIP".to_string(),
            unit_price: price,
            quantity: qty,
        }
    }

    fn buyer() -> BuyerInfo {
        BuyerInfo {
            name: "Linh Tran".to_string(),
            phone: "0901234567".to_string(),
            email: "linh@example.com".to_string(),
        }
    }

    #[test]
    fn test_status_round_trips_through_text() {
        for status in [OrderStatus::Pending, OrderStatus::Paid, OrderStatus::Canceled] {
            assert_eq!(status.as_str().parse::<OrderStatus>().unwrap(), status);
        }
        assert!("SHIPPED".parse::<OrderStatus>().is_err());
    }

    #[test]
    fn test_only_pending_is_non_terminal() {
        assert!(!OrderStatus::Pending.is_terminal());
        assert!(OrderStatus::Paid.is_terminal());
        assert!(OrderStatus::Canceled.is_terminal());
    }

    #[test]
    fn test_new_pending_computes_total() {
        let now = Utc::now();
        let order = Order::new_pending(
            "user-1".to_string(),
            Uuid::new_v4(),
            buyer(),
            vec![item(150_000, 2), item(50_000, 1)],
            now,
            now + Duration::minutes(15),
        )
        .unwrap();

        assert_eq!(order.total_price, 350_000);
        assert_eq!(order.total_quantity(), 3);
        assert_eq!(order.status, OrderStatus::Pending);
        assert!(order.code.starts_with("ORD"));
        assert_eq!(order.code.len(), 13);
    }

    #[test]
    fn test_new_pending_rejects_overflowing_total() {
        let now = Utc::now();
        let order = Order::new_pending(
            "user-1".to_string(),
            Uuid::new_v4(),
            buyer(),
            vec![item(i64::MAX, 2)],
            now,
            now,
        );
        assert!(order.is_none());
    }

    #[test]
    fn test_expiry_is_strictly_after_deadline() {
        let now = Utc::now();
        let order = Order::new_pending(
            "user-1".to_string(),
            Uuid::new_v4(),
            buyer(),
            vec![item(1, 1)],
            now,
            now + Duration::minutes(15),
        )
        .unwrap();

        assert!(!order.is_expired_at(order.expired_at));
        assert!(order.is_expired_at(order.expired_at + Duration::seconds(1)));
    }

    #[test]
    fn test_status_serializes_screaming_case() {
        let json = serde_json::to_string(&OrderStatus::Canceled).unwrap();
        assert_eq!(json, "\"CANCELED\"");
    }
}
