use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A purchasable category within an event together with its inventory
/// counters. `reserved + sold <= total_quantity` always holds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TicketType {
    pub id: Uuid,
    pub event_id: Uuid,
    pub name: String,
    pub price: i64,
    pub total_quantity: i32,
    pub reserved: i32,
    pub sold: i32,
    pub max_per_order: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TicketType {
    pub fn available(&self) -> i32 {
        self.total_quantity - self.reserved - self.sold
    }

    pub fn can_hold(&self, quantity: i32) -> bool {
        quantity > 0 && self.reserved + self.sold + quantity <= self.total_quantity
    }
}

/// Input for seeding a ticket type.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewTicketType {
    pub event_id: Uuid,
    pub name: String,
    pub price: i64,
    pub total_quantity: i32,
    pub max_per_order: i32,
}

impl NewTicketType {
    pub fn validate(&self) -> Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("name must not be empty".to_string());
        }
        if self.price < 0 {
            return Err("price must not be negative".to_string());
        }
        if self.total_quantity < 0 {
            return Err("total quantity must not be negative".to_string());
        }
        if self.max_per_order <= 0 {
            return Err("max per order must be positive".to_string());
        }
        Ok(())
    }

    pub fn into_ticket_type(self, now: DateTime<Utc>) -> TicketType {
        TicketType {
            id: Uuid::new_v4(),
            event_id: self.event_id,
            name: self.name.trim().to_string(),
            price: self.price,
            total_quantity: self.total_quantity,
            reserved: 0,
            sold: 0,
            max_per_order: self.max_per_order,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Result of a conditional hold attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reservation {
    Reserved,
    Insufficient { available: i32 },
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ticket(total: i32, reserved: i32, sold: i32) -> TicketType {
        NewTicketType {
            event_id: Uuid::new_v4(),
            name: "GA".to_string(),
            price: 100,
            total_quantity: total,
            max_per_order: 4,
        }
        .into_ticket_type(Utc::now())
        .with_counts(reserved, sold)
    }

    impl TicketType {
        fn with_counts(mut self, reserved: i32, sold: i32) -> Self {
            self.reserved = reserved;
            self.sold = sold;
            self
        }
    }

    #[test]
    fn test_available_accounts_for_held_and_sold() {
        assert_eq!(ticket(10, 3, 2).available(), 5);
    }

    #[test]
    fn test_can_hold_respects_capacity() {
        let t = ticket(10, 6, 0);
        assert!(t.can_hold(4));
        assert!(!t.can_hold(5));
        assert!(!t.can_hold(0));
    }

    #[test]
    fn test_new_ticket_type_validation() {
        let mut input = NewTicketType {
            event_id: Uuid::new_v4(),
            name: "  ".to_string(),
            price: 10,
            total_quantity: 5,
            max_per_order: 2,
        };
        assert!(input.validate().is_err());
        input.name = "VIP".to_string();
        assert!(input.validate().is_ok());
        input.max_per_order = 0;
        assert!(input.validate().is_err());
    }
}
