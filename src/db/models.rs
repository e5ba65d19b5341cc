use chrono::{DateTime, Utc};
use sqlx::FromRow;
use uuid::Uuid;

use crate::domain::{BuyerInfo, LineItem, Order, TicketType};
use crate::ports::{RepositoryError, RepositoryResult};

#[derive(Debug, FromRow)]
pub struct TicketTypeRow {
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

impl From<TicketTypeRow> for TicketType {
    fn from(row: TicketTypeRow) -> Self {
        TicketType {
            id: row.id,
            event_id: row.event_id,
            name: row.name,
            price: row.price,
            total_quantity: row.total_quantity,
            reserved: row.reserved,
            sold: row.sold,
            max_per_order: row.max_per_order,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Debug, FromRow)]
pub struct OrderRow {
    pub id: Uuid,
    pub code: String,
    pub user_id: String,
    pub event_id: Uuid,
    pub buyer_name: String,
    pub buyer_phone: String,
    pub buyer_email: String,
    pub total_price: i64,
    pub status: String,
    pub cancel_reason: Option<String>,
    pub payment_method: Option<String>,
    pub payment_reference: Option<String>,
    pub created_at: DateTime<Utc>,
    pub expired_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}

#[derive(Debug, FromRow)]
pub struct OrderItemRow {
    pub position: i32,
    pub ticket_type_id: Uuid,
    pub ticket_name: String,
    pub unit_price: i64,
    pub quantity: i32,
}

impl From<OrderItemRow> for LineItem {
    fn from(row: OrderItemRow) -> Self {
        LineItem {
            ticket_type_id: row.ticket_type_id,
            ticket_name: row.ticket_name,
            unit_price: row.unit_price,
            quantity: row.quantity,
        }
    }
}

impl OrderRow {
    pub fn into_domain(self, mut items: Vec<OrderItemRow>) -> RepositoryResult<Order> {
        let id = self.id;
        items.sort_by_key(|item| item.position);
        let corrupt = |e: crate::domain::order::UnknownVariant| {
            RepositoryError::Inconsistent(format!("order {}: {}", id, e))
        };

        Ok(Order {
            id,
            code: self.code,
            user_id: self.user_id,
            event_id: self.event_id,
            buyer: BuyerInfo {
                name: self.buyer_name,
                phone: self.buyer_phone,
                email: self.buyer_email,
            },
            items: items.into_iter().map(LineItem::from).collect(),
            total_price: self.total_price,
            status: self.status.parse().map_err(corrupt)?,
            cancel_reason: self
                .cancel_reason
                .as_deref()
                .map(str::parse)
                .transpose()
                .map_err(corrupt)?,
            payment_method: self
                .payment_method
                .as_deref()
                .map(str::parse)
                .transpose()
                .map_err(corrupt)?,
            payment_reference: self.payment_reference,
            created_at: self.created_at,
            expired_at: self.expired_at,
            resolved_at: self.resolved_at,
        })
    }
}
