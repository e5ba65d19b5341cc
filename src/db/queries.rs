use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Result, Transaction as SqlxTransaction};
use uuid::Uuid;

use crate::db::models::{OrderItemRow, OrderRow, TicketTypeRow};
use crate::domain::{Order, OrderStatus, PaymentMethod, TicketType};
use crate::ports::{LatePayment, Transition};

const ORDER_COLUMNS: &str = r#"
    id, code, user_id, event_id, buyer_name, buyer_phone, buyer_email,
    total_price, status, cancel_reason, payment_method, payment_reference,
    created_at, expired_at, resolved_at
"#;

// --- Ticket type queries ---

pub async fn insert_ticket_type(pool: &PgPool, ticket: &TicketType) -> Result<TicketTypeRow> {
    sqlx::query_as::<_, TicketTypeRow>(
        r#"
        INSERT INTO ticket_types (
            id, event_id, name, price, total_quantity, reserved, sold,
            max_per_order, created_at, updated_at
        ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        RETURNING *
        "#,
    )
    .bind(ticket.id)
    .bind(ticket.event_id)
    .bind(&ticket.name)
    .bind(ticket.price)
    .bind(ticket.total_quantity)
    .bind(ticket.reserved)
    .bind(ticket.sold)
    .bind(ticket.max_per_order)
    .bind(ticket.created_at)
    .bind(ticket.updated_at)
    .fetch_one(pool)
    .await
}

pub async fn get_ticket_type(pool: &PgPool, id: Uuid) -> Result<Option<TicketTypeRow>> {
    sqlx::query_as::<_, TicketTypeRow>("SELECT * FROM ticket_types WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await
}

/// Conditional hold in a single statement. Returns the updated row, or `None`
/// when capacity would be exceeded.
pub async fn reserve_tickets(
    executor: &mut SqlxTransaction<'_, Postgres>,
    id: Uuid,
    quantity: i32,
) -> Result<Option<TicketTypeRow>> {
    sqlx::query_as::<_, TicketTypeRow>(
        r#"
        UPDATE ticket_types
        SET reserved = reserved + $2, updated_at = NOW()
        WHERE id = $1 AND reserved + sold + $2 <= total_quantity
        RETURNING *
        "#,
    )
    .bind(id)
    .bind(quantity)
    .fetch_optional(&mut **executor)
    .await
}

/// Returns `false` when fewer than `quantity` tickets are held.
pub async fn finalize_tickets(
    executor: &mut SqlxTransaction<'_, Postgres>,
    id: Uuid,
    quantity: i32,
) -> Result<bool> {
    let result = sqlx::query(
        r#"
        UPDATE ticket_types
        SET reserved = reserved - $2, sold = sold + $2, updated_at = NOW()
        WHERE id = $1 AND reserved >= $2
        "#,
    )
    .bind(id)
    .bind(quantity)
    .execute(&mut **executor)
    .await?;

    Ok(result.rows_affected() == 1)
}

/// Returns `false` when fewer than `quantity` tickets are held.
pub async fn release_tickets(
    executor: &mut SqlxTransaction<'_, Postgres>,
    id: Uuid,
    quantity: i32,
) -> Result<bool> {
    let result = sqlx::query(
        r#"
        UPDATE ticket_types
        SET reserved = reserved - $2, updated_at = NOW()
        WHERE id = $1 AND reserved >= $2
        "#,
    )
    .bind(id)
    .bind(quantity)
    .execute(&mut **executor)
    .await?;

    Ok(result.rows_affected() == 1)
}

// --- Order queries ---

pub async fn insert_order(executor: &mut SqlxTransaction<'_, Postgres>, order: &Order) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO orders (
            id, code, user_id, event_id, buyer_name, buyer_phone, buyer_email,
            total_price, status, cancel_reason, payment_method, payment_reference,
            created_at, expired_at, resolved_at
        ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
        "#,
    )
    .bind(order.id)
    .bind(&order.code)
    .bind(&order.user_id)
    .bind(order.event_id)
    .bind(&order.buyer.name)
    .bind(&order.buyer.phone)
    .bind(&order.buyer.email)
    .bind(order.total_price)
    .bind(order.status.as_str())
    .bind(order.cancel_reason.map(|r| r.as_str()))
    .bind(order.payment_method.map(|m| m.as_str()))
    .bind(&order.payment_reference)
    .bind(order.created_at)
    .bind(order.expired_at)
    .bind(order.resolved_at)
    .execute(&mut **executor)
    .await?;

    for (position, item) in order.items.iter().enumerate() {
        sqlx::query(
            r#"
            INSERT INTO order_items (
                order_id, position, ticket_type_id, ticket_name, unit_price, quantity
            ) VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(order.id)
        .bind(position as i32)
        .bind(item.ticket_type_id)
        .bind(&item.ticket_name)
        .bind(item.unit_price)
        .bind(item.quantity)
        .execute(&mut **executor)
        .await?;
    }

    Ok(())
}

pub async fn get_order_row(pool: &PgPool, id: Uuid) -> Result<Option<OrderRow>> {
    sqlx::query_as::<_, OrderRow>(&format!("SELECT {} FROM orders WHERE id = $1", ORDER_COLUMNS))
        .bind(id)
        .fetch_optional(pool)
        .await
}

pub async fn get_order_row_by_code(pool: &PgPool, code: &str) -> Result<Option<OrderRow>> {
    sqlx::query_as::<_, OrderRow>(&format!(
        "SELECT {} FROM orders WHERE code = $1",
        ORDER_COLUMNS
    ))
    .bind(code)
    .fetch_optional(pool)
    .await
}

pub async fn get_order_row_by_reference(pool: &PgPool, reference: &str) -> Result<Option<OrderRow>> {
    sqlx::query_as::<_, OrderRow>(&format!(
        r#"
        SELECT {} FROM orders
        WHERE id = (SELECT order_id FROM payment_sessions WHERE reference = $1)
        "#,
        ORDER_COLUMNS
    ))
    .bind(reference)
    .fetch_optional(pool)
    .await
}

pub async fn get_order_items(pool: &PgPool, order_id: Uuid) -> Result<Vec<OrderItemRow>> {
    sqlx::query_as::<_, OrderItemRow>(
        r#"
        SELECT position, ticket_type_id, ticket_name, unit_price, quantity
        FROM order_items
        WHERE order_id = $1
        ORDER BY position
        "#,
    )
    .bind(order_id)
    .fetch_all(pool)
    .await
}

/// Line items in lock order (by ticket type) for applying ledger effects.
/// Sort by `position` before handing them out.
pub async fn get_order_items_in_lock_order(
    executor: &mut SqlxTransaction<'_, Postgres>,
    order_id: Uuid,
) -> Result<Vec<OrderItemRow>> {
    sqlx::query_as::<_, OrderItemRow>(
        r#"
        SELECT position, ticket_type_id, ticket_name, unit_price, quantity
        FROM order_items
        WHERE order_id = $1
        ORDER BY ticket_type_id
        "#,
    )
    .bind(order_id)
    .fetch_all(&mut **executor)
    .await
}

/// The compare half of compare-and-transition. Returns `None` when the order
/// is not in `transition.from`.
pub async fn transition_order_status(
    executor: &mut SqlxTransaction<'_, Postgres>,
    id: Uuid,
    transition: &Transition,
) -> Result<Option<OrderRow>> {
    sqlx::query_as::<_, OrderRow>(&format!(
        r#"
        UPDATE orders
        SET status = $3, cancel_reason = $4, resolved_at = NOW(), updated_at = NOW()
        WHERE id = $1 AND status = $2
        RETURNING {}
        "#,
        ORDER_COLUMNS
    ))
    .bind(id)
    .bind(transition.from.as_str())
    .bind(transition.to.as_str())
    .bind(transition.reason.map(|r| r.as_str()))
    .fetch_optional(&mut **executor)
    .await
}

pub async fn get_order_status(pool: &PgPool, id: Uuid) -> Result<Option<String>> {
    sqlx::query_scalar::<_, String>("SELECT status FROM orders WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await
}

/// Registers a session and points the order at it, only while pending.
pub async fn attach_payment_session(
    executor: &mut SqlxTransaction<'_, Postgres>,
    order_id: Uuid,
    method: PaymentMethod,
    reference: &str,
) -> Result<bool> {
    let updated = sqlx::query(
        r#"
        UPDATE orders
        SET payment_method = $2, payment_reference = $3, updated_at = NOW()
        WHERE id = $1 AND status = $4
        "#,
    )
    .bind(order_id)
    .bind(method.as_str())
    .bind(reference)
    .bind(OrderStatus::Pending.as_str())
    .execute(&mut **executor)
    .await?;

    if updated.rows_affected() == 0 {
        return Ok(false);
    }

    sqlx::query(
        r#"
        INSERT INTO payment_sessions (reference, order_id, method, created_at)
        VALUES ($1, $2, $3, NOW())
        "#,
    )
    .bind(reference)
    .bind(order_id)
    .bind(method.as_str())
    .execute(&mut **executor)
    .await?;

    Ok(true)
}

pub async fn find_expired_pending(
    pool: &PgPool,
    now: DateTime<Utc>,
    limit: i64,
) -> Result<Vec<Uuid>> {
    sqlx::query_scalar::<_, Uuid>(
        r#"
        SELECT id FROM orders
        WHERE status = $1 AND expired_at < $2
        ORDER BY expired_at ASC
        LIMIT $3
        "#,
    )
    .bind(OrderStatus::Pending.as_str())
    .bind(now)
    .bind(limit)
    .fetch_all(pool)
    .await
}

// --- Reconciliation ---

pub async fn insert_late_payment(pool: &PgPool, late: &LatePayment) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO late_payments (
            id, order_id, reference, provider_transaction_id, amount, order_status, received_at
        ) VALUES ($1, $2, $3, $4, $5, $6, $7)
        ON CONFLICT (reference, provider_transaction_id) DO NOTHING
        "#,
    )
    .bind(late.id)
    .bind(late.order_id)
    .bind(&late.reference)
    .bind(late.provider_transaction_id.as_deref().unwrap_or(""))
    .bind(late.amount)
    .bind(late.order_status.as_str())
    .bind(late.received_at)
    .execute(pool)
    .await?;

    Ok(())
}
