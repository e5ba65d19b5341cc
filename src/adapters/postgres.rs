//! Postgres implementation of the inventory ledger and reservation store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::db::models::OrderRow;
use crate::db::queries;
use crate::domain::{
    LineItem, NewTicketType, Order, OrderStatus, PaymentMethod, Reservation, TicketType,
};
use crate::ports::{
    Creation, InventoryLedger, LatePayment, LedgerEffect, RepositoryError, RepositoryResult,
    ReservationStore, Transition, TransitionOutcome,
};

/// Postgres-backed ledger and store sharing one pool.
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn hydrate(&self, row: Option<OrderRow>, what: String) -> RepositoryResult<Order> {
        let row = row.ok_or(RepositoryError::NotFound(what))?;
        let items = queries::get_order_items(&self.pool, row.id).await?;
        row.into_domain(items)
    }
}

#[async_trait]
impl InventoryLedger for PostgresStore {
    async fn ticket_type(&self, id: Uuid) -> RepositoryResult<TicketType> {
        queries::get_ticket_type(&self.pool, id)
            .await?
            .map(TicketType::from)
            .ok_or_else(|| RepositoryError::NotFound(format!("ticket type {}", id)))
    }

    async fn create_ticket_type(&self, input: NewTicketType) -> RepositoryResult<TicketType> {
        let ticket = input.into_ticket_type(Utc::now());
        let row = queries::insert_ticket_type(&self.pool, &ticket).await?;
        Ok(row.into())
    }

    async fn try_reserve(&self, id: Uuid, quantity: i32) -> RepositoryResult<Reservation> {
        let mut tx = self.pool.begin().await?;
        if queries::reserve_tickets(&mut tx, id, quantity).await?.is_some() {
            tx.commit().await?;
            return Ok(Reservation::Reserved);
        }
        tx.rollback().await?;

        // The conditional update refused; report what is left for the message.
        let ticket = self.ticket_type(id).await?;
        Ok(Reservation::Insufficient {
            available: ticket.available(),
        })
    }

    async fn finalize(&self, id: Uuid, quantity: i32) -> RepositoryResult<()> {
        let mut tx = self.pool.begin().await?;
        if !queries::finalize_tickets(&mut tx, id, quantity).await? {
            tx.rollback().await?;
            return Err(RepositoryError::Inconsistent(format!(
                "ticket type {} cannot finalize {}",
                id, quantity
            )));
        }
        tx.commit().await?;
        Ok(())
    }

    async fn release(&self, id: Uuid, quantity: i32) -> RepositoryResult<()> {
        let mut tx = self.pool.begin().await?;
        if !queries::release_tickets(&mut tx, id, quantity).await? {
            tx.rollback().await?;
            return Err(RepositoryError::Inconsistent(format!(
                "ticket type {} cannot release {}",
                id, quantity
            )));
        }
        tx.commit().await?;
        Ok(())
    }
}

#[async_trait]
impl ReservationStore for PostgresStore {
    async fn create(&self, order: &Order) -> RepositoryResult<Creation> {
        let mut lines: Vec<&LineItem> = order.items.iter().collect();
        lines.sort_by_key(|item| item.ticket_type_id);

        // Holds and rows commit together. An early return or a dropped future
        // drops `tx`, which rolls every hold back.
        let mut tx = self.pool.begin().await?;
        for item in lines {
            if queries::reserve_tickets(&mut tx, item.ticket_type_id, item.quantity)
                .await?
                .is_none()
            {
                tx.rollback().await?;
                let ticket = self.ticket_type(item.ticket_type_id).await?;
                return Ok(Creation::Insufficient {
                    ticket_type_id: item.ticket_type_id,
                    available: ticket.available(),
                });
            }
        }

        queries::insert_order(&mut tx, order).await?;
        tx.commit().await?;
        Ok(Creation::Created(order.id))
    }

    async fn get(&self, id: Uuid) -> RepositoryResult<Order> {
        let row = queries::get_order_row(&self.pool, id).await?;
        self.hydrate(row, format!("order {}", id)).await
    }

    async fn get_by_code(&self, code: &str) -> RepositoryResult<Order> {
        let row = queries::get_order_row_by_code(&self.pool, code).await?;
        self.hydrate(row, format!("order code {}", code)).await
    }

    async fn find_by_payment_reference(&self, reference: &str) -> RepositoryResult<Order> {
        let row = queries::get_order_row_by_reference(&self.pool, reference).await?;
        self.hydrate(row, format!("payment reference {}", reference))
            .await
    }

    async fn attach_payment_session(
        &self,
        id: Uuid,
        method: PaymentMethod,
        reference: &str,
    ) -> RepositoryResult<bool> {
        let mut tx = self.pool.begin().await?;
        let attached = queries::attach_payment_session(&mut tx, id, method, reference).await?;
        if !attached {
            tx.rollback().await?;
            if queries::get_order_status(&self.pool, id).await?.is_none() {
                return Err(RepositoryError::NotFound(format!("order {}", id)));
            }
            return Ok(false);
        }
        tx.commit().await?;
        Ok(true)
    }

    async fn compare_and_transition(
        &self,
        id: Uuid,
        transition: Transition,
    ) -> RepositoryResult<TransitionOutcome> {
        let mut tx = self.pool.begin().await?;

        // The row lock taken by this UPDATE serializes racing resolvers; the
        // loser re-evaluates `status = from` after we commit and matches nothing.
        let Some(row) = queries::transition_order_status(&mut tx, id, &transition).await? else {
            tx.rollback().await?;
            let current = queries::get_order_status(&self.pool, id)
                .await?
                .ok_or_else(|| RepositoryError::NotFound(format!("order {}", id)))?;
            let current: OrderStatus = current.parse().map_err(|e| {
                RepositoryError::Inconsistent(format!("order {}: {}", id, e))
            })?;
            return Ok(TransitionOutcome::Skipped { current });
        };

        let items = queries::get_order_items_in_lock_order(&mut tx, id).await?;
        for item in &items {
            let applied = match transition.effect {
                LedgerEffect::Finalize => {
                    queries::finalize_tickets(&mut tx, item.ticket_type_id, item.quantity).await?
                }
                LedgerEffect::Release => {
                    queries::release_tickets(&mut tx, item.ticket_type_id, item.quantity).await?
                }
            };
            if !applied {
                tx.rollback().await?;
                return Err(RepositoryError::Inconsistent(format!(
                    "order {}: ticket type {} holds fewer than {} reserved",
                    id, item.ticket_type_id, item.quantity
                )));
            }
        }

        tx.commit().await?;
        Ok(TransitionOutcome::Applied(row.into_domain(items)?))
    }

    async fn find_expired_pending(
        &self,
        now: DateTime<Utc>,
        limit: i64,
    ) -> RepositoryResult<Vec<Uuid>> {
        Ok(queries::find_expired_pending(&self.pool, now, limit).await?)
    }

    async fn record_late_payment(&self, late: &LatePayment) -> RepositoryResult<()> {
        Ok(queries::insert_late_payment(&self.pool, late).await?)
    }

    async fn health_check(&self) -> RepositoryResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
