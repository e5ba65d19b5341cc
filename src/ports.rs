//! Storage seams used by the order orchestrator.
//!
//! `InventoryLedger` owns the per-ticket-type counters and `ReservationStore`
//! owns order rows. An adapter implementing both must apply a
//! [`Transition`] and its [`LedgerEffect`] as one atomic unit.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use crate::domain::{
    CancelReason, NewTicketType, Order, OrderStatus, PaymentMethod, Reservation, TicketType,
};

#[derive(Error, Debug)]
pub enum RepositoryError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("inconsistent state: {0}")]
    Inconsistent(String),
}

pub type RepositoryResult<T> = Result<T, RepositoryError>;

/// Counter movement applied to every line of an order when its status changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedgerEffect {
    /// reserved -> sold
    Finalize,
    /// reserved -> available
    Release,
}

/// A guarded status change: applies only while the order is in `from`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub from: OrderStatus,
    pub to: OrderStatus,
    pub effect: LedgerEffect,
    pub reason: Option<CancelReason>,
}

impl Transition {
    pub fn pay() -> Self {
        Self {
            from: OrderStatus::Pending,
            to: OrderStatus::Paid,
            effect: LedgerEffect::Finalize,
            reason: None,
        }
    }

    pub fn cancel(reason: CancelReason) -> Self {
        Self {
            from: OrderStatus::Pending,
            to: OrderStatus::Canceled,
            effect: LedgerEffect::Release,
            reason: Some(reason),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransitionOutcome {
    /// The compare matched; the order now holds the target status.
    Applied(Order),
    /// Someone else resolved the order first.
    Skipped { current: OrderStatus },
}

/// Result of creating an order together with its holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Creation {
    Created(Uuid),
    /// One line could not be held; nothing was written.
    Insufficient { ticket_type_id: Uuid, available: i32 },
}

/// A success callback that arrived after the order had been released.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LatePayment {
    pub id: Uuid,
    pub order_id: Uuid,
    pub reference: String,
    pub provider_transaction_id: Option<String>,
    pub amount: Option<i64>,
    pub order_status: OrderStatus,
    pub received_at: DateTime<Utc>,
}

#[async_trait]
pub trait InventoryLedger: Send + Sync {
    async fn ticket_type(&self, id: Uuid) -> RepositoryResult<TicketType>;

    async fn create_ticket_type(&self, input: NewTicketType) -> RepositoryResult<TicketType>;

    /// Increments `reserved` by `quantity` only if capacity allows, in one
    /// indivisible step.
    async fn try_reserve(&self, id: Uuid, quantity: i32) -> RepositoryResult<Reservation>;

    /// Moves `quantity` from reserved to sold. Only call behind an order
    /// transition; it is not idempotent on its own.
    async fn finalize(&self, id: Uuid, quantity: i32) -> RepositoryResult<()>;

    /// Returns `quantity` held tickets to the pool. Same gating rule as
    /// `finalize`.
    async fn release(&self, id: Uuid, quantity: i32) -> RepositoryResult<()>;
}

#[async_trait]
pub trait ReservationStore: Send + Sync {
    /// Holds every line of `order` in ticket-type order and inserts the order,
    /// as one unit. On `Insufficient` or any error no hold and no row remain.
    async fn create(&self, order: &Order) -> RepositoryResult<Creation>;

    async fn get(&self, id: Uuid) -> RepositoryResult<Order>;

    async fn get_by_code(&self, code: &str) -> RepositoryResult<Order>;

    async fn find_by_payment_reference(&self, reference: &str) -> RepositoryResult<Order>;

    /// Records a new payment session and makes it the order's current one.
    /// Returns `false` without writing when the order is no longer pending.
    async fn attach_payment_session(
        &self,
        id: Uuid,
        method: PaymentMethod,
        reference: &str,
    ) -> RepositoryResult<bool>;

    /// Atomically checks `transition.from`, sets `transition.to` and applies
    /// `transition.effect` to every line item.
    async fn compare_and_transition(
        &self,
        id: Uuid,
        transition: Transition,
    ) -> RepositoryResult<TransitionOutcome>;

    /// Pending orders whose hold ended strictly before `now`, oldest first.
    async fn find_expired_pending(
        &self,
        now: DateTime<Utc>,
        limit: i64,
    ) -> RepositoryResult<Vec<Uuid>>;

    async fn record_late_payment(&self, late: &LatePayment) -> RepositoryResult<()>;

    async fn health_check(&self) -> RepositoryResult<()>;
}
