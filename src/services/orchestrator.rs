//! Order orchestrator.
//!
//! Every status change goes through `ReservationStore::compare_and_transition`.
//! Client cancellation, payment callbacks and the expiry sweep all race on
//! that single primitive; whichever compare succeeds first decides the order.

use chrono::Duration;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::clock::{Clock, SystemClock};
use crate::domain::{
    BuyerInfo, CancelReason, LineItem, Order, OrderStatus, PaymentMethod, PaymentOutcome,
    WebhookEvent,
};
use crate::payment::{PaymentError, PaymentGateway};
use crate::ports::{
    Creation, InventoryLedger, LatePayment, RepositoryError, ReservationStore, Transition,
    TransitionOutcome,
};
use crate::validation::{validate_buyer, ValidationError};

pub const DEFAULT_HOLD_MINUTES: i64 = 15;

#[derive(Error, Debug)]
pub enum OrderError {
    #[error("not enough tickets left for {ticket_type}: requested {requested}, available {available}")]
    InsufficientInventory {
        ticket_type: String,
        requested: i32,
        available: i32,
    },

    #[error("invalid quantity: {0}")]
    InvalidQuantity(String),

    #[error("at most {max} tickets of {ticket_type} per order, requested {requested}")]
    ExceedsMaxPerOrder {
        ticket_type: String,
        requested: i32,
        max: i32,
    },

    #[error("ticket type {0} is not sold for this event")]
    UnknownTicketType(Uuid),

    #[error("invalid buyer info: {0}")]
    InvalidBuyer(#[from] ValidationError),

    #[error("order not found: {0}")]
    OrderNotFound(String),

    #[error("order does not belong to the requester")]
    NotOwner,

    #[error("order is already {status}")]
    NotPending { status: OrderStatus },

    #[error("order hold has expired")]
    Expired,

    #[error("payment session could not be created: {0}")]
    PaymentSession(PaymentError),

    #[error("webhook rejected: {0}")]
    WebhookVerification(String),

    #[error("invalid webhook payload: {0}")]
    InvalidWebhook(String),

    #[error("store unavailable: {0}")]
    Store(RepositoryError),
}

impl From<RepositoryError> for OrderError {
    fn from(e: RepositoryError) -> Self {
        match e {
            RepositoryError::NotFound(what) => OrderError::OrderNotFound(what),
            other => OrderError::Store(other),
        }
    }
}

/// How a resolution attempt ended. Losing a race is not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    Applied(OrderStatus),
    AlreadyResolved(OrderStatus),
    /// A failure callback for a session the buyer has since replaced.
    SupersededSession,
}

impl Resolution {
    pub fn status(&self) -> Option<OrderStatus> {
        match self {
            Resolution::Applied(s) | Resolution::AlreadyResolved(s) => Some(*s),
            Resolution::SupersededSession => None,
        }
    }
}

impl From<TransitionOutcome> for Resolution {
    fn from(outcome: TransitionOutcome) -> Self {
        match outcome {
            TransitionOutcome::Applied(order) => Resolution::Applied(order.status),
            TransitionOutcome::Skipped { current } => Resolution::AlreadyResolved(current),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderItemRequest {
    pub ticket_type_id: Uuid,
    pub quantity: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentRedirect {
    pub order_id: Uuid,
    pub method: PaymentMethod,
    pub reference: String,
    pub pay_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebhookResolution {
    pub order_id: Uuid,
    pub reference: String,
    pub outcome: PaymentOutcome,
    pub resolution: Resolution,
}

#[derive(Debug, Clone, Copy)]
pub struct OrderPolicy {
    pub hold_duration: Duration,
}

impl Default for OrderPolicy {
    fn default() -> Self {
        Self {
            hold_duration: Duration::minutes(DEFAULT_HOLD_MINUTES),
        }
    }
}

pub struct OrderOrchestrator {
    store: Arc<dyn ReservationStore>,
    ledger: Arc<dyn InventoryLedger>,
    gateway: Arc<dyn PaymentGateway>,
    clock: Arc<dyn Clock>,
    policy: OrderPolicy,
}

impl OrderOrchestrator {
    pub fn new(
        store: Arc<dyn ReservationStore>,
        ledger: Arc<dyn InventoryLedger>,
        gateway: Arc<dyn PaymentGateway>,
        policy: OrderPolicy,
    ) -> Self {
        Self {
            store,
            ledger,
            gateway,
            clock: Arc::new(SystemClock),
            policy,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn store(&self) -> &Arc<dyn ReservationStore> {
        &self.store
    }

    /// Holds every requested line and records the `PENDING` order in one store
    /// call, so a failed or abandoned request leaves no hold behind.
    pub async fn create_order(
        &self,
        user_id: &str,
        event_id: Uuid,
        buyer: BuyerInfo,
        items: Vec<OrderItemRequest>,
    ) -> Result<Order, OrderError> {
        let buyer = validate_buyer(&buyer)?;
        let requested = merge_items(items)?;

        // Everything that can be rejected is checked before the ledger is touched.
        let mut lines = Vec::with_capacity(requested.len());
        for (ticket_type_id, quantity) in requested {
            let ticket = match self.ledger.ticket_type(ticket_type_id).await {
                Ok(ticket) => ticket,
                Err(RepositoryError::NotFound(_)) => {
                    return Err(OrderError::UnknownTicketType(ticket_type_id))
                }
                Err(e) => return Err(OrderError::Store(e)),
            };
            if ticket.event_id != event_id {
                return Err(OrderError::UnknownTicketType(ticket_type_id));
            }
            if quantity > ticket.max_per_order {
                return Err(OrderError::ExceedsMaxPerOrder {
                    ticket_type: ticket.name,
                    requested: quantity,
                    max: ticket.max_per_order,
                });
            }
            lines.push(LineItem {
                ticket_type_id,
                ticket_name: ticket.name,
                unit_price: ticket.price,
                quantity,
            });
        }

        let now = self.clock.now();
        let order = Order::new_pending(
            user_id.to_string(),
            event_id,
            buyer,
            lines,
            now,
            now + self.policy.hold_duration,
        )
        .ok_or_else(|| OrderError::InvalidQuantity("order total is too large".to_string()))?;

        match self.store.create(&order).await.map_err(OrderError::Store)? {
            Creation::Created(_) => {}
            Creation::Insufficient {
                ticket_type_id,
                available,
            } => {
                let (ticket_type, requested) = order
                    .items
                    .iter()
                    .find(|item| item.ticket_type_id == ticket_type_id)
                    .map(|item| (item.ticket_name.clone(), item.quantity))
                    .unwrap_or_else(|| (ticket_type_id.to_string(), 0));
                return Err(OrderError::InsufficientInventory {
                    ticket_type,
                    requested,
                    available: available.max(0),
                });
            }
        }

        info!(
            order_id = %order.id,
            code = %order.code,
            total_price = order.total_price,
            tickets = order.total_quantity(),
            expired_at = %order.expired_at,
            "Order created"
        );
        Ok(order)
    }

    /// Opens a payment session for a pending, unexpired order. Calling again
    /// replaces the current session; the hold itself is untouched.
    pub async fn select_payment(
        &self,
        order_id: Uuid,
        method: PaymentMethod,
    ) -> Result<PaymentRedirect, OrderError> {
        let order = self.store.get(order_id).await?;
        if order.status.is_terminal() {
            return Err(OrderError::NotPending {
                status: order.status,
            });
        }
        if order.is_expired_at(self.clock.now()) {
            return Err(OrderError::Expired);
        }

        // Recorded before the provider call so a fast webhook always finds it.
        let reference = payment_reference(&order);
        if !self
            .store
            .attach_payment_session(order.id, method, &reference)
            .await?
        {
            let current = self.store.get(order_id).await?;
            return Err(OrderError::NotPending {
                status: current.status,
            });
        }

        let session = self
            .gateway
            .create_session(&order, method, &reference)
            .await
            .map_err(|e| {
                warn!(order_id = %order.id, method = %method, error = %e, "Payment session failed");
                OrderError::PaymentSession(e)
            })?;

        info!(order_id = %order.id, method = %method, reference = %reference, "Payment session opened");
        Ok(PaymentRedirect {
            order_id: order.id,
            method,
            reference: session.reference,
            pay_url: session.redirect_url,
        })
    }

    /// Verifies a raw provider callback and applies its outcome.
    pub async fn handle_webhook(
        &self,
        signature: Option<&str>,
        payload: &[u8],
    ) -> Result<WebhookResolution, OrderError> {
        let event = self
            .gateway
            .verify_webhook(signature, payload)
            .map_err(|e| {
                if e.is_verification_failure() {
                    warn!(error = %e, "Dropping unverified payment webhook");
                    OrderError::WebhookVerification(e.to_string())
                } else {
                    warn!(error = %e, "Dropping unreadable payment webhook");
                    OrderError::InvalidWebhook(e.to_string())
                }
            })?;

        let order = self.store.find_by_payment_reference(&event.reference).await?;
        let resolution = match event.outcome {
            PaymentOutcome::Success => self.confirm_payment(&order, &event).await?,
            PaymentOutcome::Failure => self.fail_payment(&order, &event).await?,
        };

        Ok(WebhookResolution {
            order_id: order.id,
            reference: event.reference,
            outcome: event.outcome,
            resolution,
        })
    }

    /// PENDING -> PAID. Wins even past `expired_at` if the sweep has not
    /// released the order yet.
    pub async fn confirm_payment(
        &self,
        order: &Order,
        event: &WebhookEvent,
    ) -> Result<Resolution, OrderError> {
        if let Some(amount) = event.amount {
            if amount != order.total_price {
                warn!(
                    order_id = %order.id,
                    reference = %event.reference,
                    expected = order.total_price,
                    reported = amount,
                    "Payment amount differs from order total"
                );
            }
        }

        let outcome = self
            .store
            .compare_and_transition(order.id, Transition::pay())
            .await?;

        match &outcome {
            TransitionOutcome::Applied(_) => {
                info!(order_id = %order.id, reference = %event.reference, "Order paid");
            }
            TransitionOutcome::Skipped {
                current: OrderStatus::Canceled,
            } => {
                warn!(
                    order_id = %order.id,
                    reference = %event.reference,
                    "Payment captured for a released hold; queued for refund"
                );
                self.store
                    .record_late_payment(&LatePayment {
                        id: Uuid::new_v4(),
                        order_id: order.id,
                        reference: event.reference.clone(),
                        provider_transaction_id: event.provider_transaction_id.clone(),
                        amount: event.amount,
                        order_status: OrderStatus::Canceled,
                        received_at: self.clock.now(),
                    })
                    .await?;
            }
            TransitionOutcome::Skipped { current } => {
                debug!(order_id = %order.id, status = %current, "Duplicate payment confirmation");
            }
        }

        Ok(outcome.into())
    }

    /// PENDING -> CANCELED for a provider-reported failure on the current
    /// session. Failures for replaced sessions are ignored.
    pub async fn fail_payment(
        &self,
        order: &Order,
        event: &WebhookEvent,
    ) -> Result<Resolution, OrderError> {
        if order.payment_reference.as_deref() != Some(event.reference.as_str()) {
            info!(
                order_id = %order.id,
                reference = %event.reference,
                "Ignoring failure for a superseded payment session"
            );
            return Ok(Resolution::SupersededSession);
        }

        let outcome = self
            .store
            .compare_and_transition(order.id, Transition::cancel(CancelReason::PaymentFailed))
            .await?;
        if let TransitionOutcome::Applied(_) = outcome {
            info!(order_id = %order.id, reference = %event.reference, "Order canceled after failed payment");
        }
        Ok(outcome.into())
    }

    /// Buyer-initiated cancellation. Only the owner may cancel; an already
    /// resolved order is reported as such.
    pub async fn cancel_order(
        &self,
        order_id: Uuid,
        requester_user_id: &str,
    ) -> Result<Resolution, OrderError> {
        let order = self.store.get(order_id).await?;
        if order.user_id != requester_user_id {
            return Err(OrderError::NotOwner);
        }
        if order.status.is_terminal() {
            return Ok(Resolution::AlreadyResolved(order.status));
        }

        let outcome = self
            .store
            .compare_and_transition(order_id, Transition::cancel(CancelReason::User))
            .await?;
        if let TransitionOutcome::Applied(_) = outcome {
            info!(order_id = %order_id, "Order canceled by buyer");
        }
        Ok(outcome.into())
    }

    /// Releases an order whose hold ran out. Uses the same guarded transition
    /// as every other resolver, so a payment that landed first is kept.
    pub async fn expire_order(&self, order_id: Uuid) -> Result<Resolution, OrderError> {
        let outcome = self
            .store
            .compare_and_transition(order_id, Transition::cancel(CancelReason::Expired))
            .await?;
        match &outcome {
            TransitionOutcome::Applied(_) => info!(order_id = %order_id, "Order expired"),
            TransitionOutcome::Skipped { current } => {
                debug!(order_id = %order_id, status = %current, "Expiry skipped; already resolved")
            }
        }
        Ok(outcome.into())
    }

    pub async fn expired_order_ids(&self, limit: i64) -> Result<Vec<Uuid>, OrderError> {
        Ok(self
            .store
            .find_expired_pending(self.clock.now(), limit)
            .await?)
    }

    pub async fn check_status(&self, order_id: Uuid) -> Result<OrderStatus, OrderError> {
        Ok(self.store.get(order_id).await?.status)
    }

    pub async fn get_order(&self, order_id: Uuid) -> Result<Order, OrderError> {
        Ok(self.store.get(order_id).await?)
    }

    pub async fn get_order_by_code(&self, code: &str) -> Result<Order, OrderError> {
        Ok(self.store.get_by_code(code).await?)
    }
}

/// Drops zero quantities and folds duplicate ticket types together, keyed in
/// ticket-type order.
fn merge_items(items: Vec<OrderItemRequest>) -> Result<BTreeMap<Uuid, i32>, OrderError> {
    let mut merged: BTreeMap<Uuid, u32> = BTreeMap::new();
    for item in items.into_iter().filter(|i| i.quantity > 0) {
        let total = merged.entry(item.ticket_type_id).or_insert(0);
        *total = total
            .checked_add(item.quantity)
            .ok_or_else(|| OrderError::InvalidQuantity("quantity is too large".to_string()))?;
    }

    if merged.is_empty() {
        return Err(OrderError::InvalidQuantity(
            "select at least one ticket".to_string(),
        ));
    }

    merged
        .into_iter()
        .map(|(id, quantity)| {
            i32::try_from(quantity)
                .map(|q| (id, q))
                .map_err(|_| OrderError::InvalidQuantity("quantity is too large".to_string()))
        })
        .collect()
}

fn payment_reference(order: &Order) -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!("{}-{}", order.code, &suffix[..8])
}
