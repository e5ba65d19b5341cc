//! In-process implementation of both storage seams.
//!
//! Orders and counters live behind one mutex, so a transition and its ledger
//! effect are a single critical section. Nothing survives a restart; use the
//! Postgres adapter outside tests and local runs.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use uuid::Uuid;

use crate::domain::{LineItem, NewTicketType, Order, PaymentMethod, Reservation, TicketType};
use crate::ports::{
    Creation, InventoryLedger, LatePayment, LedgerEffect, RepositoryError, RepositoryResult,
    ReservationStore, Transition, TransitionOutcome,
};

#[derive(Default)]
struct Inner {
    ticket_types: HashMap<Uuid, TicketType>,
    orders: HashMap<Uuid, Order>,
    codes: HashMap<String, Uuid>,
    sessions: HashMap<String, Uuid>,
    late_payments: Vec<LatePayment>,
}

impl Inner {
    fn ticket_mut(&mut self, id: Uuid) -> RepositoryResult<&mut TicketType> {
        self.ticket_types
            .get_mut(&id)
            .ok_or_else(|| RepositoryError::NotFound(format!("ticket type {}", id)))
    }

    fn try_reserve(&mut self, id: Uuid, quantity: i32) -> RepositoryResult<Reservation> {
        let ticket = self.ticket_mut(id)?;
        if !ticket.can_hold(quantity) {
            return Ok(Reservation::Insufficient {
                available: ticket.available(),
            });
        }
        ticket.reserved += quantity;
        ticket.updated_at = Utc::now();
        Ok(Reservation::Reserved)
    }

    fn finalize(&mut self, id: Uuid, quantity: i32) -> RepositoryResult<()> {
        let ticket = self.ticket_mut(id)?;
        if ticket.reserved < quantity {
            return Err(RepositoryError::Inconsistent(format!(
                "ticket type {} has {} reserved, cannot finalize {}",
                id, ticket.reserved, quantity
            )));
        }
        ticket.reserved -= quantity;
        ticket.sold += quantity;
        ticket.updated_at = Utc::now();
        Ok(())
    }

    fn release(&mut self, id: Uuid, quantity: i32) -> RepositoryResult<()> {
        let ticket = self.ticket_mut(id)?;
        if ticket.reserved < quantity {
            return Err(RepositoryError::Inconsistent(format!(
                "ticket type {} has {} reserved, cannot release {}",
                id, ticket.reserved, quantity
            )));
        }
        ticket.reserved -= quantity;
        ticket.updated_at = Utc::now();
        Ok(())
    }

    /// Copies of the counters `items` touch, for restoring after a failed step.
    fn snapshot(&self, items: &[LineItem]) -> HashMap<Uuid, TicketType> {
        items
            .iter()
            .filter_map(|item| {
                self.ticket_types
                    .get(&item.ticket_type_id)
                    .map(|t| (t.id, t.clone()))
            })
            .collect()
    }

    fn order(&self, id: Uuid) -> RepositoryResult<&Order> {
        self.orders
            .get(&id)
            .ok_or_else(|| RepositoryError::NotFound(format!("order {}", id)))
    }
}

#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Late payments recorded so far, oldest first.
    pub fn late_payments(&self) -> Vec<LatePayment> {
        self.lock().late_payments.clone()
    }
}

#[async_trait]
impl InventoryLedger for MemoryStore {
    async fn ticket_type(&self, id: Uuid) -> RepositoryResult<TicketType> {
        self.lock()
            .ticket_types
            .get(&id)
            .cloned()
            .ok_or_else(|| RepositoryError::NotFound(format!("ticket type {}", id)))
    }

    async fn create_ticket_type(&self, input: NewTicketType) -> RepositoryResult<TicketType> {
        let ticket = input.into_ticket_type(Utc::now());
        self.lock().ticket_types.insert(ticket.id, ticket.clone());
        Ok(ticket)
    }

    async fn try_reserve(&self, id: Uuid, quantity: i32) -> RepositoryResult<Reservation> {
        self.lock().try_reserve(id, quantity)
    }

    async fn finalize(&self, id: Uuid, quantity: i32) -> RepositoryResult<()> {
        self.lock().finalize(id, quantity)
    }

    async fn release(&self, id: Uuid, quantity: i32) -> RepositoryResult<()> {
        self.lock().release(id, quantity)
    }
}

#[async_trait]
impl ReservationStore for MemoryStore {
    async fn create(&self, order: &Order) -> RepositoryResult<Creation> {
        let mut inner = self.lock();
        let mut items = order.items.clone();
        items.sort_by_key(|item| item.ticket_type_id);
        let snapshot = inner.snapshot(&items);

        for item in &items {
            match inner.try_reserve(item.ticket_type_id, item.quantity) {
                Ok(Reservation::Reserved) => {}
                Ok(Reservation::Insufficient { available }) => {
                    inner.ticket_types.extend(snapshot);
                    return Ok(Creation::Insufficient {
                        ticket_type_id: item.ticket_type_id,
                        available,
                    });
                }
                Err(e) => {
                    inner.ticket_types.extend(snapshot);
                    return Err(e);
                }
            }
        }

        if inner.codes.contains_key(&order.code) || inner.orders.contains_key(&order.id) {
            inner.ticket_types.extend(snapshot);
            return Err(RepositoryError::Inconsistent(format!(
                "order code {} already exists",
                order.code
            )));
        }
        inner.codes.insert(order.code.clone(), order.id);
        inner.orders.insert(order.id, order.clone());
        Ok(Creation::Created(order.id))
    }

    async fn get(&self, id: Uuid) -> RepositoryResult<Order> {
        self.lock().order(id).cloned()
    }

    async fn get_by_code(&self, code: &str) -> RepositoryResult<Order> {
        let inner = self.lock();
        let id = inner
            .codes
            .get(code)
            .copied()
            .ok_or_else(|| RepositoryError::NotFound(format!("order code {}", code)))?;
        inner.order(id).cloned()
    }

    async fn find_by_payment_reference(&self, reference: &str) -> RepositoryResult<Order> {
        let inner = self.lock();
        let id = inner
            .sessions
            .get(reference)
            .copied()
            .ok_or_else(|| RepositoryError::NotFound(format!("payment reference {}", reference)))?;
        inner.order(id).cloned()
    }

    async fn attach_payment_session(
        &self,
        id: Uuid,
        method: PaymentMethod,
        reference: &str,
    ) -> RepositoryResult<bool> {
        let mut inner = self.lock();
        let order = inner
            .orders
            .get_mut(&id)
            .ok_or_else(|| RepositoryError::NotFound(format!("order {}", id)))?;
        if order.status.is_terminal() {
            return Ok(false);
        }
        order.payment_method = Some(method);
        order.payment_reference = Some(reference.to_string());
        inner.sessions.insert(reference.to_string(), id);
        Ok(true)
    }

    async fn compare_and_transition(
        &self,
        id: Uuid,
        transition: Transition,
    ) -> RepositoryResult<TransitionOutcome> {
        let mut inner = self.lock();
        let current = inner.order(id)?.clone();
        if current.status != transition.from {
            return Ok(TransitionOutcome::Skipped {
                current: current.status,
            });
        }

        let mut items = current.items.clone();
        items.sort_by_key(|item| item.ticket_type_id);

        // Stage counter changes on a copy so a failed line leaves nothing applied.
        let snapshot = inner.snapshot(&items);

        for item in &items {
            let applied = match transition.effect {
                LedgerEffect::Finalize => inner.finalize(item.ticket_type_id, item.quantity),
                LedgerEffect::Release => inner.release(item.ticket_type_id, item.quantity),
            };
            if let Err(e) = applied {
                inner.ticket_types.extend(snapshot);
                return Err(e);
            }
        }

        let order = inner
            .orders
            .get_mut(&id)
            .ok_or_else(|| RepositoryError::NotFound(format!("order {}", id)))?;
        order.status = transition.to;
        order.cancel_reason = transition.reason;
        order.resolved_at = Some(Utc::now());

        Ok(TransitionOutcome::Applied(order.clone()))
    }

    async fn find_expired_pending(
        &self,
        now: DateTime<Utc>,
        limit: i64,
    ) -> RepositoryResult<Vec<Uuid>> {
        let inner = self.lock();
        let mut expired: Vec<&Order> = inner
            .orders
            .values()
            .filter(|o| !o.status.is_terminal() && o.is_expired_at(now))
            .collect();
        expired.sort_by_key(|o| o.expired_at);

        Ok(expired
            .into_iter()
            .take(usize::try_from(limit).unwrap_or(0))
            .map(|o| o.id)
            .collect())
    }

    async fn record_late_payment(&self, late: &LatePayment) -> RepositoryResult<()> {
        let mut inner = self.lock();
        let duplicate = inner.late_payments.iter().any(|existing| {
            existing.reference == late.reference
                && existing.provider_transaction_id == late.provider_transaction_id
        });
        if !duplicate {
            inner.late_payments.push(late.clone());
        }
        Ok(())
    }

    async fn health_check(&self) -> RepositoryResult<()> {
        Ok(())
    }
}
