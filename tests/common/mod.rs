#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use uuid::Uuid;

use boxoffice_core::adapters::MemoryStore;
use boxoffice_core::clock::ManualClock;
use boxoffice_core::domain::{
    BuyerInfo, NewTicketType, Order, PaymentMethod, PaymentSession, TicketType, WebhookEvent,
};
use boxoffice_core::payment::{parse_webhook, signature, PaymentError, PaymentGateway};
use boxoffice_core::ports::{
    Creation, InventoryLedger, LatePayment, RepositoryError, RepositoryResult, ReservationStore,
    Transition, TransitionOutcome,
};
use boxoffice_core::services::{OrderItemRequest, OrderOrchestrator, OrderPolicy};

pub const WEBHOOK_SECRET: &str = "test_webhook_secret";
pub const BUYER_ID: &str = "user-1";

/// Gateway double: hands out a fake checkout url and verifies callbacks with
/// the real signature check.
#[derive(Default)]
pub struct StubGateway {
    pub fail_sessions: AtomicBool,
    pub sessions_created: AtomicUsize,
}

#[async_trait]
impl PaymentGateway for StubGateway {
    async fn create_session(
        &self,
        _order: &Order,
        _method: PaymentMethod,
        reference: &str,
    ) -> Result<PaymentSession, PaymentError> {
        if self.fail_sessions.load(Ordering::SeqCst) {
            return Err(PaymentError::Rejected {
                status: 503,
                body: "provider down".to_string(),
            });
        }
        self.sessions_created.fetch_add(1, Ordering::SeqCst);
        Ok(PaymentSession {
            reference: reference.to_string(),
            redirect_url: format!("https://pay.test/checkout/{}", reference),
        })
    }

    fn verify_webhook(
        &self,
        signature: Option<&str>,
        payload: &[u8],
    ) -> Result<WebhookEvent, PaymentError> {
        parse_webhook(WEBHOOK_SECRET, signature, payload)
    }
}

/// Store double whose order writes fail as if the pool were exhausted.
/// Reads and transitions go to the wrapped store.
pub struct UnavailableStore {
    pub inner: MemoryStore,
}

#[async_trait]
impl ReservationStore for UnavailableStore {
    async fn create(&self, _order: &Order) -> RepositoryResult<Creation> {
        Err(RepositoryError::Database(sqlx::Error::PoolTimedOut))
    }

    async fn get(&self, id: Uuid) -> RepositoryResult<Order> {
        self.inner.get(id).await
    }

    async fn get_by_code(&self, code: &str) -> RepositoryResult<Order> {
        self.inner.get_by_code(code).await
    }

    async fn find_by_payment_reference(&self, reference: &str) -> RepositoryResult<Order> {
        self.inner.find_by_payment_reference(reference).await
    }

    async fn attach_payment_session(
        &self,
        id: Uuid,
        method: PaymentMethod,
        reference: &str,
    ) -> RepositoryResult<bool> {
        self.inner.attach_payment_session(id, method, reference).await
    }

    async fn compare_and_transition(
        &self,
        id: Uuid,
        transition: Transition,
    ) -> RepositoryResult<TransitionOutcome> {
        self.inner.compare_and_transition(id, transition).await
    }

    async fn find_expired_pending(
        &self,
        now: DateTime<Utc>,
        limit: i64,
    ) -> RepositoryResult<Vec<Uuid>> {
        self.inner.find_expired_pending(now, limit).await
    }

    async fn record_late_payment(&self, late: &LatePayment) -> RepositoryResult<()> {
        self.inner.record_late_payment(late).await
    }

    async fn health_check(&self) -> RepositoryResult<()> {
        Err(RepositoryError::Database(sqlx::Error::PoolTimedOut))
    }
}

pub struct TestContext {
    pub store: MemoryStore,
    pub clock: Arc<ManualClock>,
    pub gateway: Arc<StubGateway>,
    pub orchestrator: Arc<OrderOrchestrator>,
    pub event_id: Uuid,
}

impl TestContext {
    pub fn new() -> Self {
        let store = MemoryStore::new();
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap(),
        ));
        let gateway = Arc::new(StubGateway::default());
        let orchestrator = OrderOrchestrator::new(
            Arc::new(store.clone()),
            Arc::new(store.clone()),
            gateway.clone(),
            OrderPolicy::default(),
        )
        .with_clock(clock.clone());

        Self {
            store,
            clock,
            gateway,
            orchestrator: Arc::new(orchestrator),
            event_id: Uuid::new_v4(),
        }
    }

    pub async fn seed_ticket_type(&self, name: &str, total_quantity: i32) -> TicketType {
        self.store
            .create_ticket_type(NewTicketType {
                event_id: self.event_id,
                name: name.to_string(),
                price: 100_000,
                total_quantity,
                max_per_order: 10,
            })
            .await
            .unwrap()
    }

    pub async fn ticket(&self, id: Uuid) -> TicketType {
        self.store.ticket_type(id).await.unwrap()
    }

    pub async fn order_for(
        &self,
        items: &[(Uuid, u32)],
    ) -> Result<Order, boxoffice_core::services::OrderError> {
        self.orchestrator
            .create_order(BUYER_ID, self.event_id, buyer(), request(items))
            .await
    }
}

pub fn buyer() -> BuyerInfo {
    BuyerInfo {
        name: "Tran Thi B".to_string(),
        phone: "0912345678".to_string(),
        email: "b@example.com".to_string(),
    }
}

pub fn request(items: &[(Uuid, u32)]) -> Vec<OrderItemRequest> {
    items
        .iter()
        .map(|(id, quantity)| OrderItemRequest {
            ticket_type_id: *id,
            quantity: *quantity,
        })
        .collect()
}

/// A webhook body for `reference` and the matching signature header value.
pub fn signed_webhook(reference: &str, status: &str, transaction_id: &str) -> (String, Vec<u8>) {
    let body = serde_json::json!({
        "reference": reference,
        "status": status,
        "transactionId": transaction_id,
    })
    .to_string()
    .into_bytes();
    (signature::sign(WEBHOOK_SECRET, &body), body)
}
