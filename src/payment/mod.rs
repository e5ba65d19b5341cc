//! Provider-neutral payment contract: open a checkout session, and turn a
//! signed provider callback into a verified outcome.

pub mod gateway_client;
pub mod signature;
pub mod webhook;

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::{Order, PaymentMethod, PaymentSession, WebhookEvent};

pub use gateway_client::{GatewaySettings, HttpPaymentGateway};
pub use webhook::parse_webhook;

pub const SIGNATURE_HEADER: &str = "x-signature";

#[derive(Error, Debug)]
pub enum PaymentError {
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("provider rejected the request with status {status}: {body}")]
    Rejected { status: u16, body: String },
    #[error("invalid response from provider: {0}")]
    InvalidResponse(String),
    #[error("circuit breaker open: {0}")]
    CircuitBreakerOpen(String),
    #[error("webhook signature missing")]
    MissingSignature,
    #[error("webhook signature mismatch")]
    InvalidSignature,
    #[error("malformed webhook payload: {0}")]
    MalformedPayload(String),
}

impl PaymentError {
    pub fn is_verification_failure(&self) -> bool {
        matches!(
            self,
            PaymentError::MissingSignature | PaymentError::InvalidSignature
        )
    }
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Opens a checkout session under `reference`, which the caller has
    /// already recorded against the order.
    async fn create_session(
        &self,
        order: &Order,
        method: PaymentMethod,
        reference: &str,
    ) -> Result<PaymentSession, PaymentError>;

    /// Authenticates and decodes a raw callback body. Nothing is surfaced
    /// unless the signature matches.
    fn verify_webhook(
        &self,
        signature: Option<&str>,
        payload: &[u8],
    ) -> Result<WebhookEvent, PaymentError>;
}
