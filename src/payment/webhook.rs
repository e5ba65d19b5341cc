use serde::Deserialize;

use super::{signature, PaymentError};
use crate::domain::{PaymentOutcome, WebhookEvent};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WebhookPayload {
    reference: String,
    status: String,
    transaction_id: Option<String>,
    amount: Option<i64>,
}

fn outcome_from_status(status: &str) -> Option<PaymentOutcome> {
    match status.to_ascii_lowercase().as_str() {
        "success" | "paid" => Some(PaymentOutcome::Success),
        "failed" | "cancelled" | "canceled" | "expired" => Some(PaymentOutcome::Failure),
        _ => None,
    }
}

/// Verifies `signature` over the raw bytes, then decodes. The body is not
/// parsed at all when the signature is absent or wrong.
pub fn parse_webhook(
    secret: &str,
    signature: Option<&str>,
    payload: &[u8],
) -> Result<WebhookEvent, PaymentError> {
    let signature = signature
        .filter(|s| !s.trim().is_empty())
        .ok_or(PaymentError::MissingSignature)?;
    if !signature::verify(secret, payload, signature) {
        return Err(PaymentError::InvalidSignature);
    }

    let body: WebhookPayload = serde_json::from_slice(payload)
        .map_err(|e| PaymentError::MalformedPayload(e.to_string()))?;
    if body.reference.trim().is_empty() {
        return Err(PaymentError::MalformedPayload("reference is empty".to_string()));
    }
    let outcome = outcome_from_status(&body.status).ok_or_else(|| {
        PaymentError::MalformedPayload(format!("unknown status {}", body.status))
    })?;

    Ok(WebhookEvent {
        reference: body.reference,
        outcome,
        provider_transaction_id: body.transaction_id,
        amount: body.amount,
    })
}
