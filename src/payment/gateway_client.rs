use async_trait::async_trait;
use chrono::{DateTime, Utc};
use failsafe::futures::CircuitBreaker as FuturesCircuitBreaker;
use failsafe::{backoff, failure_policy, Config, Error as FailsafeError, StateMachine};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::{parse_webhook, signature, PaymentError, PaymentGateway, SIGNATURE_HEADER};
use crate::domain::{Order, PaymentMethod, PaymentSession, WebhookEvent};

const API_KEY_HEADER: &str = "x-api-key";
const DESCRIPTION_MAX_LEN: usize = 25;

#[derive(Debug, Clone)]
pub struct GatewaySettings {
    pub base_url: String,
    pub api_key: String,
    pub webhook_secret: String,
    pub return_url: String,
    pub timeout: Duration,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CreatePaymentRequest<'a> {
    reference: &'a str,
    method: PaymentMethod,
    amount: i64,
    description: String,
    return_url: &'a str,
    expired_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreatePaymentResponse {
    checkout_url: String,
}

/// HTTP client for the payment provider's checkout API.
#[derive(Clone)]
pub struct HttpPaymentGateway {
    client: Client,
    settings: GatewaySettings,
    circuit_breaker: StateMachine<failure_policy::ConsecutiveFailures<backoff::EqualJittered>, ()>,
}

impl HttpPaymentGateway {
    pub fn new(settings: GatewaySettings) -> Self {
        Self::with_circuit_breaker(settings, 3, 60)
    }

    pub fn with_circuit_breaker(
        settings: GatewaySettings,
        failure_threshold: u32,
        reset_timeout_secs: u64,
    ) -> Self {
        let client = Client::builder()
            .timeout(settings.timeout)
            .build()
            .unwrap_or_default();

        let backoff = backoff::equal_jittered(
            Duration::from_secs(reset_timeout_secs),
            Duration::from_secs(reset_timeout_secs * 2),
        );
        let policy = failure_policy::consecutive_failures(failure_threshold, backoff);
        let circuit_breaker = Config::new().failure_policy(policy).build();

        Self {
            client,
            settings,
            circuit_breaker,
        }
    }

    pub fn circuit_state(&self) -> String {
        if self.circuit_breaker.is_call_permitted() {
            "closed".to_string()
        } else {
            "open".to_string()
        }
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/v1/payment-requests",
            self.settings.base_url.trim_end_matches('/')
        )
    }
}

fn description_for(order: &Order) -> String {
    format!("Thanh toan {}", order.code)
        .chars()
        .take(DESCRIPTION_MAX_LEN)
        .collect()
}

#[async_trait]
impl PaymentGateway for HttpPaymentGateway {
    async fn create_session(
        &self,
        order: &Order,
        method: PaymentMethod,
        reference: &str,
    ) -> Result<PaymentSession, PaymentError> {
        let request = CreatePaymentRequest {
            reference,
            method,
            amount: order.total_price,
            description: description_for(order),
            return_url: &self.settings.return_url,
            expired_at: order.expired_at,
        };
        let body = serde_json::to_vec(&request)
            .map_err(|e| PaymentError::InvalidResponse(e.to_string()))?;
        let signature = signature::sign(&self.settings.webhook_secret, &body);

        let client = self.client.clone();
        let url = self.endpoint();
        let api_key = self.settings.api_key.clone();

        let result = self
            .circuit_breaker
            .call(async move {
                let response = client
                    .post(&url)
                    .header(API_KEY_HEADER, api_key)
                    .header(SIGNATURE_HEADER, signature)
                    .header(reqwest::header::CONTENT_TYPE, "application/json")
                    .body(body)
                    .send()
                    .await?;

                let status = response.status();
                if !status.is_success() {
                    let body = response.text().await.unwrap_or_default();
                    return Err(PaymentError::Rejected {
                        status: status.as_u16(),
                        body,
                    });
                }

                let created = response
                    .json::<CreatePaymentResponse>()
                    .await
                    .map_err(|e| PaymentError::InvalidResponse(e.to_string()))?;
                Ok(created)
            })
            .await;

        let created = match result {
            Ok(created) => created,
            Err(FailsafeError::Rejected) => {
                return Err(PaymentError::CircuitBreakerOpen(
                    "payment provider circuit breaker is open".to_string(),
                ))
            }
            Err(FailsafeError::Inner(e)) => return Err(e),
        };

        if created.checkout_url.trim().is_empty() {
            return Err(PaymentError::InvalidResponse(
                "checkout url is empty".to_string(),
            ));
        }

        Ok(PaymentSession {
            reference: reference.to_string(),
            redirect_url: created.checkout_url,
        })
    }

    fn verify_webhook(
        &self,
        signature: Option<&str>,
        payload: &[u8],
    ) -> Result<WebhookEvent, PaymentError> {
        parse_webhook(&self.settings.webhook_secret, signature, payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{BuyerInfo, LineItem};
    use uuid::Uuid;

    fn settings(base_url: String) -> GatewaySettings {
        GatewaySettings {
            base_url,
            api_key: "key-123".to_string(),
            webhook_secret: "whsec".to_string(),
            return_url: "https://tickets.example.com/orders/return".to_string(),
            timeout: Duration::from_secs(5),
        }
    }

    fn order() -> Order {
        let now = Utc::now();
        Order::new_pending(
            "user-1".to_string(),
            Uuid::new_v4(),
            BuyerInfo {
                name: "Minh".to_string(),
                phone: "0911111111".to_string(),
                email: "minh@example.com".to_string(),
            },
            vec![LineItem {
                ticket_type_id: Uuid::new_v4(),
                ticket_name: "VIP".to_string(),
                unit_price: 250_000,
                quantity: 2,
            }],
            now,
            now + chrono::Duration::minutes(15),
        )
        .unwrap()
    }

    #[test]
    fn test_description_is_truncated() {
        let description = description_for(&order());
        assert!(description.starts_with("Thanh toan ORD"));
        assert!(description.chars().count() <= DESCRIPTION_MAX_LEN);
    }

    #[test]
    fn test_circuit_starts_closed() {
        let gateway = HttpPaymentGateway::new(settings("http://localhost:1".to_string()));
        assert_eq!(gateway.circuit_state(), "closed");
    }

    #[tokio::test]
    async fn test_create_session_returns_checkout_url() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/v1/payment-requests")
            .match_header("x-api-key", "key-123")
            .match_header("x-signature", mockito::Matcher::Regex("^[0-9a-f]{64}$".into()))
            .match_body(mockito::Matcher::PartialJsonString(
                r#"{"reference":"ORDX-1","method":"vnpay","amount":500000}"#.to_string(),
            ))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"checkoutUrl":"https://pay.example.com/c/abc"}"#)
            .create_async()
            .await;

        let gateway = HttpPaymentGateway::new(settings(server.url()));
        let session = gateway
            .create_session(&order(), PaymentMethod::VnPay, "ORDX-1")
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(session.reference, "ORDX-1");
        assert_eq!(session.redirect_url, "https://pay.example.com/c/abc");
    }

    #[tokio::test]
    async fn test_provider_error_is_surfaced() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/v1/payment-requests")
            .with_status(503)
            .with_body("maintenance")
            .create_async()
            .await;

        let gateway = HttpPaymentGateway::new(settings(server.url()));
        let result = gateway
            .create_session(&order(), PaymentMethod::PayOs, "ORDX-2")
            .await;

        assert!(matches!(result, Err(PaymentError::Rejected { status: 503, .. })));
    }

    #[tokio::test]
    async fn test_circuit_opens_after_consecutive_failures() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/v1/payment-requests")
            .with_status(500)
            .expect_at_least(2)
            .create_async()
            .await;

        let gateway = HttpPaymentGateway::with_circuit_breaker(settings(server.url()), 2, 30);
        for _ in 0..2 {
            let _ = gateway
                .create_session(&order(), PaymentMethod::ZaloPay, "ORDX-3")
                .await;
        }

        let result = gateway
            .create_session(&order(), PaymentMethod::ZaloPay, "ORDX-3")
            .await;
        assert!(matches!(result, Err(PaymentError::CircuitBreakerOpen(_))));
        assert_eq!(gateway.circuit_state(), "open");
    }

    #[test]
    fn test_verify_webhook_uses_shared_secret() {
        let gateway = HttpPaymentGateway::new(settings("http://localhost:1".to_string()));
        let body = br#"{"reference":"ORDX-1","status":"success"}"#;
        let sig = signature::sign("whsec", body);

        assert!(gateway.verify_webhook(Some(&sig), body).is_ok());
        assert!(gateway.verify_webhook(Some(&signature::sign("nope", body)), body).is_err());
    }
}
