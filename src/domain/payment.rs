use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::order::UnknownVariant;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentMethod {
    PayOs,
    VnPay,
    ZaloPay,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::PayOs => "payos",
            PaymentMethod::VnPay => "vnpay",
            PaymentMethod::ZaloPay => "zalopay",
        }
    }
}

impl fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentMethod {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "payos" => Ok(PaymentMethod::PayOs),
            "vnpay" => Ok(PaymentMethod::VnPay),
            "zalopay" => Ok(PaymentMethod::ZaloPay),
            _ => Err(UnknownVariant::new("payment method", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentOutcome {
    Success,
    Failure,
}

/// A verified provider callback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebhookEvent {
    pub reference: String,
    pub outcome: PaymentOutcome,
    pub provider_transaction_id: Option<String>,
    pub amount: Option<i64>,
}

/// What the provider handed back when a session was opened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentSession {
    pub reference: String,
    pub redirect_url: String,
}
