use anyhow::{Context, Result};
use dotenvy::dotenv;
use serde::Deserialize;
use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::payment::GatewaySettings;
use crate::services::{OrderPolicy, SweeperSettings};

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Text,
    Json,
}

impl FromStr for LogFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "text" | "" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            other => anyhow::bail!("LOG_FORMAT must be 'text' or 'json', got '{}'", other),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server_port: u16,
    pub database_url: String,
    pub database_max_connections: u32,
    pub database_acquire_timeout_secs: u64,
    pub hold_duration_secs: i64,
    pub sweep_interval_secs: u64,
    pub sweep_batch_size: i64,
    pub sweep_concurrency: usize,
    pub payment_gateway_url: String,
    pub payment_api_key: String,
    pub payment_webhook_secret: String,
    pub payment_return_url: String,
    pub payment_timeout_secs: u64,
    pub request_timeout_secs: u64,
    pub log_format: LogFormat,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenv().ok(); // Load .env file if present

        let config = Config {
            server_port: parse_or("SERVER_PORT", 3000)?,
            database_url: required("DATABASE_URL")?,
            database_max_connections: parse_or("DATABASE_MAX_CONNECTIONS", 10)?,
            database_acquire_timeout_secs: parse_or("DATABASE_ACQUIRE_TIMEOUT_SECS", 5)?,
            hold_duration_secs: parse_or("HOLD_DURATION_SECS", 900)?,
            sweep_interval_secs: parse_or("SWEEP_INTERVAL_SECS", 5)?,
            sweep_batch_size: parse_or("SWEEP_BATCH_SIZE", 100)?,
            sweep_concurrency: parse_or("SWEEP_CONCURRENCY", 8)?,
            payment_gateway_url: required("PAYMENT_GATEWAY_URL")?,
            payment_api_key: required("PAYMENT_API_KEY")?,
            payment_webhook_secret: required("PAYMENT_WEBHOOK_SECRET")?,
            payment_return_url: required("PAYMENT_RETURN_URL")?,
            payment_timeout_secs: parse_or("PAYMENT_TIMEOUT_SECS", 10)?,
            request_timeout_secs: parse_or("REQUEST_TIMEOUT_SECS", 15)?,
            log_format: parse_or("LOG_FORMAT", LogFormat::Text)?,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.hold_duration_secs <= 0 {
            anyhow::bail!("HOLD_DURATION_SECS must be positive");
        }
        if self.sweep_interval_secs == 0 {
            anyhow::bail!("SWEEP_INTERVAL_SECS must be positive");
        }
        if self.sweep_batch_size <= 0 {
            anyhow::bail!("SWEEP_BATCH_SIZE must be positive");
        }
        if self.sweep_concurrency == 0 {
            anyhow::bail!("SWEEP_CONCURRENCY must be positive");
        }
        if self.payment_webhook_secret.trim().is_empty() {
            anyhow::bail!("PAYMENT_WEBHOOK_SECRET must not be empty");
        }
        Ok(())
    }

    pub fn order_policy(&self) -> OrderPolicy {
        OrderPolicy {
            hold_duration: chrono::Duration::seconds(self.hold_duration_secs),
        }
    }

    pub fn sweeper_settings(&self) -> SweeperSettings {
        SweeperSettings {
            interval: Duration::from_secs(self.sweep_interval_secs),
            batch_size: self.sweep_batch_size,
            concurrency: self.sweep_concurrency,
        }
    }

    pub fn gateway_settings(&self) -> GatewaySettings {
        GatewaySettings {
            base_url: self.payment_gateway_url.clone(),
            api_key: self.payment_api_key.clone(),
            webhook_secret: self.payment_webhook_secret.clone(),
            return_url: self.payment_return_url.clone(),
            timeout: Duration::from_secs(self.payment_timeout_secs),
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

fn required(key: &str) -> Result<String> {
    env::var(key).with_context(|| format!("{} must be set", key))
}

fn parse_or<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|e| anyhow::anyhow!("{} is invalid: {}", key, e)),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> Config {
        Config {
            server_port: 3000,
            database_url: "postgres://localhost/boxoffice".to_string(),
            database_max_connections: 10,
            database_acquire_timeout_secs: 5,
            hold_duration_secs: 900,
            sweep_interval_secs: 5,
            sweep_batch_size: 100,
            sweep_concurrency: 8,
            payment_gateway_url: "https://pay.example.com".to_string(),
            payment_api_key: "key".to_string(),
            payment_webhook_secret: "secret".to_string(),
            payment_return_url: "https://tickets.example.com/return".to_string(),
            payment_timeout_secs: 10,
            request_timeout_secs: 15,
            log_format: LogFormat::Text,
        }
    }

    #[test]
    fn test_log_format_parsing() {
        assert_eq!("json".parse::<LogFormat>().unwrap(), LogFormat::Json);
        assert_eq!("TEXT".parse::<LogFormat>().unwrap(), LogFormat::Text);
        assert!("yaml".parse::<LogFormat>().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_hold() {
        let mut config = config();
        assert!(config.validate().is_ok());
        config.hold_duration_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_derived_settings() {
        let config = config();
        assert_eq!(config.order_policy().hold_duration, chrono::Duration::minutes(15));
        assert_eq!(config.sweeper_settings().batch_size, 100);
        assert_eq!(config.gateway_settings().timeout, Duration::from_secs(10));
        assert_eq!(config.request_timeout(), Duration::from_secs(15));
    }
}
