//! Readiness checks reported by the `config` command.

use crate::config::Config;
use anyhow::{Context, Result};
use sqlx::PgPool;
use std::time::Duration;

pub struct Check {
    pub name: &'static str,
    pub outcome: Result<()>,
}

pub struct ValidationReport {
    pub checks: Vec<Check>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.checks.iter().all(|check| check.outcome.is_ok())
    }

    pub fn print(&self) {
        for check in &self.checks {
            match &check.outcome {
                Ok(()) => println!("  ✓ {}", check.name),
                Err(e) => println!("  ✗ {}: {:#}", check.name, e),
            }
        }
    }
}

pub async fn validate_environment(config: &Config, pool: &PgPool) -> ValidationReport {
    ValidationReport {
        checks: vec![
            Check {
                name: "payment settings",
                outcome: check_payment_settings(config),
            },
            Check {
                name: "order schema",
                outcome: check_schema(pool).await,
            },
            Check {
                name: "payment gateway",
                outcome: check_gateway(&config.payment_gateway_url).await,
            },
        ],
    }
}

fn check_payment_settings(config: &Config) -> Result<()> {
    if config.payment_api_key.trim().is_empty() {
        anyhow::bail!("PAYMENT_API_KEY is empty");
    }
    url::Url::parse(&config.payment_gateway_url)
        .context("PAYMENT_GATEWAY_URL is not a valid URL")?;
    url::Url::parse(&config.payment_return_url)
        .context("PAYMENT_RETURN_URL is not a valid URL")?;
    Ok(())
}

/// The sweeper and order endpoints need the orders table; `db migrate` creates it.
async fn check_schema(pool: &PgPool) -> Result<()> {
    let present: bool = sqlx::query_scalar("SELECT to_regclass('public.orders') IS NOT NULL")
        .fetch_one(pool)
        .await
        .context("database unreachable")?;
    if !present {
        anyhow::bail!("orders table missing, run `db migrate`");
    }
    Ok(())
}

/// Reachability only; any answer below 500 counts.
async fn check_gateway(gateway_url: &str) -> Result<()> {
    let response = reqwest::Client::builder()
        .timeout(Duration::from_secs(10))
        .build()?
        .get(gateway_url)
        .send()
        .await
        .context("no answer")?;

    if response.status().is_server_error() {
        anyhow::bail!("answered {}", response.status());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LogFormat;

    fn config() -> Config {
        Config {
            server_port: 3000,
            database_url: "postgres://localhost:5432/test".to_string(),
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
    fn test_payment_settings_ok() {
        assert!(check_payment_settings(&config()).is_ok());
    }

    #[test]
    fn test_payment_settings_reject_blank_key_and_bad_urls() {
        let mut blank = config();
        blank.payment_api_key = " ".to_string();
        assert!(check_payment_settings(&blank).is_err());

        let mut bad_url = config();
        bad_url.payment_return_url = "not-a-url".to_string();
        assert!(check_payment_settings(&bad_url).is_err());
    }

    #[test]
    fn test_report_fails_when_any_check_fails() {
        let report = ValidationReport {
            checks: vec![
                Check {
                    name: "a",
                    outcome: Ok(()),
                },
                Check {
                    name: "b",
                    outcome: Err(anyhow::anyhow!("down")),
                },
            ],
        };
        assert!(!report.is_valid());
    }

    #[tokio::test]
    async fn test_gateway_check_accepts_client_errors() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server.mock("GET", "/").with_status(404).create_async().await;
        assert!(check_gateway(&server.url()).await.is_ok());
    }

    #[tokio::test]
    async fn test_gateway_check_rejects_server_errors() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server.mock("GET", "/").with_status(503).create_async().await;
        assert!(check_gateway(&server.url()).await.is_err());
    }
}
