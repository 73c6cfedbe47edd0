//! Environment-backed configuration, loaded once at startup.

use crate::error::{AppError, Result};

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    pub jwt_secret: String,
    /// Shared secret for service-to-service endpoints (`x-internal-token`).
    pub internal_api_token: String,
    pub product_catalog_url: String,
    pub promotions_url: String,
    pub inventory_url: String,
    pub payments_url: String,
    pub orders_url: String,
    pub notifications_url: String,
    pub http_timeout_secs: u64,
    pub outbox_poll_secs: u64,
    pub outbox_backoff_base_secs: u64,
    pub outbox_backoff_cap_secs: u64,
    pub nats_url: Option<String>,
}

fn required(name: &str) -> Result<String> {
    std::env::var(name).map_err(|_| AppError::Config(format!("Missing environment variable '{}'", name)))
}

fn parse_var<T: std::str::FromStr>(name: &str, default: T) -> Result<T> {
    match std::env::var(name) {
        Ok(raw) => raw
            .parse::<T>()
            .map_err(|_| AppError::Config(format!("Invalid value for '{}': {}", name, raw))),
        Err(_) => Ok(default),
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
        let port: u16 = parse_var("PORT", 8080)?;

        // Sibling services default to this process; the URLs exist so the
        // route groups can be split into separate deployments.
        let self_base = format!("http://127.0.0.1:{}", port);
        let service_url = |name: &str| std::env::var(name).unwrap_or_else(|_| self_base.clone());

        Ok(Self {
            database_url: required("DATABASE_URL")?,
            jwt_secret: required("JWT_SECRET")?,
            internal_api_token: required("INTERNAL_API_TOKEN")?,
            product_catalog_url: service_url("PRODUCT_CATALOG_URL"),
            promotions_url: service_url("PROMOTIONS_SERVICE_URL"),
            inventory_url: service_url("INVENTORY_SERVICE_URL"),
            payments_url: service_url("PAYMENT_SERVICE_URL"),
            orders_url: service_url("ORDER_SERVICE_URL"),
            notifications_url: service_url("NOTIFICATION_SERVICE_URL"),
            http_timeout_secs: parse_var("HTTP_TIMEOUT_SECS", 5)?,
            outbox_poll_secs: parse_var("OUTBOX_POLL_SECS", 5)?,
            outbox_backoff_base_secs: parse_var("OUTBOX_BACKOFF_BASE_SECS", 2)?,
            outbox_backoff_cap_secs: parse_var("OUTBOX_BACKOFF_CAP_SECS", 300)?,
            nats_url: std::env::var("NATS_URL").ok(),
            host,
            port,
        })
    }
}
