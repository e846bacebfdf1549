//! Application configuration loaded from environment variables.

use std::str::FromStr;
use std::time::Duration;

use domain::HoldPolicy;
use inventory::{HttpStockServiceConfig, InventorySettings};

/// Server configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST`, `PORT`: bind address (default `0.0.0.0:3000`)
/// - `RUST_LOG`: tracing filter directive (default `info`)
/// - `LOG_FORMAT`: `json` for JSON log lines, anything else for plain text
/// - `DATABASE_URL`: PostgreSQL connection string; absent means in-memory store
/// - `DATABASE_MAX_CONNECTIONS`: pool size (default `10`)
/// - `SWEEP_INTERVAL_SECS`, `SWEEP_BATCH_SIZE`: expiration sweeper cadence
/// - `CUSTOMER_HOLD_SECS`, `STOCK_HOLD_SECS`: hold lifetimes
/// - `UPSTREAM_BASE_URL`: stock service root; absent means in-memory sink
/// - `UPSTREAM_TOKEN`, `UPSTREAM_COUNTERPARTY_ID`, `UPSTREAM_TIMEOUT_SECS`
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub log_json: bool,
    pub database_url: Option<String>,
    pub database_max_connections: u32,
    pub sweep_interval_secs: u64,
    pub sweep_batch_size: usize,
    pub customer_hold_secs: i64,
    pub stock_hold_secs: i64,
    pub upstream_base_url: Option<String>,
    pub upstream_token: String,
    pub upstream_counterparty_id: String,
    pub upstream_timeout_secs: u64,
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads configuration from an arbitrary key lookup.
    ///
    /// Empty values count as absent; unparsable numbers fall back to the default.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let defaults = Self::default();

        Self {
            host: get("HOST").unwrap_or(defaults.host),
            port: parse(get("PORT")).unwrap_or(defaults.port),
            log_level: get("RUST_LOG").unwrap_or(defaults.log_level),
            log_json: get("LOG_FORMAT").is_some_and(|v| v.eq_ignore_ascii_case("json")),
            database_url: get("DATABASE_URL"),
            database_max_connections: parse(get("DATABASE_MAX_CONNECTIONS"))
                .unwrap_or(defaults.database_max_connections),
            sweep_interval_secs: parse(get("SWEEP_INTERVAL_SECS"))
                .unwrap_or(defaults.sweep_interval_secs),
            sweep_batch_size: parse(get("SWEEP_BATCH_SIZE")).unwrap_or(defaults.sweep_batch_size),
            customer_hold_secs: positive(parse(get("CUSTOMER_HOLD_SECS")))
                .unwrap_or(defaults.customer_hold_secs),
            stock_hold_secs: positive(parse(get("STOCK_HOLD_SECS")))
                .unwrap_or(defaults.stock_hold_secs),
            upstream_base_url: get("UPSTREAM_BASE_URL"),
            upstream_token: get("UPSTREAM_TOKEN").unwrap_or_default(),
            upstream_counterparty_id: get("UPSTREAM_COUNTERPARTY_ID").unwrap_or_default(),
            upstream_timeout_secs: parse(get("UPSTREAM_TIMEOUT_SECS"))
                .unwrap_or(defaults.upstream_timeout_secs),
        }
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs.max(1))
    }

    pub fn hold_policy(&self) -> HoldPolicy {
        HoldPolicy {
            customer: chrono::Duration::seconds(self.customer_hold_secs),
            stock: chrono::Duration::seconds(self.stock_hold_secs),
        }
    }

    pub fn settings(&self) -> InventorySettings {
        InventorySettings {
            hold_policy: self.hold_policy(),
            customer_counterparty_id: self.upstream_counterparty_id.clone(),
        }
    }

    /// Settings of the HTTP stock service adapter, if an upstream is configured.
    pub fn stock_service_config(&self) -> Option<HttpStockServiceConfig> {
        self.upstream_base_url
            .as_ref()
            .map(|base_url| HttpStockServiceConfig {
                base_url: base_url.clone(),
                token: self.upstream_token.clone(),
                timeout: Duration::from_secs(self.upstream_timeout_secs),
            })
    }
}

fn parse<T: FromStr>(raw: Option<String>) -> Option<T> {
    raw.and_then(|v| v.trim().parse().ok())
}

fn positive<T: PartialOrd + Default>(value: Option<T>) -> Option<T> {
    value.filter(|v| *v > T::default())
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            log_level: "info".to_string(),
            log_json: false,
            database_url: None,
            database_max_connections: 10,
            sweep_interval_secs: 30 * 60,
            sweep_batch_size: 500,
            customer_hold_secs: 60 * 60,
            stock_hold_secs: 2 * 24 * 60 * 60,
            upstream_base_url: None,
            upstream_token: String::new(),
            upstream_counterparty_id: String::new(),
            upstream_timeout_secs: 15,
        }
    }
}
