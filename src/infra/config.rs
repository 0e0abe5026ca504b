//! Centralized configuration (environment variables + defaults).

use crate::app::executor::ExecutorSettings;
use crate::domain::query::{ConnectionConfig, TrustMode, ValidationPolicy};
use anyhow::Context;
use std::collections::HashSet;
use std::str::FromStr;
use std::time::Duration;

/// Listen address of the API server.
pub fn bind_addr() -> String {
    std::env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".to_string())
}

/// Whether a `config` object sent by the caller may configure the pool.
pub fn accept_caller_config() -> anyhow::Result<bool> {
    parsed_or("PROXY_ACCEPT_CALLER_CONFIG", true)
}

/// Default connection parameters, used at startup and by the preflight tool.
///
/// Returns `Ok(None)` unless `DATABASE_HOST`, `DATABASE_NAME` and `DATABASE_USER` are all set.
pub fn default_connection() -> anyhow::Result<Option<ConnectionConfig>> {
    let (host, database, username) = match (
        non_empty("DATABASE_HOST"),
        non_empty("DATABASE_NAME"),
        non_empty("DATABASE_USER"),
    ) {
        (Some(h), Some(d), Some(u)) => (h, d, u),
        _ => return Ok(None),
    };

    Ok(Some(ConnectionConfig {
        host,
        port: parsed_or("DATABASE_PORT", 5432u16)?,
        database,
        username,
        password: std::env::var("DATABASE_PASSWORD").unwrap_or_default(),
        ssl: parsed_or("DATABASE_SSL", false)?,
    }))
}

/// Pool sizing, timeouts and validation policy for the executor.
pub fn executor_settings() -> anyhow::Result<ExecutorSettings> {
    Ok(ExecutorSettings {
        max_connections: parsed_or("DB_MAX_CONNECTIONS", 5u32)?.max(1),
        acquire_timeout: Duration::from_secs(parsed_or("DB_ACQUIRE_TIMEOUT_SECS", 10u64)?.max(1)),
        query_timeout: Duration::from_secs(parsed_or("QUERY_TIMEOUT_SECS", 30u64)?.max(1)),
        policy: validation_policy()?,
    })
}

pub fn validation_policy() -> anyhow::Result<ValidationPolicy> {
    let mode = match non_empty("PROXY_TRUST_MODE") {
        Some(v) => TrustMode::from_str(&v).map_err(|e| anyhow::anyhow!("PROXY_TRUST_MODE: {}", e))?,
        None => TrustMode::default(),
    };
    let allowed_tables = non_empty("PROXY_ALLOWED_TABLES").map(|v| parse_table_list(&v));
    Ok(ValidationPolicy {
        mode,
        allowed_tables,
    })
}

fn parse_table_list(v: &str) -> HashSet<String> {
    v.split(',')
        .map(|t| t.trim())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_string())
        .collect()
}

fn non_empty(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parsed_or<T>(key: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match non_empty(key) {
        Some(v) => v
            .parse::<T>()
            .with_context(|| format!("{} has an invalid value '{}'", key, v)),
        None => Ok(default),
    }
}
