//! Application configuration loaded from environment variables.

use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;

use orchestrator::DEFAULT_ORDER_TTL_SECS;
use orchestrator::reaper::{DEFAULT_REAP_CONCURRENCY, DEFAULT_REAP_INTERVAL};
use orchestrator::services::ProviderCodeTable;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {name}: {value:?}")]
    InvalidValue { name: &'static str, value: String },

    #[error("invalid PROVIDER_CODES: {0}")]
    InvalidProviderCodes(#[from] serde_json::Error),
}

/// Server configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST`: bind address (default: `"0.0.0.0"`)
/// - `PORT`: listen port (default: `3000`)
/// - `RUST_LOG`: tracing filter directive (default: `"info"`)
/// - `REAPER_INTERVAL_SECS`: expiry reaper period (default: `30`)
/// - `REAPER_CONCURRENCY`: orders cancelled in parallel per tick (default: `8`)
/// - `ORDER_TTL_SECS`: lifetime of an unfinished order (default: `900`)
/// - `TASK_POOL_SIZE`: background tasks running at once (default: `32`)
/// - `PROVIDER_CODES`: JSON object of provider name to
///   `{"success": [..], "pending": [..]}`, merged over the built-in tables
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub reaper_interval: Duration,
    pub reaper_concurrency: usize,
    pub order_ttl_secs: i64,
    pub task_pool_size: usize,
    pub provider_codes: HashMap<String, ProviderCodeTable>,
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Loads configuration from `lookup`, falling back to defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let provider_codes = match lookup("PROVIDER_CODES") {
            Some(json) if !json.trim().is_empty() => serde_json::from_str(&json)?,
            _ => HashMap::new(),
        };

        Ok(Self {
            host: lookup("HOST").unwrap_or(defaults.host),
            port: parse(&lookup, "PORT", defaults.port)?,
            log_level: lookup("RUST_LOG").unwrap_or(defaults.log_level),
            reaper_interval: Duration::from_secs(parse(
                &lookup,
                "REAPER_INTERVAL_SECS",
                defaults.reaper_interval.as_secs(),
            )?),
            reaper_concurrency: parse(&lookup, "REAPER_CONCURRENCY", defaults.reaper_concurrency)?,
            order_ttl_secs: parse(&lookup, "ORDER_TTL_SECS", defaults.order_ttl_secs)?,
            task_pool_size: parse(&lookup, "TASK_POOL_SIZE", defaults.task_pool_size)?,
            provider_codes,
        })
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match lookup(name) {
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue { name, value }),
        None => Ok(default),
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            log_level: "info".to_string(),
            reaper_interval: DEFAULT_REAP_INTERVAL,
            reaper_concurrency: DEFAULT_REAP_CONCURRENCY,
            order_ttl_secs: DEFAULT_ORDER_TTL_SECS,
            task_pool_size: 32,
            provider_codes: HashMap::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn test_default_values() {
        let config = Config::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 3000);
        assert_eq!(config.log_level, "info");
        assert_eq!(config.reaper_interval, Duration::from_secs(30));
        assert_eq!(config.order_ttl_secs, 900);
        assert!(config.provider_codes.is_empty());
    }

    #[test]
    fn test_overrides() {
        let config = Config::from_lookup(lookup(&[
            ("PORT", "8080"),
            ("REAPER_INTERVAL_SECS", "5"),
            ("TASK_POOL_SIZE", "4"),
            (
                "PROVIDER_CODES",
                r#"{"bill":{"success":["00"],"pending":["WAIT"]}}"#,
            ),
        ]))
        .unwrap();
        assert_eq!(config.port, 8080);
        assert_eq!(config.reaper_interval, Duration::from_secs(5));
        assert_eq!(config.task_pool_size, 4);
        assert!(config.provider_codes["bill"].is_pending("WAIT"));
    }

    #[test]
    fn test_invalid_values() {
        let err = Config::from_lookup(lookup(&[("PORT", "http")])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { name: "PORT", .. }));

        let err = Config::from_lookup(lookup(&[("PROVIDER_CODES", "[1,2]")])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidProviderCodes(_)));
    }

    #[test]
    fn test_addr_formatting() {
        let config = Config {
            host: "127.0.0.1".to_string(),
            port: 8080,
            ..Config::default()
        };
        assert_eq!(config.addr(), "127.0.0.1:8080");
    }
}
