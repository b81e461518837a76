//! Configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! All optional:
//! - `STOREFRONT_HOST` - Bind address (default: 127.0.0.1)
//! - `PORT` - Listen port (default: 8083)
//! - `DATABASE_URL` - Postgres document store; the in-memory store is used when unset
//! - `CATALOG_API_URL` - Product catalog (default: https://dummyjson.com)
//! - `PINCODE_API_URL` - Postal code directory (default: https://api.postalpincode.in)
//! - `GEONAMES_API_URL` - Coordinate lookup (default: https://secure.geonames.org)
//! - `GEONAMES_USERNAME` - Coordinate lookup account; lookup is disabled without it
//! - `LOCAL_STORAGE_PATH` - Local storage file (default: .storefront/local-storage.json)
//! - `STORE_RETRY_ATTEMPTS` - Attempts per conflicting write (default: 4)
//! - `STORE_RETRY_BACKOFF_MS` - First retry delay (default: 120)
//! - `STOREFRONT_CURRENCY` - Currency for totals (default: INR)
//! - `HTTP_TIMEOUT_SECS` - Outbound request timeout (default: 10)

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;
use crate::store::RetryPolicy;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
}

#[derive(Debug, Clone)]
pub struct Config {
    pub host: IpAddr,
    pub port: u16,
    pub database_url: Option<String>,
    pub catalog_api_url: String,
    pub pincode_api_url: String,
    pub geonames_api_url: String,
    pub geonames_username: Option<String>,
    pub local_storage_path: PathBuf,
    pub retry: RetryPolicy,
    pub currency: String,
    pub http_timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: 8083,
            database_url: None,
            catalog_api_url: "https://dummyjson.com".to_string(),
            pincode_api_url: "https://api.postalpincode.in".to_string(),
            geonames_api_url: "https://secure.geonames.org".to_string(),
            geonames_username: None,
            local_storage_path: PathBuf::from(".storefront/local-storage.json"),
            retry: RetryPolicy::default(),
            currency: "INR".to_string(),
            http_timeout: Duration::from_secs(10),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from any key lookup; unset or blank keys keep their default.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let defaults = Self::default();
        Ok(Self {
            host: parse_or(get("STOREFRONT_HOST"), "STOREFRONT_HOST", defaults.host)?,
            port: parse_or(get("PORT"), "PORT", defaults.port)?,
            database_url: get("DATABASE_URL"),
            catalog_api_url: get("CATALOG_API_URL").unwrap_or(defaults.catalog_api_url),
            pincode_api_url: get("PINCODE_API_URL").unwrap_or(defaults.pincode_api_url),
            geonames_api_url: get("GEONAMES_API_URL").unwrap_or(defaults.geonames_api_url),
            geonames_username: get("GEONAMES_USERNAME"),
            local_storage_path: get("LOCAL_STORAGE_PATH").map(PathBuf::from).unwrap_or(defaults.local_storage_path),
            retry: RetryPolicy {
                max_attempts: parse_or(get("STORE_RETRY_ATTEMPTS"), "STORE_RETRY_ATTEMPTS", defaults.retry.max_attempts)?,
                base_backoff_ms: parse_or(get("STORE_RETRY_BACKOFF_MS"), "STORE_RETRY_BACKOFF_MS", defaults.retry.base_backoff_ms)?,
            },
            currency: get("STOREFRONT_CURRENCY").map(|c| c.to_uppercase()).unwrap_or(defaults.currency),
            http_timeout: Duration::from_secs(parse_or(get("HTTP_TIMEOUT_SECS"), "HTTP_TIMEOUT_SECS", defaults.http_timeout.as_secs())?),
        })
    }

    pub fn socket_addr(&self) -> SocketAddr { SocketAddr::new(self.host, self.port) }
}

fn parse_or<T: FromStr>(value: Option<String>, key: &str, default: T) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    match value {
        None => Ok(default),
        Some(raw) => raw.parse().map_err(|e: T::Err| ConfigError::InvalidEnvVar(key.to_string(), format!("{raw:?}: {e}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.port, 8083);
        assert_eq!(config.currency, "INR");
        assert!(config.database_url.is_none());
        assert_eq!(config.retry.max_attempts, 4);
    }

    #[test]
    fn test_overrides() {
        let config = Config::from_lookup(lookup(&[
            ("PORT", "9000"), ("DATABASE_URL", "postgres://localhost/shop"), ("STOREFRONT_CURRENCY", "usd"),
            ("STORE_RETRY_ATTEMPTS", "2"), ("GEONAMES_USERNAME", " "),
        ]))
        .unwrap();
        assert_eq!(config.socket_addr().port(), 9000);
        assert_eq!(config.database_url.as_deref(), Some("postgres://localhost/shop"));
        assert_eq!(config.currency, "USD");
        assert_eq!(config.retry.max_attempts, 2);
        assert!(config.geonames_username.is_none());
    }

    #[test]
    fn test_invalid_value() {
        let err = Config::from_lookup(lookup(&[("PORT", "eighty")])).unwrap_err();
        assert!(err.to_string().contains("PORT"));
    }
}
