//! Service Configuration Module
//!
//! Configuration is loaded from environment variables with defaults that
//! match a local development setup (Postgres and Kafka on localhost).

use std::net::SocketAddr;
use std::time::Duration;

use orderline_core::{ConfigError, RetryPolicy};
use tokio_postgres::config::SslMode;

// ============================================================================
// DATABASE
// ============================================================================

/// PostgreSQL connection settings.
#[derive(Debug, Clone)]
pub struct DbConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub dbname: String,
    pub sslmode: SslMode,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5432,
            user: "myuser".to_string(),
            password: "mypassword".to_string(),
            dbname: "mydatabase".to_string(),
            sslmode: SslMode::Disable,
        }
    }
}

impl DbConfig {
    /// Environment variables:
    /// - `DB_HOST`, `DB_PORT`, `DB_USER`, `DB_PASSWORD`, `DB_NAME`
    /// - `DB_SSLMODE`: `disable`, `prefer` or `require` (default: disable)
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(|key| std::env::var(key).ok())
    }

    pub fn from_vars(var: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        Ok(Self {
            host: var("DB_HOST").unwrap_or(defaults.host),
            port: parse_or("DB_PORT", &var, defaults.port)?,
            user: var("DB_USER").unwrap_or(defaults.user),
            password: var("DB_PASSWORD").unwrap_or(defaults.password),
            dbname: var("DB_NAME").unwrap_or(defaults.dbname),
            sslmode: match var("DB_SSLMODE") {
                Some(value) => parse_sslmode(&value)?,
                None => defaults.sslmode,
            },
        })
    }

    /// Driver configuration for a single connection.
    pub fn pg_config(&self) -> tokio_postgres::Config {
        let mut config = tokio_postgres::Config::new();
        config
            .host(&self.host)
            .port(self.port)
            .user(&self.user)
            .password(&self.password)
            .dbname(&self.dbname)
            .ssl_mode(self.sslmode);
        config
    }
}

fn parse_sslmode(value: &str) -> Result<SslMode, ConfigError> {
    match value.to_lowercase().as_str() {
        "disable" => Ok(SslMode::Disable),
        "prefer" => Ok(SslMode::Prefer),
        "require" => Ok(SslMode::Require),
        _ => Err(ConfigError::InvalidValue {
            field: "DB_SSLMODE".to_string(),
            value: value.to_string(),
            reason: "expected disable, prefer or require".to_string(),
        }),
    }
}

// ============================================================================
// MESSAGE STREAM
// ============================================================================

/// Consumer group settings for the order topic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamConfig {
    pub brokers: String,
    pub topic: String,
    pub group_id: String,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            brokers: "localhost:9092".to_string(),
            topic: "orders".to_string(),
            group_id: "my_group".to_string(),
        }
    }
}

impl StreamConfig {
    pub fn from_vars(var: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            brokers: var("KAFKA_BROKERS").unwrap_or(defaults.brokers),
            topic: var("KAFKA_TOPIC").unwrap_or(defaults.topic),
            group_id: var("KAFKA_GROUP_ID").unwrap_or(defaults.group_id),
        }
    }
}

// ============================================================================
// SERVICE
// ============================================================================

/// Everything the service binary needs at startup.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub db: DbConfig,
    pub retry: RetryPolicy,
    pub stream: StreamConfig,
    pub http_addr: SocketAddr,
}

impl ServiceConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(|key| std::env::var(key).ok())
    }

    /// Additional variables on top of [`DbConfig`] and [`StreamConfig`]:
    /// - `DB_CONNECT_ATTEMPTS` (default: 5)
    /// - `DB_CONNECT_INTERVAL_SECS` (default: 3)
    /// - `ORDERLINE_HTTP_ADDR` (default: 0.0.0.0:8080)
    pub fn from_vars(var: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = RetryPolicy::default();
        let attempts = parse_or("DB_CONNECT_ATTEMPTS", &var, defaults.max_attempts)?;
        let interval_secs = parse_or("DB_CONNECT_INTERVAL_SECS", &var, defaults.interval.as_secs())?;

        Ok(Self {
            db: DbConfig::from_vars(&var)?,
            retry: RetryPolicy::new(attempts, Duration::from_secs(interval_secs)),
            stream: StreamConfig::from_vars(&var),
            http_addr: parse_or(
                "ORDERLINE_HTTP_ADDR",
                &var,
                SocketAddr::from(([0, 0, 0, 0], 8080)),
            )?,
        })
    }
}

fn parse_or<T>(
    key: &str,
    var: &impl Fn(&str) -> Option<String>,
    default: T,
) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match var(key) {
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::InvalidValue {
            field: key.to_string(),
            value: raw.clone(),
            reason: e.to_string(),
        }),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn vars(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = ServiceConfig::from_vars(vars(&[])).unwrap();
        assert_eq!(config.db.host, "localhost");
        assert_eq!(config.db.port, 5432);
        assert_eq!(config.db.dbname, "mydatabase");
        assert!(matches!(config.db.sslmode, SslMode::Disable));
        assert_eq!(config.retry, RetryPolicy::default());
        assert_eq!(config.stream, StreamConfig::default());
        assert_eq!(config.http_addr.port(), 8080);
    }

    #[test]
    fn test_overrides() {
        let config = ServiceConfig::from_vars(vars(&[
            ("DB_HOST", "db"),
            ("DB_PORT", "6543"),
            ("DB_SSLMODE", "REQUIRE"),
            ("DB_CONNECT_ATTEMPTS", "2"),
            ("DB_CONNECT_INTERVAL_SECS", "0"),
            ("KAFKA_BROKERS", "kafka:29092"),
            ("KAFKA_TOPIC", "orders-v2"),
            ("ORDERLINE_HTTP_ADDR", "127.0.0.1:9000"),
        ]))
        .unwrap();

        assert_eq!(config.db.host, "db");
        assert_eq!(config.db.port, 6543);
        assert!(matches!(config.db.sslmode, SslMode::Require));
        assert_eq!(config.retry.max_attempts, 2);
        assert_eq!(config.retry.interval, Duration::ZERO);
        assert_eq!(config.stream.brokers, "kafka:29092");
        assert_eq!(config.stream.topic, "orders-v2");
        assert_eq!(config.stream.group_id, "my_group");
        assert_eq!(config.http_addr.to_string(), "127.0.0.1:9000");
    }

    #[test]
    fn test_invalid_port_rejected() {
        let err = DbConfig::from_vars(vars(&[("DB_PORT", "five")])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref field, .. } if field == "DB_PORT"));
    }

    #[test]
    fn test_invalid_sslmode_rejected() {
        let err = DbConfig::from_vars(vars(&[("DB_SSLMODE", "verify-full")])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref field, .. } if field == "DB_SSLMODE"));
    }
}
