//! Application configuration loaded from environment variables.

use std::time::Duration;

use enrichment::{DEFAULT_CALL_TIMEOUT, DEFAULT_MAX_IN_FLIGHT};
use messaging::{AmqpConfig, DEFAULT_PUBLISH_TIMEOUT};

/// Server configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST`: bind address (default: `"0.0.0.0"`)
/// - `PORT`: listen port (default: `3000`)
/// - `RUST_LOG`: tracing filter directive (default: `"info"`)
/// - `DATABASE_DSN`: PostgreSQL connection string; in-memory store when unset
/// - `AMQP_URL`: RabbitMQ URL; in-memory broker and no consumer when unset
/// - `AMQP_EXCHANGE`: topic exchange (default: `"events"`)
/// - `AMQP_QUEUE`: queue consumed by this service (default: `"orders"`)
/// - `PRODUCTS_URL`: products service base URL (default: `"http://localhost:8080"`)
/// - `PUBLISH_TIMEOUT_SECS`: per-publish deadline (default: `5`)
/// - `ENRICHMENT_TIMEOUT_SECS`: per products call deadline (default: `5`)
/// - `ENRICHMENT_MAX_IN_FLIGHT`: concurrent products calls per read (default: `16`)
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub database_dsn: Option<String>,
    pub amqp_url: Option<String>,
    pub amqp_exchange: String,
    pub amqp_queue: String,
    pub products_url: String,
    pub publish_timeout: Duration,
    pub enrichment_timeout: Duration,
    pub enrichment_max_in_flight: usize,
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads configuration from an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let secs = |key: &str, default: Duration| {
            non_empty(key)
                .and_then(|v| v.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(default)
        };

        Self {
            host: non_empty("HOST").unwrap_or(defaults.host),
            port: non_empty("PORT")
                .and_then(|p| p.parse().ok())
                .unwrap_or(defaults.port),
            log_level: non_empty("RUST_LOG").unwrap_or(defaults.log_level),
            database_dsn: non_empty("DATABASE_DSN"),
            amqp_url: non_empty("AMQP_URL"),
            amqp_exchange: non_empty("AMQP_EXCHANGE").unwrap_or(defaults.amqp_exchange),
            amqp_queue: non_empty("AMQP_QUEUE").unwrap_or(defaults.amqp_queue),
            products_url: non_empty("PRODUCTS_URL").unwrap_or(defaults.products_url),
            publish_timeout: secs("PUBLISH_TIMEOUT_SECS", defaults.publish_timeout),
            enrichment_timeout: secs("ENRICHMENT_TIMEOUT_SECS", defaults.enrichment_timeout),
            enrichment_max_in_flight: non_empty("ENRICHMENT_MAX_IN_FLIGHT")
                .and_then(|v| v.parse().ok())
                .filter(|n: &usize| *n > 0)
                .unwrap_or(defaults.enrichment_max_in_flight),
        }
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Returns the broker settings, or `None` when no broker is configured.
    pub fn amqp(&self) -> Option<AmqpConfig> {
        self.amqp_url.as_ref().map(|url| {
            AmqpConfig::new(url.as_str(), self.amqp_queue.as_str())
                .with_exchange(self.amqp_exchange.as_str())
        })
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            log_level: "info".to_string(),
            database_dsn: None,
            amqp_url: None,
            amqp_exchange: messaging::amqp::DEFAULT_EXCHANGE.to_string(),
            amqp_queue: "orders".to_string(),
            products_url: "http://localhost:8080".to_string(),
            publish_timeout: DEFAULT_PUBLISH_TIMEOUT,
            enrichment_timeout: DEFAULT_CALL_TIMEOUT,
            enrichment_max_in_flight: DEFAULT_MAX_IN_FLIGHT,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn from_pairs(pairs: &[(&str, &str)]) -> Config {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_default_values() {
        let config = Config::default();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 3000);
        assert_eq!(config.log_level, "info");
        assert_eq!(config.amqp_exchange, "events");
        assert_eq!(config.amqp_queue, "orders");
        assert_eq!(config.publish_timeout, Duration::from_secs(5));
        assert_eq!(config.enrichment_timeout, Duration::from_secs(5));
        assert_eq!(config.enrichment_max_in_flight, 16);
        assert!(config.database_dsn.is_none());
        assert!(config.amqp().is_none());
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

    #[test]
    fn test_lookup_overrides() {
        let config = from_pairs(&[
            ("PORT", "9000"),
            ("DATABASE_DSN", "postgres://localhost/orders"),
            ("AMQP_URL", "amqp://localhost:5672"),
            ("AMQP_QUEUE", "orders-v2"),
            ("PRODUCTS_URL", "http://products"),
            ("PUBLISH_TIMEOUT_SECS", "2"),
            ("ENRICHMENT_MAX_IN_FLIGHT", "4"),
        ]);

        assert_eq!(config.port, 9000);
        assert_eq!(
            config.database_dsn.as_deref(),
            Some("postgres://localhost/orders")
        );
        assert_eq!(config.products_url, "http://products");
        assert_eq!(config.publish_timeout, Duration::from_secs(2));
        assert_eq!(config.enrichment_max_in_flight, 4);

        let amqp = config.amqp().unwrap();
        assert_eq!(amqp.url, "amqp://localhost:5672");
        assert_eq!(amqp.exchange, "events");
        assert_eq!(amqp.queue, "orders-v2");
    }

    #[test]
    fn test_invalid_values_fall_back() {
        let config = from_pairs(&[
            ("PORT", "not-a-port"),
            ("AMQP_URL", "  "),
            ("ENRICHMENT_MAX_IN_FLIGHT", "0"),
            ("ENRICHMENT_TIMEOUT_SECS", "soon"),
        ]);

        assert_eq!(config.port, 3000);
        assert!(config.amqp_url.is_none());
        assert_eq!(config.enrichment_max_in_flight, 16);
        assert_eq!(config.enrichment_timeout, Duration::from_secs(5));
    }
}
