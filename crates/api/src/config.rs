//! Application configuration loaded from environment variables.

use std::time::Duration;

use outbox::DispatcherConfig;

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl LogFormat {
    fn parse(value: &str) -> Self {
        if value.eq_ignore_ascii_case("json") {
            Self::Json
        } else {
            Self::Text
        }
    }
}

/// Server configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST`: bind address (default: `"0.0.0.0"`)
/// - `PORT`: listen port (default: `3000`)
/// - `RUST_LOG`: tracing filter directive (default: `"info"`)
/// - `LOG_FORMAT`: `text` or `json` (default: `text`)
/// - `DATABASE_URL`: PostgreSQL URL; in-memory stores when unset
/// - `OUTBOX_BATCH_SIZE`: records claimed per cycle (default: `50`)
/// - `OUTBOX_DISPATCH_INTERVAL_MS`: delay between cycles (default: `5000`)
/// - `OUTBOX_MAX_RETRY_ATTEMPTS`: attempts before a record fails (default: `5`)
/// - `OUTBOX_TOPIC`: destination topic (default: `"order-created"`)
/// - `OUTBOX_PUBLISH_TIMEOUT_MS`: acknowledgment bound (default: `10000`)
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub log_format: LogFormat,
    pub database_url: Option<String>,
    pub outbox_batch_size: usize,
    pub outbox_dispatch_interval: Duration,
    pub outbox_max_retry_attempts: u32,
    pub outbox_topic: String,
    pub outbox_publish_timeout: Duration,
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads configuration from an arbitrary key lookup.
    ///
    /// Unparseable numeric values fall back to their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let number = |key: &str| lookup(key).and_then(|v| v.trim().parse::<u64>().ok());

        Self {
            host: lookup("HOST").unwrap_or(defaults.host),
            port: lookup("PORT")
                .and_then(|p| p.parse().ok())
                .unwrap_or(defaults.port),
            log_level: lookup("RUST_LOG").unwrap_or(defaults.log_level),
            log_format: lookup("LOG_FORMAT")
                .map(|f| LogFormat::parse(&f))
                .unwrap_or(defaults.log_format),
            database_url: lookup("DATABASE_URL").filter(|url| !url.trim().is_empty()),
            outbox_batch_size: number("OUTBOX_BATCH_SIZE")
                .filter(|n| *n > 0)
                .map(|n| n as usize)
                .unwrap_or(defaults.outbox_batch_size),
            outbox_dispatch_interval: number("OUTBOX_DISPATCH_INTERVAL_MS")
                .filter(|n| *n > 0)
                .map(Duration::from_millis)
                .unwrap_or(defaults.outbox_dispatch_interval),
            outbox_max_retry_attempts: number("OUTBOX_MAX_RETRY_ATTEMPTS")
                .filter(|n| *n > 0)
                .and_then(|n| u32::try_from(n).ok())
                .unwrap_or(defaults.outbox_max_retry_attempts),
            outbox_topic: lookup("OUTBOX_TOPIC")
                .filter(|t| !t.trim().is_empty())
                .unwrap_or(defaults.outbox_topic),
            outbox_publish_timeout: number("OUTBOX_PUBLISH_TIMEOUT_MS")
                .filter(|n| *n > 0)
                .map(Duration::from_millis)
                .unwrap_or(defaults.outbox_publish_timeout),
        }
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Returns the dispatcher settings.
    pub fn dispatcher_config(&self) -> DispatcherConfig {
        DispatcherConfig {
            batch_size: self.outbox_batch_size,
            dispatch_interval: self.outbox_dispatch_interval,
            max_retry_attempts: self.outbox_max_retry_attempts,
            topic: self.outbox_topic.clone(),
            publish_timeout: self.outbox_publish_timeout,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            log_level: "info".to_string(),
            log_format: LogFormat::Text,
            database_url: None,
            outbox_batch_size: DispatcherConfig::DEFAULT_BATCH_SIZE,
            outbox_dispatch_interval: DispatcherConfig::DEFAULT_DISPATCH_INTERVAL,
            outbox_max_retry_attempts: DispatcherConfig::DEFAULT_MAX_RETRY_ATTEMPTS,
            outbox_topic: DispatcherConfig::DEFAULT_TOPIC.to_string(),
            outbox_publish_timeout: DispatcherConfig::DEFAULT_PUBLISH_TIMEOUT,
        }
    }
}
