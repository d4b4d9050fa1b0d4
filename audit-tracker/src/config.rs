//! Audit client configuration
//!
//! Configuration is loaded from multiple sources with the following
//! precedence (highest to lowest):
//! 1. Environment variables (prefix: AUDIT_, nested keys split on "__")
//! 2. TOML file (./audit.toml by default)
//! 3. Default values
//!
//! The client reads the live configuration on every dispatch, so a host
//! application may mutate it at any time through the shared handle owned
//! by [`Tracker`](crate::tracker::Tracker).

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{AuditError, Result};

/// Default queue routing name for asynchronous delivery
pub const DEFAULT_QUEUE_NAME: &str = "tracker";

/// Audit client configuration
///
/// `endpoint`, `api_key` and `api_secret` are required for dispatch;
/// [`AuditConfig::is_valid`] reports whether they are usable and
/// [`AuditConfig::error_messages`] aggregates everything that is wrong
/// into a single readable sentence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditConfig {
    /// URL that serves the audit API, e.g. "http://localhost:8090"
    #[serde(default)]
    pub endpoint: Option<String>,

    /// Key expected by the audit API; validated by the service on every
    /// request
    #[serde(default)]
    pub api_key: Option<String>,

    /// Secret expected by the audit API; validated by the service on
    /// every request
    #[serde(default)]
    pub api_secret: Option<String>,

    /// Convert every internal failure into `Ok(false)` instead of a typed
    /// error (default: true)
    #[serde(default = "default_true")]
    pub fail_silently: bool,

    /// Deliver through the queue backend instead of synchronously
    /// (default: false)
    #[serde(default)]
    pub use_queue: bool,

    /// Queue routing name for asynchronous delivery (default: "tracker")
    #[serde(default = "default_queue_name")]
    pub queue_name: String,

    /// HTTP request timeout in seconds (default: 30)
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Queue backend configuration (required when `use_queue` is true)
    #[serde(default)]
    pub redis: Option<RedisConfig>,
}

/// Queue backend (Redis) configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisConfig {
    /// Redis connection URL (redis://host:port)
    pub url: String,

    /// Maximum number of connections in the pool
    #[serde(default = "default_redis_max_connections")]
    pub max_connections: usize,

    /// Maximum retry attempts for establishing the Redis connection
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Delay between retry attempts in seconds
    #[serde(default = "default_retry_delay")]
    pub retry_delay_secs: u64,
}

// Default value functions
fn default_true() -> bool {
    true
}

fn default_queue_name() -> String {
    DEFAULT_QUEUE_NAME.to_string()
}

fn default_request_timeout() -> u64 {
    30
}

fn default_redis_max_connections() -> usize {
    20
}

fn default_max_retries() -> u32 {
    5
}

fn default_retry_delay() -> u64 {
    2
}

impl AuditConfig {
    /// Load configuration from ./audit.toml and AUDIT_-prefixed
    /// environment variables
    pub fn load() -> Result<Self> {
        Self::load_from("audit.toml")
    }

    /// Load configuration from a specific TOML file
    ///
    /// Environment variables (AUDIT_ prefix) override file values; nested
    /// keys use "__", e.g. `AUDIT_REDIS__URL`.
    pub fn load_from(path: &str) -> Result<Self> {
        let config = Figment::new()
            .merge(Serialized::defaults(AuditConfig::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed("AUDIT_").split("__"))
            .extract()
            .map_err(|e| {
                AuditError::missing_configuration(format!("Failed to load configuration: {}", e))
            })?;

        Ok(config)
    }

    /// Run every validity check and collect one message per violation
    ///
    /// Checks run in fixed order and do not short-circuit, so a
    /// configuration missing several attributes reports all of them at
    /// once: endpoint present, endpoint is a valid HTTP(S) URL, api_key
    /// present, api_secret present.
    pub fn validation_errors(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.endpoint.is_none() {
            errors.push("No endpoint specified".to_string());
        }
        if !self.endpoint_is_http_url() {
            errors.push("Invalid endpoint, it must be a valid URL".to_string());
        }
        if self.api_key.is_none() {
            errors.push("No api_key specified".to_string());
        }
        if self.api_secret.is_none() {
            errors.push("No api_secret specified".to_string());
        }

        errors
    }

    /// Whether the configuration can be used for dispatch
    pub fn is_valid(&self) -> bool {
        self.validation_errors().is_empty()
    }

    /// Aggregate all validation errors into one comma-joined sentence
    ///
    /// Every message after the first is lower-cased so the result reads
    /// as a single sentence, e.g. "No endpoint specified, invalid
    /// endpoint, it must be a valid URL, no api_key specified".
    pub fn error_messages(&self) -> String {
        let errors = self.validation_errors();
        if errors.is_empty() {
            return String::new();
        }

        errors
            .iter()
            .enumerate()
            .map(|(i, msg)| if i == 0 { msg.clone() } else { msg.to_lowercase() })
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// HTTP request timeout as a Duration
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    fn endpoint_is_http_url(&self) -> bool {
        match &self.endpoint {
            Some(endpoint) => reqwest::Url::parse(endpoint)
                .map(|url| matches!(url.scheme(), "http" | "https"))
                .unwrap_or(false),
            None => false,
        }
    }
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            api_key: None,
            api_secret: None,
            fail_silently: true,
            use_queue: false,
            queue_name: default_queue_name(),
            request_timeout_secs: default_request_timeout(),
            redis: None,
        }
    }
}
