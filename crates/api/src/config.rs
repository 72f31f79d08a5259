//! Configuration loaded from environment variables.

use std::env;
use std::net::SocketAddr;
use std::time::Duration;

use provider_gateway::config::{DEFAULT_SEND_TIMEOUT, DEFAULT_STATUS_TIMEOUT};

/// API server configuration.
#[derive(Clone)]
pub struct Config {
    /// Server bind address.
    pub addr: SocketAddr,
    /// SQLite database URL.
    pub database_url: String,
    /// Upstream provider base URL.
    pub provider_base_url: String,
    /// Provider token used when `provider.api_key` is not set in the config store.
    pub provider_api_key: Option<String>,
    pub provider_send_timeout: Duration,
    pub provider_status_timeout: Duration,
    /// HMAC secret for dashboard JWTs.
    pub jwt_secret: String,
    /// Mixed into every API key hash.
    pub api_key_pepper: String,
    /// Shared secret expected in `X-Webhook-Secret` on inbound webhooks.
    pub webhook_secret: Option<String>,
    /// Dial prefix for numbers without a country code.
    pub default_dial_prefix: String,
    /// The one tenant nobody else may demote or disable.
    pub operator_tenant_id: Option<String>,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// | Variable | Description | Default |
    /// |----------|-------------|---------|
    /// | `API_ADDR` | Server bind address | `127.0.0.1:8790` |
    /// | `SQLITE_PATH` | SQLite database URL | `sqlite:sms.db?mode=rwc` |
    /// | `PROVIDER_BASE_URL` | Upstream SMS API | `http://127.0.0.1:9000` |
    /// | `PROVIDER_API_KEY` | Fallback provider token | (none) |
    /// | `PROVIDER_SEND_TIMEOUT_SECS` | Send call timeout | `20` |
    /// | `PROVIDER_STATUS_TIMEOUT_SECS` | Status/balance timeout | `8` |
    /// | `JWT_SECRET` | Dashboard token secret | (required) |
    /// | `API_KEY_PEPPER` | API key hash pepper | empty |
    /// | `WEBHOOK_SECRET` | Inbound webhook secret | (none, unchecked) |
    /// | `DEFAULT_DIAL_PREFIX` | Default country prefix | `+1` |
    /// | `OPERATOR_TENANT_ID` | Immutable operator tenant | (none) |
    pub fn from_env() -> Result<Self, ConfigError> {
        let addr = env::var("API_ADDR")
            .unwrap_or_else(|_| "127.0.0.1:8790".to_string())
            .parse()
            .map_err(|_| ConfigError::InvalidAddr)?;

        let database_url = env::var("SQLITE_PATH").unwrap_or_else(|_| "sqlite:sms.db?mode=rwc".to_string());

        let provider_base_url =
            env::var("PROVIDER_BASE_URL").unwrap_or_else(|_| "http://127.0.0.1:9000".to_string());

        let jwt_secret = optional("JWT_SECRET").ok_or(ConfigError::MissingJwtSecret)?;

        Ok(Self {
            addr,
            database_url,
            provider_base_url,
            provider_api_key: optional("PROVIDER_API_KEY"),
            provider_send_timeout: seconds("PROVIDER_SEND_TIMEOUT_SECS", DEFAULT_SEND_TIMEOUT)?,
            provider_status_timeout: seconds("PROVIDER_STATUS_TIMEOUT_SECS", DEFAULT_STATUS_TIMEOUT)?,
            jwt_secret,
            api_key_pepper: env::var("API_KEY_PEPPER").unwrap_or_default(),
            webhook_secret: optional("WEBHOOK_SECRET"),
            default_dial_prefix: optional("DEFAULT_DIAL_PREFIX").unwrap_or_else(|| "+1".to_string()),
            operator_tenant_id: optional("OPERATOR_TENANT_ID"),
        })
    }

    /// Defaults for tests and local runs against `base_url`.
    pub fn for_provider(base_url: impl Into<String>, jwt_secret: impl Into<String>) -> Self {
        Self {
            addr: SocketAddr::from(([127, 0, 0, 1], 8790)),
            database_url: "sqlite::memory:".to_string(),
            provider_base_url: base_url.into(),
            provider_api_key: None,
            provider_send_timeout: DEFAULT_SEND_TIMEOUT,
            provider_status_timeout: DEFAULT_STATUS_TIMEOUT,
            jwt_secret: jwt_secret.into(),
            api_key_pepper: String::new(),
            webhook_secret: None,
            default_dial_prefix: "+1".to_string(),
            operator_tenant_id: None,
        }
    }
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("addr", &self.addr)
            .field("database_url", &self.database_url)
            .field("provider_base_url", &self.provider_base_url)
            .field("provider_send_timeout", &self.provider_send_timeout)
            .field("provider_status_timeout", &self.provider_status_timeout)
            .field("webhook_secret", &self.webhook_secret.as_ref().map(|_| "<redacted>"))
            .field("default_dial_prefix", &self.default_dial_prefix)
            .field("operator_tenant_id", &self.operator_tenant_id)
            .finish_non_exhaustive()
    }
}

fn optional(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn seconds(name: &'static str, default: Duration) -> Result<Duration, ConfigError> {
    match optional(name) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse::<u64>()
            .map(Duration::from_secs)
            .map_err(|_| ConfigError::InvalidNumber(name)),
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid API_ADDR format")]
    InvalidAddr,

    #[error("JWT_SECRET environment variable is required")]
    MissingJwtSecret,

    #[error("{0} must be a whole number of seconds")]
    InvalidNumber(&'static str),
}
