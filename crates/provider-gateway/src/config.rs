//! Configuration types for the provider gateway.

use std::time::Duration;

/// Default timeout for send calls.
pub const DEFAULT_SEND_TIMEOUT: Duration = Duration::from_secs(20);

/// Default timeout for status and balance reads.
pub const DEFAULT_STATUS_TIMEOUT: Duration = Duration::from_secs(8);

/// Connection settings for the upstream SMS API.
#[derive(Clone)]
pub struct ProviderConfig {
    /// Base URL of the provider API (e.g., "https://sms.example.com/api").
    pub base_url: String,
    /// Shared bearer token. Required for every call.
    pub api_key: Option<String>,
    /// Timeout applied to send calls.
    pub send_timeout: Duration,
    /// Timeout applied to status and balance calls.
    pub status_timeout: Duration,
}

impl ProviderConfig {
    /// Create a configuration with default timeouts and no key.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: None,
            send_timeout: DEFAULT_SEND_TIMEOUT,
            status_timeout: DEFAULT_STATUS_TIMEOUT,
        }
    }

    /// Set the bearer token.
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    /// Override both timeouts.
    pub fn with_timeouts(mut self, send: Duration, status: Duration) -> Self {
        self.send_timeout = send;
        self.status_timeout = status;
        self
    }

    pub fn send_single_url(&self) -> String {
        format!("{}/sms/sendsingle", self.base_url)
    }

    pub fn send_bulk_url(&self) -> String {
        format!("{}/sms/sendbulk", self.base_url)
    }

    pub fn send_bulk_multi_url(&self) -> String {
        format!("{}/sms/sendbulkmulti", self.base_url)
    }

    pub fn status_url(&self, message_id: &str) -> String {
        format!("{}/sms/status/{}", self.base_url, urlencoding::encode(message_id))
    }

    pub fn balance_url(&self) -> String {
        format!("{}/account/balance", self.base_url)
    }
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self::new("http://localhost:9000")
    }
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("base_url", &self.base_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("send_timeout", &self.send_timeout)
            .field("status_timeout", &self.status_timeout)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_urls() {
        let config = ProviderConfig::new("http://127.0.0.1:9000/");
        assert_eq!(config.send_single_url(), "http://127.0.0.1:9000/sms/sendsingle");
        assert_eq!(config.status_url("a/b"), "http://127.0.0.1:9000/sms/status/a%2Fb");
        assert_eq!(config.balance_url(), "http://127.0.0.1:9000/account/balance");
    }

    #[test]
    fn test_debug_redacts_key() {
        let config = ProviderConfig::default().with_api_key("secret-token");
        let rendered = format!("{:?}", config);
        assert!(!rendered.contains("secret-token"));
        assert_eq!(config.send_timeout, DEFAULT_SEND_TIMEOUT);
    }
}
