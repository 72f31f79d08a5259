//! Error types for the provider gateway.

use thiserror::Error;

/// Errors that can occur when calling the upstream provider.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// Provider answered with a non-2xx status.
    #[error("provider returned HTTP {status}: {body}")]
    Api { status: u16, body: String },

    /// Timeout or connection failure.
    #[error("provider unreachable: {0}")]
    Unreachable(String),

    /// Other HTTP failure.
    #[error("HTTP error: {0}")]
    Http(reqwest::Error),

    /// Provider body was not valid JSON.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// No API key configured.
    #[error("provider API key is not configured")]
    MissingApiKey,
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() || err.is_connect() {
            ProviderError::Unreachable(err.to_string())
        } else {
            ProviderError::Http(err)
        }
    }
}

impl ProviderError {
    /// Whether a read path should fall back to locally known state.
    pub fn is_degraded(&self) -> bool {
        matches!(self, ProviderError::Unreachable(_) | ProviderError::Api { .. })
    }
}
