//! Upstream SMS provider HTTP client.

use std::time::Duration;

use reqwest::{Client, RequestBuilder};
use tracing::{debug, info, warn};

use crate::config::ProviderConfig;
use crate::error::ProviderError;
use crate::types::{BalanceResult, BulkMultiItem, SendBulkRequest, SendResult, SendSingleRequest, StatusResult};

/// Client for the upstream provider. Cheap to clone.
///
/// Every call carries the shared bearer token and its own timeout. Non-2xx
/// answers are [`ProviderError::Api`]; timeouts and connection failures are
/// [`ProviderError::Unreachable`]. Nothing is retried.
#[derive(Clone)]
pub struct ProviderClient {
    http: Client,
    config: ProviderConfig,
}

impl ProviderClient {
    /// Build a client. No request is made.
    pub fn new(config: ProviderConfig) -> Result<Self, ProviderError> {
        let http = Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .build()
            .map_err(ProviderError::Http)?;

        Ok(Self { http, config })
    }

    /// A copy of this client using a different bearer token.
    ///
    /// `None` keeps the current token.
    pub fn with_api_key(&self, api_key: Option<&str>) -> Self {
        let mut client = self.clone();
        if let Some(key) = api_key.filter(|k| !k.is_empty()) {
            client.config.api_key = Some(key.to_string());
        }
        client
    }

    /// Send one message to one recipient.
    pub async fn send_single(&self, request: &SendSingleRequest) -> Result<SendResult, ProviderError> {
        info!(recipient = %request.recipient, "Provider sendsingle");
        let builder = self.http.post(self.config.send_single_url()).json(request);
        let body = self.execute(builder, self.config.send_timeout).await?;
        Ok(SendResult::from_body(body))
    }

    /// Send the same content to many recipients.
    pub async fn send_bulk(&self, request: &SendBulkRequest) -> Result<SendResult, ProviderError> {
        info!(recipients = request.recipients.len(), "Provider sendbulk");
        let builder = self.http.post(self.config.send_bulk_url()).json(request);
        let body = self.execute(builder, self.config.send_timeout).await?;
        Ok(SendResult::from_body(body))
    }

    /// Send per-recipient content in one call.
    pub async fn send_bulk_multi(&self, items: &[BulkMultiItem]) -> Result<SendResult, ProviderError> {
        info!(recipients = items.len(), "Provider sendbulkmulti");
        let builder = self.http.post(self.config.send_bulk_multi_url()).json(items);
        let body = self.execute(builder, self.config.send_timeout).await?;
        Ok(SendResult::from_body(body))
    }

    /// Delivery status of a message.
    pub async fn status(&self, message_id: &str) -> Result<StatusResult, ProviderError> {
        let builder = self.http.get(self.config.status_url(message_id));
        let body = self.execute(builder, self.config.status_timeout).await?;
        Ok(StatusResult::from_body(&body))
    }

    /// Provider account balance.
    pub async fn balance(&self) -> Result<BalanceResult, ProviderError> {
        let builder = self.http.get(self.config.balance_url());
        let body = self.execute(builder, self.config.status_timeout).await?;
        Ok(BalanceResult::from_body(&body))
    }

    /// Get the configuration.
    pub fn config(&self) -> &ProviderConfig {
        &self.config
    }

    async fn execute(&self, builder: RequestBuilder, timeout: Duration) -> Result<serde_json::Value, ProviderError> {
        let api_key = self.config.api_key.as_deref().ok_or(ProviderError::MissingApiKey)?;

        let response = builder.bearer_auth(api_key).timeout(timeout).send().await.map_err(|e| {
            warn!(error = %e, "Provider request failed");
            ProviderError::from(e)
        })?;

        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            warn!(status = status.as_u16(), "Provider returned error status");
            return Err(ProviderError::Api {
                status: status.as_u16(),
                body: text,
            });
        }

        debug!(status = status.as_u16(), bytes = text.len(), "Provider response");
        if text.trim().is_empty() {
            return Ok(serde_json::Value::Null);
        }
        Ok(serde_json::from_str(&text)?)
    }
}

impl std::fmt::Debug for ProviderClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderClient")
            .field("config", &self.config)
            .finish()
    }
}
