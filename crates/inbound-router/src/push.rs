//! Signed webhook push to tenants.

use std::time::Duration;

use database::IncomingMessage;
use hmac::{Hmac, Mac};
use reqwest::Client;
use serde::Serialize;
use sha2::Sha256;
use tracing::{info, warn};

use crate::error::{Result, RouterError};

type HmacSha256 = Hmac<Sha256>;

/// Header carrying `sha256=<hex>` of the request body.
pub const SIGNATURE_HEADER: &str = "X-Signature";

/// Default time allowed for a tenant webhook to answer.
pub const DEFAULT_PUSH_TIMEOUT: Duration = Duration::from_secs(5);

/// Where and how to push a tenant's inbound messages.
#[derive(Clone, PartialEq, Eq)]
pub struct PushTarget {
    pub tenant_id: String,
    pub url: String,
    pub secret: Option<String>,
}

impl std::fmt::Debug for PushTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PushTarget")
            .field("tenant_id", &self.tenant_id)
            .field("url", &self.url)
            .field("secret", &self.secret.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

#[derive(Serialize)]
struct PushEnvelope<'a> {
    event: &'static str,
    message: &'a IncomingMessage,
}

/// `sha256=<hex HMAC-SHA256(secret, body)>`.
pub fn sign(secret: &str, body: &[u8]) -> Result<String> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| RouterError::Push(format!("invalid signing key: {e}")))?;
    mac.update(body);
    Ok(format!("sha256={}", hex::encode(mac.finalize().into_bytes())))
}

/// HTTP client for tenant webhooks.
#[derive(Debug, Clone)]
pub struct PushClient {
    http: Client,
    timeout: Duration,
}

impl PushClient {
    pub fn new(timeout: Duration) -> Result<Self> {
        let http = Client::builder()
            .connect_timeout(timeout)
            .build()
            .map_err(|e| RouterError::Push(e.to_string()))?;
        Ok(Self { http, timeout })
    }

    /// POST the message to the target, failing on transport errors or non-2xx.
    pub async fn deliver(&self, target: &PushTarget, message: &IncomingMessage) -> Result<()> {
        let body = serde_json::to_vec(&PushEnvelope {
            event: "sms.received",
            message,
        })
        .map_err(|e| RouterError::Push(e.to_string()))?;

        let mut request = self
            .http
            .post(&target.url)
            .timeout(self.timeout)
            .header(reqwest::header::CONTENT_TYPE, "application/json");
        if let Some(secret) = target.secret.as_deref().filter(|s| !s.is_empty()) {
            request = request.header(SIGNATURE_HEADER, sign(secret, &body)?);
        }

        let response = request
            .body(body)
            .send()
            .await
            .map_err(|e| RouterError::Push(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(RouterError::Push(format!("webhook answered {}", status.as_u16())));
        }

        info!(tenant_id = %target.tenant_id, message_id = message.id, "Pushed inbound message");
        Ok(())
    }

    /// Like [`PushClient::deliver`], but failures are only logged.
    pub async fn deliver_best_effort(&self, target: &PushTarget, message: &IncomingMessage) {
        if let Err(e) = self.deliver(target, message).await {
            warn!(
                tenant_id = %target.tenant_id,
                url = %target.url,
                error = %e,
                "Push delivery failed"
            );
        }
    }
}
