//! Types for sending messages through the provider.

use serde::Serialize;

use super::field_as_string;

/// One message to one recipient.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SendSingleRequest {
    pub recipient: String,
    pub message: String,

    /// Tenant business tag, echoed back on replies.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub business: Option<String>,

    /// Modem to send from when replying on an inbound conversation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usedmodem: Option<String>,

    /// Port to send from when replying on an inbound conversation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<String>,
}

impl SendSingleRequest {
    pub fn new(recipient: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            recipient: recipient.into(),
            message: message.into(),
            ..Default::default()
        }
    }

    /// Tag the message with the sending tenant's business name.
    pub fn with_business(mut self, business: Option<String>) -> Self {
        self.business = business;
        self
    }

    /// Pin the reply to the modem and port the conversation arrived on.
    pub fn with_channel(mut self, usedmodem: Option<String>, port: Option<String>) -> Self {
        self.usedmodem = usedmodem;
        self.port = port;
        self
    }
}

/// Shared content to many recipients.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SendBulkRequest {
    pub recipients: Vec<String>,
    pub content: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub business: Option<String>,
}

impl SendBulkRequest {
    pub fn new(recipients: Vec<String>, content: impl Into<String>) -> Self {
        Self {
            recipients,
            content: content.into(),
            business: None,
        }
    }

    pub fn with_business(mut self, business: Option<String>) -> Self {
        self.business = business;
        self
    }
}

/// Per-recipient content for a bulk-multi send.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, serde::Deserialize)]
pub struct BulkMultiItem {
    pub recipient: String,
    pub content: String,
}

/// Result of a send call.
///
/// Only the identifiers and status are extracted; the full body is kept in
/// `raw` for persisting.
#[derive(Debug, Clone, PartialEq)]
pub struct SendResult {
    /// `messageId` of a single send.
    pub message_id: Option<String>,
    /// `messageIds` of a bulk send, or the ids found in `results`.
    pub message_ids: Vec<String>,
    pub status: Option<String>,
    pub raw: serde_json::Value,
}

impl SendResult {
    /// Extract identifiers from a provider response body.
    pub fn from_body(raw: serde_json::Value) -> Self {
        let message_id = field_as_string(&raw, "messageId");

        let mut message_ids: Vec<String> = raw
            .get("messageIds")
            .and_then(|v| v.as_array())
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| match id {
                        serde_json::Value::String(s) => Some(s.clone()),
                        serde_json::Value::Number(n) => Some(n.to_string()),
                        _ => None,
                    })
                    .collect()
            })
            .unwrap_or_default();

        if message_ids.is_empty() {
            if let Some(results) = raw.get("results").and_then(|v| v.as_array()) {
                message_ids = results
                    .iter()
                    .filter_map(|r| field_as_string(r, "messageId"))
                    .collect();
            }
        }

        let status = field_as_string(&raw, "status");

        Self {
            message_id,
            message_ids,
            status,
            raw,
        }
    }

    /// Identifier to persist on the message log: the single id, else the
    /// first bulk id.
    pub fn primary_id(&self) -> Option<String> {
        self.message_id
            .clone()
            .or_else(|| self.message_ids.first().cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_single_request_omits_empty_channel() {
        let body = serde_json::to_value(SendSingleRequest::new("+14155551234", "hi")).unwrap();
        assert_eq!(body, json!({"recipient": "+14155551234", "message": "hi"}));

        let body = serde_json::to_value(
            SendSingleRequest::new("+14155551234", "hi").with_channel(Some("3".into()), Some("7".into())),
        )
        .unwrap();
        assert_eq!(body["usedmodem"], "3");
        assert_eq!(body["port"], "7");
    }

    #[test]
    fn test_result_extraction() {
        let single = SendResult::from_body(json!({"messageId": 991, "status": "sent"}));
        assert_eq!(single.message_id.as_deref(), Some("991"));
        assert_eq!(single.primary_id().as_deref(), Some("991"));

        let bulk = SendResult::from_body(json!({"messageIds": ["a", "b"], "status": "queued"}));
        assert_eq!(bulk.message_ids, vec!["a", "b"]);
        assert_eq!(bulk.primary_id().as_deref(), Some("a"));

        let multi = SendResult::from_body(json!({"results": [{"messageId": "x"}, {"error": "bad"}]}));
        assert_eq!(multi.message_ids, vec!["x"]);
        assert!(multi.status.is_none());
    }
}
