//! Inbound webhook payload parsing.
//!
//! The gateway is loose about types: ids, modem and port may arrive as
//! strings or numbers, and `message` is sometimes an object wrapping the
//! text. Parsing normalizes all of that into [`InboundPayload`].

use database::models::InboundStatus;
use serde::Serialize;
use serde_json::Value;

use crate::error::{Result, RouterError};

/// Fields that must be present on every webhook.
pub const REQUIRED_FIELDS: [&str; 5] = ["from", "message", "receiver", "timestamp", "messageId"];

/// Keys searched, in order, when `message` is an object.
const TEXT_KEYS: [&str; 3] = ["text", "content", "message"];

/// Message body as delivered by the gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "text", rename_all = "snake_case")]
pub enum MessageText {
    /// A plain string.
    Plain(String),
    /// An object carrying the text under `text`, `content` or `message`.
    Structured(String),
    /// Anything else, kept as its JSON rendering.
    Raw(String),
}

impl MessageText {
    /// Classify a `message` value. `None` for null.
    pub fn parse(value: &Value) -> Option<Self> {
        match value {
            Value::Null => None,
            Value::String(s) => Some(MessageText::Plain(s.clone())),
            Value::Object(map) => {
                let text = TEXT_KEYS
                    .iter()
                    .find_map(|key| map.get(*key).and_then(Value::as_str));
                match text {
                    Some(text) => Some(MessageText::Structured(text.to_string())),
                    None => Some(MessageText::Raw(value.to_string())),
                }
            }
            other => Some(MessageText::Raw(other.to_string())),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            MessageText::Plain(s) | MessageText::Structured(s) | MessageText::Raw(s) => s,
        }
    }

    pub fn is_raw(&self) -> bool {
        matches!(self, MessageText::Raw(_))
    }
}

/// A validated inbound webhook.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundPayload {
    pub from: String,
    pub receiver: String,
    pub message: MessageText,
    pub timestamp: String,
    pub message_id: String,
    pub business: Option<String>,
    pub used_modem: Option<String>,
    pub port: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub status: InboundStatus,
    pub matched_block_word: Option<String>,
}

impl InboundPayload {
    /// Validate a webhook body.
    pub fn from_json(body: &Value) -> Result<Self> {
        if !body.is_object() {
            return Err(RouterError::NotAnObject);
        }

        let message = body
            .get("message")
            .and_then(MessageText::parse)
            .ok_or(RouterError::MissingField("message"))?;
        if message.is_raw() {
            tracing::warn!(message = %message.as_str(), "Inbound message text has unexpected shape");
        }

        let status = match optional(body, "status") {
            Some(s) if s.eq_ignore_ascii_case("blocked") => InboundStatus::Blocked,
            _ => InboundStatus::Received,
        };

        Ok(Self {
            from: required(body, "from")?,
            receiver: required(body, "receiver")?,
            message,
            timestamp: required(body, "timestamp")?,
            message_id: required(body, "messageId")?,
            business: optional(body, "business"),
            used_modem: optional(body, "usedmodem"),
            port: optional(body, "port"),
            first_name: optional(body, "firstname"),
            last_name: optional(body, "lastname"),
            status,
            matched_block_word: optional(body, "matchedBlockWord"),
        })
    }

    /// Sender's display name from first and last name.
    pub fn sender_name(&self) -> Option<String> {
        let parts: Vec<&str> = [self.first_name.as_deref(), self.last_name.as_deref()]
            .into_iter()
            .flatten()
            .collect();
        if parts.is_empty() {
            None
        } else {
            Some(parts.join(" "))
        }
    }
}

fn required(body: &Value, field: &'static str) -> Result<String> {
    optional(body, field).ok_or(RouterError::MissingField(field))
}

/// A non-empty trimmed string, or a number rendered as a string.
fn optional(body: &Value, field: &str) -> Option<String> {
    match body.get(field)? {
        Value::String(s) => {
            let s = s.trim();
            (!s.is_empty()).then(|| s.to_string())
        }
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
