//! Provider request and response types.

mod account;
mod send;

pub use account::{BalanceResult, StatusResult};
pub use send::{BulkMultiItem, SendBulkRequest, SendResult, SendSingleRequest};

/// Read a string or number field as a string.
pub(crate) fn field_as_string(value: &serde_json::Value, field: &str) -> Option<String> {
    match value.get(field)? {
        serde_json::Value::String(s) if !s.is_empty() => Some(s.clone()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
