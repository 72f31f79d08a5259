//! Status and balance responses.

use std::str::FromStr;

use rust_decimal::Decimal;
use serde::Serialize;

use super::field_as_string;

/// Delivery status of one message.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResult {
    pub status: String,
    pub delivered_at: Option<String>,
}

impl StatusResult {
    pub fn from_body(raw: &serde_json::Value) -> Self {
        Self {
            status: field_as_string(raw, "status").unwrap_or_else(|| "unknown".to_string()),
            delivered_at: field_as_string(raw, "deliveredAt"),
        }
    }
}

/// Provider account balance.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BalanceResult {
    /// `None` when the provider reported something that is not a number.
    pub balance: Option<Decimal>,
    pub currency: Option<String>,
}

impl BalanceResult {
    pub fn from_body(raw: &serde_json::Value) -> Self {
        Self {
            balance: field_as_string(raw, "balance").and_then(|b| Decimal::from_str(b.trim()).ok()),
            currency: field_as_string(raw, "currency"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_balance_accepts_numbers_and_strings() {
        let numeric = BalanceResult::from_body(&json!({"balance": 12.5, "currency": "USD"}));
        assert_eq!(numeric.balance, Some(Decimal::new(125, 1)));
        assert_eq!(numeric.currency.as_deref(), Some("USD"));

        let text = BalanceResult::from_body(&json!({"balance": "40.00"}));
        assert_eq!(text.balance, Some(Decimal::new(4000, 2)));

        assert_eq!(BalanceResult::from_body(&json!({"balance": "n/a"})).balance, None);
    }

    #[test]
    fn test_status_defaults_to_unknown() {
        let status = StatusResult::from_body(&json!({"deliveredAt": "2025-03-01T10:00:00Z"}));
        assert_eq!(status.status, "unknown");
        assert!(status.delivered_at.is_some());
    }
}
