//! Database models.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::credits;

/// Account role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum Role {
    Client,
    Supervisor,
    Admin,
}

impl Role {
    /// Whether this role may use admin/supervisor dashboard routes.
    pub fn is_staff(&self) -> bool {
        matches!(self, Role::Supervisor | Role::Admin)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Client => "client",
            Role::Supervisor => "supervisor",
            Role::Admin => "admin",
        }
    }
}

/// How a tenant receives inbound messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum DeliveryMode {
    Poll,
    Push,
    Both,
}

impl DeliveryMode {
    /// Whether inbound messages should be pushed to the tenant webhook.
    pub fn pushes(&self) -> bool {
        matches!(self, DeliveryMode::Push | DeliveryMode::Both)
    }
}

/// Outbound message status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum MessageStatus {
    Queued,
    Sent,
    Delivered,
    Failed,
}

impl MessageStatus {
    /// Parse a provider status string, tolerating case and unknown values.
    pub fn from_provider(status: &str) -> Self {
        match status.trim().to_ascii_lowercase().as_str() {
            "sent" | "success" | "ok" | "submitted" => MessageStatus::Sent,
            "delivered" | "delivrd" => MessageStatus::Delivered,
            "failed" | "error" | "rejected" | "undelivered" | "expired" => MessageStatus::Failed,
            _ => MessageStatus::Queued,
        }
    }

    /// Statuses that are expected to have been billed.
    pub fn is_chargeable(&self) -> bool {
        !matches!(self, MessageStatus::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MessageStatus::Queued => "queued",
            MessageStatus::Sent => "sent",
            MessageStatus::Delivered => "delivered",
            MessageStatus::Failed => "failed",
        }
    }
}

/// Kind of balance mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum TransactionKind {
    Debit,
    AdminCreditAdd,
    AdminCreditDeduct,
    TransferOut,
    TransferIn,
    Reconciliation,
}

/// Inbound message status as reported by the gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum InboundStatus {
    Received,
    Blocked,
}

/// Inbound message lifecycle. Purged rows are removed entirely.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum Lifecycle {
    Active,
    Deleted,
}

/// How a contact entered the address book.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum ContactSource {
    Manual,
    Inbound,
}

/// An account on the platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Tenant {
    pub id: String,
    pub email: String,
    pub name: String,
    pub role: Role,
    pub group_id: Option<String>,
    pub is_active: bool,
    pub created_at: String,
}

/// Billing and routing profile, one per tenant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct ClientProfile {
    pub tenant_id: String,
    /// Balance in hundredths of a credit.
    pub credit_units: i64,
    pub currency: String,
    pub custom_markup: Option<String>,
    /// JSON array of E.164 numbers assigned to this tenant.
    pub assigned_numbers: String,
    pub rate_limit: i64,
    pub business_name: Option<String>,
    pub delivery_mode: DeliveryMode,
    pub webhook_url: Option<String>,
    #[serde(skip_serializing)]
    pub webhook_secret: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl ClientProfile {
    /// Balance as a decimal credit amount.
    pub fn credits(&self) -> Decimal {
        credits::from_units(self.credit_units)
    }

    /// Decoded assigned numbers; malformed JSON yields an empty list.
    pub fn assigned_numbers(&self) -> Vec<String> {
        serde_json::from_str(&self.assigned_numbers).unwrap_or_default()
    }
}

/// A hashed API key. The raw value is never stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct ApiKey {
    pub id: String,
    pub tenant_id: String,
    #[serde(skip_serializing)]
    pub key_hash: String,
    pub prefix: String,
    pub suffix: String,
    pub label: Option<String>,
    pub is_active: bool,
    pub last_used_at: Option<String>,
    pub revoked_at: Option<String>,
    pub created_at: String,
}

/// One raw key-value configuration entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct ConfigEntry {
    pub key: String,
    pub value: String,
    pub updated_at: String,
}

/// Snapshot of the most recent inbound webhook.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct WebhookDiagnostics {
    pub last_event: String,
    pub last_event_at: String,
    pub routed_tenant_id: Option<String>,
    pub strategy: String,
}

/// One outbound send attempt; both billing record and audit trail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct MessageLog {
    pub id: i64,
    pub tenant_id: String,
    pub provider_message_id: Option<String>,
    /// JSON array of every provider-assigned id for the send.
    pub provider_message_ids: String,
    pub endpoint: String,
    pub recipient: Option<String>,
    /// JSON array of recipients for bulk sends.
    pub recipients: String,
    pub sender_phone: Option<String>,
    pub status: MessageStatus,
    pub cost_per_message: String,
    pub charge_per_message: String,
    pub total_cost: String,
    pub total_charge: String,
    pub message_count: i64,
    pub request_payload: String,
    pub response_payload: String,
    pub is_example: bool,
    pub created_at: String,
    pub updated_at: String,
}

impl MessageLog {
    /// Decoded bulk recipient list.
    pub fn recipients(&self) -> Vec<String> {
        serde_json::from_str(&self.recipients).unwrap_or_default()
    }

    /// Decoded provider message ids.
    pub fn provider_message_ids(&self) -> Vec<String> {
        serde_json::from_str(&self.provider_message_ids).unwrap_or_default()
    }
}

/// Fields for a new message log row.
#[derive(Debug, Clone)]
pub struct NewMessageLog {
    pub tenant_id: String,
    pub provider_message_id: Option<String>,
    pub provider_message_ids: Vec<String>,
    pub endpoint: String,
    pub recipient: Option<String>,
    pub recipients: Vec<String>,
    pub sender_phone: Option<String>,
    pub status: MessageStatus,
    pub cost_per_message: Decimal,
    pub charge_per_message: Decimal,
    pub message_count: i64,
    pub request_payload: serde_json::Value,
    pub response_payload: serde_json::Value,
    pub is_example: bool,
}

/// One balance mutation in the append-only ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct CreditTransaction {
    pub id: i64,
    pub tenant_id: String,
    pub amount_units: i64,
    pub kind: TransactionKind,
    pub description: String,
    pub balance_before_units: i64,
    pub balance_after_units: i64,
    pub message_log_id: Option<i64>,
    pub created_at: String,
}

impl CreditTransaction {
    pub fn amount(&self) -> Decimal {
        credits::from_units(self.amount_units)
    }

    pub fn balance_before(&self) -> Decimal {
        credits::from_units(self.balance_before_units)
    }

    pub fn balance_after(&self) -> Decimal {
        credits::from_units(self.balance_after_units)
    }
}

/// A message delivered to the inbound webhook.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct IncomingMessage {
    pub id: i64,
    pub tenant_id: Option<String>,
    pub from_number: String,
    pub receiver: String,
    pub business: Option<String>,
    pub body: String,
    pub status: InboundStatus,
    pub matched_block_word: Option<String>,
    pub used_modem: Option<String>,
    pub port: Option<String>,
    pub provider_message_id: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub is_read: bool,
    pub lifecycle: Lifecycle,
    pub deleted_at: Option<String>,
    pub is_example: bool,
    pub received_at: String,
    pub created_at: String,
}

/// Fields for a new inbound message row.
#[derive(Debug, Clone)]
pub struct NewIncomingMessage {
    pub tenant_id: Option<String>,
    pub from_number: String,
    pub receiver: String,
    pub business: Option<String>,
    pub body: String,
    pub status: InboundStatus,
    pub matched_block_word: Option<String>,
    pub used_modem: Option<String>,
    pub port: Option<String>,
    pub provider_message_id: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub is_example: bool,
    pub received_at: String,
}

/// A tenant's address book entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Contact {
    pub id: i64,
    pub tenant_id: String,
    pub phone: String,
    pub name: Option<String>,
    pub source: ContactSource,
    pub created_at: String,
}

/// A named set of contacts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct ContactGroup {
    pub id: i64,
    pub tenant_id: String,
    pub name: String,
    pub created_at: String,
}
