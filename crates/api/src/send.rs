//! Outbound send pipeline shared by every send route.
//!
//! Order matters: normalize, validate, check balance, call the provider, and
//! only then debit. A failed provider call leaves no log and no charge.

use database::incoming_message::ReplyChannel;
use database::models::MessageStatus;
use database::validation::validate_message;
use database::{client_profile, PlatformSettings};
use metering::{AuditRequest, MeterRequest, MeteringError};
use phone::NormalizedBatch;
use provider_gateway::{BulkMultiItem, ProviderClient, SendBulkRequest, SendResult, SendSingleRequest};
use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::Value;
use tracing::{error, info, warn};

use crate::error::{ApiError, Result};
use crate::state::AppState;

/// What to send.
#[derive(Debug, Clone)]
pub enum Outbound {
    Single {
        recipient: String,
        message: String,
        channel: Option<ReplyChannel>,
    },
    Bulk {
        recipients: Vec<String>,
        content: String,
    },
    BulkMulti {
        items: Vec<BulkMultiItem>,
    },
}

/// Who pays.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Billing {
    /// Debit the tenant one credit per message.
    Metered,
    /// Staff send on a tenant's behalf; logged at zero charge.
    AdminAudit,
}

/// Result of a send, as returned to callers.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SendOutcome {
    pub success: bool,
    pub message_log_id: i64,
    pub message_id: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub message_ids: Vec<String>,
    pub status: MessageStatus,
    pub message_count: i64,
    pub recipients: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub invalid: Vec<String>,
    /// Balance after the debit; absent for audit-only sends.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub balance: Option<Decimal>,
}

/// An [`Outbound`] whose recipients have all been normalized.
struct Prepared {
    endpoint: &'static str,
    recipients: Vec<String>,
    invalid: Vec<String>,
    kind: PreparedKind,
}

enum PreparedKind {
    Single(SendSingleRequest),
    Bulk(SendBulkRequest),
    BulkMulti(Vec<BulkMultiItem>),
}

fn prepare(outbound: Outbound, dial_prefix: &str, business: Option<String>) -> Result<Prepared> {
    match outbound {
        Outbound::Single {
            recipient,
            message,
            channel,
        } => {
            validate_message(&message)?;
            let Some(normalized) = phone::normalize(&recipient, dial_prefix) else {
                return Err(ApiError::InvalidRecipient(vec![recipient]));
            };
            let channel = channel.unwrap_or_default();
            let request = SendSingleRequest::new(normalized.clone(), message)
                .with_business(business)
                .with_channel(channel.used_modem, channel.port);
            Ok(Prepared {
                endpoint: "sendsingle",
                recipients: vec![normalized],
                invalid: Vec::new(),
                kind: PreparedKind::Single(request),
            })
        }
        Outbound::Bulk { recipients, content } => {
            validate_message(&content)?;
            let NormalizedBatch { ok, invalid } = phone::normalize_many(&recipients, dial_prefix);
            if ok.is_empty() {
                return Err(ApiError::InvalidRecipient(invalid));
            }
            let request = SendBulkRequest::new(ok.clone(), content).with_business(business);
            Ok(Prepared {
                endpoint: "sendbulk",
                recipients: ok,
                invalid,
                kind: PreparedKind::Bulk(request),
            })
        }
        Outbound::BulkMulti { items } => {
            let mut kept: Vec<BulkMultiItem> = Vec::with_capacity(items.len());
            let mut invalid = Vec::new();
            for item in items {
                validate_message(&item.content)?;
                match phone::normalize(&item.recipient, dial_prefix) {
                    Some(n) if kept.iter().any(|k| k.recipient == n) => {}
                    Some(n) => kept.push(BulkMultiItem {
                        recipient: n,
                        content: item.content,
                    }),
                    None => invalid.push(item.recipient),
                }
            }
            if kept.is_empty() {
                return Err(ApiError::InvalidRecipient(invalid));
            }
            Ok(Prepared {
                endpoint: "sendbulkmulti",
                recipients: kept.iter().map(|i| i.recipient.clone()).collect(),
                invalid,
                kind: PreparedKind::BulkMulti(kept),
            })
        }
    }
}

async fn call_provider(provider: &ProviderClient, kind: &PreparedKind) -> Result<(Value, SendResult)> {
    let (payload, result) = match kind {
        PreparedKind::Single(request) => (to_payload(request)?, provider.send_single(request).await?),
        PreparedKind::Bulk(request) => (to_payload(request)?, provider.send_bulk(request).await?),
        PreparedKind::BulkMulti(items) => (to_payload(items)?, provider.send_bulk_multi(items).await?),
    };
    Ok((payload, result))
}

fn to_payload<T: Serialize>(value: &T) -> Result<Value> {
    serde_json::to_value(value).map_err(|e| ApiError::Internal(e.to_string()))
}

/// Provider balance for error reporting. Failures yield `None`.
pub async fn provider_balance(provider: &ProviderClient) -> Option<Decimal> {
    match provider.balance().await {
        Ok(balance) => balance.balance,
        Err(e) => {
            warn!(error = %e, "Provider balance unavailable");
            None
        }
    }
}

/// Run one send for `tenant_id`.
pub async fn send(
    state: &AppState,
    settings: &PlatformSettings,
    tenant_id: &str,
    outbound: Outbound,
    billing: Billing,
) -> Result<SendOutcome> {
    let pool = state.db.pool();
    let profile = client_profile::find_profile(pool, tenant_id)
        .await?
        .ok_or_else(|| ApiError::ProfileNotFound(tenant_id.to_string()))?;

    let prepared = prepare(outbound, state.dial_prefix(), profile.business_name.clone())?;
    let message_count = prepared.recipients.len() as i64;

    let max_batch = settings.max_batch_for(pool, tenant_id).await?;
    if prepared.recipients.len() > max_batch {
        return Err(ApiError::BadRequest(format!(
            "batch of {} recipients exceeds the limit of {max_batch}",
            prepared.recipients.len()
        )));
    }

    let provider = state.provider(settings);
    if billing == Billing::Metered {
        if let Err(err) = metering::pre_check(pool, tenant_id, message_count).await {
            let api_err = ApiError::from(err);
            if matches!(api_err, ApiError::InsufficientCredits { .. }) {
                info!(tenant_id, message_count, "Send rejected for insufficient credits");
                return Err(api_err.with_provider_balance(provider_balance(&provider).await));
            }
            return Err(api_err);
        }
    }

    let (request_payload, result) = call_provider(&provider, &prepared.kind).await?;
    let status = result
        .status
        .as_deref()
        .map(MessageStatus::from_provider)
        .unwrap_or(MessageStatus::Sent);
    let provider_message_id = result.primary_id();
    let single_recipient = match &prepared.kind {
        PreparedKind::Single(_) => prepared.recipients.first().cloned(),
        _ => None,
    };
    let bulk_recipients = match &prepared.kind {
        PreparedKind::Single(_) => Vec::new(),
        _ => prepared.recipients.clone(),
    };

    let (message_log_id, balance) = match billing {
        Billing::Metered => {
            let request = MeterRequest {
                tenant_id: tenant_id.to_string(),
                message_count,
                endpoint: prepared.endpoint.to_string(),
                provider_message_id: provider_message_id.clone(),
                provider_message_ids: result.message_ids.clone(),
                status,
                request_payload,
                response_payload: result.raw.clone(),
                recipient: single_recipient,
                recipients: bulk_recipients,
                sender_phone: None,
                is_example: false,
            };
            match metering::meter_send(pool, request.clone()).await {
                Ok(outcome) => (outcome.message_log.id, Some(outcome.new_balance)),
                Err(err @ MeteringError::InsufficientCredits { .. }) => {
                    error!(
                        tenant_id,
                        provider_message_id = ?provider_message_id,
                        "Provider accepted a send the balance no longer covers"
                    );
                    if let Err(e) = metering::record_unbilled_send(pool, request).await {
                        error!(error = %e, tenant_id, "Failed to record unbilled send");
                    }
                    return Err(err.into());
                }
                Err(err) => return Err(err.into()),
            }
        }
        Billing::AdminAudit => {
            let log = metering::create_admin_audit_log(
                pool,
                AuditRequest {
                    tenant_id: tenant_id.to_string(),
                    endpoint: prepared.endpoint.to_string(),
                    message_count,
                    provider_message_id: provider_message_id.clone(),
                    provider_message_ids: result.message_ids.clone(),
                    status,
                    recipient: single_recipient,
                    recipients: bulk_recipients,
                    sender_phone: None,
                    request_payload,
                    response_payload: result.raw.clone(),
                },
            )
            .await?;
            (log.id, None)
        }
    };

    Ok(SendOutcome {
        success: true,
        message_log_id,
        message_id: provider_message_id,
        message_ids: result.message_ids,
        status,
        message_count,
        recipients: prepared.recipients,
        invalid: prepared.invalid,
        balance,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prepare_bulk_drops_invalid_and_duplicates() {
        let prepared = prepare(
            Outbound::Bulk {
                recipients: vec![
                    "4155551234".to_string(),
                    "not-a-number".to_string(),
                    "4155555678".to_string(),
                    "+1 415 555 1234".to_string(),
                ],
                content: "hi".to_string(),
            },
            "+1",
            None,
        )
        .unwrap();

        assert_eq!(prepared.endpoint, "sendbulk");
        assert_eq!(prepared.recipients, vec!["+14155551234", "+14155555678"]);
        assert_eq!(prepared.invalid, vec!["not-a-number"]);
    }

    #[test]
    fn test_prepare_rejects_when_nothing_is_valid() {
        let err = prepare(
            Outbound::Single {
                recipient: "12".to_string(),
                message: "hi".to_string(),
                channel: None,
            },
            "+1",
            None,
        )
        .err()
        .unwrap();
        assert!(matches!(err, ApiError::InvalidRecipient(ref r) if r == &vec!["12".to_string()]));

        let err = prepare(
            Outbound::BulkMulti {
                items: vec![BulkMultiItem {
                    recipient: "abc".to_string(),
                    content: "hi".to_string(),
                }],
            },
            "+1",
            None,
        )
        .err()
        .unwrap();
        assert_eq!(err.code(), "INVALID_RECIPIENT");
    }

    #[test]
    fn test_prepare_single_carries_channel_and_business() {
        let prepared = prepare(
            Outbound::Single {
                recipient: "(415) 555-1234".to_string(),
                message: "on my way".to_string(),
                channel: Some(ReplyChannel {
                    used_modem: Some("3".to_string()),
                    port: None,
                }),
            },
            "+1",
            Some("IBS_7".to_string()),
        )
        .unwrap();

        let PreparedKind::Single(request) = prepared.kind else {
            panic!("expected single");
        };
        assert_eq!(request.recipient, "+14155551234");
        assert_eq!(request.business.as_deref(), Some("IBS_7"));
        assert_eq!(request.usedmodem.as_deref(), Some("3"));
    }
}
