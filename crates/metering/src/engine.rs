//! Debit-and-log for every send path.
//!
//! Callers normalize recipients and call the provider first; `meter_send`
//! runs only after a successful provider response. The balance check and
//! debit are one conditional update inside the logging transaction, so
//! concurrent sends for one tenant can never overdraw it.

use database::models::{CreditTransaction, MessageLog, MessageStatus, NewMessageLog, TransactionKind};
use database::{client_profile, credits, ledger, message_log, tenant};
use rust_decimal::Decimal;
use sqlx::SqlitePool;

use crate::pools;
use crate::pricing::resolve_pricing;
use crate::{MeteringError, Result};

/// Suffix on the endpoint of audit-only logs.
pub const ADMIN_AUDIT_SUFFIX: &str = ":admin-audit";

/// Response payload fields that may carry the sender number, in order.
const SENDER_FIELDS: [&str; 3] = ["senderPhone", "from", "sender"];

/// A successful provider send to bill.
#[derive(Debug, Clone)]
pub struct MeterRequest {
    pub tenant_id: String,
    pub message_count: i64,
    pub endpoint: String,
    pub provider_message_id: Option<String>,
    /// Every id the provider returned; bulk sends carry one per recipient.
    pub provider_message_ids: Vec<String>,
    pub status: MessageStatus,
    pub request_payload: serde_json::Value,
    pub response_payload: serde_json::Value,
    pub recipient: Option<String>,
    pub recipients: Vec<String>,
    pub sender_phone: Option<String>,
    pub is_example: bool,
}

/// Result of a metered send.
#[derive(Debug, Clone)]
pub struct MeterOutcome {
    pub message_log: MessageLog,
    pub transaction: CreditTransaction,
    pub new_balance: Decimal,
}

/// Debit one credit per message and write the log and ledger entry.
///
/// Fails with `InsufficientCredits` or `ProfileNotFound` without side
/// effects. Pool aggregates are updated after commit and never fail the call.
pub async fn meter_send(pool: &SqlitePool, request: MeterRequest) -> Result<MeterOutcome> {
    let (log, group_id) = priced_log(pool, request).await?;
    let debit = ledger::debit_for_send(pool, &log).await?;

    pools::apply_pool_delta(pool, group_id.as_deref(), -Decimal::from(log.message_count)).await;

    let new_balance = debit.transaction.balance_after();
    tracing::info!(
        tenant_id = %log.tenant_id,
        message_log_id = debit.message_log.id,
        message_count = log.message_count,
        %new_balance,
        "Send metered"
    );

    Ok(MeterOutcome {
        message_log: debit.message_log,
        transaction: debit.transaction,
        new_balance,
    })
}

/// Log a send the provider accepted after the balance stopped covering it.
///
/// No ledger entry is written, so [`crate::reconcile_credits`] counts the
/// messages as a shortfall and collects them once the tenant has credit.
pub async fn record_unbilled_send(pool: &SqlitePool, request: MeterRequest) -> Result<MessageLog> {
    let (log, _) = priced_log(pool, request).await?;
    let log = message_log::insert_unbilled(pool, &log).await?;

    tracing::warn!(tenant_id = %log.tenant_id, message_log_id = log.id, "Unbilled send recorded");
    Ok(log)
}

/// Resolve pricing and the sender number for a send, returning the log row
/// to write and the tenant's group.
async fn priced_log(pool: &SqlitePool, request: MeterRequest) -> Result<(NewMessageLog, Option<String>)> {
    if request.message_count <= 0 {
        return Err(MeteringError::InvalidCount(request.message_count));
    }

    let profile = client_profile::find_profile(pool, &request.tenant_id)
        .await?
        .ok_or_else(|| MeteringError::ProfileNotFound(request.tenant_id.clone()))?;
    let group_id = tenant::find_tenant(pool, &request.tenant_id)
        .await?
        .and_then(|t| t.group_id);
    let pricing = resolve_pricing(pool, Some(&request.tenant_id), group_id.as_deref()).await?;

    let sender_phone = request
        .sender_phone
        .clone()
        .or_else(|| sender_from_response(&request.response_payload))
        .or_else(|| profile.assigned_numbers().into_iter().next());

    let log = NewMessageLog {
        tenant_id: request.tenant_id,
        provider_message_id: request.provider_message_id,
        provider_message_ids: request.provider_message_ids,
        endpoint: request.endpoint,
        recipient: request.recipient,
        recipients: request.recipients,
        sender_phone,
        status: request.status,
        cost_per_message: pricing.extreme_cost,
        charge_per_message: pricing.client_rate,
        message_count: request.message_count,
        request_payload: request.request_payload,
        response_payload: request.response_payload,
        is_example: request.is_example,
    };
    Ok((log, group_id))
}

/// Read-only balance check run before the provider call.
///
/// Returns the current balance. The debit in [`meter_send`] remains the
/// authoritative check.
pub async fn pre_check(pool: &SqlitePool, tenant_id: &str, message_count: i64) -> Result<Decimal> {
    if message_count <= 0 {
        return Err(MeteringError::InvalidCount(message_count));
    }
    let required_units = credits::units_for_messages(message_count)?;

    let profile = client_profile::find_profile(pool, tenant_id)
        .await?
        .ok_or_else(|| MeteringError::ProfileNotFound(tenant_id.to_string()))?;

    if profile.credit_units < required_units {
        return Err(MeteringError::InsufficientCredits {
            balance: profile.credits(),
            required: credits::from_units(required_units),
        });
    }
    Ok(profile.credits())
}

/// An on-behalf send recorded for traceability only.
#[derive(Debug, Clone)]
pub struct AuditRequest {
    pub tenant_id: String,
    pub endpoint: String,
    pub message_count: i64,
    pub provider_message_id: Option<String>,
    pub provider_message_ids: Vec<String>,
    pub status: MessageStatus,
    pub recipient: Option<String>,
    pub recipients: Vec<String>,
    pub sender_phone: Option<String>,
    pub request_payload: serde_json::Value,
    pub response_payload: serde_json::Value,
}

/// Write a zero-charge `<endpoint>:admin-audit` log. No balance changes.
pub async fn create_admin_audit_log(pool: &SqlitePool, request: AuditRequest) -> Result<MessageLog> {
    if request.message_count <= 0 {
        return Err(MeteringError::InvalidCount(request.message_count));
    }

    let log = message_log::insert_unbilled(
        pool,
        &NewMessageLog {
            tenant_id: request.tenant_id,
            provider_message_id: request.provider_message_id,
            provider_message_ids: request.provider_message_ids,
            endpoint: format!("{}{}", request.endpoint, ADMIN_AUDIT_SUFFIX),
            recipient: request.recipient,
            recipients: request.recipients,
            sender_phone: request.sender_phone,
            status: request.status,
            cost_per_message: Decimal::ZERO,
            charge_per_message: Decimal::ZERO,
            message_count: request.message_count,
            request_payload: request.request_payload,
            response_payload: request.response_payload,
            is_example: false,
        },
    )
    .await?;

    tracing::info!(tenant_id = %log.tenant_id, message_log_id = log.id, endpoint = %log.endpoint, "Admin audit log written");
    Ok(log)
}

/// Add or remove credit on an operator's behalf.
///
/// Positive amounts are `admin_credit_add`, negative `admin_credit_deduct`;
/// a deduction larger than the balance fails. Pools move with the amount.
pub async fn adjust_credits(
    pool: &SqlitePool,
    tenant_id: &str,
    amount: Decimal,
    description: &str,
) -> Result<CreditTransaction> {
    if amount.is_zero() {
        return Err(MeteringError::InvalidAmount("amount must be non-zero".to_string()));
    }
    let units = credits::to_units(amount)?;
    let kind = if units > 0 {
        TransactionKind::AdminCreditAdd
    } else {
        TransactionKind::AdminCreditDeduct
    };

    let transaction = ledger::adjust_balance(pool, tenant_id, units, kind, description).await?;

    let group_id = tenant::find_tenant(pool, tenant_id).await?.and_then(|t| t.group_id);
    pools::apply_pool_delta(pool, group_id.as_deref(), transaction.amount()).await;

    tracing::info!(tenant_id, amount = %transaction.amount(), kind = ?kind, "Credits adjusted");
    Ok(transaction)
}

/// Move credit between two tenants. Returns the out and in entries.
pub async fn transfer_credits(
    pool: &SqlitePool,
    from_tenant: &str,
    to_tenant: &str,
    amount: Decimal,
    description: &str,
) -> Result<(CreditTransaction, CreditTransaction)> {
    if amount <= Decimal::ZERO {
        return Err(MeteringError::InvalidAmount("transfer amount must be positive".to_string()));
    }
    let units = credits::to_units(amount)?;
    let entries = ledger::transfer(pool, from_tenant, to_tenant, units, description).await?;

    tracing::info!(from_tenant, to_tenant, %amount, "Credits transferred");
    Ok(entries)
}

/// First non-empty string among the top-level sender fields.
fn sender_from_response(response: &serde_json::Value) -> Option<String> {
    SENDER_FIELDS.iter().find_map(|field| {
        response
            .get(field)
            .and_then(|v| v.as_str())
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{funded_tenant, test_db};
    use database::credit_transaction;
    use database::settings::keys;
    use rust_decimal_macros::dec;
    use serde_json::json;

    fn single(tenant_id: &str) -> MeterRequest {
        MeterRequest {
            tenant_id: tenant_id.to_string(),
            message_count: 1,
            endpoint: "sendsingle".to_string(),
            provider_message_id: Some("msg-1".to_string()),
            provider_message_ids: vec!["msg-1".to_string()],
            status: MessageStatus::Sent,
            request_payload: json!({"recipient": "+14155551234", "message": "hi"}),
            response_payload: json!({"messageId": "msg-1", "status": "sent", "from": "+15550001111"}),
            recipient: Some("+14155551234".to_string()),
            recipients: vec![],
            sender_phone: None,
            is_example: false,
        }
    }

    #[tokio::test]
    async fn test_single_send_debits_one_credit() {
        let db = test_db().await;
        let tenant = funded_tenant(&db, "a@example.com", 5, None).await;

        let outcome = meter_send(db.pool(), single(&tenant.id)).await.unwrap();

        assert_eq!(outcome.new_balance, dec!(4));
        assert_eq!(outcome.message_log.message_count, 1);
        assert_eq!(outcome.message_log.sender_phone.as_deref(), Some("+15550001111"));
        assert_eq!(outcome.message_log.charge_per_message, "1.00");
        assert_eq!(outcome.transaction.amount(), dec!(-1));
        assert_eq!(outcome.transaction.balance_before(), dec!(5));
        assert_eq!(outcome.transaction.balance_after(), dec!(4));
        assert_eq!(outcome.transaction.message_log_id, Some(outcome.message_log.id));
    }

    #[tokio::test]
    async fn test_sender_falls_back_to_assigned_number() {
        let db = test_db().await;
        let tenant = funded_tenant(&db, "a@example.com", 2, None).await;
        client_profile::set_assigned_numbers(db.pool(), &tenant.id, &["+15559990000".to_string()])
            .await
            .unwrap();

        let mut request = single(&tenant.id);
        request.response_payload = json!({"messageId": "msg-1", "status": "sent"});
        let outcome = meter_send(db.pool(), request).await.unwrap();
        assert_eq!(outcome.message_log.sender_phone.as_deref(), Some("+15559990000"));
    }

    #[tokio::test]
    async fn test_zero_balance_rejected() {
        let db = test_db().await;
        let tenant = funded_tenant(&db, "a@example.com", 0, None).await;

        let err = pre_check(db.pool(), &tenant.id, 1).await.unwrap_err();
        assert!(matches!(err, MeteringError::InsufficientCredits { .. }));

        let err = meter_send(db.pool(), single(&tenant.id)).await.unwrap_err();
        assert!(matches!(err, MeteringError::InsufficientCredits { balance, required }
            if balance == dec!(0) && required == dec!(1)));
        assert!(message_log::list_for_tenant(db.pool(), &tenant.id, 10, 0).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unbilled_send_is_collected_by_reconciliation() {
        let db = test_db().await;
        let pool = db.pool();
        let tenant = funded_tenant(&db, "a@example.com", 0, None).await;

        let log = record_unbilled_send(pool, single(&tenant.id)).await.unwrap();
        assert_eq!(log.endpoint, "sendsingle");
        assert_eq!(log.charge_per_message, "1.00");
        assert!(credit_transaction::list_for_tenant(pool, &tenant.id).await.unwrap().is_empty());

        adjust_credits(pool, &tenant.id, dec!(3), "top up").await.unwrap();
        let report = crate::reconcile_credits(pool).await.unwrap();
        assert_eq!(report.adjusted.len(), 1);
        let profile = client_profile::get_profile(pool, &tenant.id).await.unwrap();
        assert_eq!(profile.credits(), dec!(2));
    }

    #[tokio::test]
    async fn test_missing_profile_and_bad_count() {
        let db = test_db().await;
        assert!(matches!(
            meter_send(db.pool(), single("ghost")).await,
            Err(MeteringError::ProfileNotFound(_))
        ));

        let tenant = funded_tenant(&db, "a@example.com", 1, None).await;
        let mut request = single(&tenant.id);
        request.message_count = 0;
        assert!(matches!(meter_send(db.pool(), request).await, Err(MeteringError::InvalidCount(0))));
    }

    #[tokio::test]
    async fn test_send_decrements_pools() {
        let db = test_db().await;
        let pool = db.pool();
        let tenant = funded_tenant(&db, "a@example.com", 0, Some("g1")).await;

        adjust_credits(pool, &tenant.id, dec!(10), "top up").await.unwrap();
        assert_eq!(pools::pool_balance(pool, &keys::group_pool("g1")).await, dec!(10));

        let mut bulk = single(&tenant.id);
        bulk.message_count = 3;
        meter_send(pool, bulk).await.unwrap();

        assert_eq!(pools::pool_balance(pool, &keys::group_pool("g1")).await, dec!(7));
        assert_eq!(pools::pool_balance(pool, keys::ADMIN_POOL).await, dec!(7));
    }

    #[tokio::test]
    async fn test_admin_audit_log_is_free() {
        let db = test_db().await;
        let tenant = funded_tenant(&db, "a@example.com", 3, None).await;

        let log = create_admin_audit_log(
            db.pool(),
            AuditRequest {
                tenant_id: tenant.id.clone(),
                endpoint: "sendsingle".to_string(),
                message_count: 1,
                provider_message_id: Some("msg-9".to_string()),
                provider_message_ids: vec!["msg-9".to_string()],
                status: MessageStatus::Sent,
                recipient: Some("+14155551234".to_string()),
                recipients: vec![],
                sender_phone: None,
                request_payload: json!({}),
                response_payload: json!({}),
            },
        )
        .await
        .unwrap();

        assert_eq!(log.endpoint, "sendsingle:admin-audit");
        assert_eq!(log.total_charge, "0");
        let profile = client_profile::get_profile(db.pool(), &tenant.id).await.unwrap();
        assert_eq!(profile.credits(), dec!(3));
    }

    #[tokio::test]
    async fn test_adjust_and_transfer() {
        let db = test_db().await;
        let pool = db.pool();
        let a = funded_tenant(&db, "a@example.com", 5, None).await;
        let b = funded_tenant(&db, "b@example.com", 0, None).await;

        let deduct = adjust_credits(pool, &a.id, dec!(-1.5), "correction").await.unwrap();
        assert_eq!(deduct.kind, TransactionKind::AdminCreditDeduct);
        assert_eq!(deduct.balance_after(), dec!(3.5));

        assert!(matches!(
            adjust_credits(pool, &a.id, dec!(-10), "too much").await,
            Err(MeteringError::InsufficientCredits { .. })
        ));
        assert!(matches!(
            adjust_credits(pool, &a.id, dec!(0.001), "dust").await,
            Err(MeteringError::InvalidAmount(_))
        ));

        let (out, incoming) = transfer_credits(pool, &a.id, &b.id, dec!(2), "share").await.unwrap();
        assert_eq!(out.balance_after(), dec!(1.5));
        assert_eq!(incoming.balance_after(), dec!(2));

        let chain = credit_transaction::list_for_tenant(pool, &a.id).await.unwrap();
        for pair in chain.windows(2) {
            assert_eq!(pair[0].balance_after_units, pair[1].balance_before_units);
        }
    }

    #[test]
    fn test_sender_from_response_order() {
        assert_eq!(
            sender_from_response(&json!({"from": "+1555", "senderPhone": "+1666"})),
            Some("+1666".to_string())
        );
        assert_eq!(sender_from_response(&json!({"sender": "  ", "from": "+1777"})), Some("+1777".to_string()));
        assert_eq!(sender_from_response(&json!({"sender": 42})), None);
    }
}
