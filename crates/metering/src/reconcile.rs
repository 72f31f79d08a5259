//! Catch-up debits for sends that were logged but never billed.
//!
//! Expected charge per tenant is one credit per message over every
//! chargeable, non-example log. Actual charge is the sum of `debit` and
//! `reconciliation` entries. Any shortfall becomes one `reconciliation`
//! debit, floored so the balance stays non-negative.

use std::collections::BTreeMap;

use database::models::{MessageLog, TransactionKind};
use database::{client_profile, credit_transaction, credits, ledger, message_log};
use rust_decimal::Decimal;
use serde::Serialize;
use sqlx::SqlitePool;

use crate::Result;

/// What reconciliation found and did for one tenant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TenantReconciliation {
    pub tenant_id: String,
    pub expected: Decimal,
    pub charged: Decimal,
    pub shortfall: Decimal,
    /// Amount actually debited; less than `shortfall` when the balance ran out.
    pub debited: Decimal,
}

/// Summary of one reconciliation run.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileReport {
    pub logs_scanned: usize,
    pub tenants_checked: usize,
    pub adjusted: Vec<TenantReconciliation>,
    /// Tenants with logs but no billing profile.
    pub skipped: Vec<String>,
}

/// Messages a log should have been billed for.
///
/// `message_count`, else the recipient list length, else one.
pub fn expected_messages(log: &MessageLog) -> i64 {
    if log.message_count > 0 {
        return log.message_count;
    }
    match log.recipients().len() {
        0 => 1,
        n => n as i64,
    }
}

/// Scan all chargeable logs and debit any unbilled shortfall.
pub async fn reconcile_credits(pool: &SqlitePool) -> Result<ReconcileReport> {
    let logs = message_log::list_chargeable(pool).await?;

    let mut expected_units: BTreeMap<String, i64> = BTreeMap::new();
    for log in &logs {
        let units = credits::units_for_messages(expected_messages(log))?;
        *expected_units.entry(log.tenant_id.clone()).or_default() += units;
    }

    let charged_units: BTreeMap<String, i64> = credit_transaction::charged_units_by_tenant(pool)
        .await?
        .into_iter()
        .collect();

    let mut report = ReconcileReport {
        logs_scanned: logs.len(),
        tenants_checked: expected_units.len(),
        ..Default::default()
    };

    for (tenant_id, expected) in expected_units {
        let charged = charged_units.get(&tenant_id).copied().unwrap_or(0);
        let shortfall = expected - charged;
        if shortfall <= 0 {
            continue;
        }

        if client_profile::find_profile(pool, &tenant_id).await?.is_none() {
            tracing::warn!(tenant_id = %tenant_id, "Skipping reconciliation for tenant without profile");
            report.skipped.push(tenant_id);
            continue;
        }

        let description = format!(
            "reconciliation: {} credits unbilled",
            credits::from_units(shortfall)
        );
        let debited = ledger::debit_up_to(
            pool,
            &tenant_id,
            shortfall,
            TransactionKind::Reconciliation,
            &description,
        )
        .await?
        .map(|tx| -tx.amount_units)
        .unwrap_or(0);

        tracing::info!(
            tenant_id = %tenant_id,
            shortfall_units = shortfall,
            debited_units = debited,
            "Reconciled unbilled sends"
        );

        report.adjusted.push(TenantReconciliation {
            tenant_id,
            expected: credits::from_units(expected),
            charged: credits::from_units(charged),
            shortfall: credits::from_units(shortfall),
            debited: credits::from_units(debited),
        });
    }

    Ok(report)
}
