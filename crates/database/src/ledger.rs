//! Balance mutations.
//!
//! Every change to `client_profiles.credit_units` goes through this module so
//! the credit ledger chains: each transaction's `balance_before_units` equals
//! the previous transaction's `balance_after_units` for the same tenant.
//!
//! Debits are a single conditional `UPDATE ... WHERE credit_units >= n
//! RETURNING credit_units` executed as the first statement of the
//! transaction. The write lock is therefore held before anything is read, and
//! zero rows updated means either no profile or not enough credit.

use sqlx::{SqliteConnection, SqlitePool};

use crate::client_profile;
use crate::credit_transaction::{self, NewCreditTransaction};
use crate::credits;
use crate::error::{DatabaseError, Result};
use crate::message_log;
use crate::models::{CreditTransaction, MessageLog, NewMessageLog, TransactionKind};

/// A message log and the debit that paid for it.
#[derive(Debug, Clone)]
pub struct SendDebit {
    pub message_log: MessageLog,
    pub transaction: CreditTransaction,
}

/// Debit one credit per message and record the send, atomically.
///
/// Fails with `InsufficientCredits` or `NotFound { entity: "ClientProfile" }`
/// without writing anything.
pub async fn debit_for_send(pool: &SqlitePool, log: &NewMessageLog) -> Result<SendDebit> {
    if log.message_count <= 0 {
        return Err(DatabaseError::InvalidAmount(format!(
            "message count must be positive, got {}",
            log.message_count
        )));
    }
    let units = credits::units_for_messages(log.message_count)?;

    let mut tx = pool.begin().await?;

    let after = apply_delta(&mut tx, &log.tenant_id, -units).await?;
    let message_log = message_log::insert(&mut tx, log).await?;
    let transaction = credit_transaction::insert(
        &mut tx,
        &NewCreditTransaction {
            tenant_id: &log.tenant_id,
            amount_units: -units,
            kind: TransactionKind::Debit,
            description: &format!("{} x{}", log.endpoint, log.message_count),
            balance_before_units: after + units,
            balance_after_units: after,
            message_log_id: Some(message_log.id),
        },
    )
    .await?;

    tx.commit().await?;

    tracing::debug!(
        tenant_id = %log.tenant_id,
        message_log_id = message_log.id,
        balance_units = after,
        "Send debited"
    );

    Ok(SendDebit {
        message_log,
        transaction,
    })
}

/// Add (positive) or remove (negative) credit units with a ledger entry.
///
/// Negative adjustments never take the balance below zero.
pub async fn adjust_balance(
    pool: &SqlitePool,
    tenant_id: &str,
    delta_units: i64,
    kind: TransactionKind,
    description: &str,
) -> Result<CreditTransaction> {
    if delta_units == 0 {
        return Err(DatabaseError::InvalidAmount("adjustment must be non-zero".to_string()));
    }

    let mut tx = pool.begin().await?;
    let transaction = adjust_in(&mut tx, tenant_id, delta_units, kind, description).await?;
    tx.commit().await?;

    Ok(transaction)
}

/// [`adjust_balance`] on an open transaction.
pub(crate) async fn adjust_in(
    conn: &mut SqliteConnection,
    tenant_id: &str,
    delta_units: i64,
    kind: TransactionKind,
    description: &str,
) -> Result<CreditTransaction> {
    let after = apply_delta(&mut *conn, tenant_id, delta_units).await?;
    credit_transaction::insert(
        conn,
        &NewCreditTransaction {
            tenant_id,
            amount_units: delta_units,
            kind,
            description,
            balance_before_units: after - delta_units,
            balance_after_units: after,
            message_log_id: None,
        },
    )
    .await
}

/// Move credit units between two tenants in one transaction.
///
/// Returns the `transfer_out` and `transfer_in` entries.
pub async fn transfer(
    pool: &SqlitePool,
    from_tenant: &str,
    to_tenant: &str,
    units: i64,
    description: &str,
) -> Result<(CreditTransaction, CreditTransaction)> {
    if units <= 0 {
        return Err(DatabaseError::InvalidAmount("transfer must be positive".to_string()));
    }
    if from_tenant == to_tenant {
        return Err(DatabaseError::InvalidAmount("cannot transfer to the same tenant".to_string()));
    }

    let mut tx = pool.begin().await?;

    let from_after = apply_delta(&mut tx, from_tenant, -units).await?;
    let out = credit_transaction::insert(
        &mut tx,
        &NewCreditTransaction {
            tenant_id: from_tenant,
            amount_units: -units,
            kind: TransactionKind::TransferOut,
            description,
            balance_before_units: from_after + units,
            balance_after_units: from_after,
            message_log_id: None,
        },
    )
    .await?;

    let to_after = apply_delta(&mut tx, to_tenant, units).await?;
    let incoming = credit_transaction::insert(
        &mut tx,
        &NewCreditTransaction {
            tenant_id: to_tenant,
            amount_units: units,
            kind: TransactionKind::TransferIn,
            description,
            balance_before_units: to_after - units,
            balance_after_units: to_after,
            message_log_id: None,
        },
    )
    .await?;

    tx.commit().await?;
    Ok((out, incoming))
}

/// Debit up to `shortfall_units`, flooring the balance at zero.
///
/// Returns `None` when the balance is already zero.
pub async fn debit_up_to(
    pool: &SqlitePool,
    tenant_id: &str,
    shortfall_units: i64,
    kind: TransactionKind,
    description: &str,
) -> Result<Option<CreditTransaction>> {
    let mut tx = pool.begin().await?;

    let balance = lock_balance(&mut tx, tenant_id).await?;
    let debit = shortfall_units.min(balance);
    if debit <= 0 {
        return Ok(None);
    }

    let after = apply_delta(&mut tx, tenant_id, -debit).await?;
    let transaction = credit_transaction::insert(
        &mut tx,
        &NewCreditTransaction {
            tenant_id,
            amount_units: -debit,
            kind,
            description,
            balance_before_units: after + debit,
            balance_after_units: after,
            message_log_id: None,
        },
    )
    .await?;
    tx.commit().await?;

    Ok(Some(transaction))
}

/// Soft-disable a tenant: zero the balance, clear routing identity, deactivate.
///
/// The zeroing is recorded as an `admin_credit_deduct` so the ledger still
/// chains. Returns that entry when the balance was non-zero.
pub async fn disable_tenant(pool: &SqlitePool, tenant_id: &str) -> Result<Option<CreditTransaction>> {
    let mut tx = pool.begin().await?;

    let balance = lock_balance(&mut tx, tenant_id).await?;
    let transaction = if balance > 0 {
        let after = apply_delta(&mut tx, tenant_id, -balance).await?;
        Some(
            credit_transaction::insert(
                &mut tx,
                &NewCreditTransaction {
                    tenant_id,
                    amount_units: -balance,
                    kind: TransactionKind::AdminCreditDeduct,
                    description: "account disabled",
                    balance_before_units: after + balance,
                    balance_after_units: after,
                    message_log_id: None,
                },
            )
            .await?,
        )
    } else {
        None
    };

    client_profile::clear_routing_identity(&mut tx, tenant_id).await?;
    sqlx::query("UPDATE tenants SET is_active = 0 WHERE id = ?")
        .bind(tenant_id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;
    tracing::info!(tenant_id, "Tenant disabled");

    Ok(transaction)
}

/// Take the write lock on a profile row and return its balance.
async fn lock_balance(conn: &mut SqliteConnection, tenant_id: &str) -> Result<i64> {
    sqlx::query_scalar::<_, i64>(
        r#"
        UPDATE client_profiles
        SET updated_at = updated_at
        WHERE tenant_id = ?
        RETURNING credit_units
        "#,
    )
    .bind(tenant_id)
    .fetch_optional(conn)
    .await?
    .ok_or_else(|| DatabaseError::NotFound {
        entity: "ClientProfile",
        id: tenant_id.to_string(),
    })
}

/// Conditionally apply `delta_units`, refusing to go below zero.
///
/// Returns the balance after the update.
async fn apply_delta(conn: &mut SqliteConnection, tenant_id: &str, delta_units: i64) -> Result<i64> {
    let after = sqlx::query_scalar::<_, i64>(
        r#"
        UPDATE client_profiles
        SET credit_units = credit_units + ?1, updated_at = datetime('now')
        WHERE tenant_id = ?2 AND credit_units + ?1 >= 0
        RETURNING credit_units
        "#,
    )
    .bind(delta_units)
    .bind(tenant_id)
    .fetch_optional(&mut *conn)
    .await?;

    if let Some(after) = after {
        return Ok(after);
    }

    let balance = sqlx::query_scalar::<_, i64>(
        "SELECT credit_units FROM client_profiles WHERE tenant_id = ?",
    )
    .bind(tenant_id)
    .fetch_optional(&mut *conn)
    .await?;

    match balance {
        None => Err(DatabaseError::NotFound {
            entity: "ClientProfile",
            id: tenant_id.to_string(),
        }),
        Some(balance_units) => Err(DatabaseError::InsufficientCredits {
            tenant_id: tenant_id.to_string(),
            balance_units,
            required_units: -delta_units,
        }),
    }
}
