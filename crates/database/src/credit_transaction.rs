//! Append-only credit ledger.

use sqlx::{SqliteConnection, SqlitePool};

use crate::models::{CreditTransaction, TransactionKind};
use crate::Result;

const TRANSACTION_COLUMNS: &str = r#"
    id, tenant_id, amount_units, kind, description, balance_before_units,
    balance_after_units, message_log_id, created_at
"#;

/// Fields for a new ledger entry.
#[derive(Debug, Clone)]
pub(crate) struct NewCreditTransaction<'a> {
    pub tenant_id: &'a str,
    pub amount_units: i64,
    pub kind: TransactionKind,
    pub description: &'a str,
    pub balance_before_units: i64,
    pub balance_after_units: i64,
    pub message_log_id: Option<i64>,
}

/// Insert a ledger entry. Only [`crate::ledger`] writes the ledger.
pub(crate) async fn insert(
    conn: &mut SqliteConnection,
    entry: &NewCreditTransaction<'_>,
) -> Result<CreditTransaction> {
    let row = sqlx::query_as::<_, CreditTransaction>(&format!(
        r#"
        INSERT INTO credit_transactions (
            tenant_id, amount_units, kind, description,
            balance_before_units, balance_after_units, message_log_id
        )
        VALUES (?, ?, ?, ?, ?, ?, ?)
        RETURNING {TRANSACTION_COLUMNS}
        "#
    ))
    .bind(entry.tenant_id)
    .bind(entry.amount_units)
    .bind(entry.kind)
    .bind(entry.description)
    .bind(entry.balance_before_units)
    .bind(entry.balance_after_units)
    .bind(entry.message_log_id)
    .fetch_one(conn)
    .await?;

    Ok(row)
}

/// A tenant's ledger in write order.
pub async fn list_for_tenant(pool: &SqlitePool, tenant_id: &str) -> Result<Vec<CreditTransaction>> {
    let rows = sqlx::query_as::<_, CreditTransaction>(&format!(
        r#"
        SELECT {TRANSACTION_COLUMNS}
        FROM credit_transactions
        WHERE tenant_id = ?
        ORDER BY id
        "#
    ))
    .bind(tenant_id)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// The most recent ledger entries for a tenant, newest first.
pub async fn recent_for_tenant(pool: &SqlitePool, tenant_id: &str, limit: i64) -> Result<Vec<CreditTransaction>> {
    let rows = sqlx::query_as::<_, CreditTransaction>(&format!(
        r#"
        SELECT {TRANSACTION_COLUMNS}
        FROM credit_transactions
        WHERE tenant_id = ?
        ORDER BY id DESC
        LIMIT ?
        "#
    ))
    .bind(tenant_id)
    .bind(limit)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Units already charged for sends, per tenant.
///
/// Counts `debit` and `reconciliation` entries as positive charged amounts.
pub async fn charged_units_by_tenant(pool: &SqlitePool) -> Result<Vec<(String, i64)>> {
    let rows = sqlx::query_as::<_, (String, i64)>(
        r#"
        SELECT tenant_id, COALESCE(SUM(-amount_units), 0) AS charged
        FROM credit_transactions
        WHERE kind IN ('debit', 'reconciliation')
        GROUP BY tenant_id
        "#,
    )
    .fetch_all(pool)
    .await?;

    Ok(rows)
}
