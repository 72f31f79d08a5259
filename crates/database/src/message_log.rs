//! Outbound message logs.

use rust_decimal::Decimal;
use sqlx::{SqliteConnection, SqlitePool};

use crate::error::{DatabaseError, Result};
use crate::models::{MessageLog, MessageStatus, NewMessageLog};

const LOG_COLUMNS: &str = r#"
    id, tenant_id, provider_message_id, provider_message_ids, endpoint, recipient, recipients, sender_phone, status,
    cost_per_message, charge_per_message, total_cost, total_charge, message_count,
    request_payload, response_payload, is_example, created_at, updated_at
"#;

/// Insert a message log using an open connection or transaction.
pub(crate) async fn insert(conn: &mut SqliteConnection, log: &NewMessageLog) -> Result<MessageLog> {
    let count = Decimal::from(log.message_count);
    let total_cost = log.cost_per_message * count;
    let total_charge = log.charge_per_message * count;

    let row = sqlx::query_as::<_, MessageLog>(&format!(
        r#"
        INSERT INTO message_logs (
            tenant_id, provider_message_id, provider_message_ids, endpoint, recipient, recipients,
            sender_phone, status, cost_per_message, charge_per_message, total_cost, total_charge,
            message_count, request_payload, response_payload, is_example
        )
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        RETURNING {LOG_COLUMNS}
        "#
    ))
    .bind(&log.tenant_id)
    .bind(&log.provider_message_id)
    .bind(serde_json::to_string(&log.provider_message_ids)?)
    .bind(&log.endpoint)
    .bind(&log.recipient)
    .bind(serde_json::to_string(&log.recipients)?)
    .bind(&log.sender_phone)
    .bind(log.status)
    .bind(log.cost_per_message.to_string())
    .bind(log.charge_per_message.to_string())
    .bind(total_cost.to_string())
    .bind(total_charge.to_string())
    .bind(log.message_count)
    .bind(log.request_payload.to_string())
    .bind(log.response_payload.to_string())
    .bind(log.is_example)
    .fetch_one(conn)
    .await?;

    Ok(row)
}

/// Insert a message log that carries no balance change (audit entries).
pub async fn insert_unbilled(pool: &SqlitePool, log: &NewMessageLog) -> Result<MessageLog> {
    let mut conn = pool.acquire().await?;
    insert(&mut conn, log).await
}

/// Get a message log by row ID.
pub async fn get_message_log(pool: &SqlitePool, id: i64) -> Result<MessageLog> {
    sqlx::query_as::<_, MessageLog>(&format!("SELECT {LOG_COLUMNS} FROM message_logs WHERE id = ?"))
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| DatabaseError::NotFound {
            entity: "MessageLog",
            id: id.to_string(),
        })
}

/// Find a tenant's log by any provider-assigned message ID it carries.
pub async fn find_by_provider_id(
    pool: &SqlitePool,
    tenant_id: &str,
    provider_message_id: &str,
) -> Result<Option<MessageLog>> {
    let row = sqlx::query_as::<_, MessageLog>(&format!(
        r#"
        SELECT {LOG_COLUMNS}
        FROM message_logs
        WHERE tenant_id = ?1
          AND (provider_message_id = ?2
               OR EXISTS (SELECT 1 FROM json_each(message_logs.provider_message_ids) WHERE json_each.value = ?2))
        ORDER BY id DESC
        LIMIT 1
        "#
    ))
    .bind(tenant_id)
    .bind(provider_message_id)
    .fetch_optional(pool)
    .await?;

    Ok(row)
}

/// A tenant's send history, newest first.
pub async fn list_for_tenant(pool: &SqlitePool, tenant_id: &str, limit: i64, offset: i64) -> Result<Vec<MessageLog>> {
    let rows = sqlx::query_as::<_, MessageLog>(&format!(
        r#"
        SELECT {LOG_COLUMNS}
        FROM message_logs
        WHERE tenant_id = ?
        ORDER BY id DESC
        LIMIT ? OFFSET ?
        "#
    ))
    .bind(tenant_id)
    .bind(limit)
    .bind(offset)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Backfill the status reported by the provider.
pub async fn update_status(pool: &SqlitePool, id: i64, status: MessageStatus) -> Result<()> {
    let result = sqlx::query(
        r#"
        UPDATE message_logs
        SET status = ?, updated_at = datetime('now')
        WHERE id = ?
        "#,
    )
    .bind(status)
    .bind(id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DatabaseError::NotFound {
            entity: "MessageLog",
            id: id.to_string(),
        });
    }
    Ok(())
}

/// The active tenant that most recently sent an outbound message to `phone`.
pub async fn latest_sender_tenant_for(pool: &SqlitePool, phone: &str) -> Result<Option<String>> {
    let tenant = sqlx::query_scalar::<_, String>(
        r#"
        SELECT tenant_id
        FROM message_logs
        WHERE (recipient = ?1
               OR EXISTS (SELECT 1 FROM json_each(message_logs.recipients) WHERE json_each.value = ?1))
          AND EXISTS (SELECT 1 FROM tenants WHERE tenants.id = message_logs.tenant_id AND tenants.is_active = 1)
        ORDER BY id DESC
        LIMIT 1
        "#,
    )
    .bind(phone)
    .fetch_optional(pool)
    .await?;

    Ok(tenant)
}

/// Non-example logs whose status is expected to have been billed.
pub async fn list_chargeable(pool: &SqlitePool) -> Result<Vec<MessageLog>> {
    let rows = sqlx::query_as::<_, MessageLog>(&format!(
        r#"
        SELECT {LOG_COLUMNS}
        FROM message_logs
        WHERE is_example = 0
          AND status IN ('queued', 'sent', 'delivered')
          AND endpoint NOT LIKE '%:admin-audit'
        ORDER BY id
        "#
    ))
    .fetch_all(pool)
    .await?;

    Ok(rows)
}
