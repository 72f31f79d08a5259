//! Inbound message storage.
//!
//! Lifecycle is `active -> deleted -> purged`. Deleting is a reversible flag;
//! purging removes deleted rows for good.

use sqlx::SqlitePool;

use crate::error::{DatabaseError, Result};
use crate::models::{IncomingMessage, NewIncomingMessage};

const INCOMING_COLUMNS: &str = r#"
    id, tenant_id, from_number, receiver, business, body, status, matched_block_word,
    used_modem, port, provider_message_id, first_name, last_name, is_read, lifecycle,
    deleted_at, is_example, received_at, created_at
"#;

/// Deleted-message count at which the inbox recommends a purge.
pub const PURGE_RECOMMENDED_AT: i64 = 2000;

/// Modem and port an inbound message arrived on.
#[derive(Debug, Clone, PartialEq, Eq, Default, sqlx::FromRow)]
pub struct ReplyChannel {
    pub used_modem: Option<String>,
    pub port: Option<String>,
}

impl ReplyChannel {
    pub fn is_empty(&self) -> bool {
        self.used_modem.is_none() && self.port.is_none()
    }
}

/// Persist an inbound message.
pub async fn insert(pool: &SqlitePool, message: &NewIncomingMessage) -> Result<IncomingMessage> {
    let row = sqlx::query_as::<_, IncomingMessage>(&format!(
        r#"
        INSERT INTO incoming_messages (
            tenant_id, from_number, receiver, business, body, status, matched_block_word,
            used_modem, port, provider_message_id, first_name, last_name, is_example, received_at
        )
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        RETURNING {INCOMING_COLUMNS}
        "#
    ))
    .bind(&message.tenant_id)
    .bind(&message.from_number)
    .bind(&message.receiver)
    .bind(&message.business)
    .bind(&message.body)
    .bind(message.status)
    .bind(&message.matched_block_word)
    .bind(&message.used_modem)
    .bind(&message.port)
    .bind(&message.provider_message_id)
    .bind(&message.first_name)
    .bind(&message.last_name)
    .bind(message.is_example)
    .bind(&message.received_at)
    .fetch_one(pool)
    .await?;

    Ok(row)
}

/// Get one of a tenant's messages.
pub async fn get_for_tenant(pool: &SqlitePool, tenant_id: &str, id: i64) -> Result<IncomingMessage> {
    sqlx::query_as::<_, IncomingMessage>(&format!(
        "SELECT {INCOMING_COLUMNS} FROM incoming_messages WHERE id = ? AND tenant_id = ?"
    ))
    .bind(id)
    .bind(tenant_id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| DatabaseError::NotFound {
        entity: "IncomingMessage",
        id: id.to_string(),
    })
}

/// A tenant's active inbox, newest first.
pub async fn list_active(pool: &SqlitePool, tenant_id: &str, limit: i64, offset: i64) -> Result<Vec<IncomingMessage>> {
    list_by_lifecycle(pool, tenant_id, "active", limit, offset).await
}

/// A tenant's soft-deleted messages, newest first.
pub async fn list_deleted(pool: &SqlitePool, tenant_id: &str, limit: i64, offset: i64) -> Result<Vec<IncomingMessage>> {
    list_by_lifecycle(pool, tenant_id, "deleted", limit, offset).await
}

async fn list_by_lifecycle(
    pool: &SqlitePool,
    tenant_id: &str,
    lifecycle: &str,
    limit: i64,
    offset: i64,
) -> Result<Vec<IncomingMessage>> {
    let rows = sqlx::query_as::<_, IncomingMessage>(&format!(
        r#"
        SELECT {INCOMING_COLUMNS}
        FROM incoming_messages
        WHERE tenant_id = ? AND lifecycle = ?
        ORDER BY id DESC
        LIMIT ? OFFSET ?
        "#
    ))
    .bind(tenant_id)
    .bind(lifecycle)
    .bind(limit)
    .bind(offset)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Messages that no tenant could be resolved for.
pub async fn list_unassigned(pool: &SqlitePool, limit: i64) -> Result<Vec<IncomingMessage>> {
    let rows = sqlx::query_as::<_, IncomingMessage>(&format!(
        r#"
        SELECT {INCOMING_COLUMNS}
        FROM incoming_messages
        WHERE tenant_id IS NULL
        ORDER BY id DESC
        LIMIT ?
        "#
    ))
    .bind(limit)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Active messages from one phone number to a tenant, oldest first.
pub async fn conversation(pool: &SqlitePool, tenant_id: &str, phone: &str) -> Result<Vec<IncomingMessage>> {
    let rows = sqlx::query_as::<_, IncomingMessage>(&format!(
        r#"
        SELECT {INCOMING_COLUMNS}
        FROM incoming_messages
        WHERE tenant_id = ? AND from_number = ? AND lifecycle = 'active'
        ORDER BY id
        "#
    ))
    .bind(tenant_id)
    .bind(phone)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Modem/port of the most recent active inbound message from `phone` to a tenant.
pub async fn latest_reply_channel(pool: &SqlitePool, tenant_id: &str, phone: &str) -> Result<Option<ReplyChannel>> {
    let channel = sqlx::query_as::<_, ReplyChannel>(
        r#"
        SELECT used_modem, port
        FROM incoming_messages
        WHERE tenant_id = ? AND from_number = ? AND lifecycle = 'active'
        ORDER BY id DESC
        LIMIT 1
        "#,
    )
    .bind(tenant_id)
    .bind(phone)
    .fetch_optional(pool)
    .await?;

    Ok(channel)
}

/// Mark a message as read.
pub async fn mark_read(pool: &SqlitePool, tenant_id: &str, id: i64) -> Result<()> {
    let result = sqlx::query("UPDATE incoming_messages SET is_read = 1 WHERE id = ? AND tenant_id = ?")
        .bind(id)
        .bind(tenant_id)
        .execute(pool)
        .await?;
    ensure_updated(result.rows_affected(), id)
}

/// Soft-delete a message.
pub async fn soft_delete(pool: &SqlitePool, tenant_id: &str, id: i64) -> Result<()> {
    let result = sqlx::query(
        r#"
        UPDATE incoming_messages
        SET lifecycle = 'deleted', deleted_at = datetime('now')
        WHERE id = ? AND tenant_id = ? AND lifecycle = 'active'
        "#,
    )
    .bind(id)
    .bind(tenant_id)
    .execute(pool)
    .await?;
    ensure_updated(result.rows_affected(), id)
}

/// Restore a soft-deleted message.
pub async fn restore(pool: &SqlitePool, tenant_id: &str, id: i64) -> Result<()> {
    let result = sqlx::query(
        r#"
        UPDATE incoming_messages
        SET lifecycle = 'active', deleted_at = NULL
        WHERE id = ? AND tenant_id = ? AND lifecycle = 'deleted'
        "#,
    )
    .bind(id)
    .bind(tenant_id)
    .execute(pool)
    .await?;
    ensure_updated(result.rows_affected(), id)
}

/// Count unread active messages for a tenant.
pub async fn count_unread(pool: &SqlitePool, tenant_id: &str) -> Result<i64> {
    let count = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM incoming_messages WHERE tenant_id = ? AND lifecycle = 'active' AND is_read = 0",
    )
    .bind(tenant_id)
    .fetch_one(pool)
    .await?;
    Ok(count)
}

/// Count soft-deleted messages for a tenant.
pub async fn count_deleted(pool: &SqlitePool, tenant_id: &str) -> Result<i64> {
    let count = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM incoming_messages WHERE tenant_id = ? AND lifecycle = 'deleted'",
    )
    .bind(tenant_id)
    .fetch_one(pool)
    .await?;
    Ok(count)
}

/// Permanently remove a tenant's soft-deleted messages.
pub async fn purge_deleted(pool: &SqlitePool, tenant_id: &str) -> Result<u64> {
    let result = sqlx::query("DELETE FROM incoming_messages WHERE tenant_id = ? AND lifecycle = 'deleted'")
        .bind(tenant_id)
        .execute(pool)
        .await?;

    tracing::info!(tenant_id, purged = result.rows_affected(), "Purged deleted messages");
    Ok(result.rows_affected())
}

/// Permanently remove messages, across tenants, deleted more than `days` ago.
pub async fn purge_deleted_older_than(pool: &SqlitePool, days: u32) -> Result<u64> {
    let modifier = format!("-{days} days");
    let result = sqlx::query(
        r#"
        DELETE FROM incoming_messages
        WHERE lifecycle = 'deleted' AND deleted_at <= datetime('now', ?)
        "#,
    )
    .bind(modifier)
    .execute(pool)
    .await?;

    tracing::info!(days, purged = result.rows_affected(), "Purged aged deleted messages");
    Ok(result.rows_affected())
}

fn ensure_updated(rows: u64, id: i64) -> Result<()> {
    if rows == 0 {
        return Err(DatabaseError::NotFound {
            entity: "IncomingMessage",
            id: id.to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{InboundStatus, Lifecycle};
    use crate::test_support::{funded_tenant, test_db};

    fn inbound(tenant_id: Option<&str>, from: &str, modem: Option<&str>) -> NewIncomingMessage {
        NewIncomingMessage {
            tenant_id: tenant_id.map(str::to_string),
            from_number: from.to_string(),
            receiver: "+15550001111".to_string(),
            business: None,
            body: "hello".to_string(),
            status: InboundStatus::Received,
            matched_block_word: None,
            used_modem: modem.map(str::to_string),
            port: modem.map(|_| "3".to_string()),
            provider_message_id: "in-1".to_string(),
            first_name: None,
            last_name: None,
            is_example: false,
            received_at: "2025-03-01T10:00:00Z".to_string(),
        }
    }

    #[tokio::test]
    async fn test_lifecycle_delete_restore_purge() {
        let db = test_db().await;
        let pool = db.pool();
        let tenant = funded_tenant(&db, "a@example.com", 0).await;

        let m1 = insert(pool, &inbound(Some(&tenant.id), "+14155551234", None)).await.unwrap();
        let m2 = insert(pool, &inbound(Some(&tenant.id), "+14155551234", None)).await.unwrap();
        assert_eq!(count_unread(pool, &tenant.id).await.unwrap(), 2);

        mark_read(pool, &tenant.id, m1.id).await.unwrap();
        assert_eq!(count_unread(pool, &tenant.id).await.unwrap(), 1);

        soft_delete(pool, &tenant.id, m1.id).await.unwrap();
        soft_delete(pool, &tenant.id, m2.id).await.unwrap();
        assert_eq!(count_deleted(pool, &tenant.id).await.unwrap(), 2);
        assert!(list_active(pool, &tenant.id, 50, 0).await.unwrap().is_empty());

        restore(pool, &tenant.id, m1.id).await.unwrap();
        let restored = get_for_tenant(pool, &tenant.id, m1.id).await.unwrap();
        assert_eq!(restored.lifecycle, Lifecycle::Active);

        assert!(matches!(restore(pool, &tenant.id, m1.id).await, Err(DatabaseError::NotFound { .. })));

        assert_eq!(purge_deleted(pool, &tenant.id).await.unwrap(), 1);
        assert_eq!(count_deleted(pool, &tenant.id).await.unwrap(), 0);
        assert_eq!(list_active(pool, &tenant.id, 50, 0).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_reply_channel_uses_latest_message() {
        let db = test_db().await;
        let pool = db.pool();
        let tenant = funded_tenant(&db, "a@example.com", 0).await;

        insert(pool, &inbound(Some(&tenant.id), "+14155551234", Some("modem-1"))).await.unwrap();
        insert(pool, &inbound(Some(&tenant.id), "+14155551234", Some("modem-2"))).await.unwrap();

        let channel = latest_reply_channel(pool, &tenant.id, "+14155551234").await.unwrap().unwrap();
        assert_eq!(channel.used_modem.as_deref(), Some("modem-2"));
        assert!(latest_reply_channel(pool, &tenant.id, "+10000000000").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_unassigned_messages_are_kept() {
        let db = test_db().await;
        let pool = db.pool();

        insert(pool, &inbound(None, "+14155551234", None)).await.unwrap();
        let orphans = list_unassigned(pool, 10).await.unwrap();
        assert_eq!(orphans.len(), 1);
        assert!(orphans[0].tenant_id.is_none());
    }
}
