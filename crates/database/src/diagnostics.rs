//! Last-webhook snapshot for operators.

use sqlx::SqlitePool;

use crate::error::Result;
use crate::models::WebhookDiagnostics;

/// Overwrite the snapshot with the latest inbound event.
pub async fn record_webhook_event(
    pool: &SqlitePool,
    event: &serde_json::Value,
    routed_tenant_id: Option<&str>,
    strategy: &str,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO webhook_diagnostics (id, last_event, last_event_at, routed_tenant_id, strategy)
        VALUES (1, ?, datetime('now'), ?, ?)
        ON CONFLICT(id) DO UPDATE SET
            last_event = excluded.last_event,
            last_event_at = excluded.last_event_at,
            routed_tenant_id = excluded.routed_tenant_id,
            strategy = excluded.strategy
        "#,
    )
    .bind(event.to_string())
    .bind(routed_tenant_id)
    .bind(strategy)
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn get_webhook_diagnostics(pool: &SqlitePool) -> Result<Option<WebhookDiagnostics>> {
    let row = sqlx::query_as::<_, WebhookDiagnostics>(
        r#"
        SELECT last_event, last_event_at, routed_tenant_id, strategy
        FROM webhook_diagnostics
        WHERE id = 1
        "#,
    )
    .fetch_optional(pool)
    .await?;

    Ok(row)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::test_db;

    #[tokio::test]
    async fn test_snapshot_is_overwritten() {
        let db = test_db().await;
        assert!(get_webhook_diagnostics(db.pool()).await.unwrap().is_none());

        record_webhook_event(db.pool(), &serde_json::json!({"id": "1"}), None, "unrouted")
            .await
            .unwrap();
        record_webhook_event(db.pool(), &serde_json::json!({"id": "2"}), Some("t1"), "business")
            .await
            .unwrap();

        let snap = get_webhook_diagnostics(db.pool()).await.unwrap().unwrap();
        assert_eq!(snap.strategy, "business");
        assert_eq!(snap.routed_tenant_id.as_deref(), Some("t1"));
        assert!(snap.last_event.contains("\"2\""));
    }
}
