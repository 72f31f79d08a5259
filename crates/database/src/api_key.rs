//! API key storage.
//!
//! Only the hash and a display prefix/suffix are stored. Revocation is a soft
//! flag so `last_used_at` history survives.

use sqlx::SqlitePool;

use crate::error::{DatabaseError, Result};
use crate::models::ApiKey;

const KEY_COLUMNS: &str =
    "id, tenant_id, key_hash, prefix, suffix, label, is_active, last_used_at, revoked_at, created_at";

/// Store a new key hash for a tenant.
pub async fn create_api_key(
    pool: &SqlitePool,
    tenant_id: &str,
    key_hash: &str,
    prefix: &str,
    suffix: &str,
    label: Option<&str>,
) -> Result<ApiKey> {
    let id = uuid::Uuid::new_v4().to_string();
    sqlx::query_as::<_, ApiKey>(&format!(
        r#"
        INSERT INTO api_keys (id, tenant_id, key_hash, prefix, suffix, label)
        VALUES (?, ?, ?, ?, ?, ?)
        RETURNING {KEY_COLUMNS}
        "#
    ))
    .bind(&id)
    .bind(tenant_id)
    .bind(key_hash)
    .bind(prefix)
    .bind(suffix)
    .bind(label)
    .fetch_one(pool)
    .await
    .map_err(|e| DatabaseError::from_insert(e, "ApiKey", prefix))
}

/// Look up an active key by hash.
pub async fn find_active_by_hash(pool: &SqlitePool, key_hash: &str) -> Result<Option<ApiKey>> {
    let key = sqlx::query_as::<_, ApiKey>(&format!(
        "SELECT {KEY_COLUMNS} FROM api_keys WHERE key_hash = ? AND is_active = 1"
    ))
    .bind(key_hash)
    .fetch_optional(pool)
    .await?;

    Ok(key)
}

/// Record a successful authentication.
pub async fn touch_last_used(pool: &SqlitePool, id: &str) -> Result<()> {
    sqlx::query("UPDATE api_keys SET last_used_at = datetime('now') WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}

/// List a tenant's keys, including revoked ones.
pub async fn list_for_tenant(pool: &SqlitePool, tenant_id: &str) -> Result<Vec<ApiKey>> {
    let keys = sqlx::query_as::<_, ApiKey>(&format!(
        "SELECT {KEY_COLUMNS} FROM api_keys WHERE tenant_id = ? ORDER BY created_at DESC, id"
    ))
    .bind(tenant_id)
    .fetch_all(pool)
    .await?;

    Ok(keys)
}

/// Revoke a key. When `tenant_id` is given the key must belong to it.
pub async fn revoke(pool: &SqlitePool, id: &str, tenant_id: Option<&str>) -> Result<()> {
    let result = sqlx::query(
        r#"
        UPDATE api_keys
        SET is_active = 0, revoked_at = datetime('now')
        WHERE id = ?1 AND is_active = 1 AND (?2 IS NULL OR tenant_id = ?2)
        "#,
    )
    .bind(id)
    .bind(tenant_id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DatabaseError::NotFound {
            entity: "ApiKey",
            id: id.to_string(),
        });
    }

    tracing::info!(key_id = id, "API key revoked");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{funded_tenant, test_db};

    #[tokio::test]
    async fn test_revoked_keys_stop_resolving() {
        let db = test_db().await;
        let tenant = funded_tenant(&db, "a@example.com", 0).await;
        let other = funded_tenant(&db, "b@example.com", 0).await;

        let key = create_api_key(db.pool(), &tenant.id, "hash-1", "sk_live_ab", "wxyz", Some("ci"))
            .await
            .unwrap();
        assert!(find_active_by_hash(db.pool(), "hash-1").await.unwrap().is_some());

        touch_last_used(db.pool(), &key.id).await.unwrap();

        let wrong_owner = revoke(db.pool(), &key.id, Some(&other.id)).await;
        assert!(matches!(wrong_owner, Err(DatabaseError::NotFound { .. })));

        revoke(db.pool(), &key.id, Some(&tenant.id)).await.unwrap();
        assert!(find_active_by_hash(db.pool(), "hash-1").await.unwrap().is_none());

        let keys = list_for_tenant(db.pool(), &tenant.id).await.unwrap();
        assert_eq!(keys.len(), 1);
        assert!(!keys[0].is_active);
        assert!(keys[0].last_used_at.is_some());
        assert!(keys[0].revoked_at.is_some());
    }
}
