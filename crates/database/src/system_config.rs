//! Global key-value configuration.
//!
//! Values are stored as strings. Typed access to the well-known keys lives in
//! [`crate::settings`]; this module is the raw store.

use rust_decimal::Decimal;
use sqlx::SqlitePool;

use crate::error::{DatabaseError, Result};
use crate::models::ConfigEntry;

/// Read a raw value.
pub async fn get(pool: &SqlitePool, key: &str) -> Result<Option<String>> {
    let value = sqlx::query_scalar::<_, String>("SELECT value FROM system_config WHERE key = ?")
        .bind(key)
        .fetch_optional(pool)
        .await?;

    Ok(value)
}

/// Insert or replace a value.
pub async fn set(pool: &SqlitePool, key: &str, value: &str) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO system_config (key, value, updated_at)
        VALUES (?, ?, datetime('now'))
        ON CONFLICT(key) DO UPDATE SET
            value = excluded.value,
            updated_at = excluded.updated_at
        "#,
    )
    .bind(key)
    .bind(value)
    .execute(pool)
    .await?;

    Ok(())
}

/// Remove a key. Returns whether it existed.
pub async fn delete(pool: &SqlitePool, key: &str) -> Result<bool> {
    let result = sqlx::query("DELETE FROM system_config WHERE key = ?")
        .bind(key)
        .execute(pool)
        .await?;

    Ok(result.rows_affected() > 0)
}

/// All entries whose key starts with `prefix`, ordered by key.
pub async fn list_prefix(pool: &SqlitePool, prefix: &str) -> Result<Vec<ConfigEntry>> {
    let pattern = format!("{}%", prefix.replace('%', "\\%").replace('_', "\\_"));
    let entries = sqlx::query_as::<_, ConfigEntry>(
        r#"
        SELECT key, value, updated_at
        FROM system_config
        WHERE key LIKE ? ESCAPE '\'
        ORDER BY key
        "#,
    )
    .bind(pattern)
    .fetch_all(pool)
    .await?;

    Ok(entries)
}

/// Read a decimal value. A stored value that does not parse is an error.
pub async fn get_decimal(pool: &SqlitePool, key: &str) -> Result<Option<Decimal>> {
    match get(pool, key).await? {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<Decimal>()
            .map(Some)
            .map_err(|_| DatabaseError::InvalidSetting {
                key: key.to_string(),
                reason: format!("non-numeric value {raw:?}"),
            }),
    }
}

/// Atomically add `delta` to a decimal value, flooring at zero.
///
/// Missing or non-numeric values count as zero. Returns the stored result.
pub async fn add_decimal(pool: &SqlitePool, key: &str, delta: Decimal) -> Result<Decimal> {
    let delta = delta.round_dp(2);
    let stored = sqlx::query_scalar::<_, String>(
        r#"
        INSERT INTO system_config (key, value, updated_at)
        VALUES (?1, printf('%.2f', MAX(0, CAST(?2 AS REAL))), datetime('now'))
        ON CONFLICT(key) DO UPDATE SET
            value = printf('%.2f', MAX(0, CAST(system_config.value AS REAL) + CAST(?2 AS REAL))),
            updated_at = excluded.updated_at
        RETURNING value
        "#,
    )
    .bind(key)
    .bind(delta.to_string())
    .fetch_one(pool)
    .await?;

    stored
        .parse::<Decimal>()
        .map_err(|_| DatabaseError::InvalidSetting {
            key: key.to_string(),
            reason: format!("non-numeric value {stored:?}"),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::test_db;
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn test_set_get_and_prefix() {
        let db = test_db().await;

        set(db.pool(), "pricing.group.g1.client_rate", "0.80").await.unwrap();
        set(db.pool(), "pricing.group.g1.extreme_cost", "0.02").await.unwrap();
        set(db.pool(), "pricing_other", "x").await.unwrap();
        set(db.pool(), "pricing.group.g1.client_rate", "0.75").await.unwrap();

        assert_eq!(
            get(db.pool(), "pricing.group.g1.client_rate").await.unwrap().as_deref(),
            Some("0.75")
        );
        assert_eq!(get_decimal(db.pool(), "pricing.group.g1.extreme_cost").await.unwrap(), Some(dec!(0.02)));

        let group = list_prefix(db.pool(), "pricing.group.g1.").await.unwrap();
        assert_eq!(group.len(), 2);

        assert!(delete(db.pool(), "pricing_other").await.unwrap());
        assert!(!delete(db.pool(), "pricing_other").await.unwrap());
    }

    #[tokio::test]
    async fn test_non_numeric_decimal_is_error() {
        let db = test_db().await;
        set(db.pool(), "client_rate_per_sms", "lots").await.unwrap();
        assert!(matches!(
            get_decimal(db.pool(), "client_rate_per_sms").await,
            Err(DatabaseError::InvalidSetting { .. })
        ));
    }

    #[tokio::test]
    async fn test_add_decimal_floors_at_zero() {
        let db = test_db().await;

        assert_eq!(add_decimal(db.pool(), "admin.pool", dec!(2.50)).await.unwrap(), dec!(2.50));
        assert_eq!(add_decimal(db.pool(), "admin.pool", dec!(-1.25)).await.unwrap(), dec!(1.25));
        assert_eq!(add_decimal(db.pool(), "admin.pool", dec!(-5)).await.unwrap(), dec!(0));
    }
}
