//! Denormalized credit pool aggregates.
//!
//! `admin.pool` and `group.pool.<gid>` are dashboard figures, not billing
//! truth. Updates are best-effort: failures are logged and swallowed.

use database::settings::keys;
use database::system_config;
use rust_decimal::Decimal;
use sqlx::SqlitePool;

/// Move the admin pool and, when known, the group pool by `delta` credits.
///
/// Both pools are floored at zero.
pub async fn apply_pool_delta(pool: &SqlitePool, group_id: Option<&str>, delta: Decimal) {
    if delta.is_zero() {
        return;
    }

    if let Some(gid) = group_id {
        let key = keys::group_pool(gid);
        if let Err(e) = system_config::add_decimal(pool, &key, delta).await {
            tracing::warn!(key = %key, %delta, error = %e, "Failed to update group pool");
        }
    }

    if let Err(e) = system_config::add_decimal(pool, keys::ADMIN_POOL, delta).await {
        tracing::warn!(key = keys::ADMIN_POOL, %delta, error = %e, "Failed to update admin pool");
    }
}

/// Current pool value, zero when unset or unreadable.
pub async fn pool_balance(pool: &SqlitePool, key: &str) -> Decimal {
    match system_config::get_decimal(pool, key).await {
        Ok(value) => value.unwrap_or_default(),
        Err(e) => {
            tracing::warn!(key, error = %e, "Unreadable pool value");
            Decimal::ZERO
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::test_db;
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn test_pools_floor_at_zero() {
        let db = test_db().await;
        let pool = db.pool();

        apply_pool_delta(pool, Some("g1"), dec!(3)).await;
        apply_pool_delta(pool, None, dec!(1)).await;
        assert_eq!(pool_balance(pool, &keys::group_pool("g1")).await, dec!(3));
        assert_eq!(pool_balance(pool, keys::ADMIN_POOL).await, dec!(4));

        apply_pool_delta(pool, Some("g1"), dec!(-10)).await;
        assert_eq!(pool_balance(pool, &keys::group_pool("g1")).await, dec!(0));
        assert_eq!(pool_balance(pool, keys::ADMIN_POOL).await, dec!(0));
    }
}
