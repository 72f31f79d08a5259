//! Client profile storage: balance, routing identity and delivery settings.
//!
//! Balance writes do not live here; see [`crate::ledger`], which keeps the
//! balance and the credit ledger in step.

use sqlx::SqlitePool;

use crate::error::{DatabaseError, Result};
use crate::models::{ClientProfile, DeliveryMode};

const PROFILE_COLUMNS: &str = r#"
    tenant_id, credit_units, currency, custom_markup, assigned_numbers, rate_limit,
    business_name, delivery_mode, webhook_url, webhook_secret, created_at, updated_at
"#;

/// Optional profile fields editable by staff.
///
/// `None` leaves a field unchanged; `Some(None)` clears a nullable one.
#[derive(Debug, Clone, Default)]
pub struct ProfileUpdate {
    pub business_name: Option<Option<String>>,
    pub assigned_numbers: Option<Vec<String>>,
    pub currency: Option<String>,
    pub custom_markup: Option<Option<String>>,
    pub rate_limit: Option<i64>,
}

impl ProfileUpdate {
    pub fn is_empty(&self) -> bool {
        self.business_name.is_none()
            && self.assigned_numbers.is_none()
            && self.currency.is_none()
            && self.custom_markup.is_none()
            && self.rate_limit.is_none()
    }
}

/// Get a tenant's profile.
pub async fn get_profile(pool: &SqlitePool, tenant_id: &str) -> Result<ClientProfile> {
    find_profile(pool, tenant_id)
        .await?
        .ok_or_else(|| DatabaseError::NotFound {
            entity: "ClientProfile",
            id: tenant_id.to_string(),
        })
}

/// Get a tenant's profile, if one exists.
pub async fn find_profile(pool: &SqlitePool, tenant_id: &str) -> Result<Option<ClientProfile>> {
    let profile = sqlx::query_as::<_, ClientProfile>(&format!(
        "SELECT {PROFILE_COLUMNS} FROM client_profiles WHERE tenant_id = ?"
    ))
    .bind(tenant_id)
    .fetch_optional(pool)
    .await?;

    Ok(profile)
}

/// Restricts a profile query to tenants that are still active.
const ACTIVE_TENANT: &str =
    "EXISTS (SELECT 1 FROM tenants WHERE tenants.id = client_profiles.tenant_id AND tenants.is_active = 1)";

/// Find the active tenant profile whose business name matches exactly.
pub async fn find_by_business_name(pool: &SqlitePool, business_name: &str) -> Result<Option<ClientProfile>> {
    let profile = sqlx::query_as::<_, ClientProfile>(&format!(
        "SELECT {PROFILE_COLUMNS} FROM client_profiles WHERE business_name = ? AND {ACTIVE_TENANT}"
    ))
    .bind(business_name)
    .fetch_optional(pool)
    .await?;

    Ok(profile)
}

/// Find the active tenant profile that lists `number` among its assigned numbers.
///
/// When several profiles claim the same number the oldest wins, so the result
/// is stable.
pub async fn find_by_assigned_number(pool: &SqlitePool, number: &str) -> Result<Option<ClientProfile>> {
    let profile = sqlx::query_as::<_, ClientProfile>(&format!(
        r#"
        SELECT {PROFILE_COLUMNS}
        FROM client_profiles
        WHERE EXISTS (
            SELECT 1 FROM json_each(client_profiles.assigned_numbers)
            WHERE json_each.value = ?
        )
          AND {ACTIVE_TENANT}
        ORDER BY created_at, tenant_id
        LIMIT 1
        "#
    ))
    .bind(number)
    .fetch_optional(pool)
    .await?;

    Ok(profile)
}

/// Set or clear the business name used as a routing key.
pub async fn set_business_name(pool: &SqlitePool, tenant_id: &str, business_name: Option<&str>) -> Result<()> {
    let result = sqlx::query(
        r#"
        UPDATE client_profiles
        SET business_name = ?, updated_at = datetime('now')
        WHERE tenant_id = ?
        "#,
    )
    .bind(business_name)
    .bind(tenant_id)
    .execute(pool)
    .await
    .map_err(|e| DatabaseError::from_insert(e, "BusinessName", business_name.unwrap_or_default()))?;

    ensure_updated(result.rows_affected(), tenant_id)
}

/// Replace the assigned phone numbers.
pub async fn set_assigned_numbers(pool: &SqlitePool, tenant_id: &str, numbers: &[String]) -> Result<()> {
    let encoded = serde_json::to_string(numbers)?;
    let result = sqlx::query(
        r#"
        UPDATE client_profiles
        SET assigned_numbers = ?, updated_at = datetime('now')
        WHERE tenant_id = ?
        "#,
    )
    .bind(encoded)
    .bind(tenant_id)
    .execute(pool)
    .await?;

    ensure_updated(result.rows_affected(), tenant_id)
}

/// Configure how inbound messages reach the tenant.
pub async fn set_delivery(
    pool: &SqlitePool,
    tenant_id: &str,
    mode: DeliveryMode,
    webhook_url: Option<&str>,
    webhook_secret: Option<&str>,
) -> Result<()> {
    let result = sqlx::query(
        r#"
        UPDATE client_profiles
        SET delivery_mode = ?, webhook_url = ?, webhook_secret = ?, updated_at = datetime('now')
        WHERE tenant_id = ?
        "#,
    )
    .bind(mode)
    .bind(webhook_url)
    .bind(webhook_secret)
    .bind(tenant_id)
    .execute(pool)
    .await?;

    ensure_updated(result.rows_affected(), tenant_id)
}

/// Apply a partial update of staff-editable fields.
pub async fn update_profile(pool: &SqlitePool, tenant_id: &str, update: &ProfileUpdate) -> Result<()> {
    let mut conn = pool.acquire().await?;
    apply_update(&mut conn, tenant_id, update).await
}

/// Apply a partial update as one statement on an open connection or transaction.
pub(crate) async fn apply_update(
    conn: &mut sqlx::SqliteConnection,
    tenant_id: &str,
    update: &ProfileUpdate,
) -> Result<()> {
    let assigned_numbers = update
        .assigned_numbers
        .as_ref()
        .map(serde_json::to_string)
        .transpose()?;
    let business_name = update.business_name.clone().flatten();

    let result = sqlx::query(
        r#"
        UPDATE client_profiles
        SET business_name = CASE WHEN ?1 THEN ?2 ELSE business_name END,
            assigned_numbers = COALESCE(?3, assigned_numbers),
            currency = COALESCE(?4, currency),
            custom_markup = CASE WHEN ?5 THEN ?6 ELSE custom_markup END,
            rate_limit = COALESCE(?7, rate_limit),
            updated_at = datetime('now')
        WHERE tenant_id = ?8
        "#,
    )
    .bind(update.business_name.is_some())
    .bind(business_name.clone())
    .bind(assigned_numbers)
    .bind(&update.currency)
    .bind(update.custom_markup.is_some())
    .bind(update.custom_markup.clone().flatten())
    .bind(update.rate_limit)
    .bind(tenant_id)
    .execute(conn)
    .await
    .map_err(|e| DatabaseError::from_insert(e, "BusinessName", business_name.unwrap_or_default()))?;

    ensure_updated(result.rows_affected(), tenant_id)
}

/// Clear the routing identity of a profile being disabled.
pub(crate) async fn clear_routing_identity(
    conn: &mut sqlx::SqliteConnection,
    tenant_id: &str,
) -> Result<()> {
    sqlx::query(
        r#"
        UPDATE client_profiles
        SET business_name = NULL, assigned_numbers = '[]', delivery_mode = 'poll',
            webhook_url = NULL, webhook_secret = NULL, updated_at = datetime('now')
        WHERE tenant_id = ?
        "#,
    )
    .bind(tenant_id)
    .execute(conn)
    .await?;

    Ok(())
}

fn ensure_updated(rows: u64, tenant_id: &str) -> Result<()> {
    if rows == 0 {
        return Err(DatabaseError::NotFound {
            entity: "ClientProfile",
            id: tenant_id.to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Role;
    use crate::tenant::create_tenant;
    use crate::test_support::test_db;

    #[tokio::test]
    async fn test_routing_lookups() {
        let db = test_db().await;
        let pool = db.pool();

        let a = create_tenant(pool, "a@example.com", "A", Role::Client, None).await.unwrap();
        let b = create_tenant(pool, "b@example.com", "B", Role::Client, None).await.unwrap();

        set_business_name(pool, &a.id, Some("IBS_7")).await.unwrap();
        set_assigned_numbers(pool, &b.id, &["+15550001111".to_string()]).await.unwrap();

        let by_name = find_by_business_name(pool, "IBS_7").await.unwrap().unwrap();
        assert_eq!(by_name.tenant_id, a.id);

        let by_number = find_by_assigned_number(pool, "+15550001111").await.unwrap().unwrap();
        assert_eq!(by_number.tenant_id, b.id);
        assert_eq!(by_number.assigned_numbers(), vec!["+15550001111".to_string()]);

        assert!(find_by_assigned_number(pool, "+15559999999").await.unwrap().is_none());

        let update = crate::tenant::TenantUpdate {
            is_active: Some(false),
            ..Default::default()
        };
        crate::tenant::update_tenant(pool, &a.id, &update).await.unwrap();
        crate::tenant::update_tenant(pool, &b.id, &update).await.unwrap();
        assert!(find_by_business_name(pool, "IBS_7").await.unwrap().is_none());
        assert!(find_by_assigned_number(pool, "+15550001111").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_business_name_is_unique() {
        let db = test_db().await;
        let pool = db.pool();

        let a = create_tenant(pool, "a@example.com", "A", Role::Client, None).await.unwrap();
        let b = create_tenant(pool, "b@example.com", "B", Role::Client, None).await.unwrap();

        set_business_name(pool, &a.id, Some("Acme")).await.unwrap();
        let clash = set_business_name(pool, &b.id, Some("Acme")).await;
        assert!(matches!(clash, Err(DatabaseError::AlreadyExists { .. })));
    }

    #[tokio::test]
    async fn test_delivery_and_partial_update() {
        let db = test_db().await;
        let pool = db.pool();
        let a = create_tenant(pool, "a@example.com", "A", Role::Client, None).await.unwrap();

        set_delivery(pool, &a.id, DeliveryMode::Both, Some("https://hooks.example.com/sms"), Some("s3cret"))
            .await
            .unwrap();
        update_profile(
            pool,
            &a.id,
            &ProfileUpdate {
                rate_limit: Some(10),
                ..Default::default()
            },
        )
        .await
        .unwrap();

        let profile = get_profile(pool, &a.id).await.unwrap();
        assert_eq!(profile.delivery_mode, DeliveryMode::Both);
        assert_eq!(profile.webhook_secret.as_deref(), Some("s3cret"));
        assert_eq!(profile.rate_limit, 10);
        assert_eq!(profile.currency, "USD");
    }

    #[tokio::test]
    async fn test_failed_update_changes_nothing() {
        let db = test_db().await;
        let pool = db.pool();
        let a = create_tenant(pool, "a@example.com", "A", Role::Client, None).await.unwrap();
        let b = create_tenant(pool, "b@example.com", "B", Role::Client, None).await.unwrap();
        set_business_name(pool, &a.id, Some("Acme")).await.unwrap();

        let clash = update_profile(
            pool,
            &b.id,
            &ProfileUpdate {
                business_name: Some(Some("Acme".to_string())),
                currency: Some("EUR".to_string()),
                ..Default::default()
            },
        )
        .await;
        assert!(matches!(clash, Err(DatabaseError::AlreadyExists { .. })));

        let profile = get_profile(pool, &b.id).await.unwrap();
        assert_eq!(profile.currency, "USD");
        assert!(profile.business_name.is_none());

        update_profile(
            pool,
            &a.id,
            &ProfileUpdate {
                business_name: Some(None),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert!(get_profile(pool, &a.id).await.unwrap().business_name.is_none());
    }
}
