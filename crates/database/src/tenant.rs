//! Tenant CRUD operations.

use sqlx::SqlitePool;

use crate::client_profile::{self, ProfileUpdate};
use crate::error::{DatabaseError, Result};
use crate::ledger;
use crate::models::{Role, Tenant, TransactionKind};

const TENANT_COLUMNS: &str = "id, email, name, role, group_id, is_active, created_at";

/// A tenant to create together with its profile identity and opening balance.
#[derive(Debug, Clone, Copy)]
pub struct NewTenant<'a> {
    pub email: &'a str,
    pub name: &'a str,
    pub role: Role,
    pub group_id: Option<&'a str>,
    pub business_name: Option<&'a str>,
    pub assigned_numbers: &'a [String],
    /// Opening balance in credit units, recorded as `admin_credit_add`.
    pub initial_units: i64,
}

impl<'a> NewTenant<'a> {
    pub fn new(email: &'a str, name: &'a str, role: Role) -> Self {
        Self {
            email,
            name,
            role,
            group_id: None,
            business_name: None,
            assigned_numbers: &[],
            initial_units: 0,
        }
    }
}

/// Create a tenant together with its zero-balance client profile.
pub async fn create_tenant(
    pool: &SqlitePool,
    email: &str,
    name: &str,
    role: Role,
    group_id: Option<&str>,
) -> Result<Tenant> {
    create_tenant_with_profile(
        pool,
        &NewTenant {
            group_id,
            ..NewTenant::new(email, name, role)
        },
    )
    .await
}

/// Create a tenant, its profile and its opening credit in one transaction.
///
/// A duplicate email or business name fails with `AlreadyExists` and
/// leaves nothing behind.
pub async fn create_tenant_with_profile(pool: &SqlitePool, new: &NewTenant<'_>) -> Result<Tenant> {
    if new.initial_units < 0 {
        return Err(DatabaseError::InvalidAmount("initial credit cannot be negative".to_string()));
    }
    let id = uuid::Uuid::new_v4().to_string();
    let mut tx = pool.begin().await?;

    sqlx::query(
        r#"
        INSERT INTO tenants (id, email, name, role, group_id)
        VALUES (?, ?, ?, ?, ?)
        "#,
    )
    .bind(&id)
    .bind(new.email)
    .bind(new.name)
    .bind(new.role)
    .bind(new.group_id)
    .execute(&mut *tx)
    .await
    .map_err(|e| DatabaseError::from_insert(e, "Tenant", new.email))?;

    sqlx::query(
        r#"
        INSERT INTO client_profiles (tenant_id, business_name, assigned_numbers)
        VALUES (?, ?, ?)
        "#,
    )
    .bind(&id)
    .bind(new.business_name)
    .bind(serde_json::to_string(new.assigned_numbers)?)
    .execute(&mut *tx)
    .await
    .map_err(|e| DatabaseError::from_insert(e, "BusinessName", new.business_name.unwrap_or_default()))?;

    if new.initial_units > 0 {
        ledger::adjust_in(
            &mut tx,
            &id,
            new.initial_units,
            TransactionKind::AdminCreditAdd,
            "Initial credits",
        )
        .await?;
    }

    let tenant = sqlx::query_as::<_, Tenant>(&format!(
        "SELECT {TENANT_COLUMNS} FROM tenants WHERE id = ?"
    ))
    .bind(&id)
    .fetch_one(&mut *tx)
    .await?;

    tx.commit().await?;

    tracing::info!(tenant_id = %tenant.id, role = tenant.role.as_str(), "Tenant created");
    Ok(tenant)
}

/// Get a tenant by ID.
pub async fn get_tenant(pool: &SqlitePool, id: &str) -> Result<Tenant> {
    find_tenant(pool, id).await?.ok_or_else(|| DatabaseError::NotFound {
        entity: "Tenant",
        id: id.to_string(),
    })
}

/// Get a tenant by ID, if it exists.
pub async fn find_tenant(pool: &SqlitePool, id: &str) -> Result<Option<Tenant>> {
    let tenant = sqlx::query_as::<_, Tenant>(&format!(
        "SELECT {TENANT_COLUMNS} FROM tenants WHERE id = ?"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?;

    Ok(tenant)
}

/// List tenants, optionally restricted to one group.
pub async fn list_tenants(pool: &SqlitePool, group_id: Option<&str>) -> Result<Vec<Tenant>> {
    let tenants = sqlx::query_as::<_, Tenant>(&format!(
        r#"
        SELECT {TENANT_COLUMNS}
        FROM tenants
        WHERE (?1 IS NULL OR group_id = ?1)
        ORDER BY created_at, id
        "#
    ))
    .bind(group_id)
    .fetch_all(pool)
    .await?;

    Ok(tenants)
}

/// Staff edits to a tenant and its profile. `None` leaves a field unchanged.
#[derive(Debug, Clone, Default)]
pub struct TenantUpdate {
    pub role: Option<Role>,
    /// `Some(None)` moves the tenant out of any group.
    pub group_id: Option<Option<String>>,
    pub is_active: Option<bool>,
    pub profile: ProfileUpdate,
}

/// Apply a [`TenantUpdate`] atomically: either every field changes or none does.
pub async fn update_tenant(pool: &SqlitePool, id: &str, update: &TenantUpdate) -> Result<Tenant> {
    let mut tx = pool.begin().await?;

    let result = sqlx::query(
        r#"
        UPDATE tenants
        SET role = COALESCE(?1, role),
            group_id = CASE WHEN ?2 THEN ?3 ELSE group_id END,
            is_active = COALESCE(?4, is_active)
        WHERE id = ?5
        "#,
    )
    .bind(update.role)
    .bind(update.group_id.is_some())
    .bind(update.group_id.clone().flatten())
    .bind(update.is_active)
    .bind(id)
    .execute(&mut *tx)
    .await?;
    ensure_updated(result.rows_affected(), id)?;

    if !update.profile.is_empty() {
        client_profile::apply_update(&mut tx, id, &update.profile).await?;
    }

    let tenant = sqlx::query_as::<_, Tenant>(&format!(
        "SELECT {TENANT_COLUMNS} FROM tenants WHERE id = ?"
    ))
    .bind(id)
    .fetch_one(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(tenant)
}

fn ensure_updated(rows: u64, id: &str) -> Result<()> {
    if rows == 0 {
        return Err(DatabaseError::NotFound {
            entity: "Tenant",
            id: id.to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::test_db;

    #[tokio::test]
    async fn test_group_listing_and_updates() {
        let db = test_db().await;
        let pool = db.pool();

        let a = create_tenant(pool, "a@example.com", "A", Role::Client, Some("g1")).await.unwrap();
        let _b = create_tenant(pool, "b@example.com", "B", Role::Client, Some("g2")).await.unwrap();

        assert_eq!(list_tenants(pool, None).await.unwrap().len(), 2);
        let g1 = list_tenants(pool, Some("g1")).await.unwrap();
        assert_eq!(g1.len(), 1);
        assert_eq!(g1[0].id, a.id);

        update_tenant(
            pool,
            &a.id,
            &TenantUpdate {
                role: Some(Role::Supervisor),
                group_id: Some(None),
                is_active: Some(false),
                ..Default::default()
            },
        )
        .await
        .unwrap();

        let a = get_tenant(pool, &a.id).await.unwrap();
        assert_eq!(a.role, Role::Supervisor);
        assert!(a.group_id.is_none());
        assert!(!a.is_active);

        let missing = update_tenant(
            pool,
            "nope",
            &TenantUpdate {
                role: Some(Role::Admin),
                ..Default::default()
            },
        )
        .await;
        assert!(matches!(missing, Err(DatabaseError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_create_with_profile_is_atomic() {
        let db = test_db().await;
        let pool = db.pool();
        let numbers = vec!["+15550001111".to_string()];

        let first = create_tenant_with_profile(
            pool,
            &NewTenant {
                business_name: Some("IBS_7"),
                assigned_numbers: &numbers,
                initial_units: 500,
                ..NewTenant::new("one@example.com", "One", Role::Client)
            },
        )
        .await
        .unwrap();
        let profile = client_profile::get_profile(pool, &first.id).await.unwrap();
        assert_eq!(profile.credit_units, 500);
        assert_eq!(profile.business_name.as_deref(), Some("IBS_7"));
        assert_eq!(profile.assigned_numbers(), numbers);
        let entries = crate::credit_transaction::list_for_tenant(pool, &first.id).await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].kind, TransactionKind::AdminCreditAdd);

        let clash = create_tenant_with_profile(
            pool,
            &NewTenant {
                business_name: Some("IBS_7"),
                initial_units: 100,
                ..NewTenant::new("two@example.com", "Two", Role::Client)
            },
        )
        .await;
        assert!(matches!(clash, Err(DatabaseError::AlreadyExists { entity: "BusinessName", .. })));
        assert_eq!(list_tenants(pool, None).await.unwrap().len(), 1);

        let retry = create_tenant_with_profile(
            pool,
            &NewTenant {
                business_name: Some("IBS_8"),
                ..NewTenant::new("two@example.com", "Two", Role::Client)
            },
        )
        .await
        .unwrap();
        assert_eq!(retry.email, "two@example.com");
    }

    #[tokio::test]
    async fn test_failed_update_leaves_tenant_untouched() {
        let db = test_db().await;
        let pool = db.pool();
        let _a = create_tenant_with_profile(
            pool,
            &NewTenant {
                business_name: Some("Acme"),
                ..NewTenant::new("a@example.com", "A", Role::Client)
            },
        )
        .await
        .unwrap();
        let b = create_tenant(pool, "b@example.com", "B", Role::Client, None).await.unwrap();

        let clash = update_tenant(
            pool,
            &b.id,
            &TenantUpdate {
                role: Some(Role::Supervisor),
                profile: ProfileUpdate {
                    business_name: Some(Some("Acme".to_string())),
                    ..Default::default()
                },
                ..Default::default()
            },
        )
        .await;
        assert!(matches!(clash, Err(DatabaseError::AlreadyExists { .. })));
        assert_eq!(get_tenant(pool, &b.id).await.unwrap().role, Role::Client);
    }
}
