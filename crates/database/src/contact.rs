//! Contacts and contact groups.

use sqlx::SqlitePool;

use crate::error::{DatabaseError, Result};
use crate::models::{Contact, ContactGroup, ContactSource};

/// Insert a contact or refresh its name, keyed on (tenant, phone).
///
/// An existing name is kept when `name` is `None`.
pub async fn upsert_contact(
    pool: &SqlitePool,
    tenant_id: &str,
    phone: &str,
    name: Option<&str>,
    source: ContactSource,
) -> Result<Contact> {
    let contact = sqlx::query_as::<_, Contact>(
        r#"
        INSERT INTO contacts (tenant_id, phone, name, source)
        VALUES (?, ?, ?, ?)
        ON CONFLICT(tenant_id, phone) DO UPDATE SET
            name = COALESCE(excluded.name, contacts.name)
        RETURNING id, tenant_id, phone, name, source, created_at
        "#,
    )
    .bind(tenant_id)
    .bind(phone)
    .bind(name)
    .bind(source)
    .fetch_one(pool)
    .await?;

    Ok(contact)
}

/// List a tenant's contacts by phone number.
pub async fn list_contacts(pool: &SqlitePool, tenant_id: &str) -> Result<Vec<Contact>> {
    let contacts = sqlx::query_as::<_, Contact>(
        r#"
        SELECT id, tenant_id, phone, name, source, created_at
        FROM contacts
        WHERE tenant_id = ?
        ORDER BY phone
        "#,
    )
    .bind(tenant_id)
    .fetch_all(pool)
    .await?;

    Ok(contacts)
}

/// Delete one of a tenant's contacts.
pub async fn delete_contact(pool: &SqlitePool, tenant_id: &str, id: i64) -> Result<()> {
    let result = sqlx::query("DELETE FROM contacts WHERE id = ? AND tenant_id = ?")
        .bind(id)
        .bind(tenant_id)
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(DatabaseError::NotFound {
            entity: "Contact",
            id: id.to_string(),
        });
    }
    Ok(())
}

/// Create a contact group.
pub async fn create_group(pool: &SqlitePool, tenant_id: &str, name: &str) -> Result<ContactGroup> {
    sqlx::query_as::<_, ContactGroup>(
        r#"
        INSERT INTO contact_groups (tenant_id, name)
        VALUES (?, ?)
        RETURNING id, tenant_id, name, created_at
        "#,
    )
    .bind(tenant_id)
    .bind(name)
    .fetch_one(pool)
    .await
    .map_err(|e| DatabaseError::from_insert(e, "ContactGroup", name))
}

/// List a tenant's contact groups with member counts.
pub async fn list_groups(pool: &SqlitePool, tenant_id: &str) -> Result<Vec<(ContactGroup, i64)>> {
    let rows = sqlx::query_as::<_, (i64, String, String, String, i64)>(
        r#"
        SELECT g.id, g.tenant_id, g.name, g.created_at, COUNT(m.contact_id)
        FROM contact_groups g
        LEFT JOIN contact_group_members m ON m.group_id = g.id
        WHERE g.tenant_id = ?
        GROUP BY g.id
        ORDER BY g.name
        "#,
    )
    .bind(tenant_id)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|(id, tenant_id, name, created_at, members)| {
            (
                ContactGroup {
                    id,
                    tenant_id,
                    name,
                    created_at,
                },
                members,
            )
        })
        .collect())
}

/// Add contacts to a group. Both must belong to the tenant.
///
/// Returns how many memberships were newly created.
pub async fn add_members(pool: &SqlitePool, tenant_id: &str, group_id: i64, contact_ids: &[i64]) -> Result<u64> {
    let owned = sqlx::query_scalar::<_, i64>("SELECT 1 FROM contact_groups WHERE id = ? AND tenant_id = ?")
        .bind(group_id)
        .bind(tenant_id)
        .fetch_optional(pool)
        .await?;
    if owned.is_none() {
        return Err(DatabaseError::NotFound {
            entity: "ContactGroup",
            id: group_id.to_string(),
        });
    }

    let mut tx = pool.begin().await?;
    let mut added = 0;
    for contact_id in contact_ids {
        let result = sqlx::query(
            r#"
            INSERT OR IGNORE INTO contact_group_members (group_id, contact_id)
            SELECT ?, id FROM contacts WHERE id = ? AND tenant_id = ?
            "#,
        )
        .bind(group_id)
        .bind(contact_id)
        .bind(tenant_id)
        .execute(&mut *tx)
        .await?;
        added += result.rows_affected();
    }
    tx.commit().await?;

    Ok(added)
}

/// Phone numbers of every contact in a group.
pub async fn group_phones(pool: &SqlitePool, tenant_id: &str, group_id: i64) -> Result<Vec<String>> {
    let phones = sqlx::query_scalar::<_, String>(
        r#"
        SELECT c.phone
        FROM contact_group_members m
        JOIN contacts c ON c.id = m.contact_id
        JOIN contact_groups g ON g.id = m.group_id
        WHERE m.group_id = ? AND g.tenant_id = ?
        ORDER BY c.phone
        "#,
    )
    .bind(group_id)
    .bind(tenant_id)
    .fetch_all(pool)
    .await?;

    Ok(phones)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{funded_tenant, test_db};

    #[tokio::test]
    async fn test_upsert_keeps_existing_name() {
        let db = test_db().await;
        let tenant = funded_tenant(&db, "a@example.com", 0).await;

        let first = upsert_contact(db.pool(), &tenant.id, "+14155551234", Some("Ann"), ContactSource::Manual)
            .await
            .unwrap();
        let second = upsert_contact(db.pool(), &tenant.id, "+14155551234", None, ContactSource::Inbound)
            .await
            .unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(second.name.as_deref(), Some("Ann"));
        assert_eq!(second.source, ContactSource::Manual);
        assert_eq!(list_contacts(db.pool(), &tenant.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_groups_only_accept_own_contacts() {
        let db = test_db().await;
        let a = funded_tenant(&db, "a@example.com", 0).await;
        let b = funded_tenant(&db, "b@example.com", 0).await;

        let mine = upsert_contact(db.pool(), &a.id, "+14155551234", None, ContactSource::Manual).await.unwrap();
        let theirs = upsert_contact(db.pool(), &b.id, "+14155550000", None, ContactSource::Manual).await.unwrap();

        let group = create_group(db.pool(), &a.id, "VIP").await.unwrap();
        let added = add_members(db.pool(), &a.id, group.id, &[mine.id, theirs.id, mine.id]).await.unwrap();
        assert_eq!(added, 1);

        assert_eq!(group_phones(db.pool(), &a.id, group.id).await.unwrap(), vec!["+14155551234"]);
        let groups = list_groups(db.pool(), &a.id).await.unwrap();
        assert_eq!(groups[0].1, 1);

        assert!(matches!(
            add_members(db.pool(), &b.id, group.id, &[theirs.id]).await,
            Err(DatabaseError::NotFound { .. })
        ));
        assert!(matches!(
            create_group(db.pool(), &a.id, "VIP").await,
            Err(DatabaseError::AlreadyExists { .. })
        ));
    }
}
