//! Typed view over the well-known configuration keys.
//!
//! Known keys are validated when loaded and when written through
//! [`validate_entry`]; everything else is a dynamic key built by the helpers
//! in [`keys`].

use std::collections::HashMap;

use rust_decimal::Decimal;
use serde::Serialize;
use sqlx::SqlitePool;

use crate::error::{DatabaseError, Result};
use crate::system_config;

/// Batch size used when no limit is configured.
pub const DEFAULT_MAX_BATCH_SIZE: usize = 500;

/// Configuration key names.
pub mod keys {
    pub const EXTREME_COST_PER_SMS: &str = "extreme_cost_per_sms";
    pub const CLIENT_RATE_PER_SMS: &str = "client_rate_per_sms";
    pub const PROVIDER_API_KEY: &str = "provider.api_key";
    pub const ADMIN_DEFAULT_BUSINESS_ID: &str = "admin_default_business_id";
    pub const ROUTING_ALIASES: &str = "routing.aliases";
    pub const MAX_BATCH_SIZE: &str = "limits.max_batch_size";
    pub const ADMIN_POOL: &str = "admin.pool";

    pub fn group_extreme_cost(group_id: &str) -> String {
        format!("pricing.group.{group_id}.extreme_cost")
    }

    pub fn group_client_rate(group_id: &str) -> String {
        format!("pricing.group.{group_id}.client_rate")
    }

    pub fn group_pool(group_id: &str) -> String {
        format!("group.pool.{group_id}")
    }

    pub fn favorites(tenant_id: &str) -> String {
        format!("favorites.{tenant_id}")
    }

    pub fn tenant_max_batch_size(tenant_id: &str) -> String {
        format!("limits.tenant.{tenant_id}.max_batch_size")
    }
}

/// Platform-wide settings read from the configuration table.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PlatformSettings {
    pub extreme_cost_per_sms: Option<Decimal>,
    pub client_rate_per_sms: Option<Decimal>,
    #[serde(skip_serializing)]
    pub provider_api_key: Option<String>,
    pub admin_default_business_id: Option<String>,
    /// Receiver number → canonical receiver used for assigned-number routing.
    pub routing_aliases: HashMap<String, String>,
    pub max_batch_size: usize,
}

impl PlatformSettings {
    /// Load and validate every known key.
    pub async fn load(pool: &SqlitePool) -> Result<Self> {
        let extreme_cost_per_sms = load_parsed(pool, keys::EXTREME_COST_PER_SMS, parse_rate).await?;
        let client_rate_per_sms = load_parsed(pool, keys::CLIENT_RATE_PER_SMS, parse_rate).await?;
        let routing_aliases = load_parsed(pool, keys::ROUTING_ALIASES, parse_aliases)
            .await?
            .unwrap_or_default();
        let max_batch_size = load_parsed(pool, keys::MAX_BATCH_SIZE, parse_batch_size)
            .await?
            .unwrap_or(DEFAULT_MAX_BATCH_SIZE);

        let provider_api_key = non_empty(system_config::get(pool, keys::PROVIDER_API_KEY).await?);
        let admin_default_business_id =
            non_empty(system_config::get(pool, keys::ADMIN_DEFAULT_BUSINESS_ID).await?);

        Ok(Self {
            extreme_cost_per_sms,
            client_rate_per_sms,
            provider_api_key,
            admin_default_business_id,
            routing_aliases,
            max_batch_size,
        })
    }

    /// Rewrite a receiver number through the alias table.
    pub fn resolve_alias<'a>(&'a self, receiver: &'a str) -> &'a str {
        self.routing_aliases
            .get(receiver)
            .map(String::as_str)
            .unwrap_or(receiver)
    }

    /// Batch limit for a tenant: per-tenant override, else the global limit.
    pub async fn max_batch_for(&self, pool: &SqlitePool, tenant_id: &str) -> Result<usize> {
        let key = keys::tenant_max_batch_size(tenant_id);
        Ok(load_parsed(pool, &key, parse_batch_size)
            .await?
            .unwrap_or(self.max_batch_size))
    }
}

/// Check a value before it is written under `key`.
///
/// Known keys and dynamic pricing/limit keys are validated; other keys are
/// accepted as-is.
pub fn validate_entry(key: &str, value: &str) -> Result<()> {
    let check = match key {
        keys::EXTREME_COST_PER_SMS | keys::CLIENT_RATE_PER_SMS => parse_rate(value).map(|_| ()),
        keys::ROUTING_ALIASES => parse_aliases(value).map(|_| ()),
        keys::MAX_BATCH_SIZE => parse_batch_size(value).map(|_| ()),
        k if k.starts_with("pricing.group.") => parse_rate(value).map(|_| ()),
        k if k.starts_with("limits.tenant.") => parse_batch_size(value).map(|_| ()),
        _ => Ok(()),
    };

    check.map_err(|reason| DatabaseError::InvalidSetting {
        key: key.to_string(),
        reason,
    })
}

/// Phone numbers a tenant has starred in the inbox.
pub async fn favorites(pool: &SqlitePool, tenant_id: &str) -> Result<Vec<String>> {
    let raw = system_config::get(pool, &keys::favorites(tenant_id)).await?;
    Ok(raw
        .and_then(|raw| serde_json::from_str(&raw).ok())
        .unwrap_or_default())
}

/// Star or unstar a phone number. Returns whether it is now a favorite.
pub async fn toggle_favorite(pool: &SqlitePool, tenant_id: &str, phone: &str) -> Result<bool> {
    let mut current = favorites(pool, tenant_id).await?;
    let now_favorite = if let Some(pos) = current.iter().position(|p| p == phone) {
        current.remove(pos);
        false
    } else {
        current.push(phone.to_string());
        true
    };

    system_config::set(pool, &keys::favorites(tenant_id), &serde_json::to_string(&current)?).await?;
    Ok(now_favorite)
}

async fn load_parsed<T>(
    pool: &SqlitePool,
    key: &str,
    parse: fn(&str) -> std::result::Result<T, String>,
) -> Result<Option<T>> {
    match system_config::get(pool, key).await? {
        None => Ok(None),
        Some(raw) if raw.trim().is_empty() => Ok(None),
        Some(raw) => parse(&raw).map(Some).map_err(|reason| DatabaseError::InvalidSetting {
            key: key.to_string(),
            reason,
        }),
    }
}

fn parse_rate(raw: &str) -> std::result::Result<Decimal, String> {
    let rate = raw
        .trim()
        .parse::<Decimal>()
        .map_err(|_| format!("{raw:?} is not a number"))?;
    if rate.is_sign_negative() {
        return Err(format!("{raw:?} is negative"));
    }
    Ok(rate)
}

fn parse_aliases(raw: &str) -> std::result::Result<HashMap<String, String>, String> {
    serde_json::from_str(raw).map_err(|e| format!("expected a JSON object of strings: {e}"))
}

fn parse_batch_size(raw: &str) -> std::result::Result<usize, String> {
    match raw.trim().parse::<usize>() {
        Ok(0) | Err(_) => Err(format!("{raw:?} is not a positive integer")),
        Ok(n) => Ok(n),
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::test_db;
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn test_defaults_when_unset() {
        let db = test_db().await;
        let settings = PlatformSettings::load(db.pool()).await.unwrap();

        assert!(settings.client_rate_per_sms.is_none());
        assert!(settings.routing_aliases.is_empty());
        assert_eq!(settings.max_batch_size, DEFAULT_MAX_BATCH_SIZE);
        assert_eq!(settings.resolve_alias("+15550001111"), "+15550001111");
    }

    #[tokio::test]
    async fn test_load_typed_values() {
        let db = test_db().await;
        let pool = db.pool();
        system_config::set(pool, keys::CLIENT_RATE_PER_SMS, "0.90").await.unwrap();
        system_config::set(pool, keys::ROUTING_ALIASES, r#"{"+15550001111":"+15550002222"}"#)
            .await
            .unwrap();
        system_config::set(pool, keys::MAX_BATCH_SIZE, "100").await.unwrap();
        system_config::set(pool, &keys::tenant_max_batch_size("t1"), "10").await.unwrap();

        let settings = PlatformSettings::load(pool).await.unwrap();
        assert_eq!(settings.client_rate_per_sms, Some(dec!(0.90)));
        assert_eq!(settings.resolve_alias("+15550001111"), "+15550002222");
        assert_eq!(settings.max_batch_for(pool, "t1").await.unwrap(), 10);
        assert_eq!(settings.max_batch_for(pool, "t2").await.unwrap(), 100);
    }

    #[tokio::test]
    async fn test_invalid_stored_value_fails_load() {
        let db = test_db().await;
        system_config::set(db.pool(), keys::ROUTING_ALIASES, "[1,2]").await.unwrap();

        let err = PlatformSettings::load(db.pool()).await.unwrap_err();
        assert!(matches!(err, DatabaseError::InvalidSetting { ref key, .. } if key == keys::ROUTING_ALIASES));
    }

    #[test]
    fn test_validate_entry() {
        assert!(validate_entry(keys::CLIENT_RATE_PER_SMS, "1.25").is_ok());
        assert!(validate_entry(keys::CLIENT_RATE_PER_SMS, "-1").is_err());
        assert!(validate_entry("pricing.group.g1.extreme_cost", "abc").is_err());
        assert!(validate_entry(keys::MAX_BATCH_SIZE, "0").is_err());
        assert!(validate_entry("limits.tenant.t1.max_batch_size", "25").is_ok());
        assert!(validate_entry("anything.else", "free text").is_ok());
    }

    #[tokio::test]
    async fn test_toggle_favorite() {
        let db = test_db().await;

        assert!(toggle_favorite(db.pool(), "t1", "+14155551234").await.unwrap());
        assert_eq!(favorites(db.pool(), "t1").await.unwrap(), vec!["+14155551234"]);
        assert!(!toggle_favorite(db.pool(), "t1", "+14155551234").await.unwrap());
        assert!(favorites(db.pool(), "t1").await.unwrap().is_empty());
    }
}
