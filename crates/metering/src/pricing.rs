//! Effective per-message cost and charge.
//!
//! Resolution order: both group overrides, then the global keys, then
//! hardcoded defaults. A group with only one override set falls through to
//! the global pair. Pricing is informational; the debit is always one credit
//! per message.

use database::settings::keys;
use database::{system_config, tenant};
use rust_decimal::Decimal;
use serde::Serialize;
use sqlx::SqlitePool;

use crate::Result;

/// Where a resolved price came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PricingSource {
    Group,
    Global,
    Fallback,
}

/// Provider cost and client charge per message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Pricing {
    pub extreme_cost: Decimal,
    pub client_rate: Decimal,
    pub source: PricingSource,
}

impl Pricing {
    /// Hardcoded defaults: cost 0.01, rate 1.00.
    pub fn fallback() -> Self {
        Self {
            extreme_cost: Decimal::new(1, 2),
            client_rate: Decimal::new(100, 2),
            source: PricingSource::Fallback,
        }
    }

    /// Per-message margin shown to operators.
    pub fn margin(&self) -> Decimal {
        self.client_rate - self.extreme_cost
    }
}

/// Resolve pricing for a tenant or group.
///
/// When `group_id` is `None` the tenant's group is used. Unknown tenants and
/// unparsable values resolve as if unset.
pub async fn resolve_pricing(
    pool: &SqlitePool,
    tenant_id: Option<&str>,
    group_id: Option<&str>,
) -> Result<Pricing> {
    let group_id = match (group_id, tenant_id) {
        (Some(gid), _) => Some(gid.to_string()),
        (None, Some(tid)) => tenant::find_tenant(pool, tid).await?.and_then(|t| t.group_id),
        (None, None) => None,
    };

    if let Some(gid) = group_id.as_deref() {
        let cost = read_rate(pool, &keys::group_extreme_cost(gid)).await?;
        let rate = read_rate(pool, &keys::group_client_rate(gid)).await?;
        if let (Some(extreme_cost), Some(client_rate)) = (cost, rate) {
            return Ok(Pricing {
                extreme_cost,
                client_rate,
                source: PricingSource::Group,
            });
        }
    }

    let fallback = Pricing::fallback();
    let cost = read_rate(pool, keys::EXTREME_COST_PER_SMS).await?;
    let rate = read_rate(pool, keys::CLIENT_RATE_PER_SMS).await?;
    if cost.is_none() && rate.is_none() {
        return Ok(fallback);
    }

    Ok(Pricing {
        extreme_cost: cost.unwrap_or(fallback.extreme_cost),
        client_rate: rate.unwrap_or(fallback.client_rate),
        source: PricingSource::Global,
    })
}

async fn read_rate(pool: &SqlitePool, key: &str) -> Result<Option<Decimal>> {
    let raw = system_config::get(pool, key).await?;
    Ok(raw.and_then(|raw| {
        let parsed = raw.trim().parse::<Decimal>().ok();
        if parsed.is_none() {
            tracing::warn!(key, value = %raw, "Ignoring non-numeric pricing value");
        }
        parsed
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::test_db;
    use database::models::Role;
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn test_fallback_when_unconfigured() {
        let db = test_db().await;
        let pricing = resolve_pricing(db.pool(), None, None).await.unwrap();
        assert_eq!(pricing, Pricing::fallback());
        assert_eq!(pricing.margin(), dec!(0.99));
    }

    #[tokio::test]
    async fn test_group_override_needs_both_keys() {
        let db = test_db().await;
        let pool = db.pool();
        system_config::set(pool, keys::EXTREME_COST_PER_SMS, "0.02").await.unwrap();
        system_config::set(pool, keys::CLIENT_RATE_PER_SMS, "0.90").await.unwrap();
        system_config::set(pool, &keys::group_client_rate("g1"), "0.50").await.unwrap();

        let tenant = tenant::create_tenant(pool, "a@example.com", "A", Role::Client, Some("g1"))
            .await
            .unwrap();

        let partial = resolve_pricing(pool, Some(&tenant.id), None).await.unwrap();
        assert_eq!(partial.source, PricingSource::Global);
        assert_eq!(partial.client_rate, dec!(0.90));

        system_config::set(pool, &keys::group_extreme_cost("g1"), "0.03").await.unwrap();
        let full = resolve_pricing(pool, Some(&tenant.id), None).await.unwrap();
        assert_eq!(full.source, PricingSource::Group);
        assert_eq!(full.extreme_cost, dec!(0.03));
        assert_eq!(full.client_rate, dec!(0.50));

        let explicit = resolve_pricing(pool, None, Some("g2")).await.unwrap();
        assert_eq!(explicit.source, PricingSource::Global);
    }

    #[tokio::test]
    async fn test_non_numeric_group_value_falls_through() {
        let db = test_db().await;
        let pool = db.pool();
        system_config::set(pool, &keys::group_extreme_cost("g1"), "cheap").await.unwrap();
        system_config::set(pool, &keys::group_client_rate("g1"), "0.50").await.unwrap();

        let pricing = resolve_pricing(pool, None, Some("g1")).await.unwrap();
        assert_eq!(pricing.source, PricingSource::Fallback);
    }
}
