//! Tenant resolution and persistence for inbound messages.

use database::models::ContactSource;
use database::{
    client_profile, contact, diagnostics, incoming_message, message_log, tenant, ClientProfile,
    IncomingMessage, NewIncomingMessage, PlatformSettings,
};
use serde::Serialize;
use serde_json::Value;
use sqlx::SqlitePool;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::payload::InboundPayload;
use crate::push::{PushClient, PushTarget};

/// Which rule assigned the message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RouteStrategy {
    Business,
    Conversation,
    AssignedNumber,
    Fallback,
    Unassigned,
}

impl RouteStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            RouteStrategy::Business => "business",
            RouteStrategy::Conversation => "conversation",
            RouteStrategy::AssignedNumber => "assigned_number",
            RouteStrategy::Fallback => "fallback",
            RouteStrategy::Unassigned => "unassigned",
        }
    }
}

/// Outcome of tenant resolution, before anything is written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub tenant_id: Option<String>,
    pub strategy: RouteStrategy,
}

impl Resolution {
    fn found(tenant_id: String, strategy: RouteStrategy) -> Self {
        Self {
            tenant_id: Some(tenant_id),
            strategy,
        }
    }
}

/// A persisted inbound message and how it was routed.
#[derive(Debug, Clone)]
pub struct RouteOutcome {
    pub assigned_tenant_id: Option<String>,
    pub message: IncomingMessage,
    pub strategy: RouteStrategy,
    /// Set when the owning tenant wants messages pushed.
    pub push_target: Option<PushTarget>,
}

/// Accepts inbound webhooks.
#[derive(Debug, Clone)]
pub struct InboundRouter {
    dial_prefix: String,
    push: PushClient,
}

impl InboundRouter {
    pub fn new(dial_prefix: impl Into<String>, push: PushClient) -> Self {
        Self {
            dial_prefix: dial_prefix.into(),
            push,
        }
    }

    /// Validate, resolve, persist and push one webhook body.
    ///
    /// Only a malformed payload or a failed insert is an error; a message no
    /// rule claims is stored without a tenant.
    pub async fn route_incoming(
        &self,
        pool: &SqlitePool,
        settings: &PlatformSettings,
        body: &Value,
    ) -> Result<RouteOutcome> {
        let payload = InboundPayload::from_json(body)?;
        let outcome = route_incoming(pool, settings, &payload, body, &self.dial_prefix).await?;

        if let Some(target) = &outcome.push_target {
            self.push.deliver_best_effort(target, &outcome.message).await;
        }

        Ok(outcome)
    }
}

/// Run the resolution chain. First match wins.
///
/// Lookup failures are logged and treated as a miss so the chain always
/// reaches a verdict.
pub async fn resolve_tenant(
    pool: &SqlitePool,
    settings: &PlatformSettings,
    payload: &InboundPayload,
    dial_prefix: &str,
) -> Resolution {
    if let Some(business) = payload.business.as_deref() {
        if let Some(tenant_id) = tenant_by_business_or_id(pool, business).await {
            return Resolution::found(tenant_id, RouteStrategy::Business);
        }
    }

    let sender = phone::normalize(&payload.from, dial_prefix);
    if let Some(sender) = sender.as_deref() {
        match message_log::latest_sender_tenant_for(pool, sender).await {
            Ok(Some(tenant_id)) => return Resolution::found(tenant_id, RouteStrategy::Conversation),
            Ok(None) => {}
            Err(e) => warn!(error = %e, "Conversation lookup failed"),
        }
    }

    for receiver in receiver_candidates(settings, &payload.receiver, dial_prefix) {
        match client_profile::find_by_assigned_number(pool, &receiver).await {
            Ok(Some(profile)) => {
                return Resolution::found(profile.tenant_id, RouteStrategy::AssignedNumber)
            }
            Ok(None) => {}
            Err(e) => warn!(error = %e, receiver = %receiver, "Assigned number lookup failed"),
        }
    }

    if let Some(fallback) = settings.admin_default_business_id.as_deref() {
        if let Some(tenant_id) = tenant_by_business_or_id(pool, fallback).await {
            return Resolution::found(tenant_id, RouteStrategy::Fallback);
        }
        warn!(fallback = %fallback, "Fallback business does not match any tenant");
    }

    Resolution {
        tenant_id: None,
        strategy: RouteStrategy::Unassigned,
    }
}

/// Resolve and persist a parsed payload, then record diagnostics and capture
/// the sender as a contact.
///
/// `raw` is stored as the diagnostics snapshot. Push delivery is left to the
/// caller through [`RouteOutcome::push_target`].
pub async fn route_incoming(
    pool: &SqlitePool,
    settings: &PlatformSettings,
    payload: &InboundPayload,
    raw: &Value,
    dial_prefix: &str,
) -> Result<RouteOutcome> {
    let resolution = resolve_tenant(pool, settings, payload, dial_prefix).await;
    let sender = phone::normalize(&payload.from, dial_prefix);

    let message = incoming_message::insert(
        pool,
        &NewIncomingMessage {
            tenant_id: resolution.tenant_id.clone(),
            from_number: sender.clone().unwrap_or_else(|| payload.from.clone()),
            receiver: payload.receiver.clone(),
            business: payload.business.clone(),
            body: payload.message.as_str().to_string(),
            status: payload.status,
            matched_block_word: payload.matched_block_word.clone(),
            used_modem: payload.used_modem.clone(),
            port: payload.port.clone(),
            provider_message_id: payload.message_id.clone(),
            first_name: payload.first_name.clone(),
            last_name: payload.last_name.clone(),
            is_example: false,
            received_at: payload.timestamp.clone(),
        },
    )
    .await?;

    info!(
        message_id = message.id,
        tenant_id = ?resolution.tenant_id,
        strategy = resolution.strategy.as_str(),
        "Inbound message routed"
    );

    if let Err(e) = diagnostics::record_webhook_event(
        pool,
        raw,
        resolution.tenant_id.as_deref(),
        resolution.strategy.as_str(),
    )
    .await
    {
        warn!(error = %e, "Failed to record webhook diagnostics");
    }

    let mut push_target = None;
    if let Some(tenant_id) = resolution.tenant_id.as_deref() {
        if let Some(sender) = sender.as_deref() {
            let name = payload.sender_name();
            if let Err(e) =
                contact::upsert_contact(pool, tenant_id, sender, name.as_deref(), ContactSource::Inbound).await
            {
                warn!(error = %e, tenant_id = %tenant_id, "Failed to capture inbound contact");
            }
        }

        match client_profile::find_profile(pool, tenant_id).await {
            Ok(Some(profile)) => push_target = push_target_for(&profile),
            Ok(None) => debug!(tenant_id = %tenant_id, "Routed tenant has no profile"),
            Err(e) => warn!(error = %e, tenant_id = %tenant_id, "Profile lookup for push failed"),
        }
    }

    Ok(RouteOutcome {
        assigned_tenant_id: resolution.tenant_id,
        message,
        strategy: resolution.strategy,
        push_target,
    })
}

/// Push target for a profile that opted into push and has a URL.
pub fn push_target_for(profile: &ClientProfile) -> Option<PushTarget> {
    if !profile.delivery_mode.pushes() {
        return None;
    }
    let url = profile.webhook_url.as_deref().filter(|u| !u.trim().is_empty())?;
    Some(PushTarget {
        tenant_id: profile.tenant_id.clone(),
        url: url.to_string(),
        secret: profile.webhook_secret.clone(),
    })
}

/// Business name match first, then an active tenant with that id.
async fn tenant_by_business_or_id(pool: &SqlitePool, key: &str) -> Option<String> {
    match client_profile::find_by_business_name(pool, key).await {
        Ok(Some(profile)) => return Some(profile.tenant_id),
        Ok(None) => {}
        Err(e) => warn!(error = %e, business = %key, "Business lookup failed"),
    }

    match tenant::find_tenant(pool, key).await {
        Ok(Some(tenant)) if tenant.is_active => Some(tenant.id),
        Ok(_) => None,
        Err(e) => {
            warn!(error = %e, tenant_id = %key, "Tenant lookup failed");
            None
        }
    }
}

/// Aliased raw receiver, then the aliased normalized receiver, deduplicated.
fn receiver_candidates(settings: &PlatformSettings, receiver: &str, dial_prefix: &str) -> Vec<String> {
    let mut candidates = vec![settings.resolve_alias(receiver).to_string()];
    if let Some(normalized) = phone::normalize(receiver, dial_prefix) {
        let aliased = settings.resolve_alias(&normalized).to_string();
        if !candidates.contains(&aliased) {
            candidates.push(aliased);
        }
    }
    candidates
}

#[cfg(test)]
mod tests {
    use super::*;
    use database::models::{DeliveryMode, InboundStatus, Role};
    use database::Database;
    use serde_json::json;

    async fn test_db() -> Database {
        let db = Database::connect("sqlite::memory:").await.unwrap();
        db.migrate().await.unwrap();
        db
    }

    fn webhook(from: &str, receiver: &str) -> Value {
        json!({
            "from": from,
            "receiver": receiver,
            "message": "hi there",
            "timestamp": "2025-03-01T10:00:00Z",
            "messageId": "in-1",
        })
    }

    async fn route(pool: &SqlitePool, settings: &PlatformSettings, body: Value) -> RouteOutcome {
        let payload = InboundPayload::from_json(&body).unwrap();
        route_incoming(pool, settings, &payload, &body, "+1").await.unwrap()
    }

    async fn deactivate(pool: &SqlitePool, tenant_id: &str) {
        let update = tenant::TenantUpdate {
            is_active: Some(false),
            ..Default::default()
        };
        tenant::update_tenant(pool, tenant_id, &update).await.unwrap();
    }

    #[tokio::test]
    async fn test_business_tag_wins() {
        let db = test_db().await;
        let pool = db.pool();
        let t1 = tenant::create_tenant(pool, "a@example.com", "A", Role::Client, None).await.unwrap();
        let t2 = tenant::create_tenant(pool, "b@example.com", "B", Role::Client, None).await.unwrap();
        client_profile::set_business_name(pool, &t1.id, Some("IBS_7")).await.unwrap();
        client_profile::set_assigned_numbers(pool, &t2.id, &["+15550001111".to_string()])
            .await
            .unwrap();

        let mut body = webhook("+14155551234", "+15550001111");
        body["business"] = json!("IBS_7");
        let outcome = route(pool, &PlatformSettings::default(), body).await;

        assert_eq!(outcome.assigned_tenant_id.as_deref(), Some(t1.id.as_str()));
        assert_eq!(outcome.strategy, RouteStrategy::Business);
    }

    #[tokio::test]
    async fn test_business_tag_raw_tenant_id_requires_active() {
        let db = test_db().await;
        let pool = db.pool();
        let t = tenant::create_tenant(pool, "a@example.com", "A", Role::Client, None).await.unwrap();

        let mut body = webhook("+14155551234", "+15550009999");
        body["business"] = json!(t.id.clone());
        let outcome = route(pool, &PlatformSettings::default(), body.clone()).await;
        assert_eq!(outcome.strategy, RouteStrategy::Business);

        deactivate(pool, &t.id).await;
        let outcome = route(pool, &PlatformSettings::default(), body).await;
        assert_eq!(outcome.strategy, RouteStrategy::Unassigned);
        assert!(outcome.message.tenant_id.is_none());
    }

    #[tokio::test]
    async fn test_alias_then_assigned_number() {
        let db = test_db().await;
        let pool = db.pool();
        let t = tenant::create_tenant(pool, "a@example.com", "A", Role::Client, None).await.unwrap();
        client_profile::set_assigned_numbers(pool, &t.id, &["+15550001111".to_string()])
            .await
            .unwrap();

        let mut settings = PlatformSettings::default();
        settings
            .routing_aliases
            .insert("+15550002222".to_string(), "+15550001111".to_string());

        let outcome = route(pool, &settings, webhook("+14155551234", "+15550002222")).await;
        assert_eq!(outcome.assigned_tenant_id.as_deref(), Some(t.id.as_str()));
        assert_eq!(outcome.strategy, RouteStrategy::AssignedNumber);

        // Unformatted receivers match after normalization.
        let outcome = route(pool, &settings, webhook("+14155551234", "(555) 000-1111")).await;
        assert_eq!(outcome.strategy, RouteStrategy::AssignedNumber);
    }

    #[tokio::test]
    async fn test_fallback_business() {
        let db = test_db().await;
        let pool = db.pool();
        let t = tenant::create_tenant(pool, "a@example.com", "A", Role::Client, None).await.unwrap();
        client_profile::set_business_name(pool, &t.id, Some("HQ")).await.unwrap();

        let settings = PlatformSettings {
            admin_default_business_id: Some("HQ".to_string()),
            ..PlatformSettings::default()
        };
        let outcome = route(pool, &settings, webhook("+14155551234", "+15550009999")).await;
        assert_eq!(outcome.assigned_tenant_id.as_deref(), Some(t.id.as_str()));
        assert_eq!(outcome.strategy, RouteStrategy::Fallback);
    }

    #[tokio::test]
    async fn test_blocked_message_is_kept_with_word() {
        let db = test_db().await;
        let pool = db.pool();

        let mut body = webhook("+14155551234", "+15550009999");
        body["status"] = json!("blocked");
        body["matchedBlockWord"] = json!("STOP");
        let outcome = route(pool, &PlatformSettings::default(), body).await;

        assert_eq!(outcome.message.status, InboundStatus::Blocked);
        assert_eq!(outcome.message.matched_block_word.as_deref(), Some("STOP"));
    }

    #[tokio::test]
    async fn test_push_target_only_for_push_modes() {
        let db = test_db().await;
        let pool = db.pool();
        let t = tenant::create_tenant(pool, "a@example.com", "A", Role::Client, None).await.unwrap();
        client_profile::set_business_name(pool, &t.id, Some("IBS_7")).await.unwrap();

        let mut body = webhook("+14155551234", "+15550009999");
        body["business"] = json!("IBS_7");

        let outcome = route(pool, &PlatformSettings::default(), body.clone()).await;
        assert!(outcome.push_target.is_none());

        client_profile::set_delivery(
            pool,
            &t.id,
            DeliveryMode::Both,
            Some("https://hooks.example.com/in"),
            Some("s3cret"),
        )
        .await
        .unwrap();
        let outcome = route(pool, &PlatformSettings::default(), body).await;
        let target = outcome.push_target.unwrap();
        assert_eq!(target.url, "https://hooks.example.com/in");
        assert_eq!(target.secret.as_deref(), Some("s3cret"));
    }
}
