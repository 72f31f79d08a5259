//! Staff routes.
//!
//! Supervisors act on non-admin tenants of their own group; admins act on
//! everyone. Platform-wide settings, reconciliation and inbox purges are
//! admin-only. The operator tenant can only be changed by itself.

use axum::extract::{Path, Query, State};
use axum::Json;
use database::client_profile::{self, ProfileUpdate};
use database::tenant::{NewTenant, TenantUpdate};
use database::{credits, incoming_message};
use database::models::Role;
use database::settings::{keys, validate_entry};
use database::validation::{validate_business_name, validate_currency, validate_email, validate_label};
use database::{diagnostics, ledger, system_config, tenant, CreditTransaction, IncomingMessage, Tenant, WebhookDiagnostics};
use metering::{Pricing, ReconcileReport};
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use tracing::info;

use crate::auth::{ensure_not_operator, Staff};
use crate::error::{ApiError, Result};
use crate::extract::ApiJson;
use crate::send::{self, Billing, Outbound, SendOutcome};
use crate::state::AppState;

const UNASSIGNED_SAMPLE: i64 = 20;
const DEFAULT_PURGE_AGE_DAYS: u32 = 30;

/// Distinguishes an absent field (`None`) from an explicit `null`
/// (`Some(None)`).
fn nullable<'de, T, D>(deserializer: D) -> std::result::Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

fn require_admin(staff: &Staff) -> Result<()> {
    if staff.is_admin() {
        Ok(())
    } else {
        Err(ApiError::Forbidden("admin role required".to_string()))
    }
}

/// Trimmed business name, `None` when blank.
fn trimmed_business_name(raw: Option<&str>) -> Result<Option<&str>> {
    let name = raw.map(str::trim).filter(|b| !b.is_empty());
    if let Some(name) = name {
        validate_business_name(name)?;
    }
    Ok(name)
}

fn normalize_numbers(state: &AppState, raw: &[String]) -> Result<Vec<String>> {
    let batch = phone::normalize_many(raw, state.dial_prefix());
    if !batch.invalid.is_empty() {
        return Err(ApiError::InvalidRecipient(batch.invalid));
    }
    Ok(batch.ok)
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientSummary {
    #[serde(flatten)]
    pub tenant: Tenant,
    pub balance: Decimal,
    pub business_name: Option<String>,
    pub assigned_numbers: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct ClientsResponse {
    pub success: bool,
    pub clients: Vec<ClientSummary>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientsQuery {
    pub group_id: Option<String>,
}

/// Tenants visible to the caller, with balances.
pub async fn list_clients(
    State(state): State<AppState>,
    staff: Staff,
    Query(query): Query<ClientsQuery>,
) -> Result<Json<ClientsResponse>> {
    let pool = state.db.pool();
    let tenants = if staff.is_admin() {
        tenant::list_tenants(pool, query.group_id.as_deref()).await?
    } else {
        let Some(group) = staff.0.tenant.group_id.as_deref() else {
            return Ok(Json(ClientsResponse {
                success: true,
                clients: Vec::new(),
            }));
        };
        tenant::list_tenants(pool, Some(group))
            .await?
            .into_iter()
            .filter(|t| t.role != Role::Admin)
            .collect()
    };

    let mut clients = Vec::with_capacity(tenants.len());
    for tenant in tenants {
        let profile = client_profile::find_profile(pool, &tenant.id).await?;
        clients.push(ClientSummary {
            balance: profile.as_ref().map(|p| p.credits()).unwrap_or_default(),
            business_name: profile.as_ref().and_then(|p| p.business_name.clone()),
            assigned_numbers: profile.map(|p| p.assigned_numbers()).unwrap_or_default(),
            tenant,
        });
    }

    Ok(Json(ClientsResponse { success: true, clients }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateClientBody {
    pub email: String,
    pub name: String,
    #[serde(default = "default_role")]
    pub role: Role,
    pub group_id: Option<String>,
    pub business_name: Option<String>,
    #[serde(default)]
    pub assigned_numbers: Vec<String>,
    pub initial_credits: Option<Decimal>,
}

fn default_role() -> Role {
    Role::Client
}

#[derive(Debug, Serialize)]
pub struct ClientResponse {
    pub success: bool,
    pub client: ClientSummary,
}

async fn summary(state: &AppState, tenant_id: &str) -> Result<ClientSummary> {
    let pool = state.db.pool();
    let tenant = tenant::get_tenant(pool, tenant_id).await?;
    let profile = client_profile::get_profile(pool, tenant_id).await?;
    Ok(ClientSummary {
        tenant,
        balance: profile.credits(),
        assigned_numbers: profile.assigned_numbers(),
        business_name: profile.business_name,
    })
}

/// Create a tenant with its billing profile.
///
/// Supervisors may only create clients, always in their own group.
pub async fn create_client(
    State(state): State<AppState>,
    staff: Staff,
    ApiJson(body): ApiJson<CreateClientBody>,
) -> Result<Json<ClientResponse>> {
    validate_email(&body.email)?;
    validate_label("name", &body.name)?;

    let group_id = if staff.is_admin() {
        body.group_id
    } else {
        if body.role != Role::Client {
            return Err(ApiError::Forbidden("supervisors can only create clients".to_string()));
        }
        let own = staff.0.tenant.group_id.clone();
        if own.is_none() || (body.group_id.is_some() && body.group_id != own) {
            return Err(ApiError::Forbidden("tenant is outside your group".to_string()));
        }
        own
    };

    let business_name = trimmed_business_name(body.business_name.as_deref())?;
    let numbers = normalize_numbers(&state, &body.assigned_numbers)?;
    let initial = body.initial_credits.unwrap_or_default();
    if initial < Decimal::ZERO {
        return Err(ApiError::BadRequest("initialCredits cannot be negative".to_string()));
    }
    let initial_units = credits::to_units(initial)?;

    let pool = state.db.pool();
    let created = tenant::create_tenant_with_profile(
        pool,
        &NewTenant {
            group_id: group_id.as_deref(),
            business_name,
            assigned_numbers: &numbers,
            initial_units,
            ..NewTenant::new(body.email.trim(), body.name.trim(), body.role)
        },
    )
    .await?;
    if initial_units > 0 {
        metering::pools::apply_pool_delta(pool, group_id.as_deref(), initial).await;
    }
    info!(actor = %staff.0.id(), tenant_id = %created.id, role = created.role.as_str(), "Client created");

    Ok(Json(ClientResponse {
        success: true,
        client: summary(&state, &created.id).await?,
    }))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateClientBody {
    pub role: Option<Role>,
    #[serde(default, deserialize_with = "nullable")]
    pub group_id: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable")]
    pub business_name: Option<Option<String>>,
    pub assigned_numbers: Option<Vec<String>>,
    pub currency: Option<String>,
    #[serde(default, deserialize_with = "nullable")]
    pub custom_markup: Option<Option<String>>,
    pub rate_limit: Option<i64>,
    pub is_active: Option<bool>,
}

/// Partial update. Role and group changes are admin-only.
pub async fn update_client(
    State(state): State<AppState>,
    staff: Staff,
    Path(id): Path<String>,
    ApiJson(body): ApiJson<UpdateClientBody>,
) -> Result<Json<ClientResponse>> {
    ensure_not_operator(&state.config, staff.0.id(), &id)?;
    let target = staff.managed_tenant(state.db.pool(), &id).await?;
    if (body.role.is_some() || body.group_id.is_some()) && !staff.is_admin() {
        return Err(ApiError::Forbidden("only admins can change roles or groups".to_string()));
    }

    let business_name = match &body.business_name {
        Some(name) => Some(trimmed_business_name(name.as_deref())?.map(str::to_string)),
        None => None,
    };
    let assigned_numbers = match &body.assigned_numbers {
        Some(numbers) => Some(normalize_numbers(&state, numbers)?),
        None => None,
    };
    if let Some(currency) = &body.currency {
        validate_currency(currency)?;
    }
    if body.rate_limit.is_some_and(|limit| limit <= 0) {
        return Err(ApiError::BadRequest("rateLimit must be positive".to_string()));
    }

    let update = TenantUpdate {
        role: body.role,
        group_id: body.group_id,
        is_active: body.is_active,
        profile: ProfileUpdate {
            business_name,
            assigned_numbers,
            currency: body.currency,
            custom_markup: body.custom_markup,
            rate_limit: body.rate_limit,
        },
    };
    tenant::update_tenant(state.db.pool(), &target.id, &update).await?;
    info!(actor = %staff.0.id(), tenant_id = %target.id, "Client updated");

    Ok(Json(ClientResponse {
        success: true,
        client: summary(&state, &target.id).await?,
    }))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DisableResponse {
    pub success: bool,
    /// Credits removed from the tenant, if any were left.
    pub zeroed: Option<Decimal>,
}

/// Deactivate a tenant: zero its balance, release its business name and
/// numbers, and mark it inactive.
pub async fn disable_client(
    State(state): State<AppState>,
    staff: Staff,
    Path(id): Path<String>,
) -> Result<Json<DisableResponse>> {
    ensure_not_operator(&state.config, staff.0.id(), &id)?;
    if id == staff.0.id() {
        return Err(ApiError::BadRequest("you cannot disable your own account".to_string()));
    }
    let target = staff.managed_tenant(state.db.pool(), &id).await?;

    let pool = state.db.pool();
    let zeroed = ledger::disable_tenant(pool, &target.id).await?;
    if let Some(entry) = &zeroed {
        metering::pools::apply_pool_delta(pool, target.group_id.as_deref(), entry.amount()).await;
    }
    info!(actor = %staff.0.id(), tenant_id = %target.id, "Client disabled");

    Ok(Json(DisableResponse {
        success: true,
        zeroed: zeroed.map(|entry| -entry.amount()),
    }))
}

#[derive(Debug, Deserialize)]
pub struct CreditsBody {
    pub amount: Decimal,
    pub description: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CreditsResponse {
    pub success: bool,
    pub transaction: CreditTransaction,
    pub balance: Decimal,
}

/// Add (positive) or remove (negative) credits.
pub async fn adjust_credits(
    State(state): State<AppState>,
    staff: Staff,
    Path(id): Path<String>,
    ApiJson(body): ApiJson<CreditsBody>,
) -> Result<Json<CreditsResponse>> {
    ensure_not_operator(&state.config, staff.0.id(), &id)?;
    let target = staff.managed_tenant(state.db.pool(), &id).await?;

    let description = body
        .description
        .unwrap_or_else(|| format!("Adjusted by {}", staff.0.tenant.email));
    let transaction = metering::adjust_credits(state.db.pool(), &target.id, body.amount, &description).await?;

    Ok(Json(CreditsResponse {
        success: true,
        balance: transaction.balance_after(),
        transaction,
    }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferBody {
    /// Defaults to the caller.
    pub from: Option<String>,
    pub to: String,
    pub amount: Decimal,
    pub description: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferResponse {
    pub success: bool,
    pub debit: CreditTransaction,
    pub credit: CreditTransaction,
}

pub async fn transfer(
    State(state): State<AppState>,
    staff: Staff,
    ApiJson(body): ApiJson<TransferBody>,
) -> Result<Json<TransferResponse>> {
    let pool = state.db.pool();
    let actor = staff.0.id().to_string();
    let from = body.from.unwrap_or_else(|| actor.clone());
    if from == body.to {
        return Err(ApiError::BadRequest("cannot transfer to the same tenant".to_string()));
    }

    ensure_not_operator(&state.config, &actor, &from)?;
    ensure_not_operator(&state.config, &actor, &body.to)?;
    if from != actor {
        staff.managed_tenant(pool, &from).await?;
    }
    staff.managed_tenant(pool, &body.to).await?;

    let description = body
        .description
        .unwrap_or_else(|| format!("Transfer by {}", staff.0.tenant.email));
    let (debit, credit) = metering::transfer_credits(pool, &from, &body.to, body.amount, &description).await?;

    Ok(Json(TransferResponse {
        success: true,
        debit,
        credit,
    }))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PricingQuery {
    pub group_id: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PricingResponse {
    pub success: bool,
    pub group_id: Option<String>,
    pub pricing: Pricing,
    pub margin: Decimal,
    pub pool: Decimal,
}

/// Supervisors always see their own group; admins see the global price or
/// any group's.
fn pricing_scope(staff: &Staff, requested: Option<String>) -> Result<Option<String>> {
    if staff.is_admin() {
        return Ok(requested);
    }
    let Some(own) = staff.0.tenant.group_id.clone() else {
        return Err(ApiError::Forbidden("supervisor has no group".to_string()));
    };
    if requested.is_some_and(|req| req != own) {
        return Err(ApiError::Forbidden("group is outside your scope".to_string()));
    }
    Ok(Some(own))
}

async fn pricing_response(state: &AppState, group_id: Option<String>) -> Result<PricingResponse> {
    let pool = state.db.pool();
    let pricing = metering::resolve_pricing(pool, None, group_id.as_deref()).await?;
    let pool_key = match &group_id {
        Some(gid) => keys::group_pool(gid),
        None => keys::ADMIN_POOL.to_string(),
    };
    Ok(PricingResponse {
        success: true,
        margin: pricing.margin(),
        pool: metering::pools::pool_balance(pool, &pool_key).await,
        group_id,
        pricing,
    })
}

pub async fn get_pricing(
    State(state): State<AppState>,
    staff: Staff,
    Query(query): Query<PricingQuery>,
) -> Result<Json<PricingResponse>> {
    let group_id = pricing_scope(&staff, query.group_id)?;
    Ok(Json(pricing_response(&state, group_id).await?))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PricingBody {
    pub group_id: Option<String>,
    pub extreme_cost: Decimal,
    pub client_rate: Decimal,
}

/// Set the global price (admin) or a group's price.
pub async fn put_pricing(
    State(state): State<AppState>,
    staff: Staff,
    ApiJson(body): ApiJson<PricingBody>,
) -> Result<Json<PricingResponse>> {
    let group_id = pricing_scope(&staff, body.group_id)?;
    let (cost_key, rate_key) = match &group_id {
        Some(gid) => (keys::group_extreme_cost(gid), keys::group_client_rate(gid)),
        None => (keys::EXTREME_COST_PER_SMS.to_string(), keys::CLIENT_RATE_PER_SMS.to_string()),
    };

    let cost = body.extreme_cost.to_string();
    let rate = body.client_rate.to_string();
    validate_entry(&cost_key, &cost)?;
    validate_entry(&rate_key, &rate)?;

    let pool = state.db.pool();
    system_config::set(pool, &cost_key, &cost).await?;
    system_config::set(pool, &rate_key, &rate).await?;
    info!(actor = %staff.0.id(), group_id = ?group_id, %cost, %rate, "Pricing updated");

    Ok(Json(pricing_response(&state, group_id).await?))
}

#[derive(Debug, Deserialize)]
pub struct ConfigBody {
    /// `null` removes the key.
    pub value: Value,
}

#[derive(Debug, Serialize)]
pub struct ConfigResponse {
    pub success: bool,
    pub key: String,
    pub value: Option<String>,
}

/// Write one configuration key. Strings are stored as-is, other JSON values
/// in their serialized form.
pub async fn put_config(
    State(state): State<AppState>,
    staff: Staff,
    Path(key): Path<String>,
    ApiJson(body): ApiJson<ConfigBody>,
) -> Result<Json<ConfigResponse>> {
    require_admin(&staff)?;
    let pool = state.db.pool();

    let value = match body.value {
        Value::Null => {
            system_config::delete(pool, &key).await?;
            info!(actor = %staff.0.id(), key = %key, "Config key removed");
            return Ok(Json(ConfigResponse {
                success: true,
                key,
                value: None,
            }));
        }
        Value::String(s) => s,
        other => other.to_string(),
    };

    validate_entry(&key, &value)?;
    system_config::set(pool, &key, &value).await?;
    info!(actor = %staff.0.id(), key = %key, "Config key set");

    // The provider token is write-only.
    let value = (key != keys::PROVIDER_API_KEY).then_some(value);
    Ok(Json(ConfigResponse {
        success: true,
        key,
        value,
    }))
}

#[derive(Debug, Serialize)]
pub struct ReconcileResponse {
    pub success: bool,
    pub report: ReconcileReport,
}

pub async fn reconcile(State(state): State<AppState>, staff: Staff) -> Result<Json<ReconcileResponse>> {
    require_admin(&staff)?;
    let report = metering::reconcile_credits(state.db.pool()).await?;
    info!(
        actor = %staff.0.id(),
        logs_scanned = report.logs_scanned,
        adjusted = report.adjusted.len(),
        "Reconciliation finished"
    );
    Ok(Json(ReconcileResponse { success: true, report }))
}

#[derive(Debug, Serialize)]
pub struct DiagnosticsResponse {
    pub success: bool,
    pub diagnostics: Option<WebhookDiagnostics>,
    pub unassigned: Vec<IncomingMessage>,
}

/// Last webhook event and the most recent messages no tenant claimed.
pub async fn webhook_diagnostics(State(state): State<AppState>, staff: Staff) -> Result<Json<DiagnosticsResponse>> {
    require_admin(&staff)?;
    let pool = state.db.pool();
    Ok(Json(DiagnosticsResponse {
        success: true,
        diagnostics: diagnostics::get_webhook_diagnostics(pool).await?,
        unassigned: incoming_message::list_unassigned(pool, UNASSIGNED_SAMPLE).await?,
    }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OnBehalfBody {
    pub tenant_id: String,
    pub recipients: Vec<String>,
    pub message: String,
}

/// Send as a tenant without charging it. The send is logged as an audit
/// entry on the tenant.
pub async fn send_on_behalf(
    State(state): State<AppState>,
    staff: Staff,
    ApiJson(body): ApiJson<OnBehalfBody>,
) -> Result<Json<SendOutcome>> {
    let target = staff.managed_tenant(state.db.pool(), &body.tenant_id).await?;
    let mut recipients = body.recipients;
    let outbound = match recipients.len() {
        0 => return Err(ApiError::BadRequest("at least one recipient is required".to_string())),
        1 => Outbound::Single {
            recipient: recipients.remove(0),
            message: body.message,
            channel: None,
        },
        _ => Outbound::Bulk {
            recipients,
            content: body.message,
        },
    };

    let settings = state.settings().await?;
    let outcome = send::send(&state, &settings, &target.id, outbound, Billing::AdminAudit).await?;
    info!(actor = %staff.0.id(), tenant_id = %target.id, message_count = outcome.message_count, "Sent on behalf");
    Ok(Json(outcome))
}

#[derive(Debug, Serialize)]
pub struct ProviderBalanceResponse {
    pub success: bool,
    pub balance: Option<Decimal>,
    pub currency: Option<String>,
}

pub async fn provider_balance(State(state): State<AppState>, staff: Staff) -> Result<Json<ProviderBalanceResponse>> {
    require_admin(&staff)?;
    let settings = state.settings().await?;
    let balance = state.provider(&settings).balance().await?;
    Ok(Json(ProviderBalanceResponse {
        success: true,
        balance: balance.balance,
        currency: balance.currency,
    }))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PurgeBody {
    pub older_than_days: Option<u32>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PurgeResponse {
    pub success: bool,
    pub purged: u64,
    pub older_than_days: u32,
}

/// Purge messages deleted more than `olderThanDays` ago, across tenants.
pub async fn purge_inbox(
    State(state): State<AppState>,
    staff: Staff,
    ApiJson(body): ApiJson<PurgeBody>,
) -> Result<Json<PurgeResponse>> {
    require_admin(&staff)?;
    let days = body.older_than_days.unwrap_or(DEFAULT_PURGE_AGE_DAYS);
    let purged = incoming_message::purge_deleted_older_than(state.db.pool(), days).await?;
    info!(actor = %staff.0.id(), purged, days, "Deleted inbound messages purged");
    Ok(Json(PurgeResponse {
        success: true,
        purged,
        older_than_days: days,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_update_body_distinguishes_null_from_absent() {
        let body: UpdateClientBody = serde_json::from_str(r#"{"groupId": null}"#).unwrap();
        assert_eq!(body.group_id, Some(None));
        assert_eq!(body.business_name, None);

        let body: UpdateClientBody = serde_json::from_str(r#"{"businessName": "IBS_9"}"#).unwrap();
        assert_eq!(body.business_name, Some(Some("IBS_9".to_string())));
        assert_eq!(body.group_id, None);
    }

    #[test]
    fn test_create_body_defaults_to_client_role() {
        let body: CreateClientBody =
            serde_json::from_str(r#"{"email": "a@example.com", "name": "A", "initialCredits": 25}"#).unwrap();
        assert_eq!(body.role, Role::Client);
        assert_eq!(body.initial_credits, Some(Decimal::from(25)));
        assert!(body.assigned_numbers.is_empty());
    }
}
