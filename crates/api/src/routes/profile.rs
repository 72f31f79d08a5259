//! The signed-in tenant's own profile.

use axum::extract::State;
use axum::Json;
use database::models::DeliveryMode;
use database::validation::validate_webhook_url;
use database::{client_profile, credit_transaction, ClientProfile, CreditTransaction, Tenant};
use metering::Pricing;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::auth::DashboardUser;
use crate::error::{ApiError, Result};
use crate::extract::ApiJson;
use crate::state::AppState;

const RECENT_TRANSACTIONS: i64 = 20;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileResponse {
    pub success: bool,
    pub tenant: Tenant,
    pub profile: ClientProfile,
    pub balance: Decimal,
    pub assigned_numbers: Vec<String>,
    pub pricing: Pricing,
    pub recent_transactions: Vec<CreditTransaction>,
}

pub async fn get_profile(State(state): State<AppState>, user: DashboardUser) -> Result<Json<ProfileResponse>> {
    let pool = state.db.pool();
    let profile = client_profile::get_profile(pool, user.id()).await?;
    let pricing = metering::resolve_pricing(pool, Some(user.id()), user.tenant.group_id.as_deref()).await?;
    let recent_transactions = credit_transaction::recent_for_tenant(pool, user.id(), RECENT_TRANSACTIONS).await?;

    Ok(Json(ProfileResponse {
        success: true,
        balance: profile.credits(),
        assigned_numbers: profile.assigned_numbers(),
        tenant: user.tenant,
        profile,
        pricing,
        recent_transactions,
    }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryBody {
    pub delivery_mode: DeliveryMode,
    pub webhook_url: Option<String>,
    pub webhook_secret: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryResponse {
    pub success: bool,
    pub delivery_mode: DeliveryMode,
    pub webhook_url: Option<String>,
}

/// Choose poll, push or both. Push modes need a valid webhook URL.
pub async fn update_delivery(
    State(state): State<AppState>,
    user: DashboardUser,
    ApiJson(body): ApiJson<DeliveryBody>,
) -> Result<Json<DeliveryResponse>> {
    let url = body.webhook_url.as_deref().map(str::trim).filter(|u| !u.is_empty());
    if let Some(url) = url {
        validate_webhook_url(url)?;
    } else if body.delivery_mode.pushes() {
        return Err(ApiError::BadRequest("push delivery requires a webhook URL".to_string()));
    }
    let secret = body.webhook_secret.as_deref().filter(|s| !s.is_empty());

    client_profile::set_delivery(state.db.pool(), user.id(), body.delivery_mode, url, secret).await?;
    info!(tenant_id = %user.id(), mode = ?body.delivery_mode, "Delivery settings updated");

    Ok(Json(DeliveryResponse {
        success: true,
        delivery_mode: body.delivery_mode,
        webhook_url: url.map(str::to_string),
    }))
}
