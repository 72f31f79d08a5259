//! API key management for the signed-in tenant.

use axum::extract::{Path, State};
use axum::Json;
use database::validation::validate_label;
use database::{api_key, ApiKey};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::auth::{generate_api_key, hash_api_key, DashboardUser};
use crate::error::Result;
use crate::extract::ApiJson;
use crate::state::AppState;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListResponse {
    pub success: bool,
    pub keys: Vec<ApiKey>,
}

pub async fn list(State(state): State<AppState>, user: DashboardUser) -> Result<Json<ListResponse>> {
    let keys = api_key::list_for_tenant(state.db.pool(), user.id()).await?;
    Ok(Json(ListResponse { success: true, keys }))
}

#[derive(Debug, Default, Deserialize)]
pub struct CreateBody {
    pub label: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateResponse {
    pub success: bool,
    /// The only time the raw key is returned.
    pub key: String,
    pub api_key: ApiKey,
}

pub async fn create(
    State(state): State<AppState>,
    user: DashboardUser,
    ApiJson(body): ApiJson<CreateBody>,
) -> Result<Json<CreateResponse>> {
    let label = body.label.as_deref().map(str::trim).filter(|l| !l.is_empty());
    if let Some(label) = label {
        validate_label("label", label)?;
    }

    let generated = generate_api_key();
    let hash = hash_api_key(&state.config.api_key_pepper, &generated.raw);
    let api_key = api_key::create_api_key(
        state.db.pool(),
        user.id(),
        &hash,
        &generated.prefix,
        &generated.suffix,
        label,
    )
    .await?;
    info!(tenant_id = %user.id(), key_id = %api_key.id, "API key created");

    Ok(Json(CreateResponse {
        success: true,
        key: generated.raw,
        api_key,
    }))
}

#[derive(Debug, Serialize)]
pub struct RevokeResponse {
    pub success: bool,
}

/// Soft-revoke one of the tenant's keys.
pub async fn revoke(
    State(state): State<AppState>,
    user: DashboardUser,
    Path(id): Path<String>,
) -> Result<Json<RevokeResponse>> {
    api_key::revoke(state.db.pool(), &id, Some(user.id())).await?;
    info!(tenant_id = %user.id(), key_id = %id, "API key revoked");
    Ok(Json(RevokeResponse { success: true }))
}
