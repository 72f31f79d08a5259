//! Inbound SMS webhook called by the provider.

use axum::body::Bytes;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;
use database::PlatformSettings;
use serde::Serialize;
use serde_json::Value;
use tracing::{info, warn};

use crate::error::{ApiError, Result};
use crate::state::AppState;

pub const SECRET_HEADER: &str = "x-webhook-secret";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookResponse {
    pub success: bool,
    /// Row id of the stored inbound message.
    pub message_id: i64,
    pub assigned_tenant_id: Option<String>,
    pub strategy: &'static str,
}

fn authorize(state: &AppState, headers: &HeaderMap) -> Result<()> {
    let Some(expected) = state.config.webhook_secret.as_deref() else {
        return Ok(());
    };
    let provided = headers.get(SECRET_HEADER).and_then(|v| v.to_str().ok());
    if provided != Some(expected) {
        warn!("Rejected inbound webhook with a bad secret");
        return Err(ApiError::Unauthorized);
    }
    Ok(())
}

/// Store and route one inbound message.
///
/// Messages that match no tenant are still stored, unassigned.
pub async fn incoming_sms(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookResponse>> {
    authorize(&state, &headers)?;

    let raw: Value = serde_json::from_slice(&body)
        .map_err(|e| ApiError::BadRequest(format!("invalid JSON body: {e}")))?;

    // Unreadable settings must not cost an inbound message.
    let settings = match state.settings().await {
        Ok(settings) => settings,
        Err(e) => {
            warn!(error = %e, "Routing inbound SMS with default settings");
            PlatformSettings::default()
        }
    };
    let outcome = state.inbound.route_incoming(state.db.pool(), &settings, &raw).await?;
    info!(
        message_id = outcome.message.id,
        tenant_id = ?outcome.assigned_tenant_id,
        strategy = outcome.strategy.as_str(),
        "Inbound SMS accepted"
    );

    Ok(Json(WebhookResponse {
        success: true,
        message_id: outcome.message.id,
        assigned_tenant_id: outcome.assigned_tenant_id,
        strategy: outcome.strategy.as_str(),
    }))
}
