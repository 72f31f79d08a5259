//! Client API, authenticated by API key.

use axum::extract::{Path, Query, State};
use axum::Json;
use database::models::MessageStatus;
use database::{client_profile, incoming_message, message_log, IncomingMessage, MessageLog};
use provider_gateway::BulkMultiItem;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::auth::ClientAuth;
use crate::error::{ApiError, Result};
use crate::extract::ApiJson;
use crate::routes::Page;
use crate::send::{self, Billing, Outbound, SendOutcome};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct SendSingleBody {
    #[serde(alias = "to")]
    pub recipient: String,
    #[serde(alias = "content")]
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub struct SendBulkBody {
    pub recipients: Vec<String>,
    #[serde(alias = "message")]
    pub content: String,
}

pub async fn send_single(
    State(state): State<AppState>,
    auth: ClientAuth,
    ApiJson(body): ApiJson<SendSingleBody>,
) -> Result<Json<SendOutcome>> {
    let settings = state.settings().await?;
    let outbound = Outbound::Single {
        recipient: body.recipient,
        message: body.message,
        channel: None,
    };
    let outcome = send::send(&state, &settings, &auth.tenant.id, outbound, Billing::Metered).await?;
    Ok(Json(outcome))
}

pub async fn send_bulk(
    State(state): State<AppState>,
    auth: ClientAuth,
    ApiJson(body): ApiJson<SendBulkBody>,
) -> Result<Json<SendOutcome>> {
    let settings = state.settings().await?;
    let outbound = Outbound::Bulk {
        recipients: body.recipients,
        content: body.content,
    };
    let outcome = send::send(&state, &settings, &auth.tenant.id, outbound, Billing::Metered).await?;
    Ok(Json(outcome))
}

/// Body is the provider's own shape: `[{recipient, content}, ...]`.
pub async fn send_bulk_multi(
    State(state): State<AppState>,
    auth: ClientAuth,
    ApiJson(items): ApiJson<Vec<BulkMultiItem>>,
) -> Result<Json<SendOutcome>> {
    if items.is_empty() {
        return Err(ApiError::BadRequest("at least one message is required".to_string()));
    }
    let settings = state.settings().await?;
    let outcome = send::send(
        &state,
        &settings,
        &auth.tenant.id,
        Outbound::BulkMulti { items },
        Billing::Metered,
    )
    .await?;
    Ok(Json(outcome))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    pub success: bool,
    pub message_id: String,
    pub status: String,
    pub delivered_at: Option<String>,
    /// `provider` for a live answer, `local` when falling back to the log.
    pub source: &'static str,
}

/// Delivery status of one of the tenant's messages.
///
/// Falls back to the logged status when the provider is unreachable or
/// answers with an error.
pub async fn status(
    State(state): State<AppState>,
    auth: ClientAuth,
    Path(message_id): Path<String>,
) -> Result<Json<StatusResponse>> {
    let pool = state.db.pool();
    let log = message_log::find_by_provider_id(pool, &auth.tenant.id, &message_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("message not found: {message_id}")))?;

    let settings = state.settings().await?;
    match state.provider(&settings).status(&message_id).await {
        Ok(live) => {
            let parsed = MessageStatus::from_provider(&live.status);
            if parsed != log.status && parsed != MessageStatus::Queued {
                if let Err(e) = message_log::update_status(pool, log.id, parsed).await {
                    warn!(error = %e, message_log_id = log.id, "Status backfill failed");
                }
            }
            Ok(Json(StatusResponse {
                success: true,
                message_id,
                status: live.status,
                delivered_at: live.delivered_at,
                source: "provider",
            }))
        }
        Err(e) if e.is_degraded() => {
            info!(error = %e, message_id = %message_id, "Serving logged status");
            Ok(Json(StatusResponse {
                success: true,
                message_id,
                status: log.status.as_str().to_string(),
                delivered_at: None,
                source: "local",
            }))
        }
        Err(e) => Err(e.into()),
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InboxResponse {
    pub success: bool,
    pub messages: Vec<IncomingMessage>,
    pub unread: i64,
}

pub async fn inbox(
    State(state): State<AppState>,
    auth: ClientAuth,
    Query(page): Query<Page>,
) -> Result<Json<InboxResponse>> {
    let pool = state.db.pool();
    let messages = incoming_message::list_active(pool, &auth.tenant.id, page.limit(), page.offset()).await?;
    let unread = incoming_message::count_unread(pool, &auth.tenant.id).await?;
    Ok(Json(InboxResponse {
        success: true,
        messages,
        unread,
    }))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MessagesResponse {
    pub success: bool,
    pub messages: Vec<MessageLog>,
}

pub async fn messages(
    State(state): State<AppState>,
    auth: ClientAuth,
    Query(page): Query<Page>,
) -> Result<Json<MessagesResponse>> {
    let messages = message_log::list_for_tenant(state.db.pool(), &auth.tenant.id, page.limit(), page.offset()).await?;
    Ok(Json(MessagesResponse {
        success: true,
        messages,
    }))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BalanceResponse {
    pub success: bool,
    pub balance: Decimal,
    pub currency: String,
}

pub async fn balance(State(state): State<AppState>, auth: ClientAuth) -> Result<Json<BalanceResponse>> {
    let profile = client_profile::get_profile(state.db.pool(), &auth.tenant.id).await?;
    Ok(Json(BalanceResponse {
        success: true,
        balance: profile.credits(),
        currency: profile.currency,
    }))
}
