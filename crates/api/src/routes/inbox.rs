//! Dashboard inbox: conversations, replies and message lifecycle.

use axum::extract::{Path, Query, State};
use axum::Json;
use database::incoming_message::{self, PURGE_RECOMMENDED_AT};
use database::{settings, IncomingMessage};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::auth::DashboardUser;
use crate::error::{ApiError, Result};
use crate::extract::ApiJson;
use crate::send::{self, Billing, Outbound, SendOutcome};
use crate::state::AppState;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum View {
    #[default]
    Active,
    Deleted,
}

#[derive(Debug, Default, Deserialize)]
pub struct InboxQuery {
    #[serde(default)]
    pub view: View,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InboxResponse {
    pub success: bool,
    pub messages: Vec<IncomingMessage>,
    pub unread: i64,
    pub deleted_count: i64,
    pub purge_recommended: bool,
    pub favorites: Vec<String>,
}

pub async fn list(
    State(state): State<AppState>,
    user: DashboardUser,
    Query(query): Query<InboxQuery>,
) -> Result<Json<InboxResponse>> {
    let pool = state.db.pool();
    let page = crate::routes::Page {
        limit: query.limit,
        offset: query.offset,
    };
    let messages = match query.view {
        View::Active => incoming_message::list_active(pool, user.id(), page.limit(), page.offset()).await?,
        View::Deleted => incoming_message::list_deleted(pool, user.id(), page.limit(), page.offset()).await?,
    };
    let unread = incoming_message::count_unread(pool, user.id()).await?;
    let deleted_count = incoming_message::count_deleted(pool, user.id()).await?;
    let favorites = settings::favorites(pool, user.id()).await?;

    Ok(Json(InboxResponse {
        success: true,
        messages,
        unread,
        deleted_count,
        purge_recommended: deleted_count >= PURGE_RECOMMENDED_AT,
        favorites,
    }))
}

fn normalize_phone(state: &AppState, raw: &str) -> Result<String> {
    phone::normalize(raw, state.dial_prefix()).ok_or_else(|| ApiError::InvalidRecipient(vec![raw.to_string()]))
}

#[derive(Debug, Serialize)]
pub struct ConversationResponse {
    pub success: bool,
    pub phone: String,
    pub messages: Vec<IncomingMessage>,
}

pub async fn conversation(
    State(state): State<AppState>,
    user: DashboardUser,
    Path(raw_phone): Path<String>,
) -> Result<Json<ConversationResponse>> {
    let phone = normalize_phone(&state, &raw_phone)?;
    let messages = incoming_message::conversation(state.db.pool(), user.id(), &phone).await?;
    Ok(Json(ConversationResponse {
        success: true,
        phone,
        messages,
    }))
}

#[derive(Debug, Deserialize)]
pub struct ReplyBody {
    pub phone: String,
    pub message: String,
}

/// Reply to a sender on the modem and port their last message arrived on.
pub async fn reply(
    State(state): State<AppState>,
    user: DashboardUser,
    ApiJson(body): ApiJson<ReplyBody>,
) -> Result<Json<SendOutcome>> {
    let phone = normalize_phone(&state, &body.phone)?;
    let channel = inbound_router::reply_channel(state.db.pool(), user.id(), &phone).await?;

    let settings = state.settings().await?;
    let outbound = Outbound::Single {
        recipient: phone,
        message: body.message,
        channel,
    };
    let outcome = send::send(&state, &settings, user.id(), outbound, Billing::Metered).await?;
    Ok(Json(outcome))
}

#[derive(Debug, Serialize)]
pub struct Ack {
    pub success: bool,
}

pub async fn mark_read(State(state): State<AppState>, user: DashboardUser, Path(id): Path<i64>) -> Result<Json<Ack>> {
    incoming_message::mark_read(state.db.pool(), user.id(), id).await?;
    Ok(Json(Ack { success: true }))
}

pub async fn remove(State(state): State<AppState>, user: DashboardUser, Path(id): Path<i64>) -> Result<Json<Ack>> {
    incoming_message::soft_delete(state.db.pool(), user.id(), id).await?;
    Ok(Json(Ack { success: true }))
}

pub async fn restore(State(state): State<AppState>, user: DashboardUser, Path(id): Path<i64>) -> Result<Json<Ack>> {
    incoming_message::restore(state.db.pool(), user.id(), id).await?;
    Ok(Json(Ack { success: true }))
}

#[derive(Debug, Serialize)]
pub struct PurgeResponse {
    pub success: bool,
    pub purged: u64,
}

/// Permanently remove the tenant's deleted messages.
pub async fn purge(State(state): State<AppState>, user: DashboardUser) -> Result<Json<PurgeResponse>> {
    let purged = incoming_message::purge_deleted(state.db.pool(), user.id()).await?;
    info!(tenant_id = %user.id(), purged, "Inbox purged");
    Ok(Json(PurgeResponse { success: true, purged }))
}

#[derive(Debug, Serialize)]
pub struct FavoriteResponse {
    pub success: bool,
    pub phone: String,
    pub favorite: bool,
}

pub async fn toggle_favorite(
    State(state): State<AppState>,
    user: DashboardUser,
    Path(raw_phone): Path<String>,
) -> Result<Json<FavoriteResponse>> {
    let phone = normalize_phone(&state, &raw_phone)?;
    let favorite = settings::toggle_favorite(state.db.pool(), user.id(), &phone).await?;
    Ok(Json(FavoriteResponse {
        success: true,
        phone,
        favorite,
    }))
}
