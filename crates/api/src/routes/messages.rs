//! Dashboard message history and compose.

use axum::extract::{Query, State};
use axum::Json;
use database::{contact, message_log, MessageLog};
use serde::{Deserialize, Serialize};

use crate::auth::DashboardUser;
use crate::error::{ApiError, Result};
use crate::extract::ApiJson;
use crate::routes::Page;
use crate::send::{self, Billing, Outbound, SendOutcome};
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct ListResponse {
    pub success: bool,
    pub messages: Vec<MessageLog>,
}

pub async fn list(
    State(state): State<AppState>,
    user: DashboardUser,
    Query(page): Query<Page>,
) -> Result<Json<ListResponse>> {
    let messages = message_log::list_for_tenant(state.db.pool(), user.id(), page.limit(), page.offset()).await?;
    Ok(Json(ListResponse {
        success: true,
        messages,
    }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComposeBody {
    #[serde(default)]
    pub recipients: Vec<String>,
    /// Contact group whose members are added to `recipients`.
    pub group_id: Option<i64>,
    pub message: String,
}

/// Send from the dashboard: one recipient goes out as a single send,
/// anything more as a bulk send.
pub async fn send(
    State(state): State<AppState>,
    user: DashboardUser,
    ApiJson(body): ApiJson<ComposeBody>,
) -> Result<Json<SendOutcome>> {
    let mut recipients = body.recipients;
    if let Some(group_id) = body.group_id {
        recipients.extend(contact::group_phones(state.db.pool(), user.id(), group_id).await?);
    }
    if recipients.is_empty() {
        return Err(ApiError::BadRequest("at least one recipient is required".to_string()));
    }

    let outbound = if recipients.len() == 1 {
        Outbound::Single {
            recipient: recipients.remove(0),
            message: body.message,
            channel: None,
        }
    } else {
        Outbound::Bulk {
            recipients,
            content: body.message,
        }
    };

    let settings = state.settings().await?;
    let outcome = send::send(&state, &settings, user.id(), outbound, Billing::Metered).await?;
    Ok(Json(outcome))
}
