//! Route handlers.

pub mod admin;
pub mod api_keys;
pub mod client;
pub mod contacts;
pub mod health;
pub mod inbox;
pub mod messages;
pub mod profile;
pub mod webhook;

use axum::routing::{delete, get, patch, post, put};
use axum::Router;
use serde::Deserialize;

use crate::state::AppState;

const DEFAULT_PAGE_SIZE: i64 = 50;
const MAX_PAGE_SIZE: i64 = 500;

/// `?limit=&offset=` query parameters.
#[derive(Debug, Default, Deserialize)]
pub struct Page {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl Page {
    pub fn limit(&self) -> i64 {
        self.limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE)
    }

    pub fn offset(&self) -> i64 {
        self.offset.unwrap_or(0).max(0)
    }
}

/// Build the router with all routes.
pub fn router() -> Router<AppState> {
    Router::new()
        // Health check
        .route("/health", get(health::health))
        // Inbound webhook
        .route("/webhook/incoming-sms", post(webhook::incoming_sms))
        .route("/api/webhook/extreme-sms", post(webhook::incoming_sms))
        // Client API (API key)
        .route("/api/v2/sms/sendsingle", post(client::send_single))
        .route("/api/v2/sms/sendbulk", post(client::send_bulk))
        .route("/api/v2/sms/sendbulkmulti", post(client::send_bulk_multi))
        .route("/api/v2/sms/status/:message_id", get(client::status))
        .route("/api/v2/sms/inbox", get(client::inbox))
        .route("/api/v2/sms/messages", get(client::messages))
        .route("/api/v2/account/balance", get(client::balance))
        // Dashboard (JWT)
        .route("/api/profile", get(profile::get_profile))
        .route("/api/profile/delivery", put(profile::update_delivery))
        .route("/api/api-keys", get(api_keys::list).post(api_keys::create))
        .route("/api/api-keys/:id", delete(api_keys::revoke))
        .route("/api/contacts", get(contacts::list).post(contacts::create))
        .route("/api/contacts/:id", delete(contacts::remove))
        .route("/api/contact-groups", get(contacts::list_groups).post(contacts::create_group))
        .route("/api/contact-groups/:id/members", post(contacts::add_members))
        .route("/api/messages", get(messages::list))
        .route("/api/sms/send", post(messages::send))
        .route("/api/inbox", get(inbox::list))
        .route("/api/inbox/conversation/:phone", get(inbox::conversation))
        .route("/api/inbox/reply", post(inbox::reply))
        .route("/api/inbox/purge", post(inbox::purge))
        .route("/api/inbox/favorites/:phone", post(inbox::toggle_favorite))
        .route("/api/inbox/:id", delete(inbox::remove))
        .route("/api/inbox/:id/read", post(inbox::mark_read))
        .route("/api/inbox/:id/restore", post(inbox::restore))
        // Staff
        .route("/api/admin/clients", get(admin::list_clients).post(admin::create_client))
        .route("/api/admin/clients/:id", patch(admin::update_client))
        .route("/api/admin/clients/:id/disable", post(admin::disable_client))
        .route("/api/admin/clients/:id/credits", post(admin::adjust_credits))
        .route("/api/admin/transfer", post(admin::transfer))
        .route("/api/admin/pricing", get(admin::get_pricing).put(admin::put_pricing))
        .route("/api/admin/config/:key", put(admin::put_config))
        .route("/api/admin/reconcile", post(admin::reconcile))
        .route("/api/admin/webhook/diagnostics", get(admin::webhook_diagnostics))
        .route("/api/admin/send-on-behalf", post(admin::send_on_behalf))
        .route("/api/admin/provider/balance", get(admin::provider_balance))
        .route("/api/admin/inbox/purge", post(admin::purge_inbox))
}
