//! HTTP surface of the SMS platform.
//!
//! Three audiences share one router:
//!
//! - **Client API** (`/api/v2/...`), authenticated by API key, for sending
//!   SMS, polling status and reading the inbox.
//! - **Dashboard API** (`/api/...`), authenticated by JWT, for tenants and
//!   staff. Staff routes live under `/api/admin`.
//! - **Inbound webhook** (`/webhook/incoming-sms`), called by the provider.
//!
//! Every error renders as `{"success": false, "error": ..., "code": ...}`.

pub mod auth;
pub mod config;
pub mod error;
pub mod extract;
pub mod routes;
pub mod send;
pub mod state;

use axum::Router;
use tower_http::trace::TraceLayer;

pub use config::Config;
pub use error::{ApiError, Result};
pub use state::AppState;

/// Build the application with state and request tracing attached.
pub fn app(state: AppState) -> Router {
    routes::router().layer(TraceLayer::new_for_http()).with_state(state)
}
