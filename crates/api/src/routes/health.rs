//! Liveness probe.

use axum::extract::State;
use axum::Json;
use serde::Serialize;

use crate::state::AppState;

#[derive(Serialize)]
pub struct Health {
    pub status: &'static str,
    pub database: &'static str,
}

/// Process and database liveness. Always 200; `database` carries the probe result.
pub async fn health(State(state): State<AppState>) -> Json<Health> {
    let database = match sqlx::query_scalar::<_, i64>("SELECT 1").fetch_one(state.db.pool()).await {
        Ok(_) => "ok",
        Err(e) => {
            tracing::warn!(error = %e, "Health check database probe failed");
            "unavailable"
        }
    };
    Json(Health { status: "ok", database })
}
