//! SMS platform API server.

use api::{AppState, Config};
use database::Database;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load .env file if present
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Config::from_env()?;
    info!(addr = %config.addr, provider = %config.provider_base_url, "Starting SMS API server");

    let db = Database::connect(&config.database_url).await?;
    db.migrate().await?;

    let addr = config.addr;
    let state = AppState::new(db.clone(), config)?;
    let app = api::app(state);

    info!(addr = %addr, "SMS API server listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).with_graceful_shutdown(shutdown_signal()).await?;

    db.close().await;
    info!("SMS API server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}
