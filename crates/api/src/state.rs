//! Application state shared across handlers.

use std::sync::Arc;

use database::{Database, PlatformSettings};
use inbound_router::{InboundRouter, PushClient};
use provider_gateway::{ProviderClient, ProviderConfig};

use crate::auth::JwtKeys;
use crate::config::Config;
use crate::error::{ApiError, Result};

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Database connection.
    pub db: Database,
    pub config: Arc<Config>,
    /// Provider client carrying the env token; see [`AppState::provider`].
    provider: ProviderClient,
    pub inbound: InboundRouter,
    pub jwt: Arc<JwtKeys>,
}

impl AppState {
    /// Build state from configuration. No network calls are made.
    pub fn new(db: Database, config: Config) -> Result<Self> {
        let mut provider_config = ProviderConfig::new(&config.provider_base_url)
            .with_timeouts(config.provider_send_timeout, config.provider_status_timeout);
        if let Some(key) = &config.provider_api_key {
            provider_config = provider_config.with_api_key(key);
        }
        let provider = ProviderClient::new(provider_config).map_err(|e| ApiError::Internal(e.to_string()))?;

        let push = PushClient::new(inbound_router::push::DEFAULT_PUSH_TIMEOUT)
            .map_err(|e| ApiError::Internal(e.to_string()))?;
        let inbound = InboundRouter::new(config.default_dial_prefix.clone(), push);
        let jwt = Arc::new(JwtKeys::new(config.jwt_secret.as_bytes()));

        Ok(Self {
            db,
            config: Arc::new(config),
            provider,
            inbound,
            jwt,
        })
    }

    /// Current runtime settings from the config store.
    pub async fn settings(&self) -> Result<PlatformSettings> {
        Ok(PlatformSettings::load(self.db.pool()).await?)
    }

    /// Provider client using the stored `provider.api_key` when set,
    /// otherwise the env token.
    pub fn provider(&self, settings: &PlatformSettings) -> ProviderClient {
        self.provider.with_api_key(settings.provider_api_key.as_deref())
    }

    pub fn dial_prefix(&self) -> &str {
        &self.config.default_dial_prefix
    }
}
