//! Request authentication.
//!
//! Client routes take an API key, dashboard routes a signed JWT. Both arrive
//! as `Authorization: Bearer <token>` and are resolved by the extractors in
//! this module.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use database::models::Role;
use database::{api_key, tenant, Tenant};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use sqlx::SqlitePool;
use tracing::{debug, warn};

use crate::config::Config;
use crate::error::{ApiError, Result};
use crate::state::AppState;

/// Prefix on every issued API key.
pub const API_KEY_PREFIX: &str = "sk_";

const API_KEY_RANDOM_LEN: usize = 40;
const DISPLAY_PREFIX_LEN: usize = 10;
const DISPLAY_SUFFIX_LEN: usize = 4;

/// SHA-256 hex of `pepper || raw_key`.
pub fn hash_api_key(pepper: &str, raw_key: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(pepper.as_bytes());
    hasher.update(raw_key.as_bytes());
    hex::encode(hasher.finalize())
}

/// A freshly generated key. `raw` is shown to the user once.
#[derive(Debug, Clone)]
pub struct GeneratedKey {
    pub raw: String,
    pub prefix: String,
    pub suffix: String,
}

pub fn generate_api_key() -> GeneratedKey {
    let random: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(API_KEY_RANDOM_LEN)
        .map(char::from)
        .collect();
    let raw = format!("{API_KEY_PREFIX}{random}");
    GeneratedKey {
        prefix: raw[..DISPLAY_PREFIX_LEN].to_string(),
        suffix: raw[raw.len() - DISPLAY_SUFFIX_LEN..].to_string(),
        raw,
    }
}

/// Dashboard token claims.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub role: Role,
    pub exp: usize,
}

/// HS256 signing and verification keys.
pub struct JwtKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
}

impl JwtKeys {
    pub fn new(secret: &[u8]) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            validation,
        }
    }

    /// Sign a token for `tenant_id` valid for `ttl`.
    ///
    /// Tokens are normally issued by the external session service; this is
    /// used by tooling and tests.
    pub fn issue(&self, tenant_id: &str, role: Role, ttl: Duration) -> Result<String> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|_| ApiError::Internal("system clock is before UNIX_EPOCH".to_string()))?;
        let claims = Claims {
            sub: tenant_id.to_string(),
            role,
            exp: (now + ttl).as_secs() as usize,
        };
        encode(&Header::default(), &claims, &self.encoding)
            .map_err(|e| ApiError::Internal(format!("failed to sign token: {e}")))
    }

    pub fn verify(&self, token: &str) -> Result<Claims> {
        decode::<Claims>(token, &self.decoding, &self.validation)
            .map(|data| data.claims)
            .map_err(|err| match err.kind() {
                ErrorKind::ExpiredSignature
                | ErrorKind::InvalidToken
                | ErrorKind::InvalidSignature
                | ErrorKind::MissingRequiredClaim(_)
                | ErrorKind::Base64(_)
                | ErrorKind::Json(_)
                | ErrorKind::Utf8(_) => ApiError::Unauthorized,
                other => ApiError::Internal(format!("failed to validate token: {other:?}")),
            })
    }
}

fn bearer_token(parts: &Parts) -> Result<&str> {
    let header = parts
        .headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .ok_or(ApiError::Unauthorized)?;

    let mut split = header.splitn(2, ' ');
    match (split.next(), split.next()) {
        (Some(scheme), Some(token)) if scheme.eq_ignore_ascii_case("bearer") && !token.trim().is_empty() => {
            Ok(token.trim())
        }
        _ => Err(ApiError::Unauthorized),
    }
}

async fn active_tenant(pool: &SqlitePool, tenant_id: &str) -> Result<Tenant> {
    match tenant::find_tenant(pool, tenant_id).await? {
        Some(tenant) if tenant.is_active => Ok(tenant),
        _ => Err(ApiError::Unauthorized),
    }
}

/// A tenant authenticated by API key.
#[derive(Debug, Clone)]
pub struct ClientAuth {
    pub tenant: Tenant,
    pub key_id: String,
}

#[async_trait]
impl FromRequestParts<AppState> for ClientAuth {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self> {
        let raw = bearer_token(parts)?;
        let hash = hash_api_key(&state.config.api_key_pepper, raw);
        let pool = state.db.pool();

        let Some(key) = api_key::find_active_by_hash(pool, &hash).await? else {
            warn!("Rejected unknown or revoked API key");
            return Err(ApiError::Unauthorized);
        };
        let tenant = active_tenant(pool, &key.tenant_id).await?;

        if let Err(e) = api_key::touch_last_used(pool, &key.id).await {
            warn!(error = %e, key_id = %key.id, "Failed to stamp API key use");
        }
        debug!(tenant_id = %tenant.id, key_id = %key.id, "API key accepted");

        Ok(Self { tenant, key_id: key.id })
    }
}

/// A tenant authenticated by dashboard JWT.
#[derive(Debug, Clone)]
pub struct DashboardUser {
    pub tenant: Tenant,
    pub role: Role,
}

impl DashboardUser {
    pub fn id(&self) -> &str {
        &self.tenant.id
    }
}

#[async_trait]
impl FromRequestParts<AppState> for DashboardUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self> {
        let claims = state.jwt.verify(bearer_token(parts)?)?;
        let tenant = active_tenant(state.db.pool(), &claims.sub).await?;
        Ok(Self {
            tenant,
            role: claims.role,
        })
    }
}

/// A dashboard user whose role claim is supervisor or admin.
#[derive(Debug, Clone)]
pub struct Staff(pub DashboardUser);

#[async_trait]
impl FromRequestParts<AppState> for Staff {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self> {
        let user = DashboardUser::from_request_parts(parts, state).await?;
        if !user.role.is_staff() {
            return Err(ApiError::Forbidden("staff role required".to_string()));
        }
        Ok(Self(user))
    }
}

impl Staff {
    pub fn is_admin(&self) -> bool {
        self.0.role == Role::Admin
    }

    /// Load `target_id` if this staff member may manage it.
    ///
    /// Admins manage everyone; supervisors only non-admin tenants of their
    /// own group.
    pub async fn managed_tenant(&self, pool: &SqlitePool, target_id: &str) -> Result<Tenant> {
        let target = tenant::find_tenant(pool, target_id)
            .await?
            .ok_or_else(|| ApiError::NotFound(format!("Tenant not found: {target_id}")))?;
        if self.is_admin() {
            return Ok(target);
        }

        let same_group = self.0.tenant.group_id.is_some() && self.0.tenant.group_id == target.group_id;
        if !same_group || target.role == Role::Admin {
            return Err(ApiError::Forbidden("tenant is outside your group".to_string()));
        }
        Ok(target)
    }
}

/// Reject changes to the operator tenant unless the operator makes them.
pub fn ensure_not_operator(config: &Config, actor_id: &str, target_id: &str) -> Result<()> {
    match config.operator_tenant_id.as_deref() {
        Some(operator) if operator == target_id && actor_id != operator => {
            Err(ApiError::Forbidden("the operator account cannot be modified".to_string()))
        }
        _ => Ok(()),
    }
}
