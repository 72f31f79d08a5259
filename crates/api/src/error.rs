//! Error types for the HTTP surface.

use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use database::{DatabaseError, ValidationError};
use inbound_router::RouterError;
use metering::MeteringError;
use provider_gateway::ProviderError;
use rust_decimal::Decimal;
use serde_json::{json, Map, Value};
use thiserror::Error;

/// Errors returned by handlers.
///
/// Every variant renders as `{"success": false, "error": ..., "code": ...}`.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    /// No recipient survived normalization.
    #[error("no valid recipients: {}", .0.join(", "))]
    InvalidRecipient(Vec<String>),

    #[error("unauthorized")]
    Unauthorized,

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    NotFound(String),

    #[error("client profile not found: {0}")]
    ProfileNotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("insufficient credits: balance {balance}, required {required}")]
    InsufficientCredits {
        balance: Decimal,
        required: Decimal,
        provider_balance: Option<Decimal>,
    },

    /// Upstream answered with an error status.
    #[error("provider returned HTTP {status}")]
    Provider { status: u16, body: String },

    #[error("provider unreachable: {0}")]
    ProviderUnreachable(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) | ApiError::InvalidRecipient(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) | ApiError::ProfileNotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::InsufficientCredits { .. } => StatusCode::PAYMENT_REQUIRED,
            ApiError::Provider { .. } => StatusCode::BAD_GATEWAY,
            ApiError::ProviderUnreachable(_) => StatusCode::GATEWAY_TIMEOUT,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            ApiError::BadRequest(_) => "BAD_REQUEST",
            ApiError::InvalidRecipient(_) => "INVALID_RECIPIENT",
            ApiError::Unauthorized => "UNAUTHORIZED",
            ApiError::Forbidden(_) => "FORBIDDEN",
            ApiError::NotFound(_) => "NOT_FOUND",
            ApiError::ProfileNotFound(_) => "PROFILE_NOT_FOUND",
            ApiError::Conflict(_) => "CONFLICT",
            ApiError::InsufficientCredits { .. } => "INSUFFICIENT_CREDITS",
            ApiError::Provider { .. } => "PROVIDER_ERROR",
            ApiError::ProviderUnreachable(_) => "PROVIDER_UNREACHABLE",
            ApiError::Internal(_) => "INTERNAL",
        }
    }

    /// Attach the provider's own balance to an insufficient-credit error.
    pub fn with_provider_balance(self, balance: Option<Decimal>) -> Self {
        match self {
            ApiError::InsufficientCredits { balance: b, required, .. } => ApiError::InsufficientCredits {
                balance: b,
                required,
                provider_balance: balance,
            },
            other => other,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        match &self {
            ApiError::Internal(msg) => tracing::error!("Internal error: {}", msg),
            ApiError::Provider { status, body } => {
                tracing::warn!(status, body = %body, "Provider error surfaced to caller")
            }
            ApiError::ProviderUnreachable(msg) => tracing::warn!("Provider unreachable: {}", msg),
            _ => tracing::debug!(code = self.code(), "Request rejected: {}", self),
        }

        let mut body = Map::new();
        body.insert("success".to_string(), Value::Bool(false));
        body.insert("error".to_string(), Value::String(self.to_string()));
        body.insert("code".to_string(), Value::String(self.code().to_string()));

        match &self {
            ApiError::InsufficientCredits {
                balance,
                required,
                provider_balance,
            } => {
                body.insert("balance".to_string(), json!(balance));
                body.insert("required".to_string(), json!(required));
                if let Some(provider_balance) = provider_balance {
                    body.insert("providerBalance".to_string(), json!(provider_balance));
                }
            }
            ApiError::InvalidRecipient(invalid) => {
                body.insert("invalid".to_string(), json!(invalid));
            }
            ApiError::Provider { status, body: upstream } => {
                body.insert("providerStatus".to_string(), json!(status));
                body.insert("providerBody".to_string(), json!(upstream));
            }
            _ => {}
        }

        (status, Json(Value::Object(body))).into_response()
    }
}

impl From<DatabaseError> for ApiError {
    fn from(err: DatabaseError) -> Self {
        match err {
            DatabaseError::NotFound {
                entity: "ClientProfile",
                id,
            } => ApiError::ProfileNotFound(id),
            DatabaseError::NotFound { entity, id } => ApiError::NotFound(format!("{entity} not found: {id}")),
            DatabaseError::AlreadyExists { entity, id } => {
                ApiError::Conflict(format!("{entity} already exists: {id}"))
            }
            DatabaseError::InsufficientCredits { .. } | DatabaseError::InvalidAmount(_) => {
                MeteringError::from(err).into()
            }
            DatabaseError::InvalidSetting { .. } => ApiError::BadRequest(err.to_string()),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl From<MeteringError> for ApiError {
    fn from(err: MeteringError) -> Self {
        match err {
            MeteringError::InsufficientCredits { balance, required } => ApiError::InsufficientCredits {
                balance,
                required,
                provider_balance: None,
            },
            MeteringError::ProfileNotFound(id) => ApiError::ProfileNotFound(id),
            MeteringError::InvalidCount(_) | MeteringError::InvalidAmount(_) => {
                ApiError::BadRequest(err.to_string())
            }
            MeteringError::Database(db) => db.into(),
        }
    }
}

impl From<ProviderError> for ApiError {
    fn from(err: ProviderError) -> Self {
        match err {
            ProviderError::Api { status, body } => ApiError::Provider { status, body },
            ProviderError::Unreachable(msg) => ApiError::ProviderUnreachable(msg),
            ProviderError::MissingApiKey => ApiError::Internal(err.to_string()),
            other => ApiError::Provider {
                status: 0,
                body: other.to_string(),
            },
        }
    }
}

impl From<RouterError> for ApiError {
    fn from(err: RouterError) -> Self {
        match err {
            RouterError::MissingField(_) | RouterError::NotAnObject => ApiError::BadRequest(err.to_string()),
            RouterError::Database(db) => db.into(),
            RouterError::Push(msg) => ApiError::Internal(msg),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<ValidationError> for ApiError {
    fn from(err: ValidationError) -> Self {
        ApiError::BadRequest(err.to_string())
    }
}

/// Result type for handlers.
pub type Result<T> = std::result::Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    async fn body_of(err: ApiError) -> (StatusCode, Value) {
        let response = err.into_response();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_insufficient_credits_shape() {
        let err = ApiError::from(MeteringError::InsufficientCredits {
            balance: Decimal::ZERO,
            required: Decimal::ONE,
        })
        .with_provider_balance(Some(Decimal::new(4200, 2)));

        let (status, body) = body_of(err).await;
        assert_eq!(status, StatusCode::PAYMENT_REQUIRED);
        assert_eq!(body["success"], false);
        assert_eq!(body["code"], "INSUFFICIENT_CREDITS");
        assert_eq!(body["balance"], "0");
        assert_eq!(body["providerBalance"], "42.00");
    }

    #[tokio::test]
    async fn test_provider_errors_map_to_gateway_statuses() {
        let (status, body) = body_of(
            ProviderError::Api {
                status: 422,
                body: "bad number".to_string(),
            }
            .into(),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(body["providerStatus"], 422);

        let (status, body) = body_of(ProviderError::Unreachable("timed out".to_string()).into()).await;
        assert_eq!(status, StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(body["code"], "PROVIDER_UNREACHABLE");
    }

    #[test]
    fn test_database_errors() {
        let err: ApiError = DatabaseError::NotFound {
            entity: "ClientProfile",
            id: "t1".to_string(),
        }
        .into();
        assert_eq!(err.code(), "PROFILE_NOT_FOUND");

        let err: ApiError = DatabaseError::AlreadyExists {
            entity: "Tenant",
            id: "a@example.com".to_string(),
        }
        .into();
        assert_eq!(err.status(), StatusCode::CONFLICT);
    }
}
