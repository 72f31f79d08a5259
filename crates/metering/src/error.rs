//! Error types for metering operations.

use database::credits;
use database::DatabaseError;
use rust_decimal::Decimal;
use thiserror::Error;

/// Errors that can occur while metering or adjusting credit.
#[derive(Debug, Error)]
pub enum MeteringError {
    /// Balance does not cover the requested debit.
    #[error("insufficient credits: balance {balance}, required {required}")]
    InsufficientCredits { balance: Decimal, required: Decimal },

    /// Tenant has no billing profile.
    #[error("client profile not found: {0}")]
    ProfileNotFound(String),

    /// Message count was zero or negative.
    #[error("message count must be positive, got {0}")]
    InvalidCount(i64),

    /// Credit amount cannot be applied.
    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    /// Storage failure.
    #[error(transparent)]
    Database(DatabaseError),
}

impl From<DatabaseError> for MeteringError {
    fn from(err: DatabaseError) -> Self {
        match err {
            DatabaseError::InsufficientCredits {
                balance_units,
                required_units,
                ..
            } => MeteringError::InsufficientCredits {
                balance: credits::from_units(balance_units),
                required: credits::from_units(required_units),
            },
            DatabaseError::NotFound {
                entity: "ClientProfile",
                id,
            } => MeteringError::ProfileNotFound(id),
            DatabaseError::InvalidAmount(msg) => MeteringError::InvalidAmount(msg),
            other => MeteringError::Database(other),
        }
    }
}

/// Result type for metering operations.
pub type Result<T> = std::result::Result<T, MeteringError>;
