//! Database error types.

use thiserror::Error;

/// Errors that can occur during database operations.
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// SQLx error (connection, query, etc.)
    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    /// Migration error
    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// JSON column could not be encoded
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// Record not found
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// Record already exists
    #[error("{entity} already exists: {id}")]
    AlreadyExists { entity: &'static str, id: String },

    /// Balance too low for the requested debit
    #[error("insufficient credits for {tenant_id}: balance {balance_units}, required {required_units}")]
    InsufficientCredits {
        tenant_id: String,
        balance_units: i64,
        required_units: i64,
    },

    /// Amount cannot be represented in credit units
    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    /// Stored configuration value failed validation
    #[error("invalid setting {key}: {reason}")]
    InvalidSetting { key: String, reason: String },
}

impl DatabaseError {
    /// Map a unique-constraint violation to `AlreadyExists`.
    pub(crate) fn from_insert(err: sqlx::Error, entity: &'static str, id: impl Into<String>) -> Self {
        if let sqlx::Error::Database(ref db_err) = err {
            if db_err.is_unique_violation() {
                return DatabaseError::AlreadyExists {
                    entity,
                    id: id.into(),
                };
            }
        }
        DatabaseError::Sqlx(err)
    }
}

/// Result type for database operations.
pub type Result<T> = std::result::Result<T, DatabaseError>;
