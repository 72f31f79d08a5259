//! Error types for inbound routing.

use database::DatabaseError;
use thiserror::Error;

/// Errors that can occur while accepting an inbound message.
///
/// An unresolved tenant is not an error; it is persisted as unassigned.
#[derive(Debug, Error)]
pub enum RouterError {
    /// Webhook payload lacks a required field.
    #[error("missing required field: {0}")]
    MissingField(&'static str),

    /// Webhook body is not a JSON object.
    #[error("payload must be a JSON object")]
    NotAnObject,

    /// Storage failure while persisting the message.
    #[error("database error: {0}")]
    Database(#[from] DatabaseError),

    /// Push delivery failed.
    #[error("push delivery failed: {0}")]
    Push(String),
}

/// Result type for routing operations.
pub type Result<T> = std::result::Result<T, RouterError>;
