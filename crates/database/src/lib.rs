//! SQLite ledger store for the SMS platform.
//!
//! This crate owns every persisted table: tenants and their billing profiles,
//! API keys, the global configuration store, message logs, the append-only
//! credit ledger, inbound messages and contacts. Operations are free async
//! functions taking a `&SqlitePool`, grouped by entity.
//!
//! # Example
//!
//! ```no_run
//! use database::{Database, tenant, models::Role};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let db = Database::connect("sqlite:sms.db?mode=rwc").await?;
//!     db.migrate().await?;
//!
//!     let tenant = tenant::create_tenant(db.pool(), "ops@example.com", "Ops", Role::Client, None).await?;
//!     println!("created {}", tenant.id);
//!     Ok(())
//! }
//! ```

pub mod api_key;
pub mod client_profile;
pub mod contact;
pub mod credit_transaction;
pub mod credits;
pub mod diagnostics;
pub mod error;
pub mod incoming_message;
pub mod ledger;
pub mod message_log;
pub mod models;
pub mod settings;
pub mod system_config;
pub mod tenant;
pub mod validation;

pub use error::{DatabaseError, Result};
pub use models::{
    ApiKey, ClientProfile, ConfigEntry, Contact, ContactGroup, ContactSource, CreditTransaction,
    DeliveryMode, InboundStatus, IncomingMessage, Lifecycle, MessageLog, MessageStatus,
    NewIncomingMessage, NewMessageLog, Role, Tenant, TransactionKind, WebhookDiagnostics,
};
pub use settings::PlatformSettings;
pub use validation::ValidationError;

use std::str::FromStr;
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;

/// Database connection wrapper.
#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Default pool size for database connections.
    const DEFAULT_POOL_SIZE: u32 = 20;

    /// Connect to a SQLite database.
    ///
    /// The URL should be in the format `sqlite:path/to/db.sqlite?mode=rwc`.
    /// `sqlite::memory:` opens a private in-memory database, useful for tests.
    pub async fn connect(url: &str) -> Result<Self> {
        Self::connect_with_pool_size(url, Self::DEFAULT_POOL_SIZE).await
    }

    /// Connect to a SQLite database with a custom pool size.
    pub async fn connect_with_pool_size(url: &str, pool_size: u32) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(url)?
            .create_if_missing(true)
            .foreign_keys(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(30));

        let pool = SqlitePoolOptions::new()
            .max_connections(pool_size)
            .acquire_timeout(Duration::from_secs(30))
            .connect_with(options)
            .await?;

        tracing::info!(url, pool_size, "Connected to database");

        Ok(Self { pool })
    }

    /// Run database migrations.
    pub async fn migrate(&self) -> Result<()> {
        tracing::info!("Running database migrations...");

        sqlx::migrate!("./migrations").run(&self.pool).await?;

        tracing::info!("Migrations complete");
        Ok(())
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Close the database connection pool.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    pub async fn test_db() -> Database {
        let db = Database::connect("sqlite::memory:").await.unwrap();
        db.migrate().await.unwrap();
        db
    }

    /// Create a client tenant with a profile holding `whole_credits` credits.
    pub async fn funded_tenant(db: &Database, email: &str, whole_credits: i64) -> Tenant {
        let tenant = tenant::create_tenant(db.pool(), email, "Test", Role::Client, None)
            .await
            .unwrap();
        if whole_credits > 0 {
            ledger::adjust_balance(
                db.pool(),
                &tenant.id,
                whole_credits * credits::UNITS_PER_CREDIT,
                TransactionKind::AdminCreditAdd,
                "seed",
            )
            .await
            .unwrap();
        }
        tenant
    }
}
