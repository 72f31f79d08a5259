//! Credit metering for the SMS platform.
//!
//! Every outbound send is billed at one credit per message through
//! [`engine::meter_send`]. Pricing is resolved per group for reporting, pool
//! aggregates are kept best-effort, and [`reconcile::reconcile_credits`]
//! repairs historical under-billing.
//!
//! # Example
//!
//! ```no_run
//! use database::models::MessageStatus;
//! use metering::{meter_send, MeterRequest};
//!
//! # async fn example(pool: &sqlx::SqlitePool) -> Result<(), metering::MeteringError> {
//! let outcome = meter_send(
//!     pool,
//!     MeterRequest {
//!         tenant_id: "tenant-1".to_string(),
//!         message_count: 1,
//!         endpoint: "sendsingle".to_string(),
//!         provider_message_id: Some("abc123".to_string()),
//!         provider_message_ids: vec!["abc123".to_string()],
//!         status: MessageStatus::Sent,
//!         request_payload: serde_json::json!({"recipient": "+14155551234"}),
//!         response_payload: serde_json::json!({"messageId": "abc123", "status": "sent"}),
//!         recipient: Some("+14155551234".to_string()),
//!         recipients: vec![],
//!         sender_phone: None,
//!         is_example: false,
//!     },
//! )
//! .await?;
//! println!("balance now {}", outcome.new_balance);
//! # Ok(())
//! # }
//! ```

pub mod engine;
pub mod error;
pub mod pools;
pub mod pricing;
pub mod reconcile;

pub use engine::{
    adjust_credits, create_admin_audit_log, meter_send, pre_check, record_unbilled_send, transfer_credits,
    AuditRequest, MeterOutcome, MeterRequest,
};
pub use error::{MeteringError, Result};
pub use pricing::{resolve_pricing, Pricing, PricingSource};
pub use reconcile::{reconcile_credits, ReconcileReport};

#[cfg(test)]
pub(crate) mod test_support {
    use database::models::{Role, Tenant, TransactionKind};
    use database::{credits, ledger, tenant, Database};

    pub async fn test_db() -> Database {
        let db = Database::connect("sqlite::memory:").await.unwrap();
        db.migrate().await.unwrap();
        db
    }

    /// A client tenant seeded with `whole_credits` credits.
    pub async fn funded_tenant(db: &Database, email: &str, whole_credits: i64, group_id: Option<&str>) -> Tenant {
        let tenant = tenant::create_tenant(db.pool(), email, "Test", Role::Client, group_id)
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
