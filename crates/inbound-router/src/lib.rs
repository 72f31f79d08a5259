//! Inbound SMS routing.
//!
//! Every webhook from the provider is assigned to at most one tenant by a
//! fixed chain of rules (business tag, conversation continuity, assigned
//! number, platform fallback) and stored, assigned or not. Tenants that opted
//! into push delivery receive a signed copy.
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//!
//! use database::PlatformSettings;
//! use inbound_router::{InboundRouter, PushClient};
//!
//! # async fn example(pool: &sqlx::SqlitePool, body: serde_json::Value) -> Result<(), Box<dyn std::error::Error>> {
//! let router = InboundRouter::new("+1", PushClient::new(Duration::from_secs(5))?);
//! let settings = PlatformSettings::load(pool).await?;
//!
//! let outcome = router.route_incoming(pool, &settings, &body).await?;
//! println!("{:?} via {}", outcome.assigned_tenant_id, outcome.strategy.as_str());
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod payload;
pub mod push;
pub mod reply;
pub mod router;

pub use error::{Result, RouterError};
pub use payload::{InboundPayload, MessageText};
pub use push::{PushClient, PushTarget};
pub use reply::reply_channel;
pub use router::{resolve_tenant, route_incoming, InboundRouter, Resolution, RouteOutcome, RouteStrategy};
