//! Upstream SMS provider client.
//!
//! A thin wrapper over the provider's HTTP API: send-single, send-bulk,
//! send-bulk-multi, status and balance. The provider's synchronous response
//! is the commit point for a send; this crate never retries.
//!
//! # Example
//!
//! ```no_run
//! use provider_gateway::{ProviderClient, ProviderConfig, SendSingleRequest};
//!
//! # async fn example() -> Result<(), provider_gateway::ProviderError> {
//! let config = ProviderConfig::new("https://sms.example.com/api").with_api_key("token");
//! let client = ProviderClient::new(config)?;
//!
//! let result = client
//!     .send_single(&SendSingleRequest::new("+14155551234", "Hello!"))
//!     .await?;
//! println!("provider id {:?}, status {:?}", result.message_id, result.status);
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod config;
pub mod error;
pub mod types;

pub use client::ProviderClient;
pub use config::ProviderConfig;
pub use error::ProviderError;
pub use types::*;
