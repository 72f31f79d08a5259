//! Reply metadata for outbound replies to inbound conversations.

use database::incoming_message::{self, ReplyChannel};
use sqlx::SqlitePool;

use crate::error::Result;

/// Modem and port to reply on, taken from the latest active inbound message
/// `phone` sent to the tenant. `None` when there is nothing to reuse.
pub async fn reply_channel(pool: &SqlitePool, tenant_id: &str, phone: &str) -> Result<Option<ReplyChannel>> {
    let channel = incoming_message::latest_reply_channel(pool, tenant_id, phone).await?;
    Ok(channel.filter(|c| !c.is_empty()))
}
