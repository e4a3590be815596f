//! Capability interface onto the messaging platform.
//!
//! The coordinator only talks to the platform through [`CalendarTransport`];
//! `gcal-discord` provides the serenity implementation.

use async_trait::async_trait;
use thiserror::Error;

use crate::model::{ChannelId, GuildId, MessageId, RoleId, UserId};
use crate::render::DisplayPayload;

#[derive(Debug, Error)]
pub enum TransportError {
    /// The message to edit no longer exists
    #[error("message {0} not found")]
    MessageNotFound(MessageId),

    #[error("platform rejected the request: {0}")]
    Rejected(String),
}

pub type TransportResult<T> = std::result::Result<T, TransportError>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleRef {
    pub id: RoleId,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelRef {
    pub id: ChannelId,
    pub name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageRef {
    pub channel_id: ChannelId,
    pub message_id: MessageId,
    pub author_id: UserId,
}

/// Who a channel permission override applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverrideTarget {
    /// The guild's default role
    Everyone,
    Member(UserId),
}

/// Allow or deny posting in a channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PermissionOverride {
    pub target: OverrideTarget,
    pub allow_send: bool,
}

impl PermissionOverride {
    /// Only `bot` may post; everyone else reads
    pub fn send_restricted(bot: UserId) -> Vec<Self> {
        vec![
            Self {
                target: OverrideTarget::Everyone,
                allow_send: false,
            },
            Self {
                target: OverrideTarget::Member(bot),
                allow_send: true,
            },
        ]
    }
}

#[async_trait]
pub trait CalendarTransport: Send + Sync {
    /// Identity the bot posts as; used to recognise the canonical message
    fn bot_user_id(&self) -> UserId;

    async fn find_role(&self, guild_id: GuildId, name: &str) -> TransportResult<Option<RoleRef>>;

    async fn create_role(&self, guild_id: GuildId, name: &str) -> TransportResult<RoleRef>;

    async fn find_channel(&self, guild_id: GuildId, name: &str) -> TransportResult<Option<ChannelRef>>;

    async fn create_channel(
        &self,
        guild_id: GuildId,
        name: &str,
        overrides: &[PermissionOverride],
    ) -> TransportResult<ChannelRef>;

    async fn send_message(
        &self,
        channel_id: ChannelId,
        payload: &DisplayPayload,
    ) -> TransportResult<MessageRef>;

    /// Fails with [`TransportError::MessageNotFound`] if the message is gone
    async fn edit_message(
        &self,
        channel_id: ChannelId,
        message_id: MessageId,
        payload: &DisplayPayload,
    ) -> TransportResult<()>;

    /// Newest first
    async fn fetch_recent_messages(
        &self,
        channel_id: ChannelId,
        limit: u8,
    ) -> TransportResult<Vec<MessageRef>>;
}
