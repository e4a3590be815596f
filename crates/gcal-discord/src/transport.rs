//! [`CalendarTransport`] over the Discord HTTP API

use std::sync::Arc;

use async_trait::async_trait;
use serenity::all::{
    ChannelId as DiscordChannelId, ChannelType, Colour, CreateChannel, CreateMessage, EditMessage,
    EditRole, GetMessages, GuildId as DiscordGuildId, Http, MessageId as DiscordMessageId,
    PermissionOverwrite, PermissionOverwriteType, Permissions, RoleId as DiscordRoleId,
    UserId as DiscordUserId,
};
use serenity::http::HttpError;
use tracing::debug;

use gcal_core::transport::TransportResult;
use gcal_core::{
    CalendarTransport, ChannelId, ChannelRef, DisplayPayload, GuildId, MessageId, MessageRef,
    OverrideTarget, PermissionOverride, RoleId, RoleRef, TransportError, UserId,
};

use crate::components::{calendar_buttons, calendar_embed};

/// Discord JSON error code for "Unknown Message"
const UNKNOWN_MESSAGE: isize = 10008;

pub struct SerenityTransport {
    http: Arc<Http>,
    bot_id: UserId,
}

impl SerenityTransport {
    pub fn new(http: Arc<Http>, bot_id: UserId) -> Self {
        Self { http, bot_id }
    }
}

fn rejected(error: serenity::Error) -> TransportError {
    TransportError::Rejected(error.to_string())
}

fn is_unknown_message(error: &serenity::Error) -> bool {
    match error {
        serenity::Error::Http(HttpError::UnsuccessfulRequest(response)) => {
            response.error.code == UNKNOWN_MESSAGE || response.status_code.as_u16() == 404
        }
        _ => false,
    }
}

/// Channel overwrite for one override; `@everyone` is the role whose id
/// equals the guild id
fn overwrite_for(guild_id: GuildId, rule: &PermissionOverride) -> PermissionOverwrite {
    let kind = match rule.target {
        OverrideTarget::Everyone => PermissionOverwriteType::Role(DiscordRoleId::new(guild_id.get())),
        OverrideTarget::Member(user) => PermissionOverwriteType::Member(DiscordUserId::new(user.get())),
    };

    if rule.allow_send {
        PermissionOverwrite {
            allow: Permissions::VIEW_CHANNEL | Permissions::SEND_MESSAGES | Permissions::EMBED_LINKS,
            deny: Permissions::empty(),
            kind,
        }
    } else {
        PermissionOverwrite {
            allow: Permissions::empty(),
            deny: Permissions::SEND_MESSAGES,
            kind,
        }
    }
}

#[async_trait]
impl CalendarTransport for SerenityTransport {
    fn bot_user_id(&self) -> UserId {
        self.bot_id
    }

    async fn find_role(&self, guild_id: GuildId, name: &str) -> TransportResult<Option<RoleRef>> {
        let roles = DiscordGuildId::new(guild_id.get())
            .roles(self.http.as_ref())
            .await
            .map_err(rejected)?;

        Ok(roles
            .values()
            .filter(|role| role.name == name)
            .min_by_key(|role| role.id)
            .map(|role| RoleRef {
                id: RoleId(role.id.get()),
                name: role.name.clone(),
            }))
    }

    async fn create_role(&self, guild_id: GuildId, name: &str) -> TransportResult<RoleRef> {
        let role = DiscordGuildId::new(guild_id.get())
            .create_role(self.http.as_ref(), EditRole::new().name(name).colour(Colour::BLUE))
            .await
            .map_err(rejected)?;
        debug!("Created role {} ({}) in guild {}", role.name, role.id, guild_id);

        Ok(RoleRef {
            id: RoleId(role.id.get()),
            name: role.name,
        })
    }

    async fn find_channel(&self, guild_id: GuildId, name: &str) -> TransportResult<Option<ChannelRef>> {
        let channels = DiscordGuildId::new(guild_id.get())
            .channels(self.http.as_ref())
            .await
            .map_err(rejected)?;

        Ok(channels
            .values()
            .filter(|channel| channel.kind == ChannelType::Text && channel.name == name)
            .min_by_key(|channel| channel.id)
            .map(|channel| ChannelRef {
                id: ChannelId(channel.id.get()),
                name: channel.name.clone(),
            }))
    }

    async fn create_channel(
        &self,
        guild_id: GuildId,
        name: &str,
        overrides: &[PermissionOverride],
    ) -> TransportResult<ChannelRef> {
        let builder = CreateChannel::new(name)
            .kind(ChannelType::Text)
            .permissions(overrides.iter().map(|rule| overwrite_for(guild_id, rule)));

        let channel = DiscordGuildId::new(guild_id.get())
            .create_channel(self.http.as_ref(), builder)
            .await
            .map_err(rejected)?;
        debug!("Created channel #{} ({}) in guild {}", channel.name, channel.id, guild_id);

        Ok(ChannelRef {
            id: ChannelId(channel.id.get()),
            name: channel.name,
        })
    }

    async fn send_message(
        &self,
        channel_id: ChannelId,
        payload: &DisplayPayload,
    ) -> TransportResult<MessageRef> {
        let message = DiscordChannelId::new(channel_id.get())
            .send_message(
                self.http.as_ref(),
                CreateMessage::new()
                    .embed(calendar_embed(payload))
                    .components(calendar_buttons()),
            )
            .await
            .map_err(rejected)?;

        Ok(MessageRef {
            channel_id,
            message_id: MessageId(message.id.get()),
            author_id: UserId(message.author.id.get()),
        })
    }

    async fn edit_message(
        &self,
        channel_id: ChannelId,
        message_id: MessageId,
        payload: &DisplayPayload,
    ) -> TransportResult<()> {
        let result = DiscordChannelId::new(channel_id.get())
            .edit_message(
                self.http.as_ref(),
                DiscordMessageId::new(message_id.get()),
                EditMessage::new()
                    .embed(calendar_embed(payload))
                    .components(calendar_buttons()),
            )
            .await;

        match result {
            Ok(_) => Ok(()),
            Err(e) if is_unknown_message(&e) => Err(TransportError::MessageNotFound(message_id)),
            Err(e) => Err(rejected(e)),
        }
    }

    async fn fetch_recent_messages(
        &self,
        channel_id: ChannelId,
        limit: u8,
    ) -> TransportResult<Vec<MessageRef>> {
        let messages = DiscordChannelId::new(channel_id.get())
            .messages(self.http.as_ref(), GetMessages::new().limit(limit))
            .await
            .map_err(rejected)?;

        // Discord returns the newest message first
        Ok(messages
            .into_iter()
            .map(|message| MessageRef {
                channel_id,
                message_id: MessageId(message.id.get()),
                author_id: UserId(message.author.id.get()),
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_everyone_override_targets_guild_role() {
        let rules = PermissionOverride::send_restricted(UserId(42));
        let everyone = overwrite_for(GuildId(7), &rules[0]);

        assert_eq!(everyone.kind, PermissionOverwriteType::Role(DiscordRoleId::new(7)));
        assert!(everyone.deny.contains(Permissions::SEND_MESSAGES));
        assert!(everyone.allow.is_empty());
    }

    #[test]
    fn test_bot_override_allows_posting() {
        let rules = PermissionOverride::send_restricted(UserId(42));
        let bot = overwrite_for(GuildId(7), &rules[1]);

        assert_eq!(bot.kind, PermissionOverwriteType::Member(DiscordUserId::new(42)));
        assert!(bot.allow.contains(Permissions::SEND_MESSAGES));
        assert!(bot.deny.is_empty());
    }

    #[test]
    fn test_non_http_errors_are_not_unknown_message() {
        let error = serenity::Error::Other("boom");
        assert!(!is_unknown_message(&error));
    }
}
