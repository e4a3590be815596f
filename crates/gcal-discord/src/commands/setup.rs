//! /setup command - create role, channel and calendar message

use tracing::info;

use gcal_core::{CalendarRequest, GuildId, SetupRequest, UserId};

use crate::commands::Data;
use crate::error::Result;

/// Set up the calendar for this server
#[poise::command(
    slash_command,
    prefix_command,
    guild_only,
    required_permissions = "MANAGE_GUILD",
    rename = "setup"
)]
pub async fn setup(ctx: poise::Context<'_, Data, crate::error::DiscordError>) -> Result<()> {
    // Creating role and channel can take a while
    ctx.defer_ephemeral().await?;

    let Some(guild_id) = ctx.guild_id() else {
        return Ok(());
    };
    info!("Processing /setup in guild {} from {}", guild_id, ctx.author().name);

    let ack = ctx
        .data()
        .coordinator
        .dispatch(CalendarRequest::Setup(SetupRequest {
            guild_id: GuildId(guild_id.get()),
            invoker: UserId(ctx.author().id.get()),
        }))
        .await;

    ctx.send(poise::CreateReply::default().content(ack.text).ephemeral(true))
        .await?;

    Ok(())
}
