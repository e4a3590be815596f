//! /termine command - list the guild's events with their ids

use tracing::info;

use gcal_core::{Event, GuildId};

use crate::commands::Data;
use crate::error::Result;

/// Discord message length limit, with room for the truncation marker
const MAX_REPLY_LEN: usize = 1900;

fn format_listing(events: &[Event]) -> String {
    if events.is_empty() {
        return "Noch keine Termine eingetragen.".to_string();
    }

    let mut out = String::from("**Termine:**\n");
    for (shown, event) in events.iter().enumerate() {
        let line = match event.id {
            Some(id) => format!("`#{}` {} | {} - {}\n", id, event.date, event.time, event.title),
            None => format!("{} | {} - {}\n", event.date, event.time, event.title),
        };
        if out.len() + line.len() > MAX_REPLY_LEN {
            out.push_str(&format!("… und {} weitere", events.len() - shown));
            break;
        }
        out.push_str(&line);
    }
    out
}

/// List all events of this server
#[poise::command(slash_command, guild_only, rename = "termine")]
pub async fn termine(ctx: poise::Context<'_, Data, crate::error::DiscordError>) -> Result<()> {
    let Some(guild_id) = ctx.guild_id() else {
        return Ok(());
    };
    info!("Listing events of guild {}", guild_id);

    let response = match ctx.data().coordinator.list_events(GuildId(guild_id.get())).await {
        Ok(events) => format_listing(&events),
        Err(e) => e.user_message(),
    };

    ctx.send(poise::CreateReply::default().content(response).ephemeral(true))
        .await?;

    Ok(())
}
