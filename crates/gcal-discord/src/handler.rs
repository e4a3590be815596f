//! Gateway event handling: calendar buttons, dialog submissions and
//! membership notifications

use poise::serenity_prelude as serenity;
use poise::serenity_prelude::{
    ComponentInteraction, CreateInteractionResponse, CreateInteractionResponseMessage,
    EditInteractionResponse, FullEvent, Interaction, ModalInteraction,
};
use tracing::{debug, info};

use gcal_core::{GuildId, MirrorJob, UserId};

use crate::commands::Data;
use crate::components::{
    CalendarAction, ModalInputs, ModalKind, actor_from, add_modal, member_record, remove_modal,
};
use crate::error::{DiscordError, Result};

/// poise event handler
pub async fn event_handler(
    ctx: &serenity::Context,
    event: &FullEvent,
    _framework: poise::FrameworkContext<'_, Data, DiscordError>,
    data: &Data,
) -> Result<()> {
    match event {
        FullEvent::Ready { data_about_bot } => {
            info!(
                "Connected as {} ({} guilds)",
                data_about_bot.user.name,
                data_about_bot.guilds.len()
            );
        }
        FullEvent::InteractionCreate { interaction } => match interaction {
            Interaction::Component(component) => handle_component(ctx, component, data).await?,
            Interaction::Modal(modal) => handle_modal(ctx, modal, data).await?,
            _ => {}
        },
        FullEvent::GuildCreate { guild, .. } => {
            let Some(mirror) = data.mirror.as_ref() else {
                return Ok(());
            };
            // Only a complete member list can tell who left while offline
            if (guild.members.len() as u64) < guild.member_count {
                debug!(
                    "Skipping member reconcile for guild {}: {}/{} members cached",
                    guild.id,
                    guild.members.len(),
                    guild.member_count
                );
                return Ok(());
            }
            mirror.submit(MirrorJob::Reconcile {
                guild_id: GuildId(guild.id.get()),
                members: guild.members.values().map(member_record).collect(),
            });
        }
        FullEvent::GuildMemberAddition { new_member } => {
            submit_mirror(data, MirrorJob::Join(member_record(new_member)));
        }
        FullEvent::GuildMemberRemoval { guild_id, user, .. } => {
            submit_mirror(
                data,
                MirrorJob::Leave {
                    guild_id: GuildId(guild_id.get()),
                    user_id: UserId(user.id.get()),
                },
            );
        }
        FullEvent::GuildMemberUpdate {
            old_if_available,
            new,
            ..
        } => {
            let Some(new) = new else {
                return Ok(());
            };
            submit_mirror(
                data,
                MirrorJob::Update {
                    before: old_if_available.as_ref().map(member_record),
                    after: member_record(new),
                },
            );
        }
        _ => {}
    }

    Ok(())
}

/// Hand a membership change to the mirror worker; no-op when mirroring is off
fn submit_mirror(data: &Data, job: MirrorJob) {
    if let Some(mirror) = &data.mirror {
        mirror.submit(job);
    }
}

/// Button press: check the role, then open the matching dialog
async fn handle_component(
    ctx: &serenity::Context,
    component: &ComponentInteraction,
    data: &Data,
) -> Result<()> {
    let Some(action) = CalendarAction::from_custom_id(&component.data.custom_id) else {
        return Ok(());
    };
    let Some(guild_id) = component.guild_id else {
        return Ok(());
    };

    let actor = actor_from(&component.user, component.member.as_ref());
    let response = match data
        .coordinator
        .authorize(GuildId(guild_id.get()), &actor)
        .await
    {
        Ok(()) => {
            let modal = match action {
                CalendarAction::Add => add_modal(),
                CalendarAction::Remove => remove_modal(data.coordinator.identity_scheme()),
            };
            CreateInteractionResponse::Modal(modal)
        }
        Err(e) => {
            debug!(
                "Refusing {:?} dialog for {} in guild {}: {}",
                action, component.user.name, guild_id, e
            );
            CreateInteractionResponse::Message(
                CreateInteractionResponseMessage::new()
                    .content(e.user_message())
                    .ephemeral(true),
            )
        }
    };

    component.create_response(&ctx.http, response).await?;
    Ok(())
}

/// Dialog submission: acknowledge ephemerally, run the request, report back
async fn handle_modal(ctx: &serenity::Context, modal: &ModalInteraction, data: &Data) -> Result<()> {
    let Some(kind) = ModalKind::from_custom_id(&modal.data.custom_id) else {
        return Ok(());
    };
    let Some(guild_id) = modal.guild_id else {
        return Ok(());
    };

    // Store and Discord round trips may exceed the 3s response window
    modal.defer_ephemeral(&ctx.http).await?;

    let actor = actor_from(&modal.user, modal.member.as_ref());
    let request = ModalInputs::from_interaction(modal).into_request(kind, GuildId(guild_id.get()), actor);
    let ack = data.coordinator.dispatch(request).await;
    if !ack.ok {
        info!(
            "{:?} request from {} in guild {} failed: {}",
            kind, modal.user.name, guild_id, ack.text
        );
    }

    modal
        .edit_response(&ctx.http, EditInteractionResponse::new().content(ack.text))
        .await?;
    Ok(())
}
