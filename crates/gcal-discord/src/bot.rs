//! Calendar bot built on the poise framework

use std::sync::Arc;

use poise::serenity_prelude as serenity;
use poise::serenity_prelude::GatewayIntents;
use tracing::{error, info};

use gcal_core::{
    CalendarCoordinator, CalendarTransport, Config, EventStore, MembershipMirror, UserId,
};

use crate::commands::{Data, get_commands};
use crate::error::{DiscordError, Result};
use crate::handler::event_handler;
use crate::transport::SerenityTransport;

/// Discord bot keeping one calendar message per guild
pub struct CalendarBot {
    config: Config,
    store: Arc<dyn EventStore>,
    mirror: Option<Arc<MembershipMirror>>,
}

impl CalendarBot {
    pub fn new(
        config: Config,
        store: Arc<dyn EventStore>,
        mirror: Option<Arc<MembershipMirror>>,
    ) -> Self {
        Self {
            config,
            store,
            mirror,
        }
    }

    /// Intents needed for prefix commands, calendar interactions and, when
    /// enabled, membership mirroring
    pub fn intents(&self) -> GatewayIntents {
        let mut intents = GatewayIntents::GUILDS
            | GatewayIntents::GUILD_MESSAGES
            | GatewayIntents::MESSAGE_CONTENT;
        if self.mirror.is_some() {
            // Privileged; must be enabled in the developer portal
            intents |= GatewayIntents::GUILD_MEMBERS;
        }
        intents
    }

    /// Connect and run until the gateway connection ends
    pub async fn start(self) -> Result<()> {
        let token = self
            .config
            .discord
            .token
            .clone()
            .filter(|t| !t.is_empty())
            .ok_or(DiscordError::TokenNotSet)?;
        let intents = self.intents();

        let Self {
            config,
            store,
            mirror,
        } = self;
        let settings = config.calendar.clone();

        let framework = poise::Framework::builder()
            .options(poise::FrameworkOptions {
                commands: get_commands(),
                prefix_options: poise::PrefixFrameworkOptions {
                    prefix: Some(config.discord.command_prefix.clone()),
                    ..Default::default()
                },
                event_handler: |ctx, event, framework, data| {
                    Box::pin(event_handler(ctx, event, framework, data))
                },
                on_error: |error| Box::pin(on_error(error)),
                ..Default::default()
            })
            .setup(move |ctx, ready, framework| {
                Box::pin(async move {
                    poise::builtins::register_globally(ctx, &framework.options().commands).await?;
                    info!("Registered {} commands", framework.options().commands.len());

                    let transport: Arc<dyn CalendarTransport> = Arc::new(SerenityTransport::new(
                        ctx.http.clone(),
                        UserId(ready.user.id.get()),
                    ));
                    let coordinator = CalendarCoordinator::new(store, transport, settings);
                    let mirror = mirror.map(|mirror| {
                        let (queue, _worker) = mirror.spawn_worker();
                        info!("Membership mirror worker started");
                        queue
                    });

                    Ok(Data {
                        coordinator: Arc::new(coordinator),
                        mirror,
                    })
                })
            })
            .build();

        info!("Starting Discord bot...");

        let mut client = serenity::ClientBuilder::new(token, intents)
            .framework(framework)
            .await?;

        client.start().await?;

        Ok(())
    }
}

async fn on_error(error: poise::FrameworkError<'_, Data, DiscordError>) {
    match error {
        poise::FrameworkError::Setup { error, .. } => {
            error!("Failed to start the bot: {}", error);
        }
        poise::FrameworkError::Command { error, ctx, .. } => {
            error!("Command /{} failed: {}", ctx.command().name, error);
        }
        poise::FrameworkError::EventHandler { error, event, .. } => {
            error!("Handling {} failed: {}", event.snake_case_name(), error);
        }
        other => {
            if let Err(e) = poise::builtins::on_error(other).await {
                error!("Error while handling error: {}", e);
            }
        }
    }
}
