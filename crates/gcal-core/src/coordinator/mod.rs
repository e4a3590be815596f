//! Calendar coordinator.
//!
//! Ties the event store, the renderer and the platform transport together:
//! - locates (or creates, during setup) the canonical message of a guild
//! - checks the access role inside the same critical section as the mutation
//! - runs mutate → list → render → edit as one serialized unit per guild
//!
//! Every request for a guild holds that guild's lock for its whole duration,
//! including the awaits on the store and the transport, and is bounded by a
//! deadline. A request that times out releases the lock; whatever the store
//! had already committed stays committed.

mod locks;
mod request;


use std::future::Future;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use dashmap::DashMap;
use tracing::{debug, info, warn};

use crate::config::CalendarConfig;
use crate::model::{CanonicalMessage, ChannelId, Event, EventId, GuildId, NewEvent};
use crate::render::{RenderOptions, render};
use crate::store::{EventSelector, EventStore, IdentityScheme};
use crate::transport::{CalendarTransport, PermissionOverride, TransportError};
use crate::{Error, Result};

pub use locks::GuildLocks;
pub use request::{
    Acknowledgement, Actor, AddRequest, CalendarRequest, MutationOutcome, MutationReport,
    RemoveRequest, SetupReport, SetupRequest,
};

/// Lifecycle of a guild as seen by this process
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuildState {
    /// No canonical message known yet
    Uninitialized,
    Active,
}

pub struct CalendarCoordinator {
    store: Arc<dyn EventStore>,
    transport: Arc<dyn CalendarTransport>,
    settings: CalendarConfig,
    render_options: RenderOptions,
    request_timeout: Duration,
    locks: GuildLocks,
    canonical: DashMap<GuildId, CanonicalMessage>,
}

impl CalendarCoordinator {
    pub fn new(
        store: Arc<dyn EventStore>,
        transport: Arc<dyn CalendarTransport>,
        settings: CalendarConfig,
    ) -> Self {
        Self {
            store,
            transport,
            render_options: settings.render_options(),
            request_timeout: settings.request_timeout(),
            settings,
            locks: GuildLocks::new(),
            canonical: DashMap::new(),
        }
    }

    /// Override the per-request deadline
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn settings(&self) -> &CalendarConfig {
        &self.settings
    }

    /// How the backing store identifies events for removal
    pub fn identity_scheme(&self) -> IdentityScheme {
        self.store.identity_scheme()
    }

    pub fn guild_state(&self, guild_id: GuildId) -> GuildState {
        if self.canonical.contains_key(&guild_id) {
            GuildState::Active
        } else {
            GuildState::Uninitialized
        }
    }

    /// Run any request and turn the result into the user-facing reply
    pub async fn dispatch(&self, request: CalendarRequest) -> Acknowledgement {
        let guild_id = request.guild_id();
        let result = match request {
            CalendarRequest::Setup(r) => {
                info!("Setup requested for guild {} by {}", r.guild_id, r.invoker);
                self.setup(r.guild_id).await.map(|report| report.acknowledgement())
            }
            CalendarRequest::Add(r) => self
                .handle_add(r.guild_id, &r.actor, &r.title, &r.date, &r.time)
                .await
                .map(|report| report.acknowledgement()),
            CalendarRequest::Remove(r) => self
                .handle_remove(r.guild_id, &r.actor, &r.identifier)
                .await
                .map(|report| report.acknowledgement()),
        };

        result.unwrap_or_else(|e| {
            debug!("Request for guild {} failed: {}", guild_id, e);
            Acknowledgement::failure(&e)
        })
    }

    /// Ensure role, channel and canonical message exist. Idempotent: a
    /// second call finds everything and only re-renders.
    pub async fn setup(&self, guild_id: GuildId) -> Result<SetupReport> {
        self.serialized(guild_id, async {
            let mut report = SetupReport::default();
            let transport = &self.transport;

            if transport.find_role(guild_id, &self.settings.role_name).await?.is_none() {
                transport.create_role(guild_id, &self.settings.role_name).await?;
                info!("Created role \"{}\" in guild {}", self.settings.role_name, guild_id);
                report.role_created = true;
            }

            let channel = match transport.find_channel(guild_id, &self.settings.channel_name).await? {
                Some(channel) => channel,
                None => {
                    let overrides = PermissionOverride::send_restricted(transport.bot_user_id());
                    let channel = transport
                        .create_channel(guild_id, &self.settings.channel_name, &overrides)
                        .await?;
                    info!("Created channel #{} in guild {}", channel.name, guild_id);
                    report.channel_created = true;
                    channel
                }
            };

            let mut existing = match self.known_pointer(guild_id).await? {
                Some(pointer) if pointer.channel_id == channel.id => Some(pointer),
                _ => self.scan(guild_id, channel.id).await?,
            };

            let events = self.store.list_events(guild_id).await?;
            let payload = render(&events, &self.render_options);

            // A stale pointer gets one rescan before a new message is posted
            let mut rescanned = false;
            while let Some(pointer) = existing {
                match transport
                    .edit_message(pointer.channel_id, pointer.message_id, &payload)
                    .await
                {
                    Ok(()) => {
                        debug!("Setup re-rendered existing calendar in guild {}", guild_id);
                        return Ok(report);
                    }
                    Err(TransportError::MessageNotFound(_)) => {
                        self.forget(guild_id).await;
                        existing = if rescanned {
                            None
                        } else {
                            rescanned = true;
                            self.scan(guild_id, channel.id)
                                .await?
                                .filter(|found| *found != pointer)
                        };
                    }
                    Err(e) => return Err(e.into()),
                }
            }

            let sent = transport.send_message(channel.id, &payload).await?;
            self.remember(
                guild_id,
                CanonicalMessage {
                    channel_id: sent.channel_id,
                    message_id: sent.message_id,
                },
            )
            .await;
            info!("Posted calendar message {} in guild {}", sent.message_id, guild_id);
            report.message_created = true;
            Ok(report)
        })
        .await
    }

    /// Permission check for opening a dialog; the mutation re-checks
    pub async fn authorize(&self, guild_id: GuildId, actor: &Actor) -> Result<()> {
        let role = self
            .transport
            .find_role(guild_id, &self.settings.role_name)
            .await?
            .ok_or(Error::PermissionDenied)?;
        if actor.has_role(role.id) {
            Ok(())
        } else {
            Err(Error::PermissionDenied)
        }
    }

    pub async fn handle_add(
        &self,
        guild_id: GuildId,
        actor: &Actor,
        title: &str,
        date: &str,
        time: &str,
    ) -> Result<MutationReport> {
        let committed = OnceLock::new();
        let result = self
            .serialized(guild_id, async {
                self.authorize(guild_id, actor).await?;
                let new_event = NewEvent::parse(title, date, time)?;
                let target = self.require_canonical(guild_id).await?;

                let event = self.store.add_event(guild_id, new_event).await?;
                info!(
                    "User {} added event {:?} \"{}\" in guild {}",
                    actor.user_id, event.id, event.title, guild_id
                );
                let outcome = MutationOutcome::Added(event);
                let _ = committed.set(outcome.clone());

                let render = self.publish(guild_id, target).await;
                Ok(MutationReport { outcome, render })
            })
            .await;
        Self::keep_committed(result, committed)
    }

    pub async fn handle_remove(
        &self,
        guild_id: GuildId,
        actor: &Actor,
        identifier: &str,
    ) -> Result<MutationReport> {
        let committed = OnceLock::new();
        let result = self
            .serialized(guild_id, async {
                self.authorize(guild_id, actor).await?;
                let selector = self.parse_selector(identifier)?;
                let target = self.require_canonical(guild_id).await?;

                let count = self.store.remove(guild_id, &selector).await?;
                info!(
                    "User {} removed {} event(s) matching {:?} in guild {}",
                    actor.user_id, count, selector, guild_id
                );
                let outcome = MutationOutcome::Removed { selector, count };
                let _ = committed.set(outcome.clone());

                let render = self.publish(guild_id, target).await;
                Ok(MutationReport { outcome, render })
            })
            .await;
        Self::keep_committed(result, committed)
    }

    /// Find the canonical message: in-memory pointer, then the persisted
    /// pointer, then a bounded scan of the calendar channel for the newest
    /// message authored by the bot.
    pub async fn locate_canonical_message(&self, guild_id: GuildId) -> Result<Option<CanonicalMessage>> {
        if let Some(pointer) = self.known_pointer(guild_id).await? {
            return Ok(Some(pointer));
        }

        match self
            .transport
            .find_channel(guild_id, &self.settings.channel_name)
            .await?
        {
            Some(channel) => self.scan(guild_id, channel.id).await,
            None => Ok(None),
        }
    }

    /// Current events of a guild, for read-only listings
    pub async fn list_events(&self, guild_id: GuildId) -> Result<Vec<Event>> {
        Ok(self.store.list_events(guild_id).await?)
    }

    /// Interpret a remove identifier according to the store's identity scheme
    pub fn parse_selector(&self, identifier: &str) -> Result<EventSelector> {
        let identifier = identifier.trim();
        if identifier.is_empty() {
            return Err(Error::Validation("Bitte gib einen Termin an".to_string()));
        }

        match self.store.identity_scheme() {
            IdentityScheme::Numeric => identifier
                .trim_start_matches('#')
                .parse::<i64>()
                .map(|id| EventSelector::Id(EventId(id)))
                .map_err(|_| {
                    Error::Validation(format!("\"{}\" ist keine gültige Termin-ID", identifier))
                }),
            IdentityScheme::Title => Ok(EventSelector::Title(identifier.to_string())),
        }
    }

    async fn serialized<F, T>(&self, guild_id: GuildId, op: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        let lock = self.locks.lock_for(guild_id);
        let deadline = self.request_timeout;
        let guarded = async {
            let _guard = lock.lock().await;
            op.await
        };

        match tokio::time::timeout(deadline, guarded).await {
            Ok(result) => result,
            Err(_) => {
                warn!("Request for guild {} exceeded {:?}", guild_id, deadline);
                Err(Error::Timeout(deadline))
            }
        }
    }

    /// A deadline that fires after the store write still reports the
    /// committed mutation, with the timeout as its render failure
    fn keep_committed(
        result: Result<MutationReport>,
        committed: OnceLock<MutationOutcome>,
    ) -> Result<MutationReport> {
        match (result, committed.into_inner()) {
            (Err(Error::Timeout(limit)), Some(outcome)) => Ok(MutationReport {
                outcome,
                render: Err(Error::Timeout(limit)),
            }),
            (result, _) => result,
        }
    }

    async fn require_canonical(&self, guild_id: GuildId) -> Result<CanonicalMessage> {
        self.locate_canonical_message(guild_id)
            .await?
            .ok_or(Error::RenderTargetMissing)
    }

    /// Re-render committed state onto `target`, rescanning once if the
    /// message has disappeared.
    async fn publish(&self, guild_id: GuildId, target: CanonicalMessage) -> Result<()> {
        let events = self.store.list_events(guild_id).await?;
        let payload = render(&events, &self.render_options);

        match self
            .transport
            .edit_message(target.channel_id, target.message_id, &payload)
            .await
        {
            Ok(()) => Ok(()),
            Err(TransportError::MessageNotFound(_)) => {
                warn!(
                    "Calendar message {} in guild {} vanished, rescanning",
                    target.message_id, guild_id
                );
                self.forget(guild_id).await;
                match self.scan(guild_id, target.channel_id).await? {
                    Some(found) if found != target => {
                        self.transport
                            .edit_message(found.channel_id, found.message_id, &payload)
                            .await?;
                        Ok(())
                    }
                    _ => Err(Error::RenderTargetMissing),
                }
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn known_pointer(&self, guild_id: GuildId) -> Result<Option<CanonicalMessage>> {
        if let Some(pointer) = self.canonical.get(&guild_id) {
            return Ok(Some(*pointer));
        }
        let stored = self.store.canonical_message(guild_id).await?;
        if let Some(pointer) = stored {
            self.canonical.insert(guild_id, pointer);
        }
        Ok(stored)
    }

    async fn scan(&self, guild_id: GuildId, channel_id: ChannelId) -> Result<Option<CanonicalMessage>> {
        let bot = self.transport.bot_user_id();
        let recent = self
            .transport
            .fetch_recent_messages(channel_id, self.settings.scan_limit())
            .await?;

        match recent.into_iter().find(|m| m.author_id == bot) {
            Some(found) => {
                let pointer = CanonicalMessage {
                    channel_id: found.channel_id,
                    message_id: found.message_id,
                };
                debug!("Rediscovered calendar message {} in guild {}", pointer.message_id, guild_id);
                self.remember(guild_id, pointer).await;
                Ok(Some(pointer))
            }
            None => {
                debug!(
                    "No bot message within the last {} messages of channel {}",
                    self.settings.scan_limit(),
                    channel_id
                );
                Ok(None)
            }
        }
    }

    async fn remember(&self, guild_id: GuildId, pointer: CanonicalMessage) {
        self.canonical.insert(guild_id, pointer);
        if let Err(e) = self.store.save_canonical_message(guild_id, pointer).await {
            warn!("Failed to persist calendar pointer for guild {}: {}", guild_id, e);
        }
    }

    async fn forget(&self, guild_id: GuildId) {
        self.canonical.remove(&guild_id);
        if let Err(e) = self.store.clear_canonical_message(guild_id).await {
            warn!("Failed to clear calendar pointer for guild {}: {}", guild_id, e);
        }
    }
}
