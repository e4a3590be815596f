//! gcal-core: guild calendar core library
//!
//! Event storage, membership mirroring, calendar rendering and the
//! coordinator that keeps one live calendar message per guild in sync with
//! the stored events. Platform access goes through the
//! [`CalendarTransport`] trait.

pub mod config;
pub mod coordinator;
pub mod error;
pub mod mirror;
pub mod model;
pub mod render;
pub mod store;
pub mod transport;

pub use config::{CalendarConfig, Config, DiscordConfig, MirrorConfig, StorageBackend, StorageConfig};
pub use coordinator::{
    Acknowledgement, Actor, AddRequest, CalendarCoordinator, CalendarRequest, GuildState,
    MutationOutcome, MutationReport, RemoveRequest, SetupReport, SetupRequest,
};
pub use error::{Error, Result};
pub use mirror::{MembershipMirror, MirrorJob, MirrorOutcome, MirrorQueue, ReconcileReport};
pub use model::{
    CanonicalMessage, ChannelId, Event, EventId, GuildId, MemberRecord, MessageId, NewEvent, RoleId,
    UserId,
};
pub use render::{DisplayField, DisplayPayload, RenderOptions, render};
pub use store::{
    EventSelector, EventStore, IdentityScheme, JsonFileEventStore, MemberStore, SqliteEventStore,
    SqliteMemberStore, SqlitePool, StoreError,
};
pub use transport::{
    CalendarTransport, ChannelRef, MessageRef, OverrideTarget, PermissionOverride, RoleRef,
    TransportError,
};
