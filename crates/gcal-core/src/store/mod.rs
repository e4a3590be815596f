//! Persistence for calendar events, the canonical message pointer and the
//! membership mirror.
//!
//! Two event backends exist:
//! - [`SqliteEventStore`]: numeric, never-reused event ids, persisted
//!   canonical pointer. The default.
//! - [`JsonFileEventStore`]: one JSON document keyed by guild id, rewritten on
//!   every mutation. Events carry no id and are deleted by title.
//!
//! Membership always lives in SQLite ([`SqliteMemberStore`]).

mod connection;
mod json_file;
mod sqlite;

use async_trait::async_trait;
use thiserror::Error;

use crate::model::{CanonicalMessage, Event, EventId, GuildId, MemberRecord, NewEvent, UserId};

pub use connection::{SqliteConfig, SqliteConnection, SqliteConnectionManager};
pub use json_file::JsonFileEventStore;
pub use sqlite::{SqliteEventStore, SqliteMemberStore, SqlitePool, open_in_memory_pool, open_pool};

/// Persistence-layer failure. Always transient from the caller's point of view.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("connection pool error: {0}")]
    Pool(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("task join error: {0}")]
    TaskJoin(String),

    #[error("operation not supported by this store: {0}")]
    Unsupported(&'static str),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// How events are identified for deletion
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentityScheme {
    /// Store-assigned numeric ids
    Numeric,
    /// Exact title match (legacy, ambiguous under duplicate titles)
    Title,
}

/// Which events a remove request targets
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventSelector {
    Id(EventId),
    Title(String),
}

/// Guild-scoped event storage.
///
/// Every call is atomic on its own. Removing something that does not exist
/// is a successful no-op returning `0`.
#[async_trait]
pub trait EventStore: Send + Sync {
    fn identity_scheme(&self) -> IdentityScheme;

    /// Persist a new event and return it with its freshly assigned identity
    async fn add_event(&self, guild_id: GuildId, event: NewEvent) -> StoreResult<Event>;

    async fn remove_event(&self, guild_id: GuildId, id: EventId) -> StoreResult<usize>;

    /// Deprecated compatibility path: removes every event with this exact title
    async fn remove_events_by_title(&self, guild_id: GuildId, title: &str) -> StoreResult<usize>;

    /// Events ordered by `(date, time)` ascending, compared as strings
    async fn list_events(&self, guild_id: GuildId) -> StoreResult<Vec<Event>>;

    async fn canonical_message(&self, _guild_id: GuildId) -> StoreResult<Option<CanonicalMessage>> {
        Ok(None)
    }

    async fn save_canonical_message(
        &self,
        _guild_id: GuildId,
        _message: CanonicalMessage,
    ) -> StoreResult<()> {
        Ok(())
    }

    async fn clear_canonical_message(&self, _guild_id: GuildId) -> StoreResult<()> {
        Ok(())
    }

    async fn remove(&self, guild_id: GuildId, selector: &EventSelector) -> StoreResult<usize> {
        match selector {
            EventSelector::Id(id) => self.remove_event(guild_id, *id).await,
            EventSelector::Title(title) => self.remove_events_by_title(guild_id, title).await,
        }
    }
}

/// Storage for mirrored guild membership
#[async_trait]
pub trait MemberStore: Send + Sync {
    /// Insert or update; writing identical values leaves the row untouched
    async fn upsert_member(&self, member: &MemberRecord) -> StoreResult<()>;

    async fn delete_member(&self, guild_id: GuildId, user_id: UserId) -> StoreResult<usize>;

    async fn get_member(&self, guild_id: GuildId, user_id: UserId) -> StoreResult<Option<MemberRecord>>;

    async fn list_guild_members(&self, guild_id: GuildId) -> StoreResult<Vec<MemberRecord>>;
}

/// Stable sort used by backends that cannot order in the query
pub(crate) fn sort_events(events: &mut [Event]) {
    events.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));
}
