//! SQLite-backed event and member stores

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, params};
use tracing::{debug, info};

use super::connection::SqliteConnectionManager;
use super::{EventStore, IdentityScheme, MemberStore, StoreError, StoreResult};
use crate::config::StorageConfig;
use crate::model::{
    CanonicalMessage, ChannelId, Event, EventId, GuildId, MemberRecord, MessageId, NewEvent, UserId,
};

/// Shared connection pool, created once at start-up
pub type SqlitePool = bb8::Pool<SqliteConnectionManager>;

/// Open the file-backed pool described by `config` and create missing tables
pub async fn open_pool(config: &StorageConfig) -> StoreResult<SqlitePool> {
    let path = Path::new(&config.db_path);
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    debug!("Opening calendar database at: {}", config.db_path);
    let pool = bb8::Pool::builder()
        .max_size(config.pool_size.max(1))
        .connection_timeout(Duration::from_secs(config.pool_timeout_secs.max(1)))
        .build(
            SqliteConnectionManager::file(path)
                .with_busy_timeout(Duration::from_secs(config.busy_timeout_secs)),
        )
        .await?;

    migrate(&pool).await?;
    info!(
        "SQLite pool ready ({} connections max, {}s checkout timeout, {}s busy timeout)",
        config.pool_size, config.pool_timeout_secs, config.busy_timeout_secs
    );
    Ok(pool)
}

/// Single-connection in-memory pool (for testing)
pub async fn open_in_memory_pool() -> StoreResult<SqlitePool> {
    let pool = bb8::Pool::builder()
        .max_size(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .build(SqliteConnectionManager::memory())
        .await?;
    migrate(&pool).await?;
    Ok(pool)
}

async fn migrate(pool: &SqlitePool) -> StoreResult<()> {
    let conn = checkout(pool).await?;
    conn.with_connection(|conn| {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS calendar_events (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                guild_id INTEGER NOT NULL,
                title TEXT NOT NULL,
                date TEXT NOT NULL,
                time TEXT NOT NULL,
                created_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_calendar_events_guild
                ON calendar_events(guild_id, date, time);

            CREATE TABLE IF NOT EXISTS members (
                user_id INTEGER NOT NULL,
                guild_id INTEGER NOT NULL,
                username TEXT NOT NULL,
                display_name TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                PRIMARY KEY (user_id, guild_id)
            );

            CREATE TABLE IF NOT EXISTS calendar_messages (
                guild_id INTEGER PRIMARY KEY,
                channel_id INTEGER NOT NULL,
                message_id INTEGER NOT NULL,
                updated_at TEXT NOT NULL
            );",
        )?;
        Ok(())
    })
    .await
}

async fn checkout(
    pool: &SqlitePool,
) -> StoreResult<bb8::PooledConnection<'_, SqliteConnectionManager>> {
    pool.get().await.map_err(|e| StoreError::Pool(e.to_string()))
}

// Snowflakes fit in 63 bits; SQLite integers are signed.
fn to_sql_id(id: u64) -> i64 {
    id as i64
}

fn from_sql_id(id: i64) -> u64 {
    id as u64
}

fn row_to_event(row: &rusqlite::Row<'_>) -> rusqlite::Result<Event> {
    Ok(Event {
        id: Some(EventId(row.get(0)?)),
        guild_id: GuildId(from_sql_id(row.get(1)?)),
        title: row.get(2)?,
        date: row.get(3)?,
        time: row.get(4)?,
    })
}

fn row_to_member(row: &rusqlite::Row<'_>) -> rusqlite::Result<MemberRecord> {
    Ok(MemberRecord {
        user_id: UserId(from_sql_id(row.get(0)?)),
        guild_id: GuildId(from_sql_id(row.get(1)?)),
        username: row.get(2)?,
        display_name: row.get(3)?,
    })
}

/// Event store with numeric ids and a persisted canonical pointer
#[derive(Clone)]
pub struct SqliteEventStore {
    pool: SqlitePool,
}

impl SqliteEventStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// In-memory store (for testing)
    pub async fn in_memory() -> StoreResult<Self> {
        Ok(Self::new(open_in_memory_pool().await?))
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn run<F, T>(&self, f: F) -> StoreResult<T>
    where
        F: FnOnce(&mut Connection) -> StoreResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = checkout(&self.pool).await?;
        conn.with_connection(f).await
    }
}

#[async_trait]
impl EventStore for SqliteEventStore {
    fn identity_scheme(&self) -> IdentityScheme {
        IdentityScheme::Numeric
    }

    async fn add_event(&self, guild_id: GuildId, event: NewEvent) -> StoreResult<Event> {
        let added = self
            .run(move |conn| {
                conn.execute(
                    "INSERT INTO calendar_events (guild_id, title, date, time, created_at)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                    params![
                        to_sql_id(guild_id.get()),
                        event.title,
                        event.date,
                        event.time,
                        Utc::now().to_rfc3339(),
                    ],
                )?;
                Ok(Event {
                    id: Some(EventId(conn.last_insert_rowid())),
                    guild_id,
                    title: event.title,
                    date: event.date,
                    time: event.time,
                })
            })
            .await?;
        debug!("Added event {:?} to guild {}", added.id, guild_id);
        Ok(added)
    }

    async fn remove_event(&self, guild_id: GuildId, id: EventId) -> StoreResult<usize> {
        let removed = self
            .run(move |conn| {
                Ok(conn.execute(
                    "DELETE FROM calendar_events WHERE guild_id = ?1 AND id = ?2",
                    params![to_sql_id(guild_id.get()), id.0],
                )?)
            })
            .await?;
        debug!("Removed {} event(s) with id {} from guild {}", removed, id, guild_id);
        Ok(removed)
    }

    async fn remove_events_by_title(&self, guild_id: GuildId, title: &str) -> StoreResult<usize> {
        let title = title.to_string();
        self.run(move |conn| {
            Ok(conn.execute(
                "DELETE FROM calendar_events WHERE guild_id = ?1 AND title = ?2",
                params![to_sql_id(guild_id.get()), title],
            )?)
        })
        .await
    }

    async fn list_events(&self, guild_id: GuildId) -> StoreResult<Vec<Event>> {
        self.run(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, guild_id, title, date, time FROM calendar_events
                 WHERE guild_id = ?1
                 ORDER BY date ASC, time ASC, id ASC",
            )?;
            let events = stmt
                .query_map(params![to_sql_id(guild_id.get())], row_to_event)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(events)
        })
        .await
    }

    async fn canonical_message(&self, guild_id: GuildId) -> StoreResult<Option<CanonicalMessage>> {
        self.run(move |conn| {
            let found = conn
                .query_row(
                    "SELECT channel_id, message_id FROM calendar_messages WHERE guild_id = ?1",
                    params![to_sql_id(guild_id.get())],
                    |row| {
                        Ok(CanonicalMessage {
                            channel_id: ChannelId(from_sql_id(row.get(0)?)),
                            message_id: MessageId(from_sql_id(row.get(1)?)),
                        })
                    },
                )
                .optional()?;
            Ok(found)
        })
        .await
    }

    async fn save_canonical_message(
        &self,
        guild_id: GuildId,
        message: CanonicalMessage,
    ) -> StoreResult<()> {
        self.run(move |conn| {
            conn.execute(
                "INSERT INTO calendar_messages (guild_id, channel_id, message_id, updated_at)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(guild_id) DO UPDATE SET
                    channel_id = excluded.channel_id,
                    message_id = excluded.message_id,
                    updated_at = excluded.updated_at",
                params![
                    to_sql_id(guild_id.get()),
                    to_sql_id(message.channel_id.get()),
                    to_sql_id(message.message_id.get()),
                    Utc::now().to_rfc3339(),
                ],
            )?;
            Ok(())
        })
        .await
    }

    async fn clear_canonical_message(&self, guild_id: GuildId) -> StoreResult<()> {
        self.run(move |conn| {
            conn.execute(
                "DELETE FROM calendar_messages WHERE guild_id = ?1",
                params![to_sql_id(guild_id.get())],
            )?;
            Ok(())
        })
        .await
    }
}

/// Membership mirror table
#[derive(Clone)]
pub struct SqliteMemberStore {
    pool: SqlitePool,
}

impl SqliteMemberStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    async fn run<F, T>(&self, f: F) -> StoreResult<T>
    where
        F: FnOnce(&mut Connection) -> StoreResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = checkout(&self.pool).await?;
        conn.with_connection(f).await
    }
}

#[async_trait]
impl MemberStore for SqliteMemberStore {
    async fn upsert_member(&self, member: &MemberRecord) -> StoreResult<()> {
        let member = member.clone();
        self.run(move |conn| {
            conn.execute(
                "INSERT INTO members (user_id, guild_id, username, display_name, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(user_id, guild_id) DO UPDATE SET
                    username = excluded.username,
                    display_name = excluded.display_name,
                    updated_at = excluded.updated_at
                 WHERE members.username IS NOT excluded.username
                    OR members.display_name IS NOT excluded.display_name",
                params![
                    to_sql_id(member.user_id.get()),
                    to_sql_id(member.guild_id.get()),
                    member.username,
                    member.display_name,
                    Utc::now().to_rfc3339(),
                ],
            )?;
            Ok(())
        })
        .await
    }

    async fn delete_member(&self, guild_id: GuildId, user_id: UserId) -> StoreResult<usize> {
        self.run(move |conn| {
            Ok(conn.execute(
                "DELETE FROM members WHERE user_id = ?1 AND guild_id = ?2",
                params![to_sql_id(user_id.get()), to_sql_id(guild_id.get())],
            )?)
        })
        .await
    }

    async fn get_member(&self, guild_id: GuildId, user_id: UserId) -> StoreResult<Option<MemberRecord>> {
        self.run(move |conn| {
            let found = conn
                .query_row(
                    "SELECT user_id, guild_id, username, display_name FROM members
                     WHERE user_id = ?1 AND guild_id = ?2",
                    params![to_sql_id(user_id.get()), to_sql_id(guild_id.get())],
                    row_to_member,
                )
                .optional()?;
            Ok(found)
        })
        .await
    }

    async fn list_guild_members(&self, guild_id: GuildId) -> StoreResult<Vec<MemberRecord>> {
        self.run(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT user_id, guild_id, username, display_name FROM members
                 WHERE guild_id = ?1 ORDER BY user_id",
            )?;
            let members = stmt
                .query_map(params![to_sql_id(guild_id.get())], row_to_member)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(members)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::EventSelector;

    fn new_event(title: &str, date: &str, time: &str) -> NewEvent {
        NewEvent::parse(title, date, time).unwrap()
    }

    #[tokio::test]
    async fn test_add_assigns_fresh_ids() {
        let store = SqliteEventStore::in_memory().await.unwrap();
        let guild = GuildId(1);

        let before = store.list_events(guild).await.unwrap();
        let a = store.add_event(guild, new_event("A", "01.01.2025", "09:00")).await.unwrap();
        let b = store.add_event(guild, new_event("A", "01.01.2025", "09:00")).await.unwrap();
        let after = store.list_events(guild).await.unwrap();

        assert_eq!(after.len(), before.len() + 2);
        assert!(a.id.is_some());
        assert_ne!(a.id, b.id);
        assert_eq!(a.title, "A");
    }

    #[tokio::test]
    async fn test_ids_are_not_reused_after_delete() {
        let store = SqliteEventStore::in_memory().await.unwrap();
        let guild = GuildId(1);

        let first = store.add_event(guild, new_event("A", "d", "t")).await.unwrap();
        store.remove_event(guild, first.id.unwrap()).await.unwrap();
        let second = store.add_event(guild, new_event("B", "d", "t")).await.unwrap();

        assert!(second.id.unwrap() > first.id.unwrap());
    }

    #[tokio::test]
    async fn test_remove_missing_id_is_noop() {
        let store = SqliteEventStore::in_memory().await.unwrap();
        let guild = GuildId(1);
        store.add_event(guild, new_event("A", "d", "t")).await.unwrap();

        let before = store.list_events(guild).await.unwrap();
        let removed = store.remove_event(guild, EventId(999)).await.unwrap();
        let after = store.list_events(guild).await.unwrap();

        assert_eq!(removed, 0);
        assert_eq!(before, after);
    }

    #[tokio::test]
    async fn test_remove_is_guild_scoped() {
        let store = SqliteEventStore::in_memory().await.unwrap();
        let event = store.add_event(GuildId(1), new_event("A", "d", "t")).await.unwrap();

        let removed = store.remove_event(GuildId(2), event.id.unwrap()).await.unwrap();

        assert_eq!(removed, 0);
        assert_eq!(store.list_events(GuildId(1)).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_list_sorted_by_date_then_time() {
        let store = SqliteEventStore::in_memory().await.unwrap();
        let guild = GuildId(1);
        store.add_event(guild, new_event("Standup", "01.01.2025", "09:00")).await.unwrap();
        store.add_event(guild, new_event("Late", "02.01.2025", "07:00")).await.unwrap();
        store.add_event(guild, new_event("Review", "01.01.2025", "08:00")).await.unwrap();

        let titles: Vec<_> = store
            .list_events(guild)
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.title)
            .collect();
        assert_eq!(titles, vec!["Review", "Standup", "Late"]);
    }

    #[tokio::test]
    async fn test_remove_by_title_removes_all_matches() {
        let store = SqliteEventStore::in_memory().await.unwrap();
        let guild = GuildId(1);
        store.add_event(guild, new_event("Dup", "d1", "t")).await.unwrap();
        store.add_event(guild, new_event("Dup", "d2", "t")).await.unwrap();
        store.add_event(guild, new_event("Keep", "d3", "t")).await.unwrap();

        let removed = store
            .remove(guild, &EventSelector::Title("Dup".into()))
            .await
            .unwrap();

        assert_eq!(removed, 2);
        assert_eq!(store.list_events(guild).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_canonical_pointer_roundtrip() {
        let store = SqliteEventStore::in_memory().await.unwrap();
        let guild = GuildId(1);
        assert!(store.canonical_message(guild).await.unwrap().is_none());

        let pointer = CanonicalMessage {
            channel_id: ChannelId(10),
            message_id: MessageId(20),
        };
        store.save_canonical_message(guild, pointer).await.unwrap();
        let moved = CanonicalMessage {
            channel_id: ChannelId(10),
            message_id: MessageId(30),
        };
        store.save_canonical_message(guild, moved).await.unwrap();
        assert_eq!(store.canonical_message(guild).await.unwrap(), Some(moved));

        store.clear_canonical_message(guild).await.unwrap();
        assert!(store.canonical_message(guild).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_member_upsert_and_delete() {
        let pool = open_in_memory_pool().await.unwrap();
        let store = SqliteMemberStore::new(pool);
        let mut member = MemberRecord {
            user_id: UserId(5),
            guild_id: GuildId(1),
            username: "anna".into(),
            display_name: "Anna".into(),
        };

        store.upsert_member(&member).await.unwrap();
        store.upsert_member(&member).await.unwrap();
        member.display_name = "Anna B.".into();
        store.upsert_member(&member).await.unwrap();

        let members = store.list_guild_members(GuildId(1)).await.unwrap();
        assert_eq!(members, vec![member.clone()]);

        assert_eq!(store.delete_member(GuildId(1), UserId(5)).await.unwrap(), 1);
        assert!(store.get_member(GuildId(1), UserId(5)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_file_pool_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let config = StorageConfig {
            db_path: dir.path().join("nested/gcal.db").to_string_lossy().into_owned(),
            ..StorageConfig::default()
        };

        {
            let store = SqliteEventStore::new(open_pool(&config).await.unwrap());
            store.add_event(GuildId(1), new_event("A", "d", "t")).await.unwrap();
        }

        let store = SqliteEventStore::new(open_pool(&config).await.unwrap());
        assert_eq!(store.list_events(GuildId(1)).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_file_pool_applies_busy_timeout() {
        let dir = tempfile::tempdir().unwrap();
        let config = StorageConfig {
            db_path: dir.path().join("gcal.db").to_string_lossy().into_owned(),
            busy_timeout_secs: 2,
            ..StorageConfig::default()
        };
        let pool = open_pool(&config).await.unwrap();

        let conn = checkout(&pool).await.unwrap();
        let millis = conn
            .with_connection(|conn| {
                conn.query_row("PRAGMA busy_timeout", [], |row| row.get::<_, i64>(0))
                    .map_err(StoreError::from)
            })
            .await
            .unwrap();
        assert_eq!(millis, 2000);
    }
}
