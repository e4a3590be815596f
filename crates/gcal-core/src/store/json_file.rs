//! Single-document JSON event store for small deployments

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info};

use super::{EventStore, IdentityScheme, StoreError, StoreResult, sort_events};
use crate::model::{Event, EventId, GuildId, NewEvent};

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredEvent {
    title: String,
    date: String,
    time: String,
}

/// Guild id (as string key) → events in insertion order
type Document = BTreeMap<String, Vec<StoredEvent>>;

/// File-backed store: `{ "<guild_id>": [{title, date, time}, ...] }`.
///
/// The whole document is rewritten on every mutation. Events have no id;
/// deletion matches on exact title and removes every match.
pub struct JsonFileEventStore {
    path: PathBuf,
    document: Mutex<Document>,
}

impl JsonFileEventStore {
    /// Load the document at `path`, starting empty if it does not exist yet
    pub async fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref().to_path_buf();
        let document = match tokio::fs::read_to_string(&path).await {
            Ok(content) if content.trim().is_empty() => Document::new(),
            Ok(content) => serde_json::from_str(&content)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Document::new(),
            Err(e) => return Err(StoreError::Io(e)),
        };
        info!(
            "Loaded calendar document {} ({} guilds)",
            path.display(),
            document.len()
        );
        Ok(Self {
            path,
            document: Mutex::new(document),
        })
    }

    async fn persist(&self, document: &Document) -> StoreResult<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        let content = serde_json::to_string_pretty(document)?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, content).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        debug!("Rewrote calendar document {}", self.path.display());
        Ok(())
    }

    fn to_event(guild_id: GuildId, stored: &StoredEvent) -> Event {
        Event {
            id: None,
            guild_id,
            title: stored.title.clone(),
            date: stored.date.clone(),
            time: stored.time.clone(),
        }
    }
}

#[async_trait]
impl EventStore for JsonFileEventStore {
    fn identity_scheme(&self) -> IdentityScheme {
        IdentityScheme::Title
    }

    async fn add_event(&self, guild_id: GuildId, event: NewEvent) -> StoreResult<Event> {
        let mut document = self.document.lock().await;
        let mut updated = document.clone();
        let stored = StoredEvent {
            title: event.title,
            date: event.date,
            time: event.time,
        };
        updated
            .entry(guild_id.to_string())
            .or_default()
            .push(stored.clone());

        // Only swap in the new state once it is on disk
        self.persist(&updated).await?;
        *document = updated;
        Ok(Self::to_event(guild_id, &stored))
    }

    async fn remove_event(&self, _guild_id: GuildId, _id: EventId) -> StoreResult<usize> {
        Err(StoreError::Unsupported("the JSON store has no event ids"))
    }

    async fn remove_events_by_title(&self, guild_id: GuildId, title: &str) -> StoreResult<usize> {
        let mut document = self.document.lock().await;
        let key = guild_id.to_string();
        let Some(events) = document.get(&key) else {
            return Ok(0);
        };

        let kept: Vec<StoredEvent> = events.iter().filter(|e| e.title != title).cloned().collect();
        let removed = events.len() - kept.len();
        if removed == 0 {
            return Ok(0);
        }

        let mut updated = document.clone();
        updated.insert(key, kept);
        self.persist(&updated).await?;
        *document = updated;
        Ok(removed)
    }

    async fn list_events(&self, guild_id: GuildId) -> StoreResult<Vec<Event>> {
        let document = self.document.lock().await;
        let mut events: Vec<Event> = document
            .get(&guild_id.to_string())
            .map(|events| events.iter().map(|e| Self::to_event(guild_id, e)).collect())
            .unwrap_or_default();
        sort_events(&mut events);
        Ok(events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn new_event(title: &str, date: &str, time: &str) -> NewEvent {
        NewEvent::parse(title, date, time).unwrap()
    }

    #[tokio::test]
    async fn test_open_missing_file_starts_empty() {
        let dir = TempDir::new().unwrap();
        let store = JsonFileEventStore::open(dir.path().join("calendar.json")).await.unwrap();
        assert!(store.list_events(GuildId(1)).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_mutations_are_persisted() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("calendar.json");

        let store = JsonFileEventStore::open(&path).await.unwrap();
        store.add_event(GuildId(1), new_event("Standup", "01.01.2025", "09:00")).await.unwrap();
        store.add_event(GuildId(1), new_event("Review", "01.01.2025", "08:00")).await.unwrap();
        drop(store);

        let reopened = JsonFileEventStore::open(&path).await.unwrap();
        let titles: Vec<_> = reopened
            .list_events(GuildId(1))
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.title)
            .collect();
        assert_eq!(titles, vec!["Review", "Standup"]);

        let raw: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw["1"][0]["title"], "Standup");
    }

    #[tokio::test]
    async fn test_remove_by_title() {
        let dir = TempDir::new().unwrap();
        let store = JsonFileEventStore::open(dir.path().join("calendar.json")).await.unwrap();
        store.add_event(GuildId(1), new_event("Dup", "d1", "t")).await.unwrap();
        store.add_event(GuildId(1), new_event("Dup", "d2", "t")).await.unwrap();
        store.add_event(GuildId(1), new_event("Other", "d3", "t")).await.unwrap();

        assert_eq!(store.remove_events_by_title(GuildId(1), "Dup").await.unwrap(), 2);
        assert_eq!(store.remove_events_by_title(GuildId(1), "Missing").await.unwrap(), 0);
        assert_eq!(store.remove_events_by_title(GuildId(2), "Other").await.unwrap(), 0);
        assert_eq!(store.list_events(GuildId(1)).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_remove_by_id_is_unsupported() {
        let dir = TempDir::new().unwrap();
        let store = JsonFileEventStore::open(dir.path().join("calendar.json")).await.unwrap();
        assert_eq!(store.identity_scheme(), IdentityScheme::Title);
        assert!(matches!(
            store.remove_event(GuildId(1), EventId(1)).await,
            Err(StoreError::Unsupported(_))
        ));
    }
}
