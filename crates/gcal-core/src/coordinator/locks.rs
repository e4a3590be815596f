//! Per-guild mutual exclusion

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::Mutex;

use crate::model::GuildId;

/// Lazily created, never evicted lock per guild.
///
/// Guilds never contend with each other; callers on the same guild are
/// served in arrival order (tokio's mutex is fair).
#[derive(Default)]
pub struct GuildLocks {
    inner: DashMap<GuildId, Arc<Mutex<()>>>,
}

impl GuildLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lock_for(&self, guild_id: GuildId) -> Arc<Mutex<()>> {
        self.inner
            .entry(guild_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}
