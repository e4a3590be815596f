//! Best-effort mirror of guild membership.
//!
//! Fed by membership notifications only. Writes are retried a bounded number
//! of times and then dropped with a warning; nothing here ever fails a
//! calendar operation.
//!
//! Notifications are applied one at a time, in arrival order, by a single
//! worker task (see [`MembershipMirror::spawn_worker`]). A join that is still
//! retrying therefore always lands before the leave that followed it.

use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::MirrorConfig;
use crate::model::{GuildId, MemberRecord, UserId};
use crate::store::{MemberStore, StoreResult};

/// What happened to a mirror write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MirrorOutcome {
    Written,
    /// Nothing relevant changed
    Skipped,
    /// Retries exhausted
    Dropped,
}

/// Result of a full guild reconciliation
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReconcileReport {
    pub upserted: usize,
    pub removed: usize,
    pub failed: usize,
}

/// One membership notification, queued for the mirror worker
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MirrorJob {
    Join(MemberRecord),
    Leave { guild_id: GuildId, user_id: UserId },
    Update {
        before: Option<MemberRecord>,
        after: MemberRecord,
    },
    Reconcile {
        guild_id: GuildId,
        members: Vec<MemberRecord>,
    },
}

/// Sending half of the mirror worker's queue
#[derive(Debug, Clone)]
pub struct MirrorQueue {
    tx: mpsc::UnboundedSender<MirrorJob>,
}

impl MirrorQueue {
    /// Queue a notification; never blocks the caller
    pub fn submit(&self, job: MirrorJob) {
        if let Err(e) = self.tx.send(job) {
            warn!("Mirror worker is gone, dropping {:?}", e.0);
        }
    }
}

pub struct MembershipMirror {
    store: Arc<dyn MemberStore>,
    max_retries: u32,
    backoff: Duration,
}

impl MembershipMirror {
    pub fn new(store: Arc<dyn MemberStore>, config: &MirrorConfig) -> Self {
        Self {
            store,
            max_retries: config.max_retries,
            backoff: Duration::from_millis(200),
        }
    }

    /// Base delay between attempts; attempt `n` waits `n * backoff`
    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    /// Start the worker that applies queued notifications in order.
    ///
    /// The worker ends once every [`MirrorQueue`] clone has been dropped and
    /// the queue is drained.
    pub fn spawn_worker(self: Arc<Self>) -> (MirrorQueue, JoinHandle<()>) {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let handle = tokio::spawn(async move {
            while let Some(job) = rx.recv().await {
                self.apply(job).await;
            }
            debug!("Mirror worker stopped");
        });
        (MirrorQueue { tx }, handle)
    }

    async fn apply(&self, job: MirrorJob) {
        match job {
            MirrorJob::Join(member) => {
                self.on_join(member).await;
            }
            MirrorJob::Leave { guild_id, user_id } => {
                self.on_leave(guild_id, user_id).await;
            }
            MirrorJob::Update { before, after } => {
                self.on_update(before.as_ref(), after).await;
            }
            MirrorJob::Reconcile { guild_id, members } => {
                self.reconcile(guild_id, members).await;
            }
        }
    }

    pub async fn on_join(&self, member: MemberRecord) -> MirrorOutcome {
        debug!("Member {} joined guild {}", member.user_id, member.guild_id);
        self.upsert(&member).await
    }

    pub async fn on_leave(&self, guild_id: GuildId, user_id: UserId) -> MirrorOutcome {
        debug!("Member {} left guild {}", user_id, guild_id);
        let store = &self.store;
        match self
            .with_retries("delete member", || store.delete_member(guild_id, user_id))
            .await
        {
            Some(_) => MirrorOutcome::Written,
            None => MirrorOutcome::Dropped,
        }
    }

    /// Profile change. Only username/display name changes are mirrored.
    ///
    /// Without a `before` snapshot the stored row is used as the last known
    /// value.
    pub async fn on_update(&self, before: Option<&MemberRecord>, after: MemberRecord) -> MirrorOutcome {
        let last_known = match before {
            Some(before) => Some(before.clone()),
            None => self
                .store
                .get_member(after.guild_id, after.user_id)
                .await
                .unwrap_or_else(|e| {
                    debug!("Mirror lookup failed, writing unconditionally: {}", e);
                    None
                }),
        };

        if let Some(last) = last_known {
            if last.username == after.username && last.display_name == after.display_name {
                return MirrorOutcome::Skipped;
            }
        }

        self.upsert(&after).await
    }

    /// Bring the mirror for `guild_id` in line with a full member list:
    /// upsert everyone present, delete rows for users who are gone.
    pub async fn reconcile(&self, guild_id: GuildId, members: Vec<MemberRecord>) -> ReconcileReport {
        let mut report = ReconcileReport::default();
        let present: HashSet<UserId> = members.iter().map(|m| m.user_id).collect();

        for member in members.iter().filter(|m| m.guild_id == guild_id) {
            match self.upsert(member).await {
                MirrorOutcome::Dropped => report.failed += 1,
                _ => report.upserted += 1,
            }
        }

        let store = &self.store;
        let mirrored = match self
            .with_retries("list members", || store.list_guild_members(guild_id))
            .await
        {
            Some(mirrored) => mirrored,
            None => return report,
        };

        for stale in mirrored.into_iter().filter(|m| !present.contains(&m.user_id)) {
            match self.on_leave(guild_id, stale.user_id).await {
                MirrorOutcome::Dropped => report.failed += 1,
                _ => report.removed += 1,
            }
        }

        info!(
            "Reconciled members of guild {}: {} upserted, {} removed, {} failed",
            guild_id, report.upserted, report.removed, report.failed
        );
        report
    }

    async fn upsert(&self, member: &MemberRecord) -> MirrorOutcome {
        let store = &self.store;
        match self.with_retries("upsert member", || store.upsert_member(member)).await {
            Some(()) => MirrorOutcome::Written,
            None => MirrorOutcome::Dropped,
        }
    }

    async fn with_retries<F, Fut, T>(&self, what: &str, mut op: F) -> Option<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = StoreResult<T>>,
    {
        let mut attempt = 0;
        loop {
            match op().await {
                Ok(value) => return Some(value),
                Err(e) if attempt < self.max_retries => {
                    attempt += 1;
                    debug!("Mirror {} failed (attempt {}): {}", what, attempt, e);
                    tokio::time::sleep(self.backoff * attempt).await;
                }
                Err(e) => {
                    warn!("Dropping mirror {} after {} retries: {}", what, attempt, e);
                    return None;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{SqliteMemberStore, StoreError, open_in_memory_pool};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

    fn member(user: u64, name: &str, display: &str) -> MemberRecord {
        MemberRecord {
            user_id: UserId(user),
            guild_id: GuildId(1),
            username: name.to_string(),
            display_name: display.to_string(),
        }
    }

    async fn sqlite_mirror() -> (MembershipMirror, Arc<SqliteMemberStore>) {
        let store = Arc::new(SqliteMemberStore::new(open_in_memory_pool().await.unwrap()));
        let mirror = MembershipMirror::new(store.clone(), &MirrorConfig::default())
            .with_backoff(Duration::ZERO);
        (mirror, store)
    }

    /// Fails the first `failures` writes, then succeeds
    struct FlakyStore {
        failures: u32,
        calls: AtomicU32,
    }

    #[async_trait]
    impl MemberStore for FlakyStore {
        async fn upsert_member(&self, _member: &MemberRecord) -> StoreResult<()> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures {
                Err(StoreError::Pool("unavailable".into()))
            } else {
                Ok(())
            }
        }

        async fn delete_member(&self, _guild_id: GuildId, _user_id: UserId) -> StoreResult<usize> {
            Err(StoreError::Pool("unavailable".into()))
        }

        async fn get_member(&self, _g: GuildId, _u: UserId) -> StoreResult<Option<MemberRecord>> {
            Ok(None)
        }

        async fn list_guild_members(&self, _guild_id: GuildId) -> StoreResult<Vec<MemberRecord>> {
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn test_join_and_leave() {
        let (mirror, store) = sqlite_mirror().await;

        assert_eq!(mirror.on_join(member(5, "anna", "Anna")).await, MirrorOutcome::Written);
        assert!(store.get_member(GuildId(1), UserId(5)).await.unwrap().is_some());

        assert_eq!(mirror.on_leave(GuildId(1), UserId(5)).await, MirrorOutcome::Written);
        assert!(store.get_member(GuildId(1), UserId(5)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_update_skips_unrelated_changes() {
        let (mirror, _store) = sqlite_mirror().await;
        let before = member(5, "anna", "Anna");

        let outcome = mirror.on_update(Some(&before), before.clone()).await;
        assert_eq!(outcome, MirrorOutcome::Skipped);
    }

    #[tokio::test]
    async fn test_update_writes_display_name_change() {
        let (mirror, store) = sqlite_mirror().await;
        mirror.on_join(member(5, "anna", "Anna")).await;

        let outcome = mirror.on_update(None, member(5, "anna", "Anna B.")).await;
        assert_eq!(outcome, MirrorOutcome::Written);

        let stored = store.get_member(GuildId(1), UserId(5)).await.unwrap().unwrap();
        assert_eq!(stored.display_name, "Anna B.");
    }

    #[tokio::test]
    async fn test_update_without_snapshot_uses_stored_row() {
        let (mirror, _store) = sqlite_mirror().await;
        mirror.on_join(member(5, "anna", "Anna")).await;

        let outcome = mirror.on_update(None, member(5, "anna", "Anna")).await;
        assert_eq!(outcome, MirrorOutcome::Skipped);
    }

    #[tokio::test]
    async fn test_retries_then_succeeds() {
        let store = Arc::new(FlakyStore {
            failures: 2,
            calls: AtomicU32::new(0),
        });
        let mirror = MembershipMirror::new(store.clone(), &MirrorConfig::default())
            .with_backoff(Duration::ZERO);

        assert_eq!(mirror.on_join(member(5, "a", "A")).await, MirrorOutcome::Written);
        assert_eq!(store.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_drops_after_bounded_retries() {
        let store = Arc::new(FlakyStore {
            failures: u32::MAX,
            calls: AtomicU32::new(0),
        });
        let config = MirrorConfig {
            enabled: true,
            max_retries: 2,
        };
        let mirror = MembershipMirror::new(store.clone(), &config).with_backoff(Duration::ZERO);

        assert_eq!(mirror.on_join(member(5, "a", "A")).await, MirrorOutcome::Dropped);
        assert_eq!(store.calls.load(Ordering::SeqCst), 3);
        assert_eq!(mirror.on_leave(GuildId(1), UserId(5)).await, MirrorOutcome::Dropped);
    }

    /// SQLite-backed store whose first upsert fails
    struct SlowFirstUpsert {
        inner: SqliteMemberStore,
        failed_once: AtomicBool,
    }

    #[async_trait]
    impl MemberStore for SlowFirstUpsert {
        async fn upsert_member(&self, member: &MemberRecord) -> StoreResult<()> {
            if !self.failed_once.swap(true, Ordering::SeqCst) {
                return Err(StoreError::Pool("busy".into()));
            }
            self.inner.upsert_member(member).await
        }

        async fn delete_member(&self, guild_id: GuildId, user_id: UserId) -> StoreResult<usize> {
            self.inner.delete_member(guild_id, user_id).await
        }

        async fn get_member(&self, guild_id: GuildId, user_id: UserId) -> StoreResult<Option<MemberRecord>> {
            self.inner.get_member(guild_id, user_id).await
        }

        async fn list_guild_members(&self, guild_id: GuildId) -> StoreResult<Vec<MemberRecord>> {
            self.inner.list_guild_members(guild_id).await
        }
    }

    #[tokio::test]
    async fn test_worker_applies_leave_after_retried_join() {
        let store = Arc::new(SlowFirstUpsert {
            inner: SqliteMemberStore::new(open_in_memory_pool().await.unwrap()),
            failed_once: AtomicBool::new(false),
        });
        let mirror = MembershipMirror::new(store.clone(), &MirrorConfig::default())
            .with_backoff(Duration::from_millis(50));
        let (queue, worker) = Arc::new(mirror).spawn_worker();

        queue.submit(MirrorJob::Join(member(5, "anna", "Anna")));
        queue.submit(MirrorJob::Leave {
            guild_id: GuildId(1),
            user_id: UserId(5),
        });
        drop(queue);
        worker.await.unwrap();

        assert!(store.failed_once.load(Ordering::SeqCst));
        assert!(store.get_member(GuildId(1), UserId(5)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_worker_runs_every_job_kind() {
        let (mirror, store) = sqlite_mirror().await;
        let (queue, worker) = Arc::new(mirror).spawn_worker();

        queue.submit(MirrorJob::Join(member(1, "a", "A")));
        queue.submit(MirrorJob::Join(member(2, "b", "B")));
        queue.submit(MirrorJob::Update {
            before: None,
            after: member(2, "b", "Bee"),
        });
        queue.submit(MirrorJob::Reconcile {
            guild_id: GuildId(1),
            members: vec![member(2, "b", "Bee")],
        });
        drop(queue);
        worker.await.unwrap();

        let members = store.list_guild_members(GuildId(1)).await.unwrap();
        assert_eq!(members.len(), 1);
        assert_eq!(members[0].display_name, "Bee");
    }

    #[tokio::test]
    async fn test_reconcile_removes_departed_members() {
        let (mirror, store) = sqlite_mirror().await;
        mirror.on_join(member(1, "a", "A")).await;
        mirror.on_join(member(2, "b", "B")).await;

        let report = mirror
            .reconcile(GuildId(1), vec![member(2, "b", "Bee"), member(3, "c", "C")])
            .await;

        assert_eq!(report.upserted, 2);
        assert_eq!(report.removed, 1);
        assert_eq!(report.failed, 0);

        let ids: Vec<_> = store
            .list_guild_members(GuildId(1))
            .await
            .unwrap()
            .into_iter()
            .map(|m| m.user_id.get())
            .collect();
        assert_eq!(ids, vec![2, 3]);
    }
}
