//! Reconciliation orchestrator: status machine, gating, full-sync backfill
//! and the auto-sync timer.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use keepsake_core::{
    Bookmark, Category, Error, EventBus, EventEnvelope, LocalRepository, ReachabilityProbe,
    RecordKind, RecordRef, RecordSnapshot, Result, SessionProvider, SyncEvent, SyncStatus,
    SyncableRecord,
};
use keepsake_mirror::MirrorClient;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::config::SyncConfig;

/// Why a full sync did not run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Another pass owns the engine.
    AlreadySyncing,
    NotAuthenticated,
    Offline,
}

/// Per-kind numbers of one full-sync pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct KindReport {
    pub local: usize,
    pub already_mirrored: usize,
    pub uploaded: usize,
}

/// Summary of a completed full-sync pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub categories: KindReport,
    pub bookmarks: KindReport,
    pub duration_ms: u64,
}

impl SyncReport {
    pub fn uploaded(&self) -> usize {
        self.categories.uploaded + self.bookmarks.uploaded
    }

    pub fn already_mirrored(&self) -> usize {
        self.categories.already_mirrored + self.bookmarks.already_mirrored
    }

    fn kind_mut(&mut self, kind: RecordKind) -> &mut KindReport {
        match kind {
            RecordKind::Category => &mut self.categories,
            RecordKind::Bookmark => &mut self.bookmarks,
        }
    }
}

/// Result of asking for a full sync.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    Completed(SyncReport),
    Skipped(SkipReason),
}

#[derive(Debug, Default)]
struct SyncState {
    status: SyncStatus,
    last_sync_date: Option<DateTime<Utc>>,
    last_error: Option<String>,
}

struct Inner {
    mirror: MirrorClient,
    bookmarks: Arc<dyn LocalRepository<Bookmark>>,
    categories: Arc<dyn LocalRepository<Category>>,
    session: Arc<dyn SessionProvider>,
    reachability: Arc<dyn ReachabilityProbe>,
    config: SyncConfig,
    events: EventBus,
    state: Mutex<SyncState>,
    auto_sync: Mutex<Option<JoinHandle<()>>>,
}

impl Drop for Inner {
    fn drop(&mut self) {
        if let Some(handle) = lock(&self.auto_sync).take() {
            handle.abort();
        }
    }
}

/// Drives reconciliation between the local store and the remote mirror.
///
/// Cheap to clone; clones share state. The local repositories passed here
/// must be the undecorated ones so a full sync never triggers itself.
#[derive(Clone)]
pub struct SyncOrchestrator {
    inner: Arc<Inner>,
}

impl SyncOrchestrator {
    pub fn new(
        mirror: MirrorClient,
        bookmarks: Arc<dyn LocalRepository<Bookmark>>,
        categories: Arc<dyn LocalRepository<Category>>,
        session: Arc<dyn SessionProvider>,
        reachability: Arc<dyn ReachabilityProbe>,
        config: SyncConfig,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                mirror,
                bookmarks,
                categories,
                session,
                reachability,
                config,
                events: EventBus::default(),
                state: Mutex::new(SyncState::default()),
                auto_sync: Mutex::new(None),
            }),
        }
    }

    // -------------------------------------------------------------------------
    // Observable state
    // -------------------------------------------------------------------------

    pub fn status(&self) -> SyncStatus {
        lock(&self.inner.state).status
    }

    pub fn last_sync_date(&self) -> Option<DateTime<Utc>> {
        lock(&self.inner.state).last_sync_date
    }

    /// Message of the most recent sync failure, full pass or single record.
    pub fn last_error(&self) -> Option<String> {
        lock(&self.inner.state).last_error.clone()
    }

    /// Subscribe to sync events.
    pub fn events(&self) -> broadcast::Receiver<EventEnvelope> {
        self.inner.events.subscribe()
    }

    pub fn event_bus(&self) -> &EventBus {
        &self.inner.events
    }

    pub fn mirror(&self) -> &MirrorClient {
        &self.inner.mirror
    }

    pub fn session(&self) -> &Arc<dyn SessionProvider> {
        &self.inner.session
    }

    pub fn config(&self) -> &SyncConfig {
        &self.inner.config
    }

    // -------------------------------------------------------------------------
    // Gating
    // -------------------------------------------------------------------------

    /// Whether a full sync could start now.
    ///
    /// Moves the status to `Offline` when signed out or unreachable; leaves it
    /// untouched when a pass is already running.
    pub fn can_sync(&self) -> bool {
        self.gate(false).is_ok()
    }

    /// Check the gate and, when `claim` is set, move to `Syncing` atomically.
    fn gate(&self, claim: bool) -> std::result::Result<(), SkipReason> {
        let mut state = lock(&self.inner.state);
        if state.status.is_busy() {
            return Err(SkipReason::AlreadySyncing);
        }

        let reason = if !self.inner.session.is_authenticated() {
            Some(SkipReason::NotAuthenticated)
        } else if !self.inner.reachability.is_connected() {
            Some(SkipReason::Offline)
        } else {
            None
        };

        if let Some(reason) = reason {
            let from = std::mem::replace(&mut state.status, SyncStatus::Offline);
            drop(state);
            self.emit_transition(from, SyncStatus::Offline);
            return Err(reason);
        }

        if claim {
            let from = std::mem::replace(&mut state.status, SyncStatus::Syncing);
            drop(state);
            self.emit_transition(from, SyncStatus::Syncing);
        }
        Ok(())
    }

    fn set_status(&self, to: SyncStatus) {
        let from = std::mem::replace(&mut lock(&self.inner.state).status, to);
        self.emit_transition(from, to);
    }

    fn emit_transition(&self, from: SyncStatus, to: SyncStatus) {
        if from != to {
            debug!(%from, %to, "Sync status changed");
            self.inner.events.emit(SyncEvent::StatusChanged { from, to });
        }
    }

    // -------------------------------------------------------------------------
    // Full sync
    // -------------------------------------------------------------------------

    /// Upload every local record that has no remote counterpart.
    ///
    /// Categories finish before bookmarks start. Records already mirrored are
    /// not re-uploaded. On failure the status becomes `Error`, the error is
    /// kept for [`last_error`](Self::last_error), and rows already uploaded
    /// stay uploaded.
    #[instrument(skip(self), fields(subsystem = "sync", op = "full_sync"))]
    pub async fn perform_full_sync(&self) -> Result<SyncOutcome> {
        if let Err(reason) = self.gate(true) {
            debug!(?reason, "Full sync skipped");
            return Ok(SyncOutcome::Skipped(reason));
        }

        let mut claim = PassClaim {
            orchestrator: self,
            armed: true,
        };
        let start = Instant::now();
        let result = self.run_full_sync().await;
        claim.armed = false;

        match result {
            Ok(mut report) => {
                report.duration_ms = start.elapsed().as_millis() as u64;
                {
                    let mut state = lock(&self.inner.state);
                    state.last_sync_date = Some(Utc::now());
                    state.last_error = None;
                }
                self.set_status(SyncStatus::Idle);
                info!(
                    uploaded = report.uploaded(),
                    already_mirrored = report.already_mirrored(),
                    duration_ms = report.duration_ms,
                    "Full sync completed"
                );
                self.inner.events.emit(SyncEvent::FullSyncCompleted {
                    uploaded: report.uploaded(),
                    already_mirrored: report.already_mirrored(),
                    duration_ms: report.duration_ms,
                });
                Ok(SyncOutcome::Completed(report))
            }
            Err(e) => {
                error!(
                    error = %e,
                    duration_ms = start.elapsed().as_millis() as u64,
                    "Full sync failed"
                );
                lock(&self.inner.state).last_error = Some(e.to_string());
                self.set_status(SyncStatus::Error);
                self.inner.events.emit(SyncEvent::FullSyncFailed {
                    error: e.to_string(),
                });
                Err(e)
            }
        }
    }

    async fn run_full_sync(&self) -> Result<SyncReport> {
        let owner_id = self
            .inner
            .session
            .current_user_id()
            .ok_or(Error::NotAuthenticated)?;

        let mut report = SyncReport::default();
        for kind in RecordKind::SYNC_ORDER {
            *report.kind_mut(kind) = self.sync_kind(kind, &owner_id).await?;
        }
        Ok(report)
    }

    async fn sync_kind(&self, kind: RecordKind, owner_id: &str) -> Result<KindReport> {
        let local = self.local_snapshots(kind)?;
        let remote = self.inner.mirror.list_client_ids(kind, owner_id).await?;
        let pending = missing_remotely(local.clone(), &remote);

        debug!(
            record_kind = %kind,
            local_count = local.len(),
            remote_count = remote.len(),
            pending = pending.len(),
            "Computed full-sync diff"
        );

        let mut report = KindReport {
            local: local.len(),
            already_mirrored: local.len() - pending.len(),
            uploaded: 0,
        };

        let mirror = self.inner.mirror.clone();
        let owner = owner_id.to_string();
        let results: Vec<(RecordRef, Result<()>)> = stream::iter(pending)
            .map(move |snapshot| {
                let mirror = mirror.clone();
                let owner = owner.clone();
                async move {
                    let result = mirror.upsert(&snapshot, &owner).await.map(|_| ());
                    (snapshot.record_ref(), result)
                }
            })
            .buffer_unordered(self.inner.config.upload_concurrency.max(1))
            .collect()
            .await;

        let mut first_error = None;
        for (record, result) in results {
            match result {
                Ok(()) => {
                    report.uploaded += 1;
                    self.inner.events.emit(SyncEvent::RecordSynced {
                        kind: record.kind,
                        client_id: record.client_id,
                    });
                }
                Err(e) => {
                    warn!(
                        record_kind = %record.kind,
                        client_id = %record.client_id,
                        error = %e,
                        "Full-sync upload failed"
                    );
                    first_error.get_or_insert(e);
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(report),
        }
    }

    fn local_snapshots(&self, kind: RecordKind) -> Result<Vec<RecordSnapshot>> {
        Ok(match kind {
            RecordKind::Category => snapshots(self.inner.categories.fetch_all()?),
            RecordKind::Bookmark => snapshots(self.inner.bookmarks.fetch_all()?),
        })
    }

    // -------------------------------------------------------------------------
    // Single records
    // -------------------------------------------------------------------------

    /// Upsert one record, skipping the existence diff.
    ///
    /// Failures are recorded in `last_error` without moving the status.
    pub async fn sync_one(&self, snapshot: &RecordSnapshot, owner_id: &str) -> Result<()> {
        let record = snapshot.record_ref();
        match self.inner.mirror.upsert(snapshot, owner_id).await {
            Ok(_) => {
                self.inner.events.emit(SyncEvent::RecordSynced {
                    kind: record.kind,
                    client_id: record.client_id,
                });
                Ok(())
            }
            Err(e) => {
                self.record_failure(record, &e);
                Err(e)
            }
        }
    }

    /// Remove one record's remote row.
    pub async fn delete_one(&self, record: RecordRef, owner_id: &str) -> Result<()> {
        match self.inner.mirror.delete(record, owner_id).await {
            Ok(_) => {
                self.inner.events.emit(SyncEvent::RecordDeleted {
                    kind: record.kind,
                    client_id: record.client_id,
                });
                Ok(())
            }
            Err(e) => {
                self.record_failure(record, &e);
                Err(e)
            }
        }
    }

    /// Keep a background failure observable without touching the status.
    pub(crate) fn record_failure(&self, record: RecordRef, err: &Error) {
        warn!(
            record_kind = %record.kind,
            client_id = %record.client_id,
            error = %err,
            "Background sync failed"
        );
        lock(&self.inner.state).last_error = Some(err.to_string());
        self.inner.events.emit(SyncEvent::RecordFailed {
            kind: record.kind,
            client_id: record.client_id,
            error: err.to_string(),
        });
    }

    // -------------------------------------------------------------------------
    // Auto sync
    // -------------------------------------------------------------------------

    /// Run a full sync every `interval`, first tick one interval from now.
    ///
    /// Restarting replaces the previous timer. Must be called from within a
    /// Tokio runtime.
    pub fn start_auto_sync(&self, interval: Duration) {
        let interval = interval.max(Duration::from_secs(1));
        let weak = Arc::downgrade(&self.inner);
        let mut slot = lock(&self.inner.auto_sync);
        if let Some(previous) = slot.take() {
            previous.abort();
            debug!("Replaced running auto-sync timer");
        }
        *slot = Some(tokio::spawn(auto_sync_loop(weak, interval)));
        info!(interval_secs = interval.as_secs(), "Auto-sync started");
    }

    pub fn stop_auto_sync(&self) {
        if let Some(handle) = lock(&self.inner.auto_sync).take() {
            handle.abort();
            info!("Auto-sync stopped");
        }
    }

    pub fn is_auto_sync_running(&self) -> bool {
        lock(&self.inner.auto_sync)
            .as_ref()
            .is_some_and(|h| !h.is_finished())
    }
}

async fn auto_sync_loop(weak: Weak<Inner>, interval: Duration) {
    let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        ticker.tick().await;
        let Some(inner) = weak.upgrade() else {
            break;
        };
        let orchestrator = SyncOrchestrator { inner };
        // Failures are already recorded and logged by the pass itself
        let _ = orchestrator.perform_full_sync().await;
    }
}

/// Releases the claimed `Syncing` status when a pass is dropped mid-flight,
/// e.g. when the auto-sync timer is aborted or a caller's timeout fires.
struct PassClaim<'a> {
    orchestrator: &'a SyncOrchestrator,
    armed: bool,
}

impl Drop for PassClaim<'_> {
    fn drop(&mut self) {
        if self.armed {
            warn!("Full sync cancelled before finishing");
            self.orchestrator.set_status(SyncStatus::Idle);
        }
    }
}

fn snapshots<R: SyncableRecord>(records: Vec<R>) -> Vec<RecordSnapshot> {
    records.iter().map(SyncableRecord::snapshot).collect()
}

fn missing_remotely(local: Vec<RecordSnapshot>, remote: &HashSet<Uuid>) -> Vec<RecordSnapshot> {
    local
        .into_iter()
        .filter(|s| !remote.contains(&s.client_id()))
        .collect()
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use keepsake_core::{InMemoryRepository, StaticReachability, StaticSession};
    use keepsake_crypto::{FieldCipher, KeyManager, KeyManagerConfig, MemoryKeyStore};
    use keepsake_mirror::{MemoryRemoteStore, StoreFailure};

    struct Fixture {
        orchestrator: SyncOrchestrator,
        store: Arc<MemoryRemoteStore>,
        bookmarks: Arc<InMemoryRepository<Bookmark>>,
        categories: Arc<InMemoryRepository<Category>>,
        session: Arc<StaticSession>,
        reachability: Arc<StaticReachability>,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(MemoryRemoteStore::new());
        let keys = Arc::new(KeyManager::new(
            Arc::new(MemoryKeyStore::new()),
            KeyManagerConfig::default(),
        ));
        let mirror = MirrorClient::new(store.clone(), FieldCipher::new(keys));
        let bookmarks = Arc::new(InMemoryRepository::new());
        let categories = Arc::new(InMemoryRepository::new());
        let session = Arc::new(StaticSession::signed_in("user-1"));
        let reachability = Arc::new(StaticReachability::new(true));

        let orchestrator = SyncOrchestrator::new(
            mirror,
            bookmarks.clone(),
            categories.clone(),
            session.clone(),
            reachability.clone(),
            SyncConfig::default(),
        );

        Fixture {
            orchestrator,
            store,
            bookmarks,
            categories,
            session,
            reachability,
        }
    }

    #[tokio::test]
    async fn test_full_sync_uploads_local_records() {
        let f = fixture();
        f.categories.create(&Category::new("Reading")).unwrap();
        f.bookmarks.create(&Bookmark::new("A", "https://a.example")).unwrap();
        f.bookmarks.create(&Bookmark::new("B", "https://b.example")).unwrap();

        let outcome = f.orchestrator.perform_full_sync().await.unwrap();

        let SyncOutcome::Completed(report) = outcome else {
            panic!("expected completed sync");
        };
        assert_eq!(report.categories.uploaded, 1);
        assert_eq!(report.bookmarks.uploaded, 2);
        assert_eq!(f.store.row_count("bookmarks"), 2);
        assert_eq!(f.orchestrator.status(), SyncStatus::Idle);
        assert!(f.orchestrator.last_sync_date().is_some());
        assert!(f.orchestrator.last_error().is_none());
    }

    #[tokio::test]
    async fn test_offline_gate_makes_no_calls() {
        let f = fixture();
        f.reachability.set_connected(false);
        f.bookmarks.create(&Bookmark::new("A", "https://a.example")).unwrap();

        let outcome = f.orchestrator.perform_full_sync().await.unwrap();

        assert_eq!(outcome, SyncOutcome::Skipped(SkipReason::Offline));
        assert_eq!(f.orchestrator.status(), SyncStatus::Offline);
        assert_eq!(f.store.calls().total(), 0);
    }

    #[tokio::test]
    async fn test_signed_out_gate_sets_offline() {
        let f = fixture();
        f.session.sign_out();

        assert!(!f.orchestrator.can_sync());
        assert_eq!(f.orchestrator.status(), SyncStatus::Offline);

        let outcome = f.orchestrator.perform_full_sync().await.unwrap();
        assert_eq!(outcome, SyncOutcome::Skipped(SkipReason::NotAuthenticated));
    }

    #[tokio::test]
    async fn test_gate_reopens_after_reconnect() {
        let f = fixture();
        f.reachability.set_connected(false);
        assert!(!f.orchestrator.can_sync());

        f.reachability.set_connected(true);
        assert!(f.orchestrator.can_sync());
    }

    #[tokio::test]
    async fn test_busy_gate_leaves_status_alone() {
        let f = fixture();
        f.orchestrator.set_status(SyncStatus::Syncing);
        f.reachability.set_connected(false);

        assert!(!f.orchestrator.can_sync());
        assert_eq!(f.orchestrator.status(), SyncStatus::Syncing);
    }

    #[tokio::test]
    async fn test_failure_sets_error_and_keeps_message() {
        let f = fixture();
        f.categories.create(&Category::new("Reading")).unwrap();
        f.store
            .set_failure(Some(StoreFailure::Rejected("schema mismatch".into())));

        let result = f.orchestrator.perform_full_sync().await;

        assert!(matches!(result, Err(Error::RemoteRejected(_))));
        assert_eq!(f.orchestrator.status(), SyncStatus::Error);
        assert!(f.orchestrator.last_error().unwrap().contains("schema mismatch"));
        assert!(f.orchestrator.last_sync_date().is_none());
    }

    #[tokio::test]
    async fn test_error_status_allows_next_pass() {
        let f = fixture();
        f.store.set_failure(Some(StoreFailure::Network));
        assert!(f.orchestrator.perform_full_sync().await.is_err());

        f.store.set_failure(None);
        let outcome = f.orchestrator.perform_full_sync().await.unwrap();
        assert!(matches!(outcome, SyncOutcome::Completed(_)));
        assert_eq!(f.orchestrator.status(), SyncStatus::Idle);
        assert!(f.orchestrator.last_error().is_none());
    }

    #[tokio::test]
    async fn test_sync_one_failure_keeps_status() {
        let f = fixture();
        f.store.set_failure(Some(StoreFailure::Network));
        let bookmark = Bookmark::new("A", "https://a.example");

        let result = f.orchestrator.sync_one(&bookmark.snapshot(), "user-1").await;

        assert!(result.is_err());
        assert_eq!(f.orchestrator.status(), SyncStatus::Idle);
        assert!(f.orchestrator.last_error().is_some());
    }

    #[tokio::test]
    async fn test_status_events_are_emitted() {
        let f = fixture();
        let mut events = f.orchestrator.events();

        f.orchestrator.perform_full_sync().await.unwrap();

        let mut types = Vec::new();
        while let Ok(envelope) = events.try_recv() {
            types.push(envelope.event_type);
        }
        assert_eq!(
            types,
            vec![
                "sync.status_changed",
                "sync.status_changed",
                "sync.full_completed"
            ]
        );
    }

    #[tokio::test]
    async fn test_missing_remotely_filters_known_ids() {
        let a = Bookmark::new("A", "https://a.example");
        let b = Bookmark::new("B", "https://b.example");
        let remote: HashSet<Uuid> = [a.client_id].into_iter().collect();

        let pending = missing_remotely(vec![a.snapshot(), b.snapshot()], &remote);
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].client_id(), b.client_id);
    }

    #[tokio::test(start_paused = true)]
    async fn test_auto_sync_restart_replaces_timer() {
        let f = fixture();
        f.orchestrator.start_auto_sync(Duration::from_secs(60));
        f.orchestrator.start_auto_sync(Duration::from_secs(60));
        assert!(f.orchestrator.is_auto_sync_running());

        tokio::time::sleep(Duration::from_secs(61)).await;
        // One timer, one pass: two list calls (categories, bookmarks)
        assert_eq!(f.store.calls().lists, 2);

        f.orchestrator.stop_auto_sync();
        assert!(!f.orchestrator.is_auto_sync_running());

        tokio::time::sleep(Duration::from_secs(120)).await;
        assert_eq!(f.store.calls().lists, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stopping_auto_sync_mid_pass_releases_status() {
        let f = fixture();
        f.store.set_latency(Some(Duration::from_secs(10)));
        f.orchestrator.start_auto_sync(Duration::from_secs(1));

        tokio::time::sleep(Duration::from_secs(3)).await;
        assert_eq!(f.orchestrator.status(), SyncStatus::Syncing);

        f.orchestrator.stop_auto_sync();
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(f.orchestrator.status(), SyncStatus::Idle);

        f.store.set_latency(None);
        let outcome = f.orchestrator.perform_full_sync().await.unwrap();
        assert!(matches!(outcome, SyncOutcome::Completed(_)));
        assert_eq!(f.orchestrator.status(), SyncStatus::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timed_out_pass_does_not_wedge_engine() {
        let f = fixture();
        f.store.set_latency(Some(Duration::from_secs(10)));

        let attempt =
            tokio::time::timeout(Duration::from_secs(2), f.orchestrator.perform_full_sync()).await;
        assert!(attempt.is_err());
        assert_eq!(f.orchestrator.status(), SyncStatus::Idle);

        f.store.set_latency(None);
        let outcome = f.orchestrator.perform_full_sync().await.unwrap();
        assert!(matches!(outcome, SyncOutcome::Completed(_)));
    }
}
