//! Local repository decorator that mirrors successful mutations in the
//! background.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use keepsake_core::{LocalRepository, RecordRef, Result, SyncableRecord};
use tracing::trace;
use uuid::Uuid;

use crate::dispatch::{SyncDispatcher, SyncTask};

/// Wraps a [`LocalRepository`] so every successful mutation is mirrored.
///
/// The wrapped call runs first and its result is returned unchanged. Only on
/// success is a snapshot handed to the dispatcher; the caller never waits on
/// the network.
pub struct SyncingRepository<R: SyncableRecord> {
    inner: Arc<dyn LocalRepository<R>>,
    dispatcher: Arc<SyncDispatcher>,
    sync_enabled: AtomicBool,
}

impl<R: SyncableRecord> SyncingRepository<R> {
    pub fn new(
        inner: Arc<dyn LocalRepository<R>>,
        dispatcher: Arc<SyncDispatcher>,
        sync_enabled: bool,
    ) -> Self {
        Self {
            inner,
            dispatcher,
            sync_enabled: AtomicBool::new(sync_enabled),
        }
    }

    pub fn is_sync_enabled(&self) -> bool {
        self.sync_enabled.load(Ordering::SeqCst)
    }

    /// With sync disabled the decorator is a plain pass-through.
    pub fn set_sync_enabled(&self, enabled: bool) {
        self.sync_enabled.store(enabled, Ordering::SeqCst);
    }

    /// The undecorated repository.
    pub fn inner(&self) -> &Arc<dyn LocalRepository<R>> {
        &self.inner
    }

    fn dispatch(&self, task: SyncTask) {
        if !self.is_sync_enabled() {
            trace!(op = task.op(), "Sync disabled, mutation not mirrored");
            return;
        }
        self.dispatcher.dispatch(task);
    }
}

impl<R: SyncableRecord> LocalRepository<R> for SyncingRepository<R> {
    fn fetch_all(&self) -> Result<Vec<R>> {
        self.inner.fetch_all()
    }

    fn fetch(&self, client_id: Uuid) -> Result<Option<R>> {
        self.inner.fetch(client_id)
    }

    fn create(&self, record: &R) -> Result<()> {
        self.inner.create(record)?;
        self.dispatch(SyncTask::Upsert(record.snapshot()));
        Ok(())
    }

    fn update(&self, record: &R) -> Result<()> {
        self.inner.update(record)?;
        self.dispatch(SyncTask::Upsert(record.snapshot()));
        Ok(())
    }

    fn delete(&self, record: &R) -> Result<()> {
        // Identify before deleting; the record cannot be re-read afterwards
        let target = record.record_ref();
        self.inner.delete(record)?;
        self.dispatch(SyncTask::Delete(target));
        Ok(())
    }

    fn delete_multiple(&self, records: &[R]) -> Result<()> {
        let targets: Vec<RecordRef> = records.iter().map(SyncableRecord::record_ref).collect();
        self.inner.delete_multiple(records)?;
        for target in targets {
            self.dispatch(SyncTask::Delete(target));
        }
        Ok(())
    }

    fn count(&self) -> Result<usize> {
        self.inner.count()
    }
}
