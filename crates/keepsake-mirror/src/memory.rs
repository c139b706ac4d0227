//! In-memory remote store with call accounting.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use keepsake_core::{Error, RemoteRow, RemoteStore, Result};
use uuid::Uuid;

/// Failure a [`MemoryRemoteStore`] can be told to return.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreFailure {
    Network,
    NotAuthenticated,
    Rejected(String),
}

impl StoreFailure {
    fn to_error(&self) -> Error {
        match self {
            StoreFailure::Network => Error::Network("connection refused".to_string()),
            StoreFailure::NotAuthenticated => Error::NotAuthenticated,
            StoreFailure::Rejected(reason) => Error::RemoteRejected(reason.clone()),
        }
    }
}

/// Counts of calls made against a [`MemoryRemoteStore`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallCounts {
    pub finds: usize,
    pub inserts: usize,
    pub updates: usize,
    pub deletes: usize,
    pub lists: usize,
}

impl CallCounts {
    pub fn total(&self) -> usize {
        self.finds + self.inserts + self.updates + self.deletes + self.lists
    }
}

/// Remote store held in process memory.
///
/// Behaves like a table store with a unique `(owner_id, client_id)` index:
/// a second insert for the same pair is rejected.
#[derive(Default)]
pub struct MemoryRemoteStore {
    tables: Mutex<HashMap<String, Vec<RemoteRow>>>,
    failure: Mutex<Option<StoreFailure>>,
    latency: Mutex<Option<Duration>>,
    finds: AtomicUsize,
    inserts: AtomicUsize,
    updates: AtomicUsize,
    deletes: AtomicUsize,
    lists: AtomicUsize,
}

impl MemoryRemoteStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every call fail. `None` restores normal behavior.
    pub fn set_failure(&self, failure: Option<StoreFailure>) {
        *lock(&self.failure) = failure;
    }

    /// Delay every call by `latency` before it runs.
    pub fn set_latency(&self, latency: Option<Duration>) {
        *lock(&self.latency) = latency;
    }

    /// Rows currently stored in `table`.
    pub fn rows(&self, table: &str) -> Vec<RemoteRow> {
        lock(&self.tables).get(table).cloned().unwrap_or_default()
    }

    pub fn row_count(&self, table: &str) -> usize {
        lock(&self.tables).get(table).map_or(0, Vec::len)
    }

    /// Seed a row directly, bypassing call accounting.
    pub fn seed(&self, table: &str, mut row: RemoteRow) {
        if row.remote_id.is_none() {
            row.remote_id = Some(Uuid::new_v4().to_string());
        }
        lock(&self.tables)
            .entry(table.to_string())
            .or_default()
            .push(row);
    }

    pub fn calls(&self) -> CallCounts {
        CallCounts {
            finds: self.finds.load(Ordering::SeqCst),
            inserts: self.inserts.load(Ordering::SeqCst),
            updates: self.updates.load(Ordering::SeqCst),
            deletes: self.deletes.load(Ordering::SeqCst),
            lists: self.lists.load(Ordering::SeqCst),
        }
    }

    pub fn reset_calls(&self) {
        for counter in [
            &self.finds,
            &self.inserts,
            &self.updates,
            &self.deletes,
            &self.lists,
        ] {
            counter.store(0, Ordering::SeqCst);
        }
    }

    async fn enter(&self, counter: &AtomicUsize) -> Result<()> {
        counter.fetch_add(1, Ordering::SeqCst);
        let latency = *lock(&self.latency);
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        match lock(&self.failure).as_ref() {
            Some(failure) => Err(failure.to_error()),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl RemoteStore for MemoryRemoteStore {
    async fn find_row(
        &self,
        table: &str,
        owner_id: &str,
        client_id: Uuid,
    ) -> Result<Option<RemoteRow>> {
        self.enter(&self.finds).await?;
        Ok(lock(&self.tables).get(table).and_then(|rows| {
            rows.iter()
                .find(|r| r.owner_id == owner_id && r.client_id == client_id)
                .cloned()
        }))
    }

    async fn insert_row(&self, table: &str, row: &RemoteRow) -> Result<()> {
        self.enter(&self.inserts).await?;
        let mut tables = lock(&self.tables);
        let rows = tables.entry(table.to_string()).or_default();
        if rows
            .iter()
            .any(|r| r.owner_id == row.owner_id && r.client_id == row.client_id)
        {
            return Err(Error::RemoteRejected(format!(
                "duplicate key value violates unique constraint \"{}_owner_client_key\"",
                table
            )));
        }
        let mut row = row.clone();
        row.remote_id = Some(Uuid::new_v4().to_string());
        rows.push(row);
        Ok(())
    }

    async fn update_row(&self, table: &str, remote_id: &str, row: &RemoteRow) -> Result<()> {
        self.enter(&self.updates).await?;
        let mut tables = lock(&self.tables);
        let existing = tables
            .get_mut(table)
            .and_then(|rows| {
                rows.iter_mut()
                    .find(|r| r.remote_id.as_deref() == Some(remote_id))
            })
            .ok_or_else(|| Error::NotFound(format!("{} row {}", table, remote_id)))?;

        let mut row = row.clone();
        row.remote_id = Some(remote_id.to_string());
        *existing = row;
        Ok(())
    }

    async fn delete_rows(&self, table: &str, owner_id: &str, client_id: Uuid) -> Result<u64> {
        self.enter(&self.deletes).await?;
        let mut tables = lock(&self.tables);
        let Some(rows) = tables.get_mut(table) else {
            return Ok(0);
        };
        let before = rows.len();
        rows.retain(|r| !(r.owner_id == owner_id && r.client_id == client_id));
        Ok((before - rows.len()) as u64)
    }

    async fn list_client_ids(&self, table: &str, owner_id: &str) -> Result<Vec<Uuid>> {
        self.enter(&self.lists).await?;
        Ok(lock(&self.tables)
            .get(table)
            .map(|rows| {
                rows.iter()
                    .filter(|r| r.owner_id == owner_id)
                    .map(|r| r.client_id)
                    .collect()
            })
            .unwrap_or_default())
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
