//! Collaborator traits for the sync engine.
//!
//! The host application supplies the local store, the session and the
//! reachability probe; the mirror crate supplies remote stores.

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::Result;
use crate::models::{RemoteRow, SyncableRecord};

// =============================================================================
// LOCAL STORE
// =============================================================================

/// Local CRUD repository for one record kind.
///
/// Calls are synchronous and must never perform network I/O. The host
/// serializes mutations (single writer); implementations only need to be
/// shareable across threads.
pub trait LocalRepository<R: SyncableRecord>: Send + Sync {
    /// All records, newest first.
    fn fetch_all(&self) -> Result<Vec<R>>;

    /// One record by client id.
    fn fetch(&self, client_id: Uuid) -> Result<Option<R>>;

    fn create(&self, record: &R) -> Result<()>;

    fn update(&self, record: &R) -> Result<()>;

    fn delete(&self, record: &R) -> Result<()>;

    /// Delete a batch of records in one local transaction.
    fn delete_multiple(&self, records: &[R]) -> Result<()> {
        for record in records {
            self.delete(record)?;
        }
        Ok(())
    }

    fn count(&self) -> Result<usize>;
}

// =============================================================================
// ENVIRONMENT
// =============================================================================

/// Active session of the signed-in user.
pub trait SessionProvider: Send + Sync {
    /// Owner id to attribute remote rows to, if signed in.
    fn current_user_id(&self) -> Option<String>;

    fn is_authenticated(&self) -> bool {
        self.current_user_id().is_some()
    }

    /// Bearer token for the remote store, when the backend needs one.
    fn access_token(&self) -> Option<String> {
        None
    }
}

/// Network reachability probe.
pub trait ReachabilityProbe: Send + Sync {
    fn is_connected(&self) -> bool;
}

// =============================================================================
// REMOTE STORE
// =============================================================================

/// Table-oriented remote store holding mirrored rows.
///
/// Rows are addressed by `(owner_id, client_id)` within a table.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Find the row for `(owner_id, client_id)`, if one exists.
    async fn find_row(
        &self,
        table: &str,
        owner_id: &str,
        client_id: Uuid,
    ) -> Result<Option<RemoteRow>>;

    /// Insert a new row.
    async fn insert_row(&self, table: &str, row: &RemoteRow) -> Result<()>;

    /// Replace the mutable fields of an existing row.
    async fn update_row(&self, table: &str, remote_id: &str, row: &RemoteRow) -> Result<()>;

    /// Delete rows matching `(owner_id, client_id)`. Returns the number removed.
    async fn delete_rows(&self, table: &str, owner_id: &str, client_id: Uuid) -> Result<u64>;

    /// Every client id mirrored in `table` for `owner_id`.
    async fn list_client_ids(&self, table: &str, owner_id: &str) -> Result<Vec<Uuid>>;
}
