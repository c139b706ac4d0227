//! Remote mirror client: idempotent upsert, delete and listing by client id.

use std::collections::HashSet;
use std::sync::Arc;

use keepsake_core::{Error, FieldMap, RecordKind, RecordRef, RecordSnapshot, RemoteStore, Result};
use keepsake_crypto::FieldCipher;
use tracing::{debug, instrument, trace};
use uuid::Uuid;

use crate::payload::{build_row, open_row};

/// Which branch an upsert took.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    Updated,
}

/// Mirrors records into a [`RemoteStore`], encrypting sensitive fields.
///
/// Nothing here retries; retry policy belongs to the caller.
#[derive(Clone)]
pub struct MirrorClient {
    store: Arc<dyn RemoteStore>,
    cipher: FieldCipher,
}

impl MirrorClient {
    pub fn new(store: Arc<dyn RemoteStore>, cipher: FieldCipher) -> Self {
        Self { store, cipher }
    }

    pub fn cipher(&self) -> &FieldCipher {
        &self.cipher
    }

    /// Insert the record's row if absent, otherwise replace it in place.
    ///
    /// Calling this twice with the same record leaves exactly one row.
    #[instrument(
        skip(self, snapshot),
        fields(
            subsystem = "mirror",
            op = "upsert",
            record_kind = %snapshot.kind(),
            client_id = %snapshot.client_id()
        )
    )]
    pub async fn upsert(&self, snapshot: &RecordSnapshot, owner_id: &str) -> Result<UpsertOutcome> {
        require_owner(owner_id)?;
        let table = snapshot.kind().table();

        match self
            .store
            .find_row(table, owner_id, snapshot.client_id())
            .await?
        {
            None => {
                let row = build_row(&self.cipher, snapshot, owner_id, 1)?;
                self.store.insert_row(table, &row).await?;
                debug!(table, "Inserted remote row");
                Ok(UpsertOutcome::Inserted)
            }
            Some(existing) => {
                let remote_id = existing.remote_id.ok_or_else(|| {
                    Error::RemoteRejected(format!("{} row without id", table))
                })?;
                let row = build_row(
                    &self.cipher,
                    snapshot,
                    owner_id,
                    existing.sync_version.saturating_add(1),
                )?;
                self.store.update_row(table, &remote_id, &row).await?;
                debug!(table, sync_version = row.sync_version, "Updated remote row");
                Ok(UpsertOutcome::Updated)
            }
        }
    }

    /// Remove the record's row. A row that is already gone is a success.
    ///
    /// Returns whether a row was removed.
    #[instrument(
        skip(self),
        fields(
            subsystem = "mirror",
            op = "delete",
            record_kind = %record.kind,
            client_id = %record.client_id
        )
    )]
    pub async fn delete(&self, record: RecordRef, owner_id: &str) -> Result<bool> {
        require_owner(owner_id)?;
        let removed = self
            .store
            .delete_rows(record.kind.table(), owner_id, record.client_id)
            .await?;
        if removed == 0 {
            debug!("No remote row to delete");
        }
        Ok(removed > 0)
    }

    /// Every client id of `kind` mirrored for `owner_id`.
    #[instrument(skip(self), fields(subsystem = "mirror", op = "list_client_ids"))]
    pub async fn list_client_ids(&self, kind: RecordKind, owner_id: &str) -> Result<HashSet<Uuid>> {
        require_owner(owner_id)?;
        let ids: HashSet<Uuid> = self
            .store
            .list_client_ids(kind.table(), owner_id)
            .await?
            .into_iter()
            .collect();
        trace!(remote_count = ids.len(), "Listed remote client ids");
        Ok(ids)
    }

    /// Read one row back with its sensitive fields decrypted.
    ///
    /// For inspection only; the engine never pulls remote state into the
    /// local store.
    pub async fn fetch_decrypted(
        &self,
        kind: RecordKind,
        client_id: Uuid,
        owner_id: &str,
    ) -> Result<Option<FieldMap>> {
        require_owner(owner_id)?;
        match self.store.find_row(kind.table(), owner_id, client_id).await? {
            Some(row) => open_row(&self.cipher, kind, &row).map(Some),
            None => Ok(None),
        }
    }
}

fn require_owner(owner_id: &str) -> Result<()> {
    if owner_id.trim().is_empty() {
        return Err(Error::NotAuthenticated);
    }
    Ok(())
}
