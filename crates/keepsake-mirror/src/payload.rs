//! Conversion between record snapshots and remote rows.

use keepsake_core::{FieldMap, RecordKind, RecordSnapshot, RemoteRow, Result};
use keepsake_crypto::{FieldCipher, IS_ENCRYPTED_FIELD};
use serde_json::Value;

/// Field that identifies the record on both sides; carried on the row itself.
const CLIENT_ID_FIELD: &str = "client_id";

/// Build the remote row for a snapshot.
///
/// Sensitive fields are encrypted with the degrading policy: a field that
/// cannot be encrypted becomes a sentinel and the row is marked
/// `is_encrypted = false`.
pub fn build_row(
    cipher: &FieldCipher,
    snapshot: &RecordSnapshot,
    owner_id: &str,
    sync_version: i64,
) -> Result<RemoteRow> {
    let kind = snapshot.kind();
    let mut fields = snapshot.to_fields()?;
    fields.remove(CLIENT_ID_FIELD);

    let mut fields = cipher.encrypt_payload(&fields, kind.sensitive_fields());
    let is_encrypted = matches!(fields.remove(IS_ENCRYPTED_FIELD), Some(Value::Bool(true)));

    Ok(RemoteRow {
        remote_id: None,
        owner_id: owner_id.to_string(),
        client_id: snapshot.client_id(),
        is_encrypted,
        sync_version,
        fields,
    })
}

/// Field map of a remote row with sensitive fields decrypted.
///
/// Rows that were never encrypted (legacy or degraded) are returned as stored.
pub fn open_row(cipher: &FieldCipher, kind: RecordKind, row: &RemoteRow) -> Result<FieldMap> {
    let mut fields = row.fields.clone();
    fields.insert(IS_ENCRYPTED_FIELD.to_string(), Value::Bool(row.is_encrypted));

    let mut fields = cipher.decrypt_payload(&fields, kind.sensitive_fields())?;
    fields.remove(IS_ENCRYPTED_FIELD);
    fields.insert(
        CLIENT_ID_FIELD.to_string(),
        Value::String(row.client_id.to_string()),
    );
    Ok(fields)
}
