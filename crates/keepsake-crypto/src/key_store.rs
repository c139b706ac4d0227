//! Secure key storage backends.
//!
//! A key store is a credential vault addressed by `(service, account)`. Entries
//! can carry a `synchronizable` attribute, which vaults that support it use to
//! make the secret available on the user's other devices.
//!
//! Two backends ship with the crate:
//!
//! - [`MemoryKeyStore`]: process memory only, for tests and ephemeral sessions.
//! - [`FileKeyStore`]: one JSON entry per `(service, account)` under a directory,
//!   created owner-only on Unix and renamed into place.

use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::{CryptoError, CryptoResult};
use crate::format::{base64_decode, base64_encode};

/// Generic I/O failure without an OS error code.
pub const STATUS_IO: i32 = -1;

/// Stored entry could not be parsed.
pub const STATUS_CORRUPT: i32 = -2;

/// Store lock was poisoned by a panicking writer.
pub const STATUS_UNAVAILABLE: i32 = -3;

/// A secret as held by the vault.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct StoredSecret {
    pub secret: Vec<u8>,
    #[zeroize(skip)]
    pub synchronizable: bool,
    #[zeroize(skip)]
    pub created_at: DateTime<Utc>,
}

impl std::fmt::Debug for StoredSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoredSecret")
            .field("secret", &"[REDACTED]")
            .field("synchronizable", &self.synchronizable)
            .field("created_at", &self.created_at)
            .finish()
    }
}

/// Credential vault addressed by service and account.
pub trait SecureKeyStore: Send + Sync {
    /// Look up an entry. Absence is `Ok(None)`, not an error.
    fn get(&self, service: &str, account: &str) -> CryptoResult<Option<StoredSecret>>;

    /// Add or replace an entry.
    fn put(
        &self,
        service: &str,
        account: &str,
        secret: &[u8],
        synchronizable: bool,
    ) -> CryptoResult<()>;

    /// Remove an entry. Returns whether anything was removed.
    fn delete(&self, service: &str, account: &str) -> CryptoResult<bool>;
}

fn io_status(err: &std::io::Error) -> i32 {
    err.raw_os_error().unwrap_or(STATUS_IO)
}

// =============================================================================
// MEMORY STORE
// =============================================================================

/// In-memory key store.
#[derive(Default)]
pub struct MemoryKeyStore {
    entries: Mutex<HashMap<(String, String), StoredSecret>>,
    failure: Mutex<Option<i32>>,
}

impl MemoryKeyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent operation fail with the given status code.
    /// Pass `None` to restore normal behavior.
    pub fn set_failure(&self, code: Option<i32>) {
        if let Ok(mut failure) = self.failure.lock() {
            *failure = code;
        }
    }

    /// Number of stored entries.
    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn check_failure(&self) -> CryptoResult<()> {
        let failure = self
            .failure
            .lock()
            .map_err(|_| CryptoError::key_store(STATUS_UNAVAILABLE, "store lock poisoned"))?;
        match *failure {
            Some(code) => Err(CryptoError::key_store(code, "injected failure")),
            None => Ok(()),
        }
    }

    fn entries(
        &self,
    ) -> CryptoResult<std::sync::MutexGuard<'_, HashMap<(String, String), StoredSecret>>> {
        self.entries
            .lock()
            .map_err(|_| CryptoError::key_store(STATUS_UNAVAILABLE, "store lock poisoned"))
    }
}

impl SecureKeyStore for MemoryKeyStore {
    fn get(&self, service: &str, account: &str) -> CryptoResult<Option<StoredSecret>> {
        self.check_failure()?;
        let entries = self.entries()?;
        Ok(entries
            .get(&(service.to_string(), account.to_string()))
            .cloned())
    }

    fn put(
        &self,
        service: &str,
        account: &str,
        secret: &[u8],
        synchronizable: bool,
    ) -> CryptoResult<()> {
        self.check_failure()?;
        let mut entries = self.entries()?;
        entries.insert(
            (service.to_string(), account.to_string()),
            StoredSecret {
                secret: secret.to_vec(),
                synchronizable,
                created_at: Utc::now(),
            },
        );
        Ok(())
    }

    fn delete(&self, service: &str, account: &str) -> CryptoResult<bool> {
        self.check_failure()?;
        let mut entries = self.entries()?;
        Ok(entries
            .remove(&(service.to_string(), account.to_string()))
            .is_some())
    }
}

// =============================================================================
// FILE STORE
// =============================================================================

/// On-disk entry format.
#[derive(Serialize, Deserialize)]
struct EntryFile {
    version: u8,
    service: String,
    account: String,
    secret: String,
    synchronizable: bool,
    created_at: DateTime<Utc>,
}

/// File-backed key store.
///
/// Each entry lives in `<dir>/<service>.<account>.json` with both parts
/// base64url-encoded, so distinct pairs never share a file. Writes go to a
/// temporary sibling first and are renamed into place.
#[derive(Debug, Clone)]
pub struct FileKeyStore {
    dir: PathBuf,
}

impl FileKeyStore {
    /// Open (and create if needed) a store rooted at `dir`.
    pub fn open(dir: impl AsRef<Path>) -> CryptoResult<Self> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir)
            .map_err(|e| CryptoError::key_store(io_status(&e), e.to_string()))?;
        Ok(Self { dir })
    }

    fn entry_path(&self, service: &str, account: &str) -> PathBuf {
        self.dir.join(format!(
            "{}.{}.json",
            encode_component(service),
            encode_component(account)
        ))
    }
}

/// base64url has no `.`, so the encoded pair maps back to exactly one
/// `(service, account)`.
fn encode_component(part: &str) -> String {
    URL_SAFE_NO_PAD.encode(part.as_bytes())
}

/// Create `path` (which must not exist) readable by the owner only, then
/// write `contents`. The mode applies at creation, never after the write.
fn write_private(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    let mut options = std::fs::OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }

    let mut file = options.open(path)?;
    file.write_all(contents)?;
    file.sync_all()
}

fn remove_if_present(path: &Path) -> std::io::Result<()> {
    match std::fs::remove_file(path) {
        Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}

impl SecureKeyStore for FileKeyStore {
    fn get(&self, service: &str, account: &str) -> CryptoResult<Option<StoredSecret>> {
        let path = self.entry_path(service, account);
        let contents = match std::fs::read(&path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(CryptoError::key_store(io_status(&e), e.to_string())),
        };

        let entry: EntryFile = serde_json::from_slice(&contents).map_err(|e| {
            CryptoError::key_store(STATUS_CORRUPT, format!("unreadable entry: {}", e))
        })?;
        if entry.service != service || entry.account != account {
            return Err(CryptoError::key_store(
                STATUS_CORRUPT,
                format!(
                    "entry belongs to {}/{}, not {}/{}",
                    entry.service, entry.account, service, account
                ),
            ));
        }
        let secret = base64_decode(&entry.secret).map_err(|e| {
            CryptoError::key_store(STATUS_CORRUPT, format!("unreadable secret: {}", e))
        })?;

        Ok(Some(StoredSecret {
            secret,
            synchronizable: entry.synchronizable,
            created_at: entry.created_at,
        }))
    }

    fn put(
        &self,
        service: &str,
        account: &str,
        secret: &[u8],
        synchronizable: bool,
    ) -> CryptoResult<()> {
        let path = self.entry_path(service, account);
        let tmp_path = path.with_extension("json.tmp");

        let entry = EntryFile {
            version: 1,
            service: service.to_string(),
            account: account.to_string(),
            secret: base64_encode(secret),
            synchronizable,
            created_at: Utc::now(),
        };
        let mut json = serde_json::to_vec_pretty(&entry)?;

        // A leftover from an interrupted write would block create_new
        let write = remove_if_present(&tmp_path)
            .and_then(|_| write_private(&tmp_path, &json))
            .and_then(|_| std::fs::rename(&tmp_path, &path));
        json.zeroize();

        write.map_err(|e| {
            let _ = std::fs::remove_file(&tmp_path);
            CryptoError::key_store(io_status(&e), e.to_string())
        })?;

        debug!(service, account, synchronizable, "Stored key entry");
        Ok(())
    }

    fn delete(&self, service: &str, account: &str) -> CryptoResult<bool> {
        match std::fs::remove_file(self.entry_path(service, account)) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(CryptoError::key_store(io_status(&e), e.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_store_roundtrip() {
        let store = MemoryKeyStore::new();
        assert!(store.get("svc", "acct").unwrap().is_none());

        store.put("svc", "acct", b"secret", true).unwrap();
        let entry = store.get("svc", "acct").unwrap().unwrap();
        assert_eq!(entry.secret, b"secret");
        assert!(entry.synchronizable);

        assert!(store.delete("svc", "acct").unwrap());
        assert!(!store.delete("svc", "acct").unwrap());
        assert!(store.is_empty());
    }

    #[test]
    fn test_memory_store_injected_failure() {
        let store = MemoryKeyStore::new();
        store.set_failure(Some(-25308));

        let err = store.get("svc", "acct").unwrap_err();
        assert!(matches!(err, CryptoError::KeyStore { code: -25308, .. }));

        store.set_failure(None);
        assert!(store.get("svc", "acct").unwrap().is_none());
    }

    #[test]
    fn test_file_store_roundtrip() {
        let temp = tempfile::tempdir().unwrap();
        let store = FileKeyStore::open(temp.path()).unwrap();

        store.put("com.keepsake", "field-key", &[9u8; 32], false).unwrap();
        let entry = store.get("com.keepsake", "field-key").unwrap().unwrap();
        assert_eq!(entry.secret, vec![9u8; 32]);
        assert!(!entry.synchronizable);

        // Survives reopening
        let reopened = FileKeyStore::open(temp.path()).unwrap();
        assert!(reopened.get("com.keepsake", "field-key").unwrap().is_some());
    }

    #[test]
    fn test_file_store_replace_overwrites() {
        let temp = tempfile::tempdir().unwrap();
        let store = FileKeyStore::open(temp.path()).unwrap();

        store.put("svc", "acct", b"first", false).unwrap();
        store.put("svc", "acct", b"second", true).unwrap();

        let entry = store.get("svc", "acct").unwrap().unwrap();
        assert_eq!(entry.secret, b"second");
        assert!(entry.synchronizable);
    }

    #[test]
    fn test_file_store_delete_is_idempotent() {
        let temp = tempfile::tempdir().unwrap();
        let store = FileKeyStore::open(temp.path()).unwrap();

        assert!(!store.delete("svc", "acct").unwrap());
        store.put("svc", "acct", b"x", false).unwrap();
        assert!(store.delete("svc", "acct").unwrap());
        assert!(store.get("svc", "acct").unwrap().is_none());
    }

    #[test]
    fn test_file_store_corrupt_entry() {
        let temp = tempfile::tempdir().unwrap();
        let store = FileKeyStore::open(temp.path()).unwrap();
        std::fs::write(store.entry_path("svc", "acct"), b"{ nope").unwrap();

        let err = store.get("svc", "acct").unwrap_err();
        assert!(matches!(
            err,
            CryptoError::KeyStore {
                code: STATUS_CORRUPT,
                ..
            }
        ));
    }

    #[cfg(unix)]
    #[test]
    fn test_file_store_owner_only_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let temp = tempfile::tempdir().unwrap();
        let store = FileKeyStore::open(temp.path()).unwrap();
        store.put("svc", "acct", b"x", false).unwrap();

        let mode = std::fs::metadata(store.entry_path("svc", "acct"))
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn test_file_store_similar_accounts_stay_separate() {
        let temp = tempfile::tempdir().unwrap();
        let store = FileKeyStore::open(temp.path()).unwrap();

        store.put("svc", "alice@example.com", &[1u8; 32], false).unwrap();
        store.put("svc", "alice_example.com", &[2u8; 32], false).unwrap();
        store.put("a.b", "c", &[3u8; 32], false).unwrap();
        store.put("a", "b.c", &[4u8; 32], false).unwrap();

        let secret = |service: &str, account: &str| {
            store.get(service, account).unwrap().unwrap().secret.clone()
        };
        assert_eq!(secret("svc", "alice@example.com"), vec![1u8; 32]);
        assert_eq!(secret("svc", "alice_example.com"), vec![2u8; 32]);
        assert_eq!(secret("a.b", "c"), vec![3u8; 32]);
        assert_eq!(secret("a", "b.c"), vec![4u8; 32]);
    }

    #[test]
    fn test_file_store_rejects_entry_for_other_account() {
        let temp = tempfile::tempdir().unwrap();
        let store = FileKeyStore::open(temp.path()).unwrap();
        store.put("svc", "bob", b"x", false).unwrap();
        std::fs::rename(
            store.entry_path("svc", "bob"),
            store.entry_path("svc", "alice"),
        )
        .unwrap();

        let err = store.get("svc", "alice").unwrap_err();
        assert!(matches!(
            err,
            CryptoError::KeyStore {
                code: STATUS_CORRUPT,
                ..
            }
        ));
    }

    #[test]
    fn test_file_store_entry_names_stay_in_dir() {
        let temp = tempfile::tempdir().unwrap();
        let store = FileKeyStore::open(temp.path()).unwrap();

        let path = store.entry_path("com.keepsake/../x", "user@example.com");
        assert_eq!(path.parent(), Some(temp.path()));
    }

    #[test]
    fn test_file_store_recovers_from_stale_temp_file() {
        let temp = tempfile::tempdir().unwrap();
        let store = FileKeyStore::open(temp.path()).unwrap();
        let tmp_path = store.entry_path("svc", "acct").with_extension("json.tmp");
        std::fs::write(&tmp_path, b"partial").unwrap();

        store.put("svc", "acct", b"fresh", false).unwrap();

        assert_eq!(store.get("svc", "acct").unwrap().unwrap().secret, b"fresh");
        assert!(!tmp_path.exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_file_store_temp_file_created_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("entry.json.tmp");
        write_private(&path, b"secret").unwrap();

        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
        // Refuses to reuse a file someone else may already hold open
        assert!(write_private(&path, b"again").is_err());
    }
}
