//! Lifecycle of the account-wide field key.
//!
//! The key is generated lazily on first use, persisted in a [`SecureKeyStore`]
//! and cached in memory afterwards. All access goes through one mutex, so two
//! concurrent first calls cannot generate two different keys.

use std::sync::{Arc, Mutex, MutexGuard};

use tracing::{debug, info, warn};

use crate::error::{CryptoError, CryptoResult};
use crate::kdf::KdfParams;
use crate::key::EncryptionKey;
use crate::key_store::{SecureKeyStore, STATUS_CORRUPT, STATUS_UNAVAILABLE};
use crate::sealed::{open_sealed_key, seal_key};

/// Default vault service name.
pub const DEFAULT_SERVICE: &str = "com.keepsake.encryption";

/// Default vault account name.
pub const DEFAULT_ACCOUNT: &str = "field-key";

/// Where and how the key is stored.
#[derive(Debug, Clone)]
pub struct KeyManagerConfig {
    /// Vault service name.
    pub service: String,
    /// Vault account name.
    pub account: String,
    /// Ask the vault to make the key available on the user's other devices.
    pub synchronizable: bool,
    /// Argon2id parameters for sealed exports.
    pub kdf_params: KdfParams,
}

impl Default for KeyManagerConfig {
    fn default() -> Self {
        Self {
            service: DEFAULT_SERVICE.to_string(),
            account: DEFAULT_ACCOUNT.to_string(),
            synchronizable: false,
            kdf_params: KdfParams::default(),
        }
    }
}

impl KeyManagerConfig {
    /// Create config from environment variables (with defaults).
    ///
    /// | Variable | Default | Description |
    /// |----------|---------|-------------|
    /// | `KEEPSAKE_KEY_SERVICE` | `com.keepsake.encryption` | Vault service name |
    /// | `KEEPSAKE_KEY_ACCOUNT` | `field-key` | Vault account name |
    /// | `KEEPSAKE_KEY_SYNCHRONIZABLE` | `false` | Cross-device availability |
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            service: std::env::var("KEEPSAKE_KEY_SERVICE").unwrap_or(defaults.service),
            account: std::env::var("KEEPSAKE_KEY_ACCOUNT").unwrap_or(defaults.account),
            synchronizable: std::env::var("KEEPSAKE_KEY_SYNCHRONIZABLE")
                .map(|v| v == "1" || v.to_lowercase() == "true")
                .unwrap_or(false),
            kdf_params: defaults.kdf_params,
        }
    }

    /// Use a different vault account (one key per signed-in account).
    pub fn with_account(mut self, account: impl Into<String>) -> Self {
        self.account = account.into();
        self
    }

    /// Enable or disable cross-device availability.
    pub fn with_synchronizable(mut self, synchronizable: bool) -> Self {
        self.synchronizable = synchronizable;
        self
    }

    /// Override the KDF parameters used for sealed exports.
    pub fn with_kdf_params(mut self, params: KdfParams) -> Self {
        self.kdf_params = params;
        self
    }
}

/// Owns the field key: generation, storage, export/import and destruction.
pub struct KeyManager {
    store: Arc<dyn SecureKeyStore>,
    config: KeyManagerConfig,
    cache: Mutex<Option<EncryptionKey>>,
}

impl KeyManager {
    pub fn new(store: Arc<dyn SecureKeyStore>, config: KeyManagerConfig) -> Self {
        Self {
            store,
            config,
            cache: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &KeyManagerConfig {
        &self.config
    }

    fn lock_cache(&self) -> CryptoResult<MutexGuard<'_, Option<EncryptionKey>>> {
        self.cache
            .lock()
            .map_err(|_| CryptoError::key_store(STATUS_UNAVAILABLE, "key cache lock poisoned"))
    }

    /// Return the cached key, else the stored key, else a newly generated one.
    pub fn get_or_create_key(&self) -> CryptoResult<EncryptionKey> {
        let mut cache = self.lock_cache()?;
        if let Some(key) = cache.as_ref() {
            return Ok(key.clone());
        }

        let key = match self.store.get(&self.config.service, &self.config.account)? {
            Some(entry) => {
                debug!(account = %self.config.account, "Loaded field key from store");
                EncryptionKey::from_slice(&entry.secret).map_err(|_| {
                    CryptoError::key_store(STATUS_CORRUPT, "stored key has wrong length")
                })?
            }
            None => {
                let key = EncryptionKey::generate();
                self.store.put(
                    &self.config.service,
                    &self.config.account,
                    key.as_bytes(),
                    self.config.synchronizable,
                )?;
                info!(
                    account = %self.config.account,
                    synchronizable = self.config.synchronizable,
                    "Generated new field key"
                );
                key
            }
        };

        *cache = Some(key.clone());
        Ok(key)
    }

    /// Whether a usable key exists right now. Never generates one.
    pub fn is_key_available(&self) -> bool {
        if let Ok(cache) = self.cache.lock() {
            if cache.is_some() {
                return true;
            }
        }
        match self.store.get(&self.config.service, &self.config.account) {
            Ok(entry) => entry.is_some(),
            Err(e) => {
                warn!(error = %e, "Key store lookup failed");
                false
            }
        }
    }

    /// Export the key as portable base64 text, creating it if needed.
    pub fn export_key(&self) -> CryptoResult<String> {
        Ok(self.get_or_create_key()?.to_base64())
    }

    /// Export the key sealed under a passphrase.
    pub fn export_key_sealed(&self, passphrase: &str) -> CryptoResult<String> {
        let key = self.get_or_create_key()?;
        seal_key(&key, passphrase, &self.config.kdf_params)
    }

    /// Replace the stored key with an exported one.
    ///
    /// Data encrypted under the previous key becomes unreadable unless that
    /// key is imported again.
    pub fn import_key(&self, text: &str) -> CryptoResult<()> {
        let key = EncryptionKey::from_base64(text)?;
        self.install(key)
    }

    /// Replace the stored key with a passphrase-sealed export.
    pub fn import_key_sealed(&self, text: &str, passphrase: &str) -> CryptoResult<()> {
        let key = open_sealed_key(text, passphrase)?;
        self.install(key)
    }

    fn install(&self, key: EncryptionKey) -> CryptoResult<()> {
        let mut cache = self.lock_cache()?;
        self.store.put(
            &self.config.service,
            &self.config.account,
            key.as_bytes(),
            self.config.synchronizable,
        )?;
        *cache = Some(key);
        info!(account = %self.config.account, "Imported field key");
        Ok(())
    }

    /// Remove the key from storage and memory. Deleting an absent key succeeds.
    pub fn delete_key(&self) -> CryptoResult<()> {
        let mut cache = self.lock_cache()?;
        let removed = self
            .store
            .delete(&self.config.service, &self.config.account)?;
        *cache = None;
        info!(account = %self.config.account, removed, "Deleted field key");
        Ok(())
    }
}
