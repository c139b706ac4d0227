//! # keepsake-crypto
//!
//! Field-level encryption for keepsake's remote mirror.
//!
//! Sensitive record fields are encrypted on-device before they are pushed,
//! so the backend operator only ever stores ciphertext.
//!
//! ## Cryptographic Primitives
//!
//! - **Symmetric cipher**: AES-256-GCM (AEAD), fresh 96-bit nonce per call
//! - **Envelope**: base64 of `nonce || ciphertext || tag`
//! - **Sealed key export**: Argon2id-derived key wrapping the field key
//! - **Random generation**: OS-seeded thread RNG
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//! use keepsake_crypto::{FieldCipher, KeyManager, KeyManagerConfig, MemoryKeyStore};
//!
//! let keys = Arc::new(KeyManager::new(
//!     Arc::new(MemoryKeyStore::new()),
//!     KeyManagerConfig::default(),
//! ));
//! let cipher = FieldCipher::new(keys.clone());
//!
//! let ciphertext = cipher.encrypt_str("Confidential title").unwrap();
//! assert_eq!(cipher.decrypt_str(&ciphertext).unwrap(), "Confidential title");
//!
//! // Move the key to another device
//! let exported = keys.export_key().unwrap();
//! keys.delete_key().unwrap();
//! keys.import_key(&exported).unwrap();
//! assert_eq!(cipher.decrypt_str(&ciphertext).unwrap(), "Confidential title");
//! ```

pub mod cipher;
pub mod error;
pub mod field_cipher;
pub mod format;
pub mod kdf;
pub mod key;
pub mod key_manager;
pub mod key_store;
pub mod sealed;

// Re-export commonly used types
pub use error::{CryptoError, CryptoResult};
pub use field_cipher::{
    is_encrypted, FieldCipher, FieldMap, ENCRYPTION_FAILED_SENTINEL, IS_ENCRYPTED_FIELD,
};
pub use format::{base64_decode, base64_encode, Envelope, ALGORITHM};
pub use kdf::{derive_key, DerivedKey, KdfParams};
pub use key::EncryptionKey;
pub use key_manager::{KeyManager, KeyManagerConfig};
pub use key_store::{FileKeyStore, MemoryKeyStore, SecureKeyStore, StoredSecret};
