//! Key derivation using Argon2id, for passphrase-sealed key exports.

use argon2::{Algorithm, Argon2, Params, Version};
use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::cipher::KEY_SIZE;
use crate::error::{CryptoError, CryptoResult};

/// Minimum passphrase length.
pub const MIN_PASSPHRASE_LENGTH: usize = 12;

/// Argon2id parameters.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct KdfParams {
    /// Memory in KiB (default: 65536 = 64 MiB).
    pub memory_kib: u32,
    /// Time iterations (default: 3).
    pub iterations: u32,
    /// Parallelism degree (default: 4).
    pub parallelism: u32,
}

impl Default for KdfParams {
    fn default() -> Self {
        Self {
            memory_kib: 65536, // 64 MiB
            iterations: 3,
            parallelism: 4,
        }
    }
}

impl KdfParams {
    /// Low-memory parameters for phones and tests.
    pub fn low_memory() -> Self {
        Self {
            memory_kib: 8192, // 8 MiB
            iterations: 3,
            parallelism: 1,
        }
    }
}

/// Key wrapper with automatic zeroization on drop.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct DerivedKey {
    key: [u8; KEY_SIZE],
}

impl DerivedKey {
    /// Get the key bytes.
    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.key
    }
}

impl std::fmt::Debug for DerivedKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DerivedKey")
            .field("key", &"[REDACTED]")
            .finish()
    }
}

/// Derive a 256-bit key from passphrase using Argon2id.
pub fn derive_key(
    passphrase: &[u8],
    salt: &[u8; 32],
    params: &KdfParams,
) -> CryptoResult<DerivedKey> {
    if passphrase.len() < MIN_PASSPHRASE_LENGTH {
        return Err(CryptoError::PassphraseTooShort(MIN_PASSPHRASE_LENGTH));
    }

    let argon2_params = Params::new(
        params.memory_kib,
        params.iterations,
        params.parallelism,
        Some(KEY_SIZE),
    )
    .map_err(|e| CryptoError::KeyDerivation(e.to_string()))?;

    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, argon2_params);

    let mut key = [0u8; KEY_SIZE];
    argon2
        .hash_password_into(passphrase, salt, &mut key)
        .map_err(|e| CryptoError::KeyDerivation(e.to_string()))?;

    Ok(DerivedKey { key })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derive_is_deterministic() {
        let salt = [5u8; 32];
        let params = KdfParams::low_memory();
        let a = derive_key(b"correct horse battery", &salt, &params).unwrap();
        let b = derive_key(b"correct horse battery", &salt, &params).unwrap();
        assert_eq!(a.as_bytes(), b.as_bytes());
    }

    #[test]
    fn test_different_salt_different_key() {
        let params = KdfParams::low_memory();
        let a = derive_key(b"correct horse battery", &[1u8; 32], &params).unwrap();
        let b = derive_key(b"correct horse battery", &[2u8; 32], &params).unwrap();
        assert_ne!(a.as_bytes(), b.as_bytes());
    }

    #[test]
    fn test_short_passphrase_rejected() {
        let result = derive_key(b"short", &[0u8; 32], &KdfParams::low_memory());
        assert!(matches!(result, Err(CryptoError::PassphraseTooShort(12))));
    }

    #[test]
    fn test_debug_is_redacted() {
        let key = derive_key(b"correct horse battery", &[0u8; 32], &KdfParams::low_memory())
            .unwrap();
        assert!(format!("{:?}", key).contains("REDACTED"));
    }
}
