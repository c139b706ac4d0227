//! The account-wide symmetric field key.

use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::cipher::{generate_random, KEY_SIZE};
use crate::error::{CryptoError, CryptoResult};
use crate::format::{base64_decode, base64_encode};

/// 256-bit AES key, zeroized on drop.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct EncryptionKey {
    bytes: [u8; KEY_SIZE],
}

impl EncryptionKey {
    /// Generate a new random key.
    pub fn generate() -> Self {
        Self {
            bytes: generate_random(),
        }
    }

    /// Build a key from raw bytes, checking the length.
    pub fn from_slice(bytes: &[u8]) -> CryptoResult<Self> {
        if bytes.len() != KEY_SIZE {
            return Err(CryptoError::InvalidKeyFormat(format!(
                "expected {} bytes, got {}",
                KEY_SIZE,
                bytes.len()
            )));
        }
        let mut key = [0u8; KEY_SIZE];
        key.copy_from_slice(bytes);
        Ok(Self { bytes: key })
    }

    /// Parse the portable base64 form produced by [`EncryptionKey::to_base64`].
    pub fn from_base64(text: &str) -> CryptoResult<Self> {
        let mut decoded = base64_decode(text)
            .map_err(|e| CryptoError::InvalidKeyFormat(format!("Invalid base64: {}", e)))?;
        let key = Self::from_slice(&decoded);
        decoded.zeroize();
        key
    }

    /// Portable base64 form.
    pub fn to_base64(&self) -> String {
        base64_encode(&self.bytes)
    }

    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.bytes
    }
}

impl std::fmt::Debug for EncryptionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncryptionKey")
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}
