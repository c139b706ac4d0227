//! Passphrase-sealed key export.
//!
//! The plain export is bare base64 of the key. The sealed form wraps the key
//! with a passphrase so it can travel over untrusted channels (mail, notes,
//! cloud clipboard) between devices.
//!
//! # Format: KSSEAL01
//!
//! ```text
//! +------------------+
//! | Magic: KSSEAL01  | 8 bytes
//! +------------------+
//! | Header Length    | 4 bytes (little-endian)
//! +------------------+
//! | Header (JSON)    | Variable
//! +------------------+
//! | Encrypted Key    | 48 bytes (32-byte key + 16-byte auth tag)
//! +------------------+
//! ```
//!
//! The whole blob is base64-encoded for transport.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::cipher::{
    aes_gcm_decrypt, aes_gcm_encrypt, generate_nonce, generate_salt, KEY_SIZE, NONCE_SIZE,
    TAG_SIZE,
};
use crate::error::{CryptoError, CryptoResult};
use crate::format::{base64_decode, base64_encode};
use crate::kdf::{derive_key, KdfParams};
use crate::key::EncryptionKey;

/// Magic bytes for the sealed key format.
pub const MAGIC_SEALED: &[u8; 8] = b"KSSEAL01";

/// Header for sealed key exports.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SealedKeyHeader {
    /// Format version.
    pub version: u8,
    /// KDF algorithm (always "argon2id").
    pub kdf: String,
    /// KDF parameters.
    pub kdf_params: KdfParams,
    /// Salt for key derivation (base64).
    pub salt: String,
    /// Nonce for encryption (base64).
    pub nonce: String,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

/// Seal a key under a passphrase. Returns portable base64 text.
pub fn seal_key(
    key: &EncryptionKey,
    passphrase: &str,
    kdf_params: &KdfParams,
) -> CryptoResult<String> {
    let salt = generate_salt();
    let nonce = generate_nonce();

    let derived = derive_key(passphrase.as_bytes(), &salt, kdf_params)?;
    let ciphertext = aes_gcm_encrypt(derived.as_bytes(), &nonce, key.as_bytes())?;

    let header = SealedKeyHeader {
        version: 1,
        kdf: "argon2id".to_string(),
        kdf_params: kdf_params.clone(),
        salt: base64_encode(&salt),
        nonce: base64_encode(&nonce),
        created_at: Utc::now(),
    };

    let header_json = serde_json::to_vec(&header)
        .map_err(|e| CryptoError::Encryption(format!("Header serialization failed: {}", e)))?;
    let header_len = (header_json.len() as u32).to_le_bytes();

    let mut output = Vec::with_capacity(8 + 4 + header_json.len() + ciphertext.len());
    output.extend_from_slice(MAGIC_SEALED);
    output.extend_from_slice(&header_len);
    output.extend_from_slice(&header_json);
    output.extend_from_slice(&ciphertext);

    Ok(base64_encode(&output))
}

/// Open a sealed export with its passphrase.
pub fn open_sealed_key(text: &str, passphrase: &str) -> CryptoResult<EncryptionKey> {
    let sealed = base64_decode(text)
        .map_err(|e| CryptoError::InvalidKeyFormat(format!("Invalid base64: {}", e)))?;

    let sealed_len = KEY_SIZE + TAG_SIZE;
    if sealed.len() < 12 + sealed_len {
        return Err(CryptoError::InvalidKeyFormat("sealed key too short".into()));
    }
    if &sealed[0..8] != MAGIC_SEALED {
        return Err(CryptoError::InvalidKeyFormat("not a sealed key".into()));
    }

    let mut len_bytes = [0u8; 4];
    len_bytes.copy_from_slice(&sealed[8..12]);
    let header_len = u32::from_le_bytes(len_bytes) as usize;

    if sealed.len() != 12 + header_len + sealed_len {
        return Err(CryptoError::InvalidKeyFormat("sealed key truncated".into()));
    }

    let header: SealedKeyHeader = serde_json::from_slice(&sealed[12..12 + header_len])
        .map_err(|e| CryptoError::InvalidKeyFormat(format!("Invalid header: {}", e)))?;

    let salt = base64_decode(&header.salt)
        .map_err(|e| CryptoError::InvalidKeyFormat(format!("Invalid salt: {}", e)))?;
    let nonce = base64_decode(&header.nonce)
        .map_err(|e| CryptoError::InvalidKeyFormat(format!("Invalid nonce: {}", e)))?;

    let salt_arr: [u8; 32] = salt
        .try_into()
        .map_err(|_| CryptoError::InvalidKeyFormat("Invalid salt length".into()))?;
    let nonce_arr: [u8; NONCE_SIZE] = nonce
        .try_into()
        .map_err(|_| CryptoError::InvalidKeyFormat("Invalid nonce length".into()))?;

    let derived = derive_key(passphrase.as_bytes(), &salt_arr, &header.kdf_params)?;
    let key_bytes = aes_gcm_decrypt(derived.as_bytes(), &nonce_arr, &sealed[12 + header_len..])?;

    EncryptionKey::from_slice(&key_bytes)
}
