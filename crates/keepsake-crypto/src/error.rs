//! Error types for key management and field encryption.

use thiserror::Error;

/// Cryptographic and key-store errors.
///
/// Key-store failures (`KeyStore`) are kept apart from cipher failures so
/// callers can tell a broken vault from tampered data.
#[derive(Error, Debug)]
pub enum CryptoError {
    /// The secure key store rejected or failed an operation.
    #[error("Key store error ({code}): {message}")]
    KeyStore { code: i32, message: String },

    /// Imported key text did not decode to a 256-bit key.
    #[error("Invalid key format: {0}")]
    InvalidKeyFormat(String),

    /// Ciphertext was not valid base64 or was too short to hold a nonce and tag.
    #[error("Invalid ciphertext: {0}")]
    InvalidCiphertext(String),

    /// Encryption failed.
    #[error("Encryption failed: {0}")]
    Encryption(String),

    /// Decryption failed - wrong key or tampered data.
    #[error("Decryption failed: {0}")]
    Decryption(String),

    /// Key derivation failed.
    #[error("Key derivation failed: {0}")]
    KeyDerivation(String),

    /// Passphrase too short.
    #[error("Passphrase too short (minimum {0} characters required)")]
    PassphraseTooShort(usize),

    /// I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CryptoError {
    /// Build a key-store error from a status code and message.
    pub fn key_store(code: i32, message: impl Into<String>) -> Self {
        Self::KeyStore {
            code,
            message: message.into(),
        }
    }

    /// Whether this error originated in the key store rather than the cipher.
    pub fn is_key_store(&self) -> bool {
        matches!(self, Self::KeyStore { .. })
    }
}

/// Result type for cryptographic operations.
pub type CryptoResult<T> = Result<T, CryptoError>;
