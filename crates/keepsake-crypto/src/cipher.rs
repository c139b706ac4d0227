//! AES-256-GCM cipher operations.

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use rand::RngCore;

use crate::error::{CryptoError, CryptoResult};

/// Key size in bytes (AES-256).
pub const KEY_SIZE: usize = 32;

/// Nonce size in bytes (96-bit GCM nonce).
pub const NONCE_SIZE: usize = 12;

/// Authentication tag size in bytes.
pub const TAG_SIZE: usize = 16;

/// Generate cryptographically secure random bytes.
pub fn generate_random<const N: usize>() -> [u8; N] {
    let mut bytes = [0u8; N];
    rand::thread_rng().fill_bytes(&mut bytes);
    bytes
}

/// Generate a random salt (32 bytes).
pub fn generate_salt() -> [u8; 32] {
    generate_random()
}

/// Generate a random nonce (12 bytes).
pub fn generate_nonce() -> [u8; NONCE_SIZE] {
    generate_random()
}

/// Encrypt plaintext with AES-256-GCM.
///
/// Returns ciphertext with appended authentication tag (16 bytes).
pub fn aes_gcm_encrypt(
    key: &[u8; KEY_SIZE],
    nonce: &[u8; NONCE_SIZE],
    plaintext: &[u8],
) -> CryptoResult<Vec<u8>> {
    let cipher =
        Aes256Gcm::new_from_slice(key).map_err(|e| CryptoError::Encryption(e.to_string()))?;

    cipher
        .encrypt(Nonce::from_slice(nonce), plaintext)
        .map_err(|_| CryptoError::Encryption("AES-GCM encryption failed".into()))
}

/// Decrypt ciphertext with AES-256-GCM.
///
/// The ciphertext must include the authentication tag (16 bytes) at the end.
pub fn aes_gcm_decrypt(
    key: &[u8; KEY_SIZE],
    nonce: &[u8; NONCE_SIZE],
    ciphertext: &[u8],
) -> CryptoResult<Vec<u8>> {
    let cipher = Aes256Gcm::new_from_slice(key)
        .map_err(|_| CryptoError::Decryption("Invalid key".to_string()))?;

    cipher
        .decrypt(Nonce::from_slice(nonce), ciphertext)
        .map_err(|_| CryptoError::Decryption("authentication tag mismatch".to_string()))
}

/// Encrypt under a fresh random nonce and return `nonce || ciphertext || tag`.
pub fn seal(key: &[u8; KEY_SIZE], plaintext: &[u8]) -> CryptoResult<Vec<u8>> {
    let nonce = generate_nonce();
    let ciphertext = aes_gcm_encrypt(key, &nonce, plaintext)?;

    let mut combined = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
    combined.extend_from_slice(&nonce);
    combined.extend_from_slice(&ciphertext);
    Ok(combined)
}

/// Reverse [`seal`]: split off the nonce and decrypt the remainder.
pub fn open(key: &[u8; KEY_SIZE], combined: &[u8]) -> CryptoResult<Vec<u8>> {
    if combined.len() < NONCE_SIZE + TAG_SIZE {
        return Err(CryptoError::InvalidCiphertext(format!(
            "expected at least {} bytes, got {}",
            NONCE_SIZE + TAG_SIZE,
            combined.len()
        )));
    }

    let (nonce, ciphertext) = combined.split_at(NONCE_SIZE);
    let mut nonce_arr = [0u8; NONCE_SIZE];
    nonce_arr.copy_from_slice(nonce);

    aes_gcm_decrypt(key, &nonce_arr, ciphertext)
}
