//! Field-level encryption of record payloads.
//!
//! Payloads are JSON objects. Only fields named as sensitive are touched:
//! string values become base64 envelopes, and list values are encrypted
//! element-wise so order and count survive. An `is_encrypted` marker tells
//! readers whether the sensitive fields hold ciphertext.

use std::sync::Arc;

use serde_json::Value;
use tracing::{trace, warn};

use crate::cipher::{open, seal};
use crate::error::{CryptoError, CryptoResult};
use crate::format::Envelope;
use crate::key::EncryptionKey;
use crate::key_manager::KeyManager;

/// Record payload as a JSON object.
pub type FieldMap = serde_json::Map<String, Value>;

/// Marker field set on encrypted payloads.
pub const IS_ENCRYPTED_FIELD: &str = "is_encrypted";

/// Placeholder for a field whose encryption failed.
pub const ENCRYPTION_FAILED_SENTINEL: &str = "[encryption failed]";

/// Encrypts and decrypts values with the key held by a [`KeyManager`].
#[derive(Clone)]
pub struct FieldCipher {
    keys: Arc<KeyManager>,
}

impl FieldCipher {
    pub fn new(keys: Arc<KeyManager>) -> Self {
        Self { keys }
    }

    pub fn key_manager(&self) -> &Arc<KeyManager> {
        &self.keys
    }

    /// Encrypt bytes under a fresh nonce.
    pub fn encrypt(&self, plaintext: &[u8]) -> CryptoResult<Envelope> {
        let key = self.keys.get_or_create_key()?;
        encrypt_with(&key, plaintext)
    }

    /// Decrypt an envelope produced by [`FieldCipher::encrypt`].
    pub fn decrypt(&self, envelope: &Envelope) -> CryptoResult<Vec<u8>> {
        let key = self.keys.get_or_create_key()?;
        decrypt_with(&key, envelope)
    }

    /// Encrypt a UTF-8 string and return the ciphertext text.
    pub fn encrypt_str(&self, plaintext: &str) -> CryptoResult<String> {
        Ok(self.encrypt(plaintext.as_bytes())?.ciphertext)
    }

    /// Decrypt ciphertext text back to a UTF-8 string.
    pub fn decrypt_str(&self, ciphertext: &str) -> CryptoResult<String> {
        let bytes = self.decrypt(&Envelope::from_ciphertext(ciphertext))?;
        String::from_utf8(bytes)
            .map_err(|_| CryptoError::Decryption("plaintext is not valid UTF-8".into()))
    }

    /// Like [`FieldCipher::encrypt_str`], but `None` and `""` pass through
    /// without touching the key.
    pub fn encrypt_optional(&self, plaintext: Option<&str>) -> CryptoResult<Option<String>> {
        match plaintext {
            None => Ok(None),
            Some("") => Ok(Some(String::new())),
            Some(text) => self.encrypt_str(text).map(Some),
        }
    }

    /// Like [`FieldCipher::decrypt_str`], but `None` and `""` pass through.
    pub fn decrypt_optional(&self, ciphertext: Option<&str>) -> CryptoResult<Option<String>> {
        match ciphertext {
            None => Ok(None),
            Some("") => Ok(Some(String::new())),
            Some(text) => self.decrypt_str(text).map(Some),
        }
    }

    /// Encrypt the sensitive fields of a payload, failing on the first error.
    pub fn try_encrypt_payload(
        &self,
        record: &FieldMap,
        sensitive_fields: &[&str],
    ) -> CryptoResult<FieldMap> {
        let key = self.keys.get_or_create_key()?;
        let mut out = record.clone();

        for field in sensitive_fields {
            if let Some(value) = out.get_mut(*field) {
                encrypt_value(&key, value)?;
            }
        }

        out.insert(IS_ENCRYPTED_FIELD.to_string(), Value::Bool(true));
        Ok(out)
    }

    /// Encrypt the sensitive fields of a payload, degrading per field.
    ///
    /// A field that cannot be encrypted is replaced with
    /// [`ENCRYPTION_FAILED_SENTINEL`] and the payload is marked
    /// `is_encrypted = false`. Plaintext of a sensitive field never leaves
    /// this function.
    pub fn encrypt_payload(&self, record: &FieldMap, sensitive_fields: &[&str]) -> FieldMap {
        let key = match self.keys.get_or_create_key() {
            Ok(key) => Some(key),
            Err(e) => {
                warn!(error = %e, "Field key unavailable, substituting sentinels");
                None
            }
        };

        let mut out = record.clone();
        let mut failed = key.is_none();

        for field in sensitive_fields {
            let Some(value) = out.get_mut(*field) else {
                continue;
            };
            let ok = match &key {
                Some(key) => encrypt_value_degrading(key, value),
                None => {
                    replace_with_sentinel(value);
                    false
                }
            };
            if !ok {
                warn!(field, "Field encryption failed, sentinel substituted");
                failed = true;
            }
        }

        out.insert(IS_ENCRYPTED_FIELD.to_string(), Value::Bool(!failed));
        out
    }

    /// Decrypt the sensitive fields of a payload.
    ///
    /// Payloads without `is_encrypted = true` are returned unchanged, which
    /// keeps legacy plaintext rows readable. The marker is removed from
    /// decrypted output.
    pub fn decrypt_payload(
        &self,
        record: &FieldMap,
        sensitive_fields: &[&str],
    ) -> CryptoResult<FieldMap> {
        if !is_encrypted(record) {
            return Ok(record.clone());
        }

        let key = self.keys.get_or_create_key()?;
        let mut out = record.clone();

        for field in sensitive_fields {
            if let Some(value) = out.get_mut(*field) {
                decrypt_value(&key, value)?;
            }
        }

        out.remove(IS_ENCRYPTED_FIELD);
        Ok(out)
    }
}

/// Whether a payload carries `is_encrypted = true`.
pub fn is_encrypted(record: &FieldMap) -> bool {
    matches!(record.get(IS_ENCRYPTED_FIELD), Some(Value::Bool(true)))
}

fn encrypt_with(key: &EncryptionKey, plaintext: &[u8]) -> CryptoResult<Envelope> {
    let sealed = seal(key.as_bytes(), plaintext)?;
    Ok(Envelope::from_sealed(&sealed))
}

fn decrypt_with(key: &EncryptionKey, envelope: &Envelope) -> CryptoResult<Vec<u8>> {
    let sealed = envelope.sealed_bytes()?;
    open(key.as_bytes(), &sealed)
}

fn encrypt_text(key: &EncryptionKey, text: &str) -> CryptoResult<String> {
    Ok(encrypt_with(key, text.as_bytes())?.ciphertext)
}

fn decrypt_text(key: &EncryptionKey, text: &str) -> CryptoResult<String> {
    let bytes = decrypt_with(key, &Envelope::from_ciphertext(text))?;
    String::from_utf8(bytes)
        .map_err(|_| CryptoError::Decryption("plaintext is not valid UTF-8".into()))
}

fn encrypt_value(key: &EncryptionKey, value: &mut Value) -> CryptoResult<()> {
    match value {
        Value::String(text) if !text.is_empty() => {
            *text = encrypt_text(key, text)?;
        }
        Value::Array(items) => {
            for item in items.iter_mut() {
                if let Value::String(text) = item {
                    if !text.is_empty() {
                        *text = encrypt_text(key, text)?;
                    }
                }
            }
        }
        _ => trace!("Sensitive field is empty or non-text, left as-is"),
    }
    Ok(())
}

/// Returns false if any part of the value had to be replaced with a sentinel.
fn encrypt_value_degrading(key: &EncryptionKey, value: &mut Value) -> bool {
    match value {
        Value::String(text) if !text.is_empty() => match encrypt_text(key, text) {
            Ok(ciphertext) => {
                *text = ciphertext;
                true
            }
            Err(_) => {
                *text = ENCRYPTION_FAILED_SENTINEL.to_string();
                false
            }
        },
        Value::Array(items) => {
            let mut ok = true;
            for item in items.iter_mut() {
                if let Value::String(text) = item {
                    if text.is_empty() {
                        continue;
                    }
                    match encrypt_text(key, text) {
                        Ok(ciphertext) => *text = ciphertext,
                        Err(_) => {
                            *text = ENCRYPTION_FAILED_SENTINEL.to_string();
                            ok = false;
                        }
                    }
                }
            }
            ok
        }
        _ => true,
    }
}

fn replace_with_sentinel(value: &mut Value) {
    match value {
        Value::String(text) if !text.is_empty() => {
            *text = ENCRYPTION_FAILED_SENTINEL.to_string();
        }
        Value::Array(items) => {
            for item in items.iter_mut() {
                if let Value::String(text) = item {
                    if !text.is_empty() {
                        *text = ENCRYPTION_FAILED_SENTINEL.to_string();
                    }
                }
            }
        }
        _ => {}
    }
}

fn decrypt_value(key: &EncryptionKey, value: &mut Value) -> CryptoResult<()> {
    match value {
        Value::String(text) if !text.is_empty() && text.as_str() != ENCRYPTION_FAILED_SENTINEL => {
            *text = decrypt_text(key, text)?;
        }
        Value::Array(items) => {
            for item in items.iter_mut() {
                if let Value::String(text) = item {
                    if !text.is_empty() && text.as_str() != ENCRYPTION_FAILED_SENTINEL {
                        *text = decrypt_text(key, text)?;
                    }
                }
            }
        }
        _ => {}
    }
    Ok(())
}
