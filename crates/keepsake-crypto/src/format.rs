//! Text encodings for ciphertext and exported keys.

use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::error::{CryptoError, CryptoResult};

/// Algorithm label carried by every envelope.
pub const ALGORITHM: &str = "AES-256-GCM";

/// Output of one encryption call: base64 of `nonce || ciphertext || tag`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    pub ciphertext: String,
    pub algorithm: String,
}

impl Envelope {
    /// Wrap raw sealed bytes.
    pub fn from_sealed(sealed: &[u8]) -> Self {
        Self {
            ciphertext: base64_encode(sealed),
            algorithm: ALGORITHM.to_string(),
        }
    }

    /// Wrap ciphertext text read back from a remote row.
    pub fn from_ciphertext(ciphertext: impl Into<String>) -> Self {
        Self {
            ciphertext: ciphertext.into(),
            algorithm: ALGORITHM.to_string(),
        }
    }

    /// Decode the ciphertext back to sealed bytes.
    pub fn sealed_bytes(&self) -> CryptoResult<Vec<u8>> {
        if self.algorithm != ALGORITHM {
            return Err(CryptoError::InvalidCiphertext(format!(
                "unsupported algorithm: {}",
                self.algorithm
            )));
        }
        base64_decode(&self.ciphertext)
            .map_err(|e| CryptoError::InvalidCiphertext(format!("Invalid base64: {}", e)))
    }
}

/// Encode bytes as base64.
pub fn base64_encode(data: &[u8]) -> String {
    base64::engine::general_purpose::STANDARD.encode(data)
}

/// Decode base64 string to bytes.
pub fn base64_decode(data: &str) -> Result<Vec<u8>, base64::DecodeError> {
    base64::engine::general_purpose::STANDARD.decode(data.trim())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base64_roundtrip() {
        let original = [42u8; 32];
        let decoded = base64_decode(&base64_encode(&original)).unwrap();
        assert_eq!(original.as_slice(), decoded.as_slice());
    }

    #[test]
    fn test_base64_decode_ignores_surrounding_whitespace() {
        let encoded = format!("  {}\n", base64_encode(b"key"));
        assert_eq!(base64_decode(&encoded).unwrap(), b"key");
    }

    #[test]
    fn test_envelope_invalid_base64() {
        let envelope = Envelope::from_ciphertext("not valid base64!!!");
        assert!(matches!(
            envelope.sealed_bytes(),
            Err(CryptoError::InvalidCiphertext(_))
        ));
    }

    #[test]
    fn test_envelope_rejects_unknown_algorithm() {
        let envelope = Envelope {
            ciphertext: base64_encode(b"x"),
            algorithm: "ROT13".into(),
        };
        assert!(envelope.sealed_bytes().is_err());
    }
}
