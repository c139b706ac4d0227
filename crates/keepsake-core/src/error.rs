//! Error types for keepsake.

use keepsake_crypto::CryptoError;
use thiserror::Error;

/// Result type alias using keepsake's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for keepsake operations.
#[derive(Error, Debug)]
pub enum Error {
    /// No signed-in owner to attribute remote rows to
    #[error("Not authenticated")]
    NotAuthenticated,

    /// Transport failure talking to the remote store (includes timeouts)
    #[error("Network error: {0}")]
    Network(String),

    /// The remote store refused the request (schema, validation, policy)
    #[error("Remote rejected request: {0}")]
    RemoteRejected(String),

    /// Key management or field encryption failed
    #[error("Crypto error: {0}")]
    Crypto(#[from] CryptoError),

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Whether a later attempt could succeed without any change on our side.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Network(_))
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Error::Network(e.to_string())
    }
}
