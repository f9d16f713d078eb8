//! Delivery error types.

use docstream_crypto::CryptoError;
use thiserror::Error;

/// Result type for delivery operations.
pub type DeliveryResult<T> = Result<T, DeliveryError>;

/// Errors that can occur while serving a document.
#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("invalid range: {0}")]
    InvalidRange(String),

    #[error("document not found: {0}")]
    DocumentNotFound(String),

    #[error("unsupported format for document {document_id}: {format}")]
    UnsupportedFormat { document_id: String, format: String },

    #[error("storage unavailable: {0}")]
    StorageUnavailable(String),

    #[error("decryption failed: {0}")]
    Decryption(String),

    #[error("encryption failure: {0}")]
    Encryption(String),

    #[error("client disconnected: {0}")]
    ClientDisconnected(#[source] std::io::Error),

    #[error("transfer truncated: sent {sent} of {expected} bytes")]
    Truncated { expected: u64, sent: u64 },

    #[error("cache janitor not running")]
    JanitorStopped,

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl DeliveryError {
    /// True for faults caused by the request itself (4xx-equivalent).
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidRange(_)
                | Self::DocumentNotFound(_)
                | Self::UnsupportedFormat { .. }
                | Self::Decryption(_)
        )
    }

    /// True when the caller may retry the whole operation.
    ///
    /// The engine itself never retries.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::StorageUnavailable(_) | Self::Truncated { .. })
    }
}

impl From<CryptoError> for DeliveryError {
    fn from(err: CryptoError) -> Self {
        match err {
            CryptoError::Decryption(msg) => Self::Decryption(msg),
            other => Self::Encryption(other.to_string()),
        }
    }
}
