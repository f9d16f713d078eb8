//! Shared types for document delivery.

use chrono::{DateTime, Utc};
use docstream_crypto::MasterKey;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Size of one logical chunk (1 MiB).
pub const CHUNK_SIZE: u64 = 1024 * 1024;

/// Document format as recorded by the metadata store.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FormatHint {
    Pdf,
    Other(String),
}

impl FormatHint {
    pub fn content_type(&self) -> &'static str {
        match self {
            Self::Pdf => "application/pdf",
            Self::Other(_) => "application/octet-stream",
        }
    }

    pub fn is_pdf(&self) -> bool {
        matches!(self, Self::Pdf)
    }
}

impl fmt::Display for FormatHint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pdf => f.write_str("pdf"),
            Self::Other(name) => f.write_str(name),
        }
    }
}

/// A stored document, as described by the metadata store.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentHandle {
    pub id: String,
    /// Object key in the blob store.
    pub storage_key: String,
    pub total_size: u64,
    pub format_hint: FormatHint,
    /// Name the document was uploaded under.
    pub file_name: String,
    pub last_modified: DateTime<Utc>,
}

/// Inclusive, zero-based byte interval.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ByteRange {
    pub start: u64,
    pub end: u64,
}

impl ByteRange {
    pub fn new(start: u64, end: u64) -> Self {
        debug_assert!(start <= end);
        Self { start, end }
    }

    /// Number of bytes covered. Never zero; saturates for `0..=u64::MAX`.
    #[allow(clippy::len_without_is_empty)]
    pub fn len(&self) -> u64 {
        (self.end - self.start).saturating_add(1)
    }
}

/// Answer to a document info request.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentInfo {
    pub document_id: String,
    pub file_name: String,
    pub total_size: u64,
    pub chunk_size: u64,
    pub total_chunks: u64,
    /// Base64 master key; present only when chunks are served encrypted.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub encryption_key: Option<String>,
    pub last_modified: DateTime<Utc>,
}

/// Bytes of one logical chunk, echoed with its coordinates.
#[derive(Clone, Debug)]
pub struct ChunkPayload {
    pub document_id: String,
    pub chunk_index: u64,
    pub encrypted: bool,
    pub data: Vec<u8>,
}

/// A planned range transfer, ready for the HTTP layer to emit headers.
#[derive(Clone, Debug)]
pub struct RangeDelivery {
    pub document: DocumentHandle,
    pub range: ByteRange,
    pub is_partial: bool,
    /// Key every segment of this transfer is sealed under; `None` for plaintext.
    pub master_key: Option<MasterKey>,
}

impl RangeDelivery {
    pub fn is_encrypted(&self) -> bool {
        self.master_key.is_some()
    }

    pub fn total_size(&self) -> u64 {
        self.document.total_size
    }

    /// Exact body length, unknown up front when the stream is encrypted.
    pub fn content_length(&self) -> Option<u64> {
        (!self.is_encrypted()).then(|| self.range.len())
    }

    /// `Content-Range` value for partial responses.
    pub fn content_range(&self) -> Option<String> {
        self.is_partial
            .then(|| crate::range::content_range(&self.range, self.document.total_size))
    }

    pub fn content_type(&self) -> &'static str {
        if self.is_encrypted() {
            "application/octet-stream"
        } else {
            self.document.format_hint.content_type()
        }
    }
}

/// Stage of a transfer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PipelineState {
    /// Range validation, done by `StreamPipeline::plan` before a transfer starts.
    Planning,
    Fetching,
    Encrypting,
    Emitting,
    Done,
    Failed,
}

impl PipelineState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }
}

/// Byte counts of a transfer that reached `Done`.
///
/// A failed transfer returns its error instead; the bytes it managed to
/// send are logged with the failure.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TransferReport {
    pub bytes_read: u64,
    pub bytes_written: u64,
    pub chunks_encrypted: u64,
}

/// Liveness summary for monitoring.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthStatus {
    pub cached_keys: usize,
    pub encrypt_chunks: bool,
    pub encrypt_range_stream: bool,
}
