//! Range reads from the object store.
//!
//! [`BlobStore`] is the seam to the storage backend; [`BlobReader`] wraps
//! it with timeouts and the bounded read loops the pipeline needs. Faults
//! surface as [`DeliveryError::StorageUnavailable`] and are never retried
//! here - retrying a half-sent range is the caller's decision.

use crate::error::{DeliveryError, DeliveryResult};
use crate::types::{ByteRange, CHUNK_SIZE};
use async_trait::async_trait;
use std::collections::HashMap;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::RwLock;
use tracing::debug;

/// Byte stream for one range of one object.
pub type BlobStream = Pin<Box<dyn AsyncRead + Send>>;

/// A range-capable object store.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Opens a stream over bytes `start..=end` of `key`.
    async fn get(&self, key: &str, start: u64, end: u64) -> DeliveryResult<BlobStream>;
}

/// Timeout-bounded reader over a [`BlobStore`].
#[derive(Clone)]
pub struct BlobReader {
    store: Arc<dyn BlobStore>,
    timeout: Duration,
}

impl BlobReader {
    pub fn new(store: Arc<dyn BlobStore>, timeout: Duration) -> Self {
        Self { store, timeout }
    }

    /// Opens `range` of `key` for incremental reading.
    pub async fn open(&self, key: &str, range: ByteRange) -> DeliveryResult<RangeStream> {
        let stream = tokio::time::timeout(self.timeout, self.store.get(key, range.start, range.end))
            .await
            .map_err(|_| {
                DeliveryError::StorageUnavailable(format!(
                    "timed out opening {key} bytes {}-{}",
                    range.start, range.end
                ))
            })??;

        Ok(RangeStream {
            key: key.to_string(),
            inner: stream,
            remaining: range.len(),
            timeout: self.timeout,
        })
    }

    /// Reads bytes `start..=end` of `key` into memory.
    ///
    /// Loops over short reads until the range is satisfied or the store
    /// signals end-of-stream; the result may therefore be shorter than
    /// requested.
    pub async fn read_range(&self, key: &str, start: u64, end: u64) -> DeliveryResult<Vec<u8>> {
        if start > end {
            return Err(DeliveryError::InvalidRange(format!(
                "start {start} is after end {end}"
            )));
        }

        let range = ByteRange::new(start, end);
        let mut stream = self.open(key, range).await?;
        // The object may be far shorter than the requested range.
        let mut out = Vec::with_capacity(range.len().min(CHUNK_SIZE) as usize);
        let mut buf = vec![0u8; 8 * 1024];

        loop {
            let n = stream.next_block(&mut buf).await?;
            if n == 0 {
                break;
            }
            out.extend_from_slice(&buf[..n]);
        }

        if (out.len() as u64) < range.len() {
            debug!(
                "short read from {key}: got {} of {} bytes",
                out.len(),
                range.len()
            );
        }
        Ok(out)
    }
}

/// An open range read, consumed block by block.
pub struct RangeStream {
    key: String,
    inner: BlobStream,
    remaining: u64,
    timeout: Duration,
}

impl RangeStream {
    /// Reads the next block into `buf`. Returns 0 once the range is exhausted
    /// or the store closes the stream.
    ///
    /// Never yields bytes past the end of the requested range, even if the
    /// store sends more.
    pub async fn next_block(&mut self, buf: &mut [u8]) -> DeliveryResult<usize> {
        if self.remaining == 0 || buf.is_empty() {
            return Ok(0);
        }

        let want = buf.len().min(usize::try_from(self.remaining).unwrap_or(usize::MAX));
        let n = tokio::time::timeout(self.timeout, self.inner.read(&mut buf[..want]))
            .await
            .map_err(|_| {
                DeliveryError::StorageUnavailable(format!("timed out reading {}", self.key))
            })?
            .map_err(|e| {
                DeliveryError::StorageUnavailable(format!("read failed for {}: {e}", self.key))
            })?;

        self.remaining -= n as u64;
        Ok(n)
    }

    /// Bytes still expected from the store.
    pub fn remaining(&self) -> u64 {
        self.remaining
    }
}

/// In-process blob store for tests and local runs.
#[derive(Clone, Default)]
pub struct MemoryBlobStore {
    objects: Arc<RwLock<HashMap<String, Arc<Vec<u8>>>>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn put(&self, key: impl Into<String>, data: Vec<u8>) {
        self.objects.write().await.insert(key.into(), Arc::new(data));
    }

    pub async fn remove(&self, key: &str) -> bool {
        self.objects.write().await.remove(key).is_some()
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn get(&self, key: &str, start: u64, end: u64) -> DeliveryResult<BlobStream> {
        let data = self
            .objects
            .read()
            .await
            .get(key)
            .cloned()
            .ok_or_else(|| DeliveryError::StorageUnavailable(format!("no such object: {key}")))?;

        let len = data.len() as u64;
        if start >= len {
            return Err(DeliveryError::StorageUnavailable(format!(
                "range start {start} beyond object size {len} for {key}"
            )));
        }

        let end = end.min(len - 1);
        let slice = data[start as usize..=end as usize].to_vec();
        Ok(Box::pin(std::io::Cursor::new(slice)))
    }
}
