//! Shared test helpers: in-memory documents and fault-injecting stores/sinks.
#![allow(dead_code)]

use async_trait::async_trait;
use chrono::Utc;
use docstream_delivery::{
    BlobStore, BlobStream, DeliveryConfig, DeliveryError, DeliveryResult, DeliveryService,
    DocumentHandle, FormatHint, KeyManager, MemoryBlobStore, MemoryCatalog,
};
use std::future::Future;
use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::task::{Context, Poll, ready};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::time::Sleep;
use uuid::Uuid;

/// Deterministic PDF-looking bytes of the given size.
pub fn pdf_bytes(size: usize) -> Vec<u8> {
    let mut data: Vec<u8> = (0..size).map(|i| (i % 251) as u8).collect();
    let header = b"%PDF-1.7\n";
    let n = header.len().min(size);
    data[..n].copy_from_slice(&header[..n]);
    data
}

pub fn handle(id: &str, size: u64, format_hint: FormatHint) -> DocumentHandle {
    DocumentHandle {
        id: id.to_string(),
        storage_key: format!("reports/{id}.pdf"),
        total_size: size,
        format_hint,
        file_name: format!("{id}.pdf"),
        last_modified: Utc::now(),
    }
}

/// Per-test unique document id.
pub fn unique_id() -> String {
    format!("doc-{}", Uuid::new_v4())
}

pub struct Fixture {
    pub service: DeliveryService,
    pub catalog: MemoryCatalog,
    pub store: MemoryBlobStore,
}

impl Fixture {
    pub fn new(config: DeliveryConfig) -> Self {
        let catalog = MemoryCatalog::new();
        let store = MemoryBlobStore::new();
        let keys = KeyManager::new(config.key_ttl());
        let service = DeliveryService::new(
            config,
            Arc::new(catalog.clone()),
            Arc::new(store.clone()),
            keys,
        );
        Self {
            service,
            catalog,
            store,
        }
    }

    /// Registers a PDF of `size` bytes and returns its id and contents.
    pub async fn add_pdf(&self, size: usize) -> (String, Vec<u8>) {
        let id = unique_id();
        let data = pdf_bytes(size);
        let doc = handle(&id, size as u64, FormatHint::Pdf);
        self.store.put(doc.storage_key.clone(), data.clone()).await;
        self.catalog.insert(doc).await;
        (id, data)
    }
}

/// Service over an arbitrary blob store with one registered PDF handle.
pub async fn service_over(
    store: Arc<dyn BlobStore>,
    doc: DocumentHandle,
    config: DeliveryConfig,
) -> DeliveryService {
    let catalog = MemoryCatalog::new();
    catalog.insert(doc).await;
    let keys = KeyManager::new(config.key_ttl());
    DeliveryService::new(config, Arc::new(catalog), store, keys)
}

/// Serves `data` but stops after `limit` bytes, as if the connection closed.
pub struct ShortStore {
    pub data: Arc<Vec<u8>>,
    pub limit: usize,
}

#[async_trait]
impl BlobStore for ShortStore {
    async fn get(&self, _key: &str, start: u64, end: u64) -> DeliveryResult<BlobStream> {
        let end = (end as usize).min(self.data.len() - 1);
        let slice = &self.data[start as usize..=end];
        let cut = slice.len().min(self.limit);
        Ok(Box::pin(io::Cursor::new(slice[..cut].to_vec())))
    }
}

/// Serves `good_bytes` of data and then fails with an I/O error.
pub struct FaultyStore {
    pub good_bytes: usize,
}

#[async_trait]
impl BlobStore for FaultyStore {
    async fn get(&self, _key: &str, _start: u64, _end: u64) -> DeliveryResult<BlobStream> {
        Ok(Box::pin(FaultyReader {
            remaining: self.good_bytes,
        }))
    }
}

struct FaultyReader {
    remaining: usize,
}

impl AsyncRead for FaultyReader {
    fn poll_read(
        mut self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        if self.remaining == 0 {
            return Poll::Ready(Err(io::Error::new(
                io::ErrorKind::ConnectionReset,
                "object store connection reset",
            )));
        }
        let n = self.remaining.min(buf.remaining());
        buf.put_slice(&vec![0xAB; n]);
        self.remaining -= n;
        Poll::Ready(Ok(()))
    }
}

/// Wraps another store and counts every byte handed to the pipeline.
pub struct CountingStore {
    pub inner: MemoryBlobStore,
    pub served: Arc<AtomicU64>,
}

#[async_trait]
impl BlobStore for CountingStore {
    async fn get(&self, key: &str, start: u64, end: u64) -> DeliveryResult<BlobStream> {
        let inner = self.inner.get(key, start, end).await?;
        Ok(Box::pin(CountingReader {
            inner,
            served: Arc::clone(&self.served),
        }))
    }
}

struct CountingReader {
    inner: BlobStream,
    served: Arc<AtomicU64>,
}

impl AsyncRead for CountingReader {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let before = buf.filled().len();
        let poll = self.inner.as_mut().poll_read(cx, buf);
        let n = buf.filled().len() - before;
        self.served.fetch_add(n as u64, Ordering::SeqCst);
        poll
    }
}

/// Serves `data` but pauses for `delay` once the absolute offset `stall_at`
/// is reached, like a slow link in the middle of a large object.
pub struct StallStore {
    pub data: Arc<Vec<u8>>,
    pub stall_at: u64,
    pub delay: Duration,
}

#[async_trait]
impl BlobStore for StallStore {
    async fn get(&self, _key: &str, start: u64, end: u64) -> DeliveryResult<BlobStream> {
        let end = (end as usize).min(self.data.len() - 1);
        let bytes = self.data[start as usize..=end].to_vec();
        let pause_at = self.stall_at.saturating_sub(start) as usize;
        Ok(Box::pin(StallReader {
            paused: pause_at == 0 || pause_at >= bytes.len(),
            bytes,
            pos: 0,
            pause_at,
            delay: self.delay,
            sleep: None,
        }))
    }
}

struct StallReader {
    bytes: Vec<u8>,
    pos: usize,
    pause_at: usize,
    delay: Duration,
    sleep: Option<Pin<Box<Sleep>>>,
    paused: bool,
}

impl AsyncRead for StallReader {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        if !this.paused && this.pos == this.pause_at {
            let delay = this.delay;
            let sleep = this
                .sleep
                .get_or_insert_with(|| Box::pin(tokio::time::sleep(delay)));
            ready!(sleep.as_mut().poll(cx));
            this.sleep = None;
            this.paused = true;
        }

        let limit = if this.paused { this.bytes.len() } else { this.pause_at };
        let n = (limit - this.pos).min(buf.remaining());
        buf.put_slice(&this.bytes[this.pos..this.pos + n]);
        this.pos += n;
        Poll::Ready(Ok(()))
    }
}

/// Always fails to open, like an unreachable object store.
pub struct DownStore;

#[async_trait]
impl BlobStore for DownStore {
    async fn get(&self, key: &str, _start: u64, _end: u64) -> DeliveryResult<BlobStream> {
        Err(DeliveryError::StorageUnavailable(format!(
            "connection refused for {key}"
        )))
    }
}

/// Sink that accepts `capacity` bytes and then reports a broken pipe.
#[derive(Default)]
pub struct BrokenSink {
    pub capacity: usize,
    pub received: Vec<u8>,
}

impl AsyncWrite for BrokenSink {
    fn poll_write(
        mut self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let room = self.capacity - self.received.len();
        if room == 0 {
            return Poll::Ready(Err(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "client closed connection",
            )));
        }
        let n = room.min(buf.len());
        self.received.extend_from_slice(&buf[..n]);
        Poll::Ready(Ok(n))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}

/// Sink recording how many bytes arrived between flushes.
#[derive(Default)]
pub struct FlushRecorder {
    pub received: Vec<u8>,
    pub flush_marks: Vec<usize>,
}

impl AsyncWrite for FlushRecorder {
    fn poll_write(
        mut self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        self.received.extend_from_slice(buf);
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(mut self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let len = self.received.len();
        self.flush_marks.push(len);
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}
