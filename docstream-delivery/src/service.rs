//! Delivery service: the operations exposed to the HTTP layer.
//!
//! - Byte-range delivery (`prepare_range` + `deliver_range`)
//! - Discrete chunk retrieval (`fetch_chunk`)
//! - Document info, including the master key in encrypted mode
//! - Cache maintenance and health
//!
//! All validation happens before the first byte is written, so errors from
//! `prepare_range`, `fetch_chunk` and `document_info` can be reported as
//! ordinary structured responses.

use crate::blob::{BlobReader, BlobStore};
use crate::catalog::DocumentCatalog;
use crate::config::DeliveryConfig;
use crate::error::{DeliveryError, DeliveryResult};
use crate::janitor::{CacheJanitor, JanitorHandle};
use crate::key_manager::KeyManager;
use crate::pipeline::StreamPipeline;
use crate::range;
use crate::s3_store::S3BlobStore;
use crate::types::*;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWrite;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Secure chunked document delivery.
pub struct DeliveryService {
    config: DeliveryConfig,
    catalog: Arc<dyn DocumentCatalog>,
    keys: KeyManager,
    pipeline: StreamPipeline,
}

impl DeliveryService {
    pub fn new(
        config: DeliveryConfig,
        catalog: Arc<dyn DocumentCatalog>,
        store: Arc<dyn BlobStore>,
        keys: KeyManager,
    ) -> Self {
        let reader = BlobReader::new(store, config.read_timeout());
        let pipeline = StreamPipeline::new(reader, &config);
        Self {
            config,
            catalog,
            keys,
            pipeline,
        }
    }

    /// Builds a service reading from the S3 bucket named in `config`.
    pub async fn connect_s3(
        config: DeliveryConfig,
        catalog: Arc<dyn DocumentCatalog>,
    ) -> DeliveryResult<Self> {
        config.validate()?;
        let store = S3BlobStore::connect(&config.s3).await?;
        let keys = KeyManager::new(config.key_ttl());
        info!("delivery service connected to bucket {}", store.bucket());
        Ok(Self::new(config, catalog, Arc::new(store), keys))
    }

    pub fn config(&self) -> &DeliveryConfig {
        &self.config
    }

    pub fn key_manager(&self) -> &KeyManager {
        &self.keys
    }

    /// Spawns the background cache janitor for this service's key cache.
    pub fn start_janitor(&self) -> (JanitorHandle, JoinHandle<()>) {
        CacheJanitor::spawn(
            self.keys.clone(),
            self.config.sweep_interval(),
            self.config.key_ttl(),
        )
    }

    /// Plans a range transfer: resolves the document and validates the range.
    ///
    /// The document's master key is issued here; an encrypted transfer keeps
    /// using it even if the cache rotates or evicts it mid-stream.
    pub async fn prepare_range(
        &self,
        document_id: &str,
        requested: Option<&str>,
    ) -> DeliveryResult<RangeDelivery> {
        info!("range request for document {document_id}, range {requested:?}");
        let document = self.resolve(document_id).await?;
        let master_key = self.keys.get_or_create(&document.id);

        self.pipeline.plan(
            &document,
            requested,
            self.config.encrypt_range_stream.then_some(master_key),
        )
    }

    /// Streams a planned range into `sink`.
    pub async fn deliver_range<W>(
        &self,
        delivery: &RangeDelivery,
        sink: &mut W,
    ) -> DeliveryResult<TransferReport>
    where
        W: AsyncWrite + Unpin + ?Sized,
    {
        let report = self.pipeline.run(delivery, sink).await?;
        info!(
            "range transfer complete for document {}: bytes {}-{}, {} bytes written",
            delivery.document.id, delivery.range.start, delivery.range.end, report.bytes_written
        );
        Ok(report)
    }

    /// Returns one logical chunk, encrypted when `encrypt_chunks` is set.
    pub async fn fetch_chunk(
        &self,
        document_id: &str,
        chunk_index: u64,
    ) -> DeliveryResult<ChunkPayload> {
        info!("chunk request for document {document_id}, chunk {chunk_index}");
        let document = self.resolve(document_id).await?;
        let master_key = self.keys.get_or_create(&document.id);

        let payload = self
            .pipeline
            .fetch_chunk(
                &document,
                chunk_index,
                self.config.encrypt_chunks.then_some(&master_key),
            )
            .await?;

        debug!(
            "chunk {chunk_index} of document {document_id}: {} bytes",
            payload.data.len()
        );
        Ok(payload)
    }

    /// Size and chunk layout of a document, plus its key in encrypted mode.
    pub async fn document_info(&self, document_id: &str) -> DeliveryResult<DocumentInfo> {
        let document = self.resolve(document_id).await?;

        let encryption_key = self
            .config
            .encrypt_chunks
            .then(|| self.keys.get_or_create(&document.id).to_base64());

        Ok(DocumentInfo {
            document_id: document.id,
            file_name: document.file_name,
            total_size: document.total_size,
            chunk_size: CHUNK_SIZE,
            total_chunks: range::total_chunks(document.total_size),
            encryption_key,
            last_modified: document.last_modified,
        })
    }

    /// Evicts keys older than `max_age` (default: the configured TTL).
    pub fn sweep_cache(&self, max_age: Option<Duration>) -> usize {
        let ttl = max_age.unwrap_or_else(|| self.config.key_ttl());
        let evicted = self.keys.evict_expired(ttl);
        info!("cache maintenance evicted {evicted} keys (max age {ttl:?})");
        evicted
    }

    pub fn health(&self) -> HealthStatus {
        HealthStatus {
            cached_keys: self.keys.len(),
            encrypt_chunks: self.config.encrypt_chunks,
            encrypt_range_stream: self.config.encrypt_range_stream,
        }
    }

    async fn resolve(&self, document_id: &str) -> DeliveryResult<DocumentHandle> {
        let document = self
            .catalog
            .find_document(document_id)
            .await
            .ok_or_else(|| DeliveryError::DocumentNotFound(document_id.to_string()))?;

        if self.config.pdf_only && !document.format_hint.is_pdf() {
            warn!(
                "refusing document {document_id} with format {}",
                document.format_hint
            );
            return Err(DeliveryError::UnsupportedFormat {
                document_id: document_id.to_string(),
                format: document.format_hint.to_string(),
            });
        }

        Ok(document)
    }
}
