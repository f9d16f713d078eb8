//! Stream pipeline: range planning, blob fetching, optional per-chunk
//! encryption and incremental emission to a sink.
//!
//! A transfer moves through
//! `Planning -> Fetching -> (Encrypting) -> Emitting -> Done`, with `Failed`
//! reachable from every non-terminal state. Memory stays bounded: plain
//! transfers hold one read buffer, encrypted transfers additionally hold at
//! most one logical chunk while it is being sealed.
//!
//! An encrypted transfer seals every segment under the master key captured
//! when it was planned, so the key cache may expire or evict it mid-stream
//! without changing what the client needs to decrypt.
//!
//! Bytes already written to the sink cannot be taken back, so a mid-stream
//! fault ends the transfer short. Clients must treat a short body as a
//! failed transfer and resume with a range request.

use crate::blob::BlobReader;
use crate::config::DeliveryConfig;
use crate::error::{DeliveryError, DeliveryResult};
use crate::range::{self, chunk_index_of, next_chunk_boundary};
use crate::types::{ChunkPayload, DocumentHandle, PipelineState, RangeDelivery, TransferReport};
use docstream_crypto::{derive_chunk_subkey, encrypt, encrypt_chunk, ChunkSubkey, MasterKey};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::{debug, error, trace, warn};

/// Orchestrates range reads, encryption and emission.
#[derive(Clone)]
pub struct StreamPipeline {
    reader: BlobReader,
    read_buffer_size: usize,
    flush_threshold: usize,
}

impl StreamPipeline {
    pub fn new(reader: BlobReader, config: &DeliveryConfig) -> Self {
        Self {
            reader,
            read_buffer_size: config.read_buffer_size.max(1),
            flush_threshold: config.flush_threshold.max(1),
        }
    }

    /// Planning stage of a range transfer. Fails before any byte is sent.
    ///
    /// When `master_key` is set the transfer is encrypted under that key.
    pub fn plan(
        &self,
        document: &DocumentHandle,
        requested: Option<&str>,
        master_key: Option<MasterKey>,
    ) -> DeliveryResult<RangeDelivery> {
        let plan = range::plan(requested, document.total_size).inspect_err(|e| {
            debug!("range planning failed for document {}: {e}", document.id);
        })?;

        Ok(RangeDelivery {
            document: document.clone(),
            range: plan.range,
            is_partial: plan.is_partial,
            master_key,
        })
    }

    /// Streams a planned range into `sink`.
    pub async fn run<W>(&self, delivery: &RangeDelivery, sink: &mut W) -> DeliveryResult<TransferReport>
    where
        W: AsyncWrite + Unpin + ?Sized,
    {
        let document = &delivery.document;
        let range = delivery.range;
        let mut transfer = Transfer::new(&document.id, sink, self.flush_threshold);

        let mut stream = match self.reader.open(&document.storage_key, range).await {
            Ok(stream) => stream,
            Err(e) => return Err(transfer.fail(e)),
        };

        let mut buf = vec![0u8; self.read_buffer_size];
        // Plaintext of the chunk currently being assembled, and its offset.
        let mut pending: Vec<u8> = Vec::new();
        let mut segment_start = range.start;

        loop {
            let n = match stream.next_block(&mut buf).await {
                Ok(n) => n,
                Err(e) => {
                    error!(
                        "blob read failed mid-stream for document {} after {} bytes sent: {e}",
                        document.id, transfer.bytes_written
                    );
                    return Err(transfer.fail(e));
                }
            };
            if n == 0 {
                break;
            }
            transfer.bytes_read += n as u64;

            let Some(master) = delivery.master_key.as_ref() else {
                transfer.emit(&buf[..n]).await?;
                transfer.transition(PipelineState::Fetching);
                continue;
            };

            let mut data = &buf[..n];
            while !data.is_empty() {
                let filled = segment_start + pending.len() as u64;
                let boundary = next_chunk_boundary(segment_start);
                let take = ((boundary - filled) as usize).min(data.len());
                pending.extend_from_slice(&data[..take]);
                data = &data[take..];

                if segment_start + pending.len() as u64 == boundary {
                    self.seal_and_emit(&mut transfer, master, segment_start, &pending)
                        .await?;
                    pending.clear();
                    segment_start = boundary;
                }
            }
            transfer.transition(PipelineState::Fetching);
        }

        if transfer.bytes_read < range.len() {
            let err = DeliveryError::Truncated {
                expected: range.len(),
                sent: transfer.bytes_written,
            };
            error!(
                "blob store closed early for document {}: read {} of {} bytes",
                document.id,
                transfer.bytes_read,
                range.len()
            );
            return Err(transfer.fail(err));
        }

        // Only encrypted transfers accumulate a pending segment.
        if let Some(master) = delivery.master_key.as_ref().filter(|_| !pending.is_empty()) {
            self.seal_and_emit(&mut transfer, master, segment_start, &pending)
                .await?;
        }

        transfer.finish().await
    }

    /// Reads one logical chunk, encrypting it under `master_key` when set.
    pub async fn fetch_chunk(
        &self,
        document: &DocumentHandle,
        chunk_index: u64,
        master_key: Option<&MasterKey>,
    ) -> DeliveryResult<ChunkPayload> {
        let range = range::chunk_range(chunk_index, document.total_size)?;
        let plaintext = self
            .reader
            .read_range(&document.storage_key, range.start, range.end)
            .await?;

        if (plaintext.len() as u64) < range.len() {
            error!(
                "short read for chunk {chunk_index} of document {}: {} of {} bytes",
                document.id,
                plaintext.len(),
                range.len()
            );
            return Err(DeliveryError::StorageUnavailable(format!(
                "short read for chunk {chunk_index} of {}: {} of {} bytes",
                document.id,
                plaintext.len(),
                range.len()
            )));
        }

        let data = match master_key {
            Some(master) => {
                let subkey = derive_subkey(master, chunk_index)?;
                encrypt_chunk(chunk_index, &plaintext, &subkey)
            }
            None => plaintext,
        };

        Ok(ChunkPayload {
            document_id: document.id.clone(),
            chunk_index,
            encrypted: master_key.is_some(),
            data,
        })
    }

    async fn seal_and_emit<W>(
        &self,
        transfer: &mut Transfer<'_, W>,
        master: &MasterKey,
        segment_start: u64,
        plaintext: &[u8],
    ) -> DeliveryResult<()>
    where
        W: AsyncWrite + Unpin + ?Sized,
    {
        transfer.transition(PipelineState::Encrypting);
        let chunk_index = chunk_index_of(segment_start);
        let subkey = match derive_subkey(master, chunk_index) {
            Ok(subkey) => subkey,
            Err(e) => return Err(transfer.fail(e)),
        };

        // Only a segment opening the document may carry the plain signature.
        let sealed = if segment_start == 0 {
            encrypt_chunk(chunk_index, plaintext, &subkey)
        } else {
            encrypt(plaintext, &subkey)
        };
        transfer.chunks_encrypted += 1;
        transfer.emit(&sealed).await
    }
}

fn derive_subkey(master: &MasterKey, chunk_index: u64) -> DeliveryResult<ChunkSubkey> {
    derive_chunk_subkey(master, chunk_index).map_err(|e| {
        error!(
            "subkey derivation failed for document {} chunk {chunk_index}: {e}",
            master.document_id()
        );
        e.into()
    })
}

/// Per-request transfer state and sink bookkeeping.
struct Transfer<'a, W: ?Sized> {
    document_id: &'a str,
    sink: &'a mut W,
    state: PipelineState,
    flush_threshold: usize,
    since_flush: usize,
    bytes_read: u64,
    bytes_written: u64,
    chunks_encrypted: u64,
}

impl<'a, W> Transfer<'a, W>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    fn new(document_id: &'a str, sink: &'a mut W, flush_threshold: usize) -> Self {
        Self {
            document_id,
            sink,
            state: PipelineState::Fetching,
            flush_threshold,
            since_flush: 0,
            bytes_read: 0,
            bytes_written: 0,
            chunks_encrypted: 0,
        }
    }

    fn transition(&mut self, next: PipelineState) {
        debug_assert!(!self.state.is_terminal(), "transition out of {:?}", self.state);
        if self.state != next {
            trace!(
                "transfer of document {}: {:?} -> {next:?}",
                self.document_id, self.state
            );
            self.state = next;
        }
    }

    fn fail(&mut self, err: DeliveryError) -> DeliveryError {
        self.transition(PipelineState::Failed);
        debug!(
            "transfer of document {} failed: {} bytes read, {} written, {} chunks sealed",
            self.document_id, self.bytes_read, self.bytes_written, self.chunks_encrypted
        );
        err
    }

    async fn emit(&mut self, bytes: &[u8]) -> DeliveryResult<()> {
        self.transition(PipelineState::Emitting);

        if let Err(e) = self.sink.write_all(bytes).await {
            warn!(
                "client went away during document {} after {} bytes: {e}",
                self.document_id, self.bytes_written
            );
            return Err(self.fail(DeliveryError::ClientDisconnected(e)));
        }
        self.bytes_written += bytes.len() as u64;
        self.since_flush += bytes.len();

        if self.since_flush >= self.flush_threshold {
            self.flush().await?;
        }
        Ok(())
    }

    async fn flush(&mut self) -> DeliveryResult<()> {
        if let Err(e) = self.sink.flush().await {
            warn!(
                "flush failed for document {} after {} bytes: {e}",
                self.document_id, self.bytes_written
            );
            return Err(self.fail(DeliveryError::ClientDisconnected(e)));
        }
        self.since_flush = 0;
        Ok(())
    }

    async fn finish(mut self) -> DeliveryResult<TransferReport> {
        self.transition(PipelineState::Emitting);
        self.flush().await?;
        self.transition(PipelineState::Done);

        debug!(
            "transfer of document {} done: {} bytes read, {} written, {} chunks sealed",
            self.document_id, self.bytes_read, self.bytes_written, self.chunks_encrypted
        );

        Ok(TransferReport {
            bytes_read: self.bytes_read,
            bytes_written: self.bytes_written,
            chunks_encrypted: self.chunks_encrypted,
        })
    }
}
