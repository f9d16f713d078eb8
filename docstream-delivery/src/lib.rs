//! Chunked document delivery engine for docstream.
//!
//! Serves large documents from a range-capable object store with:
//! - Byte-range resumability (`bytes=<start>-[<end>]`)
//! - Fixed 1 MiB chunk retrieval for constrained clients
//! - Per-chunk AES-128-CBC encryption under a per-document master key
//! - A TTL-bounded in-memory key cache swept by a background janitor

pub mod blob;
pub mod catalog;
pub mod config;
pub mod error;
pub mod janitor;
pub mod key_manager;
pub mod pipeline;
pub mod range;
pub mod s3_store;
pub mod service;
pub mod types;

pub use blob::{BlobReader, BlobStore, BlobStream, MemoryBlobStore};
pub use catalog::{DocumentCatalog, MemoryCatalog};
pub use config::{DeliveryConfig, S3Config};
pub use error::{DeliveryError, DeliveryResult};
pub use janitor::{CacheJanitor, JanitorHandle};
pub use key_manager::KeyManager;
pub use pipeline::StreamPipeline;
pub use service::DeliveryService;
pub use types::*;
