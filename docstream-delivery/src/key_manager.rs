//! In-memory, TTL-bounded cache of per-document master keys.
//!
//! Keys are created lazily on first request and never persisted. The map
//! is sharded (`DashMap`): creation and eviction lock one shard at a time,
//! so unrelated documents never wait on each other. Callers always receive
//! an owned clone of the key, so a sweep can never pull key material out
//! from under an in-flight derivation.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use docstream_crypto::{derive_chunk_subkey, ChunkSubkey, MasterKey};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::error::DeliveryResult;

/// Thread-safe master key cache.
#[derive(Clone)]
pub struct KeyManager {
    keys: Arc<DashMap<String, MasterKey>>,
    ttl: Duration,
}

impl KeyManager {
    pub fn new(ttl: Duration) -> Self {
        Self {
            keys: Arc::new(DashMap::new()),
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Returns the live key for a document, creating one if absent or expired.
    ///
    /// Concurrent first access yields exactly one key: creation happens while
    /// the shard holding `document_id` is write-locked.
    pub fn get_or_create(&self, document_id: &str) -> MasterKey {
        self.get_or_create_at(document_id, Utc::now())
    }

    pub(crate) fn get_or_create_at(&self, document_id: &str, now: DateTime<Utc>) -> MasterKey {
        if let Some(existing) = self.keys.get(document_id) {
            if existing.age_at(now) <= self.ttl {
                return existing.value().clone();
            }
        }

        match self.keys.entry(document_id.to_string()) {
            Entry::Occupied(mut occupied) => {
                if occupied.get().age_at(now) > self.ttl {
                    debug!("master key for document {document_id} expired, rotating");
                    occupied.insert(MasterKey::generate(document_id));
                }
                occupied.get().clone()
            }
            Entry::Vacant(vacant) => {
                debug!("generated master key for document {document_id}");
                vacant.insert(MasterKey::generate(document_id)).value().clone()
            }
        }
    }

    /// Looks up a cached key without creating one.
    pub fn get(&self, document_id: &str) -> Option<MasterKey> {
        self.keys.get(document_id).map(|entry| entry.value().clone())
    }

    /// Derives the subkey of `chunk_index` from the document's live master key.
    pub fn chunk_subkey(&self, document_id: &str, chunk_index: u64) -> DeliveryResult<ChunkSubkey> {
        let master = self.get_or_create(document_id);
        Ok(derive_chunk_subkey(&master, chunk_index)?)
    }

    /// Removes every key older than `ttl`. Returns the number evicted.
    pub fn evict_expired(&self, ttl: Duration) -> usize {
        self.evict_expired_at(ttl, Utc::now())
    }

    /// [`evict_expired`](Self::evict_expired) against an explicit clock reading.
    pub fn evict_expired_at(&self, ttl: Duration, now: DateTime<Utc>) -> usize {
        let mut evicted = 0;
        self.keys.retain(|_, key| {
            let live = key.age_at(now) <= ttl;
            if !live {
                evicted += 1;
            }
            live
        });
        if evicted > 0 {
            debug!("evicted {evicted} expired master keys");
        }
        evicted
    }

    /// Drops a document's key so the next request issues a fresh one.
    pub fn remove(&self, document_id: &str) -> Option<MasterKey> {
        self.keys.remove(document_id).map(|(_, key)| key)
    }

    pub fn contains(&self, document_id: &str) -> bool {
        self.keys.contains_key(document_id)
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Inserts a key with a chosen creation time.
    #[cfg(test)]
    pub(crate) fn insert(&self, key: MasterKey) {
        self.keys.insert(key.document_id().to_string(), key);
    }
}

impl Default for KeyManager {
    fn default() -> Self {
        Self::new(Duration::from_secs(30 * 60))
    }
}
