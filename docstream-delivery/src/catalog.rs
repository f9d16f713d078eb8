//! Lookup of document records owned by the metadata store.

use crate::types::DocumentHandle;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Read-only view of the metadata store.
#[async_trait]
pub trait DocumentCatalog: Send + Sync {
    async fn find_document(&self, document_id: &str) -> Option<DocumentHandle>;
}

/// In-process catalog for tests and local runs.
#[derive(Clone, Default)]
pub struct MemoryCatalog {
    documents: Arc<RwLock<HashMap<String, DocumentHandle>>>,
}

impl MemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a document, replacing any record with the same id.
    pub async fn insert(&self, document: DocumentHandle) {
        self.documents
            .write()
            .await
            .insert(document.id.clone(), document);
    }

    pub async fn remove(&self, document_id: &str) -> Option<DocumentHandle> {
        self.documents.write().await.remove(document_id)
    }

    pub async fn len(&self) -> usize {
        self.documents.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.documents.read().await.is_empty()
    }
}

#[async_trait]
impl DocumentCatalog for MemoryCatalog {
    async fn find_document(&self, document_id: &str) -> Option<DocumentHandle> {
        self.documents.read().await.get(document_id).cloned()
    }
}
