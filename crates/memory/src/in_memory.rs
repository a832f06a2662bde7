//! In-memory stores, useful for testing and ephemeral deployments.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use flint_core::memory::{DocumentStore, EmbeddingStore};
use flint_core::{Document, Embedding, StoreError, UserId};
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::sync::RwLock;

/// A document store that keeps every document in a Vec.
pub struct InMemoryDocumentStore {
    documents: Arc<RwLock<Vec<Document>>>,
}

impl InMemoryDocumentStore {
    pub fn new() -> Self {
        Self {
            documents: Arc::new(RwLock::new(Vec::new())),
        }
    }

    pub async fn count(&self) -> usize {
        self.documents.read().await.len()
    }
}

impl Default for InMemoryDocumentStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    fn name(&self) -> &str {
        "in_memory"
    }

    async fn persist(&self, document: Document) -> Result<String, StoreError> {
        if document.is_blank() {
            return Err(StoreError::Storage(
                "refusing to store a document with no text on either side".into(),
            ));
        }
        let id = document.id.clone();
        self.documents.write().await.push(document);
        Ok(id)
    }

    async fn get(&self, id: &str) -> Result<Option<Document>, StoreError> {
        let documents = self.documents.read().await;
        Ok(documents.iter().find(|d| d.id == id).cloned())
    }

    async fn query(&self, user: &UserId) -> Result<Vec<Document>, StoreError> {
        let documents = self.documents.read().await;
        let mut owned: Vec<Document> = documents
            .iter()
            .filter(|d| &d.user == user)
            .cloned()
            .collect();
        // Newest first; equal timestamps fall back to the later insert.
        owned.reverse();
        owned.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        Ok(owned)
    }

    async fn active_users(&self, since: DateTime<Utc>) -> Result<Vec<UserId>, StoreError> {
        let documents = self.documents.read().await;
        let users: BTreeSet<UserId> = documents
            .iter()
            .filter(|d| d.timestamp >= since)
            .map(|d| d.user.clone())
            .collect();
        Ok(users.into_iter().collect())
    }
}

/// An embedding store that keeps `(owner, embedding)` pairs in insertion order.
pub struct InMemoryEmbeddingStore {
    embeddings: Arc<RwLock<Vec<(UserId, Embedding)>>>,
}

impl InMemoryEmbeddingStore {
    pub fn new() -> Self {
        Self {
            embeddings: Arc::new(RwLock::new(Vec::new())),
        }
    }

    pub async fn count(&self) -> usize {
        self.embeddings.read().await.len()
    }
}

impl Default for InMemoryEmbeddingStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EmbeddingStore for InMemoryEmbeddingStore {
    fn name(&self) -> &str {
        "in_memory"
    }

    async fn persist(&self, owner: &UserId, embedding: Embedding) -> Result<(), StoreError> {
        self.embeddings.write().await.push((owner.clone(), embedding));
        Ok(())
    }

    async fn persist_all(
        &self,
        owner: &UserId,
        embeddings: Vec<Embedding>,
    ) -> Result<usize, StoreError> {
        let count = embeddings.len();
        self.embeddings
            .write()
            .await
            .extend(embeddings.into_iter().map(|e| (owner.clone(), e)));
        Ok(count)
    }

    async fn remove_document(&self, document_id: &str) -> Result<usize, StoreError> {
        let mut embeddings = self.embeddings.write().await;
        let before = embeddings.len();
        embeddings.retain(|(_, e)| e.document_id() != document_id);
        Ok(before - embeddings.len())
    }

    async fn query_candidates(&self, user: &UserId) -> Result<Vec<Embedding>, StoreError> {
        let embeddings = self.embeddings.read().await;
        Ok(embeddings
            .iter()
            .filter(|(owner, _)| owner == user)
            .map(|(_, e)| e.clone())
            .collect())
    }

    async fn has_embeddings(&self, document_id: &str) -> Result<bool, StoreError> {
        let embeddings = self.embeddings.read().await;
        Ok(embeddings.iter().any(|(_, e)| e.document_id() == document_id))
    }
}
