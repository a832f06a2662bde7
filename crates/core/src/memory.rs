//! Storage traits for persistent conversation history and its embeddings.
//!
//! The document store is the source of truth for a user's history; live
//! sessions are rebuilt from it. The embedding store holds one vector per
//! chunk and is always queried scoped to a single user.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::document::{Document, Embedding};
use crate::error::StoreError;
use crate::user::UserId;

/// Persisted conversation documents.
///
/// Implementations: in-memory (for testing), or a host-provided database.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// The backend name (e.g., "in_memory", "postgres").
    fn name(&self) -> &str;

    /// Store a new document. Returns its ID.
    async fn persist(&self, document: Document) -> Result<String, StoreError>;

    /// Get a document by ID.
    async fn get(&self, id: &str) -> Result<Option<Document>, StoreError>;

    /// All documents of `user`, most recent first.
    async fn query(&self, user: &UserId) -> Result<Vec<Document>, StoreError>;

    /// The `limit` most recent documents of `user`, most recent first.
    async fn recent(&self, user: &UserId, limit: usize) -> Result<Vec<Document>, StoreError> {
        let mut documents = self.query(user).await?;
        documents.truncate(limit);
        Ok(documents)
    }

    /// Users with at least one document at or after `since`.
    async fn active_users(&self, since: DateTime<Utc>) -> Result<Vec<UserId>, StoreError>;
}

/// Persisted chunk embeddings.
#[async_trait]
pub trait EmbeddingStore: Send + Sync {
    /// The backend name.
    fn name(&self) -> &str;

    /// Store one embedding owned by `owner`.
    async fn persist(&self, owner: &UserId, embedding: Embedding) -> Result<(), StoreError>;

    /// Store every embedding of one document, or none of them.
    ///
    /// The default writes one at a time and, on failure, removes whatever
    /// the batch's documents already have stored. Backends with
    /// transactions should override it.
    async fn persist_all(
        &self,
        owner: &UserId,
        embeddings: Vec<Embedding>,
    ) -> Result<usize, StoreError> {
        let count = embeddings.len();
        let documents: Vec<String> = embeddings
            .iter()
            .map(|e| e.document_id().to_string())
            .collect();
        for embedding in embeddings {
            if let Err(e) = self.persist(owner, embedding).await {
                for document_id in &documents {
                    self.remove_document(document_id).await?;
                }
                return Err(e);
            }
        }
        Ok(count)
    }

    /// Delete every embedding of `document_id`. Returns how many were removed.
    async fn remove_document(&self, document_id: &str) -> Result<usize, StoreError>;

    /// Every stored embedding whose document belongs to `user`, in insertion
    /// order. Each embedding carries the chunk it was computed from.
    async fn query_candidates(&self, user: &UserId) -> Result<Vec<Embedding>, StoreError>;

    /// Whether any embedding exists for the given document.
    async fn has_embeddings(&self, document_id: &str) -> Result<bool, StoreError>;
}
