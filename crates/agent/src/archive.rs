//! Durable history: documents plus their chunk embeddings.
//!
//! Persistence runs after the reply has been produced. Failures are logged
//! and never undo a reply already handed back to the caller.

use std::sync::Arc;

use flint_core::memory::{DocumentStore, EmbeddingStore};
use flint_core::{Document, DocumentKind, Result, UserId};
use flint_memory::EmbeddingGenerator;

/// Writes documents and their embeddings. Cheap to clone.
#[derive(Clone)]
pub struct Archive {
    documents: Arc<dyn DocumentStore>,
    embeddings: Arc<dyn EmbeddingStore>,
    generator: Arc<EmbeddingGenerator>,
}

/// Counts from a [`Archive::backfill`] run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BackfillReport {
    pub embedded: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl Archive {
    pub fn new(
        documents: Arc<dyn DocumentStore>,
        embeddings: Arc<dyn EmbeddingStore>,
        generator: Arc<EmbeddingGenerator>,
    ) -> Self {
        Self {
            documents,
            embeddings,
            generator,
        }
    }

    pub fn documents(&self) -> &Arc<dyn DocumentStore> {
        &self.documents
    }

    /// Store `document` and, for exchanges, embed it.
    ///
    /// Returns the number of embeddings written. System documents are stored
    /// but never embedded. Embedding is all-or-nothing: if any chunk fails to
    /// embed or to store, no embedding of the document is kept.
    pub async fn persist(&self, document: Document) -> Result<usize> {
        let id = self.documents.persist(document.clone()).await?;
        if document.kind() != DocumentKind::Exchange {
            return Ok(0);
        }
        self.embed_and_store(&id, &document.user, &document.full_text())
            .await
    }

    /// [`persist`](Self::persist), logging the outcome instead of returning it.
    pub async fn persist_logged(&self, document: Document) {
        let user = document.user.clone();
        let id = document.id.clone();
        match self.persist(document).await {
            Ok(chunks) => {
                tracing::info!(user = %user, document_id = %id, chunks, "Saved conversation");
            }
            Err(e) => {
                tracing::error!(user = %user, document_id = %id, error = %e, "Failed to save conversation");
            }
        }
    }

    /// Persist `documents` in order, logging each outcome.
    pub async fn persist_batch(&self, documents: Vec<Document>) {
        for document in documents {
            self.persist_logged(document).await;
        }
    }

    /// Embed exchange documents that have no embeddings yet.
    pub async fn backfill(&self, documents: &[Document]) -> BackfillReport {
        let mut report = BackfillReport::default();
        for doc in documents {
            if doc.kind() != DocumentKind::Exchange {
                report.skipped += 1;
                continue;
            }
            match self.embeddings.has_embeddings(&doc.id).await {
                Ok(true) => {
                    report.skipped += 1;
                    continue;
                }
                Ok(false) => {}
                Err(e) => {
                    tracing::warn!(document_id = %doc.id, error = %e, "Could not check existing embeddings");
                    report.failed += 1;
                    continue;
                }
            }
            match self.embed_and_store(&doc.id, &doc.user, &doc.full_text()).await {
                Ok(_) => report.embedded += 1,
                Err(e) => {
                    tracing::warn!(document_id = %doc.id, error = %e, "Backfill failed for document");
                    report.failed += 1;
                }
            }
        }
        tracing::info!(
            embedded = report.embedded,
            skipped = report.skipped,
            failed = report.failed,
            "Embedding backfill complete"
        );
        report
    }

    /// Backfill every stored document of `user`.
    pub async fn backfill_user(&self, user: &UserId) -> Result<BackfillReport> {
        let documents = self.documents.query(user).await?;
        Ok(self.backfill(&documents).await)
    }

    async fn embed_and_store(&self, document_id: &str, owner: &UserId, text: &str) -> Result<usize> {
        let embeddings = self.generator.embed_document(document_id, text).await?;
        Ok(self.embeddings.persist_all(owner, embeddings).await?)
    }
}
