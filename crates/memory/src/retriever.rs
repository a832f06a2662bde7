//! Similarity retrieval over a single user's stored embeddings.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use flint_config::RetrievalConfig;
use flint_core::memory::{DocumentStore, EmbeddingStore};
use flint_core::{Document, DocumentKind, Result, UserId};

use crate::embeddings::EmbeddingGenerator;
use crate::vector::nearest_within;

/// Returns the distinct documents of one user whose closest chunks lie within
/// a cosine-distance threshold of a query.
pub struct SimilarityRetriever {
    generator: Arc<EmbeddingGenerator>,
    documents: Arc<dyn DocumentStore>,
    embeddings: Arc<dyn EmbeddingStore>,
    distance_threshold: f32,
    top_n: usize,
    timeout: Duration,
}

impl SimilarityRetriever {
    pub fn new(
        generator: Arc<EmbeddingGenerator>,
        documents: Arc<dyn DocumentStore>,
        embeddings: Arc<dyn EmbeddingStore>,
    ) -> Self {
        Self::from_config(generator, documents, embeddings, &RetrievalConfig::default())
    }

    pub fn from_config(
        generator: Arc<EmbeddingGenerator>,
        documents: Arc<dyn DocumentStore>,
        embeddings: Arc<dyn EmbeddingStore>,
        config: &RetrievalConfig,
    ) -> Self {
        Self {
            generator,
            documents,
            embeddings,
            distance_threshold: config.distance_threshold,
            top_n: config.top_n,
            timeout: config.timeout(),
        }
    }

    /// Override the number of closest chunks kept per search.
    pub fn with_top_n(mut self, top_n: usize) -> Self {
        self.top_n = top_n;
        self
    }

    /// Search `user`'s history for documents relevant to `query`.
    ///
    /// Results are ordered nearest first and contain each document once.
    /// `top_n` caps matching chunks before they are collapsed to documents,
    /// so fewer than `top_n` documents may come back. Only exchange
    /// documents owned by `user` are ever returned.
    pub async fn search(&self, user: &UserId, query: &str) -> Result<Vec<Document>> {
        let candidates = self.embeddings.query_candidates(user).await?;
        if candidates.is_empty() {
            tracing::debug!(user = %user, "No stored embeddings, skipping retrieval");
            return Ok(Vec::new());
        }

        let query_vector = self.generator.embed_query(query).await?;
        let candidate_count = candidates.len();
        let ranked = nearest_within(candidates, &query_vector, self.distance_threshold, self.top_n);

        let mut seen = HashSet::new();
        let mut results = Vec::new();
        for scored in &ranked {
            let document_id = scored.embedding.document_id();
            if !seen.insert(document_id.to_string()) {
                continue;
            }
            match self.documents.get(document_id).await? {
                Some(doc) if &doc.user == user && doc.kind() == DocumentKind::Exchange => {
                    results.push(doc);
                }
                Some(_) => {
                    tracing::warn!(document_id, "Embedding points at a foreign or system document, ignoring");
                }
                None => {
                    tracing::debug!(document_id, "Embedding has no backing document");
                }
            }
        }

        tracing::debug!(
            user = %user,
            candidates = candidate_count,
            matched_chunks = ranked.len(),
            documents = results.len(),
            "Retrieval complete"
        );
        Ok(results)
    }

    /// [`search`](Self::search) bounded by the configured timeout.
    ///
    /// A timeout, a backend outage or a store failure all yield an empty
    /// result so the conversation can continue on buffer context alone.
    pub async fn search_or_empty(&self, user: &UserId, query: &str) -> Vec<Document> {
        self.search_with_timeout(user, query, self.timeout).await
    }

    pub async fn search_with_timeout(
        &self,
        user: &UserId,
        query: &str,
        timeout: Duration,
    ) -> Vec<Document> {
        let start = Instant::now();
        match tokio::time::timeout(timeout, self.search(user, query)).await {
            Ok(Ok(documents)) => documents,
            Ok(Err(e)) => {
                tracing::warn!(user = %user, error = %e, "Retrieval failed, continuing without history");
                Vec::new()
            }
            Err(_) => {
                tracing::warn!(
                    user = %user,
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    "Retrieval timed out, continuing without history"
                );
                Vec::new()
            }
        }
    }
}
