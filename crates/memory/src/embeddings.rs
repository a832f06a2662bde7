//! Chunked embedding generation.
//!
//! Text is cut into consecutive, non-overlapping windows of at most
//! `chunk_size` characters. Each window is framed with the passage prefix
//! and embedded on its own. Queries use a different prefix against the same
//! backend.

use std::sync::Arc;

use flint_config::EmbeddingsConfig;
use flint_core::{BackendError, Chunk, Embedding, EmbeddingBackend};
use futures::stream::{self, Stream, StreamExt, TryStreamExt};

/// Split `text` into windows of at most `chunk_size` characters.
///
/// Windows are measured in `char`s so multi-byte text is never cut inside a
/// code point. Concatenating the returned chunk texts yields `text` exactly.
/// Empty text produces no chunks.
pub fn chunk_text(document_id: &str, text: &str, chunk_size: usize) -> Vec<Chunk> {
    let chunk_size = chunk_size.max(1);
    let mut chunks = Vec::new();
    let mut start = 0usize;
    let mut chars_in_window = 0usize;

    for (byte_idx, _) in text.char_indices() {
        if chars_in_window == chunk_size {
            chunks.push(Chunk {
                document_id: document_id.to_string(),
                index: chunks.len(),
                offset: start,
                text: text[start..byte_idx].to_string(),
            });
            start = byte_idx;
            chars_in_window = 0;
        }
        chars_in_window += 1;
    }

    if start < text.len() {
        chunks.push(Chunk {
            document_id: document_id.to_string(),
            index: chunks.len(),
            offset: start,
            text: text[start..].to_string(),
        });
    }

    chunks
}

/// Produces one embedding per chunk of a document, and single embeddings for
/// search queries.
pub struct EmbeddingGenerator {
    backend: Arc<dyn EmbeddingBackend>,
    chunk_size: usize,
    passage_prefix: String,
    query_prefix: String,
}

impl EmbeddingGenerator {
    pub fn new(backend: Arc<dyn EmbeddingBackend>) -> Self {
        Self::from_config(backend, &EmbeddingsConfig::default())
    }

    pub fn from_config(backend: Arc<dyn EmbeddingBackend>, config: &EmbeddingsConfig) -> Self {
        Self {
            backend,
            chunk_size: config.chunk_size,
            passage_prefix: config.passage_prefix.clone(),
            query_prefix: config.query_prefix.clone(),
        }
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn model_name(&self) -> &str {
        self.backend.model_name()
    }

    /// Lazily embed every chunk of `text`, in order.
    ///
    /// Nothing is sent to the backend until the stream is polled, and the
    /// call can be repeated for the same text with identical chunking. A
    /// backend failure ends the stream with that error; callers that persist
    /// should use [`embed_document`](Self::embed_document) so a document is
    /// either fully embedded or not at all.
    pub fn generate_embeddings<'a>(
        &'a self,
        document_id: &str,
        text: &str,
    ) -> impl Stream<Item = Result<Embedding, BackendError>> + Send + use<'a> {
        let chunks = chunk_text(document_id, text, self.chunk_size);
        stream::iter(chunks).then(move |chunk| async move {
            let framed = format!("{}{}", self.passage_prefix, chunk.text);
            let vector = self.backend.embed(&framed).await?;
            if vector.is_empty() {
                return Err(BackendError::InvalidResponse(format!(
                    "empty embedding for chunk {} of document {}",
                    chunk.index, chunk.document_id
                )));
            }
            Ok(Embedding { chunk, vector })
        })
    }

    /// Embed every chunk of `text`, failing as a whole if any chunk fails.
    pub async fn embed_document(
        &self,
        document_id: &str,
        text: &str,
    ) -> Result<Vec<Embedding>, BackendError> {
        let embeddings: Vec<Embedding> = self
            .generate_embeddings(document_id, text)
            .try_collect()
            .await?;
        tracing::debug!(
            document_id,
            chunks = embeddings.len(),
            model = self.model_name(),
            "Embedded document"
        );
        Ok(embeddings)
    }

    /// Embed a search query with the query-side framing.
    pub async fn embed_query(&self, query: &str) -> Result<Vec<f32>, BackendError> {
        let framed = format!("{}{}", self.query_prefix, query);
        self.backend.embed(&framed).await
    }
}
