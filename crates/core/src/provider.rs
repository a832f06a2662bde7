//! Backend traits: the abstraction over embedding and completion models.
//!
//! Both are opaque to the engine: an embedding backend turns text into a
//! vector, a completion backend turns a prioritized message sequence plus
//! the current query into a reply.

use async_trait::async_trait;

use crate::error::BackendError;
use crate::message::Message;

/// Computes vector embeddings.
///
/// Used for both "passage" and "query" framings; the caller adds the
/// framing prefix before calling [`embed`](EmbeddingBackend::embed).
#[async_trait]
pub trait EmbeddingBackend: Send + Sync {
    /// The model identifier (e.g. `"intfloat/multilingual-e5-large"`).
    fn model_name(&self) -> &str;

    /// Embed one piece of text.
    async fn embed(&self, text: &str) -> Result<Vec<f32>, BackendError>;
}

/// Generates replies.
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    /// A human-readable name for this backend.
    fn name(&self) -> &str;

    /// Produce a reply to `query` given the ordered context `messages`
    /// (oldest first, system instructions leading).
    async fn complete(&self, messages: &[Message], query: &str) -> Result<String, BackendError>;
}
