//! Conversation storage, chunked embeddings and similarity retrieval for Flint.

pub mod embeddings;
pub mod in_memory;
pub mod openai_compat;
pub mod retriever;
pub mod vector;

pub use embeddings::{EmbeddingGenerator, chunk_text};
pub use in_memory::{InMemoryDocumentStore, InMemoryEmbeddingStore};
pub use openai_compat::OpenAiCompatEmbedder;
pub use retriever::SimilarityRetriever;
pub use vector::{ScoredChunk, cosine_distance, cosine_similarity, nearest_within};
