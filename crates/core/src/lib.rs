//! # Flint Core
//!
//! Domain types, traits, and error definitions for the Flint conversational
//! memory engine. This crate performs **no I/O** and needs no async runtime. It defines the
//! domain model that every other crate implements against.
//!
//! ## Design Philosophy
//!
//! Every external collaborator (document storage, embedding storage,
//! tokenizer, embedding backend, completion backend) is a trait here.
//! Implementations live in their respective crates or in the host
//! application. This enables:
//! - Swapping backends without touching the budgeting logic
//! - Easy testing with scripted stub implementations
//! - Clean dependency graph (all crates depend inward on core)

pub mod document;
pub mod error;
pub mod memory;
pub mod message;
pub mod provider;
pub mod tokenizer;
pub mod user;

// Re-export key types at crate root for ergonomics
pub use document::{Chunk, Document, DocumentKind, Embedding};
pub use error::{AssemblyError, BackendError, Error, Result, StoreError};
pub use memory::{DocumentStore, EmbeddingStore};
pub use message::{Message, Role};
pub use provider::{CompletionBackend, EmbeddingBackend};
pub use tokenizer::Tokenizer;
pub use user::UserId;
