//! Error types for the Flint domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error variant.
//!
//! A retrieval timeout and an empty candidate set are not errors: both
//! surface as an empty result list.

use std::time::Duration;

use thiserror::Error;

/// The top-level error type for all Flint operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Backend errors ---
    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),

    // --- Storage errors ---
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    // --- Prompt assembly errors ---
    #[error("Assembly error: {0}")]
    Assembly(#[from] AssemblyError),

    // --- Configuration errors ---
    #[error("Configuration error: {message}")]
    Config { message: String },

    // --- Generic ---
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Whether the caller may retry the operation later (with backoff) or
    /// degrade to a retrieval-free response.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Backend(_) | Self::Store(_))
    }
}

// --- Bounded context errors ---

/// Failures of the embedding or completion backend.
#[derive(Debug, Clone, Error)]
pub enum BackendError {
    #[error("Backend unavailable: {0}")]
    Unavailable(String),

    #[error("Backend request timed out after {0:?}")]
    Timeout(Duration),

    #[error("Backend returned an invalid response: {0}")]
    InvalidResponse(String),
}

/// Failures of the document or embedding store.
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Query failed: {0}")]
    QueryFailed(String),
}

/// Failures of prompt assembly.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AssemblyError {
    /// The new user message alone exceeds the token budget.
    #[error("Message too long: {tokens} tokens exceed the budget of {budget} tokens")]
    MessageTooLong { tokens: usize, budget: usize },
}
