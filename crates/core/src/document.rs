//! Persisted conversation history: documents, chunks and embeddings.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::user::UserId;

/// Classification of a [`Document`] by which sides carry text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentKind {
    /// Both the human and the assistant said something. Retrievable.
    Exchange,
    /// One side is empty (intro notices, system announcements). Valid history,
    /// but never embedded and never returned by similarity search.
    System,
}

/// An immutable historical exchange between a user and the assistant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    /// Unique document ID
    pub id: String,

    /// The user this exchange belongs to
    pub user: UserId,

    /// When the exchange happened
    pub timestamp: DateTime<Utc>,

    /// What the human wrote (possibly empty)
    pub human: String,

    /// What the assistant replied (possibly empty)
    pub assistant: String,
}

impl Document {
    /// Create a new document stamped with the current time.
    pub fn new(user: UserId, human: impl Into<String>, assistant: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            user,
            timestamp: Utc::now(),
            human: human.into(),
            assistant: assistant.into(),
        }
    }

    /// Override the timestamp (rehydration from storage, tests).
    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn kind(&self) -> DocumentKind {
        if self.human.is_empty() || self.assistant.is_empty() {
            DocumentKind::System
        } else {
            DocumentKind::Exchange
        }
    }

    /// Whether both sides are empty. Such documents carry nothing and are
    /// rejected by stores.
    pub fn is_blank(&self) -> bool {
        self.human.is_empty() && self.assistant.is_empty()
    }

    /// The text that gets chunked and embedded: `"{human} {assistant}"`.
    pub fn full_text(&self) -> String {
        format!("{} {}", self.human, self.assistant)
    }
}

/// A contiguous slice of a document's full text, at most one chunk-size long.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    /// Source document identifier
    pub document_id: String,

    /// Sequential index within the document, starting at 0
    pub index: usize,

    /// Byte offset of `text` inside the document's full text
    pub offset: usize,

    /// The chunk text, without any retrieval-mode prefix
    pub text: String,
}

/// A vector embedding of one chunk, together with the exact chunk it was
/// computed from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Embedding {
    pub chunk: Chunk,
    pub vector: Vec<f32>,
}

impl Embedding {
    /// The exact text the vector was computed from (minus the passage prefix).
    pub fn compiled(&self) -> &str {
        &self.chunk.text
    }

    pub fn document_id(&self) -> &str {
        &self.chunk.document_id
    }
}
