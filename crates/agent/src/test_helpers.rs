//! Shared test doubles for the agent crate.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use flint_core::memory::{DocumentStore, EmbeddingStore};
use flint_core::{
    BackendError, CompletionBackend, Document, Embedding, EmbeddingBackend, Message, StoreError,
    Tokenizer, UserId,
};
use flint_memory::{InMemoryDocumentStore, InMemoryEmbeddingStore};
use flint_telemetry::{TelemetryError, TelemetryEvent, TelemetryUploader};
use tokio::sync::Notify;

/// Counts whitespace-separated words, ignoring the model.
pub struct WordTokenizer;

impl Tokenizer for WordTokenizer {
    fn count_tokens(&self, text: &str, _model_id: &str) -> usize {
        text.split_whitespace().count()
    }
}

/// `n` distinct words: `"{prefix}0 {prefix}1 ..."`.
pub fn words(prefix: &str, n: usize) -> String {
    (0..n)
        .map(|i| format!("{prefix}{i}"))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Embeds by keyword: the first rule whose keyword occurs in the text wins.
///
/// Unmatched passages and unmatched queries get different fixed vectors so
/// they never match each other.
pub struct ScriptedEmbedder {
    rules: Vec<(String, Vec<f32>)>,
    unavailable: bool,
}

impl ScriptedEmbedder {
    pub fn new() -> Self {
        Self {
            rules: Vec::new(),
            unavailable: false,
        }
    }

    pub fn unavailable() -> Self {
        Self {
            rules: Vec::new(),
            unavailable: true,
        }
    }

    pub fn with(mut self, keyword: &str, vector: Vec<f32>) -> Self {
        self.rules.push((keyword.to_string(), vector));
        self
    }
}

#[async_trait]
impl EmbeddingBackend for ScriptedEmbedder {
    fn model_name(&self) -> &str {
        "scripted"
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, BackendError> {
        if self.unavailable {
            return Err(BackendError::Unavailable("scripted outage".into()));
        }
        if let Some((_, vector)) = self.rules.iter().find(|(k, _)| text.contains(k.as_str())) {
            return Ok(vector.clone());
        }
        if text.starts_with("query: ") {
            Ok(vec![0.0, 0.0, 1.0, 0.0])
        } else {
            Ok(vec![0.0, 0.0, 0.0, 1.0])
        }
    }
}

/// Replies with a fixed text and records every request.
///
/// With a gate, each reply waits for one `notify_one` after the request is
/// recorded.
pub struct ScriptedCompletion {
    reply: Option<String>,
    calls: Mutex<Vec<(Vec<Message>, String)>>,
    gate: Option<Arc<Notify>>,
}

impl ScriptedCompletion {
    pub fn replying(reply: &str) -> Self {
        Self {
            reply: Some(reply.to_string()),
            calls: Mutex::new(Vec::new()),
            gate: None,
        }
    }

    pub fn failing() -> Self {
        Self {
            reply: None,
            calls: Mutex::new(Vec::new()),
            gate: None,
        }
    }

    pub fn held_by(mut self, gate: Arc<Notify>) -> Self {
        self.gate = Some(gate);
        self
    }

    pub fn calls(&self) -> Vec<(Vec<Message>, String)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl CompletionBackend for ScriptedCompletion {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, messages: &[Message], query: &str) -> Result<String, BackendError> {
        self.calls
            .lock()
            .unwrap()
            .push((messages.to_vec(), query.to_string()));
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        self.reply
            .clone()
            .ok_or_else(|| BackendError::Unavailable("scripted outage".into()))
    }
}

/// A document store whose every call fails.
pub struct FailingDocumentStore;

#[async_trait]
impl DocumentStore for FailingDocumentStore {
    fn name(&self) -> &str {
        "failing"
    }

    async fn persist(&self, _document: Document) -> Result<String, StoreError> {
        Err(StoreError::Storage("store is down".into()))
    }

    async fn get(&self, _id: &str) -> Result<Option<Document>, StoreError> {
        Err(StoreError::QueryFailed("store is down".into()))
    }

    async fn query(&self, _user: &UserId) -> Result<Vec<Document>, StoreError> {
        Err(StoreError::QueryFailed("store is down".into()))
    }

    async fn active_users(&self, _since: DateTime<Utc>) -> Result<Vec<UserId>, StoreError> {
        Err(StoreError::QueryFailed("store is down".into()))
    }
}

/// An in-memory embedding store whose single writes start failing after a
/// set number succeed. Batches go through the trait's default `persist_all`.
pub struct FlakyEmbeddingStore {
    inner: InMemoryEmbeddingStore,
    writes_left: AtomicUsize,
}

impl FlakyEmbeddingStore {
    pub fn failing_after(writes: usize) -> Self {
        Self {
            inner: InMemoryEmbeddingStore::new(),
            writes_left: AtomicUsize::new(writes),
        }
    }

    pub fn recover(&self) {
        self.writes_left.store(usize::MAX, Ordering::SeqCst);
    }

    pub fn inner(&self) -> &InMemoryEmbeddingStore {
        &self.inner
    }
}

#[async_trait]
impl EmbeddingStore for FlakyEmbeddingStore {
    fn name(&self) -> &str {
        "flaky"
    }

    async fn persist(&self, owner: &UserId, embedding: Embedding) -> Result<(), StoreError> {
        let allowed = self
            .writes_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if !allowed {
            return Err(StoreError::Storage("write quota exhausted".into()));
        }
        self.inner.persist(owner, embedding).await
    }

    async fn remove_document(&self, document_id: &str) -> Result<usize, StoreError> {
        self.inner.remove_document(document_id).await
    }

    async fn query_candidates(&self, user: &UserId) -> Result<Vec<Embedding>, StoreError> {
        self.inner.query_candidates(user).await
    }

    async fn has_embeddings(&self, document_id: &str) -> Result<bool, StoreError> {
        self.inner.has_embeddings(document_id).await
    }
}

/// Records the size of every uploaded batch.
pub struct RecordingUploader {
    batches: Mutex<Vec<usize>>,
}

impl RecordingUploader {
    pub fn new() -> Self {
        Self {
            batches: Mutex::new(Vec::new()),
        }
    }

    pub fn batches(&self) -> Vec<usize> {
        self.batches.lock().unwrap().clone()
    }
}

#[async_trait]
impl TelemetryUploader for RecordingUploader {
    async fn upload(&self, batch: &[TelemetryEvent]) -> Result<(), TelemetryError> {
        self.batches.lock().unwrap().push(batch.len());
        Ok(())
    }
}

pub struct Stores {
    pub documents: Arc<InMemoryDocumentStore>,
    pub embeddings: Arc<InMemoryEmbeddingStore>,
}

pub fn stores() -> Stores {
    Stores {
        documents: Arc::new(InMemoryDocumentStore::new()),
        embeddings: Arc::new(InMemoryEmbeddingStore::new()),
    }
}
