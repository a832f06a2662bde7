//! The conversational turn: one user message in, one reply out.
//!
//! 1. **Load** the user's session (rehydrating it if needed)
//! 2. **Retrieve** relevant past exchanges, bounded by a timeout
//! 3. **Assemble** the budgeted context, trimming the session buffer
//! 4. **Complete** with the system prompt leading the retained context
//! 5. **Record** the exchange in the buffer, telemetry and the archive
//!
//! Retrieval problems degrade to buffer-only context. An oversized message
//! produces a user-facing notice instead of a reply. Persistence runs on a
//! background task and never delays or undoes the reply.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use flint_config::AppConfig;
use flint_core::memory::{DocumentStore, EmbeddingStore};
use flint_core::{
    AssemblyError, CompletionBackend, Document, EmbeddingBackend, Message, Result, Role, Tokenizer,
    UserId,
};
use flint_memory::{EmbeddingGenerator, SimilarityRetriever};
use flint_telemetry::{TelemetryEvent, TelemetrySink};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::archive::Archive;
use crate::context::assembler::{AssemblyMetadata, PromptAssembler};
use crate::context::token;
use crate::session::SessionStore;

/// Sent once, after the first reply to a user with no history.
pub const INTRO_MESSAGE: &str = "Nice to meet you! I am Flint, your personal thought companion. I can help you with:
- Free-form journaling and note-taking
- Answering general knowledge questions
- Ideating over new ideas
- Being a scratchpad for thoughts, links and concepts you want to remember

I remember our past conversations, so feel free to pick up where we left off.";

/// Sent instead of a reply when the message alone exceeds the token budget.
pub const MESSAGE_TOO_LONG_NOTICE: &str =
    "Sorry, that message is too long for me to process. Could you send a shorter one?";

/// Longest reply piece most messaging transports accept in one message.
pub const MAX_REPLY_CHARS: usize = 1600;

/// Telemetry `api` value for conversational turns.
pub const CHAT_API: &str = "chat";

/// The system instructions, dated for `now`.
pub fn system_prompt(now: DateTime<Utc>) -> String {
    format!(
        "You are Flint, a friendly, smart and helpful personal thought companion.\n\
         Use your general knowledge and our past conversations to inform your responses.\n\
         Today is {} in UTC.",
        now.format("%Y-%m-%d %A")
    )
}

/// Split `text` into pieces of at most `max_chars` characters.
///
/// Splits on character boundaries only; concatenating the pieces yields
/// `text`. Empty text yields no pieces.
pub fn split_reply(text: &str, max_chars: usize) -> Vec<String> {
    let max_chars = max_chars.max(1);
    let mut pieces = Vec::new();
    let mut current = String::new();
    let mut chars = 0usize;
    for c in text.chars() {
        if chars == max_chars {
            pieces.push(std::mem::take(&mut current));
            chars = 0;
        }
        current.push(c);
        chars += 1;
    }
    if !current.is_empty() {
        pieces.push(current);
    }
    pieces
}

/// How the user's message reached us. Reported in telemetry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MessageKind {
    #[default]
    Text,
    /// Transcribed by the host before it reached the engine.
    VoiceMessage,
}

impl MessageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::VoiceMessage => "voice_message",
        }
    }
}

/// A successful turn.
#[derive(Debug)]
pub struct ChatReply {
    /// The completion backend's reply.
    pub reply: String,
    /// `reply` split for delivery, see [`MAX_REPLY_CHARS`].
    pub parts: Vec<String>,
    /// The intro to deliver after the reply, on first contact only.
    pub intro: Option<&'static str>,
    /// Whether retrieved history made it into the context.
    pub history_included: bool,
    pub metadata: AssemblyMetadata,
    /// Background persistence of this turn. Hosts may await it or drop it.
    pub archive_task: JoinHandle<()>,
}

/// The user-visible result of [`ChatEngine::handle_message`].
#[derive(Debug)]
pub enum ChatOutcome {
    Replied(ChatReply),
    /// Nothing was sent to the backend and the session is unchanged.
    MessageTooLong {
        notice: &'static str,
        tokens: usize,
        budget: usize,
    },
}

/// Runs conversational turns against shared sessions and storage.
pub struct ChatEngine {
    sessions: Arc<SessionStore>,
    retriever: Arc<SimilarityRetriever>,
    assembler: PromptAssembler,
    completion: Arc<dyn CompletionBackend>,
    archive: Archive,
    telemetry: Option<Arc<TelemetrySink>>,
    retrieval_enabled: bool,
    client_os: String,
}

impl ChatEngine {
    /// Wire an engine from configuration and the host's backends.
    pub fn new(
        config: &AppConfig,
        tokenizer: Arc<dyn Tokenizer>,
        embedder: Arc<dyn EmbeddingBackend>,
        completion: Arc<dyn CompletionBackend>,
        documents: Arc<dyn DocumentStore>,
        embeddings: Arc<dyn EmbeddingStore>,
    ) -> Self {
        let generator = Arc::new(EmbeddingGenerator::from_config(embedder, &config.embeddings));
        let retriever = Arc::new(SimilarityRetriever::from_config(
            generator.clone(),
            documents.clone(),
            embeddings.clone(),
            &config.retrieval,
        ));
        let sessions = Arc::new(SessionStore::from_config(documents.clone(), &config.sessions));
        let archive = Archive::new(documents, embeddings, generator);

        Self {
            sessions,
            retriever,
            assembler: PromptAssembler::from_config(tokenizer, config),
            completion,
            archive,
            telemetry: None,
            retrieval_enabled: config.retrieval.enabled,
            client_os: config.telemetry.client_os.clone(),
        }
    }

    /// Record a usage event per turn into `sink`.
    pub fn with_telemetry(mut self, sink: Arc<TelemetrySink>) -> Self {
        self.telemetry = Some(sink);
        self
    }

    pub fn with_retrieval(mut self, enabled: bool) -> Self {
        self.retrieval_enabled = enabled;
        self
    }

    pub fn sessions(&self) -> &Arc<SessionStore> {
        &self.sessions
    }

    pub fn archive(&self) -> &Archive {
        &self.archive
    }

    /// Handle one message from `user`.
    ///
    /// Only a completion backend failure is returned as an error; the
    /// session is then left as assembly trimmed it, without the new
    /// exchange.
    ///
    /// The turn holds off session resets until `archive_task` finishes.
    pub async fn handle_message(
        &self,
        user: &UserId,
        message: &str,
        kind: MessageKind,
    ) -> Result<ChatOutcome> {
        let turn = self.sessions.begin_turn().await;
        let (handle, origin) = self.sessions.get_or_load(user).await;
        let mut session = handle.lock().await;

        let retrieved = if self.retrieval_enabled {
            self.retriever.search_or_empty(user, message).await
        } else {
            Vec::new()
        };

        let prompt = match self
            .assembler
            .assemble(session.buffer_mut(), &retrieved, message)
        {
            Ok(prompt) => prompt,
            Err(AssemblyError::MessageTooLong { tokens, budget }) => {
                info!(user = %user, tokens, budget, "Message exceeds token budget");
                return Ok(ChatOutcome::MessageTooLong {
                    notice: MESSAGE_TOO_LONG_NOTICE,
                    tokens,
                    budget,
                });
            }
        };

        let mut messages = Vec::with_capacity(session.buffer().len() + 1);
        messages.push(Message::system(system_prompt(Utc::now())));
        messages.extend(session.buffer().oldest_first().cloned());

        debug!(
            user = %user,
            backend = self.completion.name(),
            context_messages = messages.len(),
            retrieved = retrieved.len(),
            "Requesting completion"
        );
        let reply = self.completion.complete(&messages, message).await?;

        session.buffer_mut().append(Role::Human, message);
        session.buffer_mut().append(Role::Assistant, reply.clone());
        session.record_tokens(prompt.metadata.total_tokens + self.assembler.count_tokens(&reply));
        let high_water_mark = session.high_water_mark();
        let first_contact = session.take_first_contact();
        drop(session);

        if let Some(sink) = &self.telemetry {
            sink.append(
                TelemetryEvent::new("api", CHAT_API, user.as_str(), self.client_os.as_str())
                    .with_property("user_message_type", kind.as_str()),
            );
        }

        let mut to_persist = vec![Document::new(user.clone(), message, reply.clone())];
        if first_contact {
            to_persist.push(Document::new(user.clone(), "", INTRO_MESSAGE));
        }
        let archive = self.archive.clone();
        let archive_task = tokio::spawn(async move {
            archive.persist_batch(to_persist).await;
            drop(turn);
        });

        info!(
            user = %user,
            origin = ?origin,
            reply_tokens_est = token::estimate_tokens(&reply),
            high_water_mark,
            "Replied"
        );

        Ok(ChatOutcome::Replied(ChatReply {
            parts: split_reply(&reply, MAX_REPLY_CHARS),
            reply,
            intro: first_contact.then_some(INTRO_MESSAGE),
            history_included: prompt.history_block.is_some(),
            metadata: prompt.metadata,
            archive_task,
        }))
    }
}
