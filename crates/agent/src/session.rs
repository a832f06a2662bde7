//! Live per-user sessions.
//!
//! The [`SessionStore`] owns every user's [`Session`]. Different users are
//! served concurrently; each session sits behind its own async mutex so at
//! most one assembly per user runs at a time. Sessions are created lazily,
//! rebuilt from the document store when missing, and replaced wholesale on
//! a scheduled reset.
//!
//! Turns hold a shared [`TurnGuard`] from before the session lookup until
//! their exchange is persisted. A reset takes the same gate exclusively, so
//! it never swaps the map under an in-flight turn and always rebuilds from
//! a store that already holds every finished exchange.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use flint_config::SessionsConfig;
use flint_core::memory::DocumentStore;
use flint_core::{Document, StoreError, UserId};
use tokio::sync::{Mutex, OwnedRwLockReadGuard, RwLock};

use crate::context::buffer::ConversationBuffer;

/// A shared, lockable handle to one user's session.
pub type SessionHandle = Arc<Mutex<Session>>;

/// One user's live conversation state.
#[derive(Debug, Clone, Default)]
pub struct Session {
    buffer: ConversationBuffer,
    high_water_mark: usize,
    first_contact: bool,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    /// A session for a user with no stored history.
    pub fn first_contact() -> Self {
        Self {
            first_contact: true,
            ..Self::default()
        }
    }

    pub fn from_documents(documents: &[Document]) -> Self {
        Self {
            buffer: ConversationBuffer::from_documents(documents),
            ..Self::default()
        }
    }

    /// Whether the user has not yet completed a turn.
    pub fn is_first_contact(&self) -> bool {
        self.first_contact
    }

    /// Clear the first-contact flag, returning its previous value.
    pub fn take_first_contact(&mut self) -> bool {
        std::mem::take(&mut self.first_contact)
    }

    pub fn buffer(&self) -> &ConversationBuffer {
        &self.buffer
    }

    pub fn buffer_mut(&mut self) -> &mut ConversationBuffer {
        &mut self.buffer
    }

    /// The largest assembled token count seen in this session.
    pub fn high_water_mark(&self) -> usize {
        self.high_water_mark
    }

    /// Record an assembled token count. The mark never decreases.
    pub fn record_tokens(&mut self, tokens: usize) {
        self.high_water_mark = self.high_water_mark.max(tokens);
    }
}

/// How [`SessionStore::get_or_load`] obtained a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionOrigin {
    /// Already live.
    Existing,
    /// Rebuilt from persisted documents.
    Rehydrated,
    /// The user has no persisted history: first contact.
    Empty,
    /// The document store failed; started empty.
    Unavailable,
}

/// Shared hold on the session map for the duration of one turn.
///
/// While any guard is alive [`SessionStore::reset`] waits.
#[derive(Debug)]
pub struct TurnGuard {
    _gate: OwnedRwLockReadGuard<()>,
}

pub struct SessionStore {
    sessions: RwLock<HashMap<UserId, SessionHandle>>,
    turns: Arc<RwLock<()>>,
    documents: Arc<dyn DocumentStore>,
    rehydrate_limit: usize,
    active_window: chrono::Duration,
}

impl SessionStore {
    pub fn new(documents: Arc<dyn DocumentStore>) -> Self {
        Self::from_config(documents, &SessionsConfig::default())
    }

    pub fn from_config(documents: Arc<dyn DocumentStore>, config: &SessionsConfig) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            turns: Arc::new(RwLock::new(())),
            documents,
            rehydrate_limit: config.rehydrate_limit,
            active_window: chrono::Duration::hours(config.active_window_hours as i64),
        }
    }

    /// Enter a turn. Acquire this before [`get_or_load`](Self::get_or_load)
    /// and keep it until the turn's exchange is persisted.
    ///
    /// Waits while a reset is running or queued.
    pub async fn begin_turn(&self) -> TurnGuard {
        TurnGuard {
            _gate: self.turns.clone().read_owned().await,
        }
    }

    /// Fetch `user`'s session, rebuilding it from storage if it is not live.
    ///
    /// The store is queried without holding the map lock. If two callers
    /// race to load the same user, the first insert wins and both receive
    /// the same handle.
    pub async fn get_or_load(&self, user: &UserId) -> (SessionHandle, SessionOrigin) {
        if let Some(handle) = self.sessions.read().await.get(user) {
            return (handle.clone(), SessionOrigin::Existing);
        }

        let (session, origin) = match self.documents.recent(user, self.rehydrate_limit).await {
            Ok(docs) if docs.is_empty() => (Session::first_contact(), SessionOrigin::Empty),
            Ok(docs) => {
                tracing::debug!(user = %user, documents = docs.len(), "Rehydrating session");
                (Session::from_documents(&docs), SessionOrigin::Rehydrated)
            }
            Err(e) => {
                tracing::warn!(user = %user, error = %e, "Could not load history, starting empty session");
                (Session::new(), SessionOrigin::Unavailable)
            }
        };

        let mut sessions = self.sessions.write().await;
        if let Some(existing) = sessions.get(user) {
            return (existing.clone(), SessionOrigin::Existing);
        }
        let handle = Arc::new(Mutex::new(session));
        sessions.insert(user.clone(), handle.clone());
        (handle, origin)
    }

    /// Discard every session and rebuild those of recently active users.
    ///
    /// Waits for every outstanding [`TurnGuard`] and holds new turns off
    /// until done. The replacement map is built off to the side and swapped
    /// in under a single write lock. On a store error the current map is
    /// kept.
    pub async fn reset(&self) -> Result<usize, StoreError> {
        let _exclusive = self.turns.write().await;
        let start = Instant::now();
        tracing::info!("Re-initializing conversation sessions");

        let since = Utc::now() - self.active_window;
        let users = self.documents.active_users(since).await?;

        let mut fresh = HashMap::with_capacity(users.len());
        for user in users {
            let docs = self.documents.recent(&user, self.rehydrate_limit).await?;
            fresh.insert(user, Arc::new(Mutex::new(Session::from_documents(&docs))));
        }

        let count = fresh.len();
        let previous = std::mem::replace(&mut *self.sessions.write().await, fresh);
        tracing::info!(
            sessions = count,
            discarded = previous.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Re-initialized conversation sessions"
        );
        Ok(count)
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }

    pub async fn contains(&self, user: &UserId) -> bool {
        self.sessions.read().await.contains_key(user)
    }
}
