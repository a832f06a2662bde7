//! Per-user conversation buffer.
//!
//! An ordered log of role-tagged messages, oldest first. The buffer never
//! evicts on its own: the assembler decides what survives and installs the
//! retained window with [`ConversationBuffer::replace`].

use flint_core::{Document, Message, Role};

/// One user's live message log.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConversationBuffer {
    entries: Vec<Message>,
}

impl ConversationBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a buffer from persisted documents.
    ///
    /// Documents are replayed oldest first regardless of input order; each
    /// contributes its non-empty sides as a human then an assistant entry.
    pub fn from_documents(documents: &[Document]) -> Self {
        let mut ordered: Vec<&Document> = documents.iter().collect();
        ordered.sort_by_key(|d| d.timestamp);

        let mut buffer = Self::new();
        for doc in ordered {
            if !doc.human.is_empty() {
                buffer.append(Role::Human, &doc.human);
            }
            if !doc.assistant.is_empty() {
                buffer.append(Role::Assistant, &doc.assistant);
            }
        }
        buffer
    }

    pub fn append(&mut self, role: Role, text: impl Into<String>) {
        self.entries.push(Message::new(role, text));
    }

    /// Entries oldest to newest.
    pub fn entries(&self) -> &[Message] {
        &self.entries
    }

    /// Install a new window, given oldest to newest.
    pub fn replace(&mut self, entries: Vec<Message>) {
        self.entries = entries;
    }

    /// Walk entries from the newest backwards.
    pub fn newest_first(&self) -> impl DoubleEndedIterator<Item = &Message> + ExactSizeIterator {
        self.entries.iter().rev()
    }

    /// Walk entries from the oldest forwards.
    pub fn oldest_first(&self) -> impl DoubleEndedIterator<Item = &Message> + ExactSizeIterator {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
