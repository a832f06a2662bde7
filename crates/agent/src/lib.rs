//! The conversational engine for Flint.
//!
//! Each incoming message goes through the same turn:
//!
//! 1. **Load** the user's live session, rebuilding it from storage if needed
//! 2. **Retrieve** similar past exchanges of that user
//! 3. **Assemble** a token-budgeted context from message, history and buffer
//! 4. **Complete** via the configured backend
//! 5. **Persist** the exchange and its embeddings in the background
//!
//! Background loops reset sessions daily and upload telemetry.

pub mod archive;
pub mod chat;
pub mod context;
pub mod scheduler;
pub mod session;

#[cfg(test)]
pub(crate) mod test_helpers;

pub use archive::{Archive, BackfillReport};
pub use chat::{ChatEngine, ChatOutcome, ChatReply, MessageKind, split_reply, system_prompt};
pub use context::{
    AssembledPrompt, AssemblyMetadata, ConversationBuffer, ModelTokenizer, PromptAssembler,
    assemble,
};
pub use scheduler::{Maintenance, spawn_session_reset, spawn_telemetry_flush};
pub use session::{Session, SessionHandle, SessionOrigin, SessionStore};
