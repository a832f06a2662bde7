//! Token-budgeted context assembly.
//!
//! | Tier | Source | Trim Strategy |
//! |------|--------|---------------|
//! | 1. User message | Incoming request | Never trimmed; too long fails |
//! | 2. Retrieved history | Similarity search | Oldest first, stop at first misfit |
//! | 3. Conversation buffer | Live session | Oldest entries dropped |

pub mod assembler;
pub mod buffer;
pub mod token;

pub use assembler::{
    AssembledPrompt, AssemblyMetadata, DropInfo, HISTORY_PREAMBLE, LayerStats, PromptAssembler,
    assemble,
};
pub use buffer::ConversationBuffer;
pub use token::{ModelTokenizer, estimate_tokens};
