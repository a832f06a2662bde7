//! Prompt assembly: the token-budgeted context for one completion call.
//!
//! Three tiers compete for a single budget, highest priority first:
//!
//! 1. **User message**: always included whole, or the request fails
//! 2. **Retrieved history**: oldest document first, full or human-only form
//! 3. **Conversation buffer**: newest entry first, oldest entries dropped
//!
//! Accepted history is wrapped in a preamble and appended to the buffer as
//! an assistant entry before the buffer is trimmed, so it competes with the
//! live conversation on equal footing.
//!
//! # Determinism
//!
//! Assembly is deterministic: identical inputs and tokenizer always produce
//! identical output. Nothing here reads the clock.

use std::sync::Arc;

use flint_config::AppConfig;
use flint_core::{AssemblyError, Document, Role, Tokenizer};
use serde::{Deserialize, Serialize};

use crate::context::buffer::ConversationBuffer;

/// Heading placed above the accepted history blocks.
pub const HISTORY_PREAMBLE: &str = "Previous conversations you may find relevant:";

/// Timestamp layout of each rendered history block.
pub const HISTORY_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M";

// ── Types ─────────────────────────────────────────────────────────────────

/// The result of a successful assembly.
///
/// The trimmed buffer is not part of the value: it has already been written
/// back into the buffer passed to [`assemble`].
#[derive(Debug, Clone)]
pub struct AssembledPrompt {
    /// The accepted user message.
    pub user_message: String,
    /// The wrapped history block, also present as the newest buffer entry
    /// unless it was trimmed. `None` if no retrieved document fit.
    pub history_block: Option<String>,
    /// Token accounting for the assembly.
    pub metadata: AssemblyMetadata,
}

/// Detailed metadata about the assembly process.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssemblyMetadata {
    /// Tokens of the user message plus every retained buffer entry.
    pub total_tokens: usize,
    /// Configured token budget.
    pub budget: usize,
    /// Budget utilization percentage (0.0–100.0).
    pub utilization_pct: f32,
    /// Per-tier statistics.
    pub per_layer: Vec<LayerStats>,
    /// Items dropped from each tier.
    pub drops: Vec<DropInfo>,
    /// Retrieved documents included in human-only form.
    pub human_only_fallbacks: usize,
}

/// Statistics for a single tier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LayerStats {
    pub name: String,
    pub tokens: usize,
    pub items_included: usize,
    pub items_total: usize,
}

/// Items a tier lost to budget enforcement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DropInfo {
    pub layer: String,
    pub items_dropped: usize,
    pub tokens_dropped: usize,
    pub reason: String,
}

// ── Assembler ─────────────────────────────────────────────────────────────

/// Binds a tokenizer, model and budget for repeated assemblies.
pub struct PromptAssembler {
    tokenizer: Arc<dyn Tokenizer>,
    model_id: String,
    budget: usize,
}

impl PromptAssembler {
    pub fn new(tokenizer: Arc<dyn Tokenizer>, model_id: impl Into<String>, budget: usize) -> Self {
        Self {
            tokenizer,
            model_id: model_id.into(),
            budget,
        }
    }

    pub fn from_config(tokenizer: Arc<dyn Tokenizer>, config: &AppConfig) -> Self {
        Self::new(tokenizer, config.model.clone(), config.token_budget)
    }

    pub fn budget(&self) -> usize {
        self.budget
    }

    pub fn model_id(&self) -> &str {
        &self.model_id
    }

    pub fn count_tokens(&self, text: &str) -> usize {
        self.tokenizer.count_tokens(text, &self.model_id)
    }

    pub fn assemble(
        &self,
        buffer: &mut ConversationBuffer,
        retrieved: &[Document],
        user_message: &str,
    ) -> Result<AssembledPrompt, AssemblyError> {
        assemble(
            self.tokenizer.as_ref(),
            buffer,
            retrieved,
            user_message,
            &self.model_id,
            self.budget,
        )
    }
}

/// Assemble the context for one request and trim `buffer` in place.
///
/// # Algorithm
///
/// 1. Count the user message. Over `token_budget` → `MessageTooLong`, and
///    the buffer is left untouched.
/// 2. Walk `retrieved` oldest first. Take the full rendering if it fits the
///    remaining budget, else the human-only rendering if that fits, else
///    stop. Later documents are never tried once one fails to fit.
/// 3. Wrap accepted blocks in the preamble and append the result to the
///    buffer as an assistant entry.
/// 4. Walk the buffer newest first with `token_budget - message` tokens,
///    stop at the first entry that does not fit, and install the surviving
///    suffix oldest first.
pub fn assemble(
    tokenizer: &dyn Tokenizer,
    buffer: &mut ConversationBuffer,
    retrieved: &[Document],
    user_message: &str,
    model_id: &str,
    token_budget: usize,
) -> Result<AssembledPrompt, AssemblyError> {
    let count = |text: &str| tokenizer.count_tokens(text, model_id);
    let mut stats: Vec<LayerStats> = Vec::new();
    let mut drops: Vec<DropInfo> = Vec::new();

    // ── Tier 1: user message ───────────────────────────────────────────────
    let message_tokens = count(user_message);
    if message_tokens > token_budget {
        return Err(AssemblyError::MessageTooLong {
            tokens: message_tokens,
            budget: token_budget,
        });
    }
    let available = token_budget - message_tokens;
    stats.push(LayerStats {
        name: "user_message".into(),
        tokens: message_tokens,
        items_included: 1,
        items_total: 1,
    });

    // ── Tier 2: retrieved history ──────────────────────────────────────────
    let mut ordered: Vec<&Document> = retrieved.iter().collect();
    ordered.sort_by_key(|d| d.timestamp);

    let mut remaining = available;
    let mut accepted: Vec<(String, bool)> = Vec::new();
    for doc in &ordered {
        let full = render_document(doc, true);
        let full_tokens = count(&full);
        if full_tokens <= remaining {
            remaining -= full_tokens;
            accepted.push((full, false));
            continue;
        }

        let fallback = if doc.human.is_empty() || doc.assistant.is_empty() {
            None
        } else {
            let short = render_document(doc, false);
            let short_tokens = count(&short);
            (short_tokens <= remaining).then_some((short, short_tokens))
        };
        match fallback {
            Some((short, short_tokens)) => {
                remaining -= short_tokens;
                accepted.push((short, true));
            }
            None => break,
        }
    }

    // The preamble and separators cost tokens too; shed the newest
    // accepted blocks until the wrapped block fits.
    let history_block = loop {
        if accepted.is_empty() {
            break None;
        }
        let wrapped = wrap_history(accepted.iter().map(|(block, _)| block.as_str()));
        if count(&wrapped) <= available {
            break Some(wrapped);
        }
        accepted.pop();
    };

    let history_tokens = history_block.as_deref().map(count).unwrap_or(0);
    stats.push(LayerStats {
        name: "retrieved_history".into(),
        tokens: history_tokens,
        items_included: accepted.len(),
        items_total: ordered.len(),
    });
    if accepted.len() < ordered.len() {
        let tokens_dropped = ordered[accepted.len()..]
            .iter()
            .map(|doc| count(&render_document(doc, true)))
            .sum();
        drops.push(DropInfo {
            layer: "retrieved_history".into(),
            items_dropped: ordered.len() - accepted.len(),
            tokens_dropped,
            reason: "Budget exhausted; newer documents skipped".into(),
        });
    }
    let human_only_fallbacks = accepted.iter().filter(|(_, short)| *short).count();

    if let Some(block) = &history_block {
        buffer.append(Role::Assistant, block.clone());
    }

    // ── Tier 3: conversation buffer ────────────────────────────────────────
    let mut remaining = available;
    let mut kept = 0usize;
    let mut kept_tokens = 0usize;
    for entry in buffer.newest_first() {
        let tokens = count(&entry.content);
        if tokens > remaining {
            break;
        }
        remaining -= tokens;
        kept += 1;
        kept_tokens += tokens;
    }

    let total_entries = buffer.len();
    let dropped = total_entries - kept;
    if dropped > 0 {
        let tokens_dropped = buffer
            .oldest_first()
            .take(dropped)
            .map(|m| count(&m.content))
            .sum();
        drops.push(DropInfo {
            layer: "conversation_buffer".into(),
            items_dropped: dropped,
            tokens_dropped,
            reason: "Oldest entries dropped".into(),
        });
        let retained = buffer.entries()[dropped..].to_vec();
        buffer.replace(retained);
    }
    stats.push(LayerStats {
        name: "conversation_buffer".into(),
        tokens: kept_tokens,
        items_included: kept,
        items_total: total_entries,
    });

    let total_tokens = message_tokens + kept_tokens;
    let utilization_pct = if token_budget == 0 {
        0.0
    } else {
        (total_tokens as f32 / token_budget as f32) * 100.0
    };

    tracing::debug!(
        model = model_id,
        budget = token_budget,
        total_tokens,
        history_docs = accepted.len(),
        retained_entries = kept,
        dropped_entries = dropped,
        "Assembled prompt"
    );

    Ok(AssembledPrompt {
        user_message: user_message.to_string(),
        history_block,
        metadata: AssemblyMetadata {
            total_tokens,
            budget: token_budget,
            utilization_pct,
            per_layer: stats,
            drops,
            human_only_fallbacks,
        },
    })
}

/// Render one retrieved document as a timestamped block.
fn render_document(doc: &Document, include_assistant: bool) -> String {
    let mut block = format!("[{}]", doc.timestamp.format(HISTORY_TIMESTAMP_FORMAT));
    if !doc.human.is_empty() {
        block.push_str("\nHuman: ");
        block.push_str(&doc.human);
    }
    if include_assistant && !doc.assistant.is_empty() {
        block.push_str("\nAssistant: ");
        block.push_str(&doc.assistant);
    }
    block
}

fn wrap_history<'a>(blocks: impl Iterator<Item = &'a str>) -> String {
    let body: Vec<&str> = blocks.collect();
    format!("{HISTORY_PREAMBLE}\n\n{}", body.join("\n\n"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{WordTokenizer, words};
    use chrono::{TimeZone, Utc};
    use flint_core::{Message, UserId};

    const MODEL: &str = "test-model";

    fn doc(hour: u32, human: &str, assistant: &str) -> Document {
        Document::new(UserId::from("alice"), human, assistant)
            .with_timestamp(Utc.with_ymd_and_hms(2024, 5, 1, hour, 0, 0).unwrap())
    }

    fn buffer_of(entries: &[(Role, String)]) -> ConversationBuffer {
        let mut buffer = ConversationBuffer::new();
        for (role, text) in entries {
            buffer.append(*role, text.clone());
        }
        buffer
    }

    fn run(
        buffer: &mut ConversationBuffer,
        retrieved: &[Document],
        message: &str,
        budget: usize,
    ) -> Result<AssembledPrompt, AssemblyError> {
        assemble(&WordTokenizer, buffer, retrieved, message, MODEL, budget)
    }

    fn total(buffer: &ConversationBuffer, message: &str) -> usize {
        WordTokenizer.count_tokens(message, MODEL)
            + buffer
                .entries()
                .iter()
                .map(|m| WordTokenizer.count_tokens(&m.content, MODEL))
                .sum::<usize>()
    }

    #[test]
    fn history_competes_with_buffer_newest_first() {
        // Full rendering: 2 timestamp words + "Human:" + 25 + "Assistant:" + 25 = 54.
        // Wrapped with the 6-word preamble: 60.
        let retrieved = vec![doc(9, &words("q", 25), &words("r", 25))];
        let mut buffer = buffer_of(&[
            (Role::Human, words("a", 20)),
            (Role::Assistant, words("b", 20)),
            (Role::Human, words("c", 20)),
        ]);
        let message = words("m", 10);

        let prompt = run(&mut buffer, &retrieved, &message, 100).unwrap();

        let block = prompt.history_block.clone().unwrap();
        assert_eq!(WordTokenizer.count_tokens(&block, MODEL), 60);
        assert!(block.starts_with(HISTORY_PREAMBLE));
        assert!(block.contains("[2024-05-01 09:00]"));

        // 90 available: history (60) + C (20) fit; B (20) does not.
        let retained: Vec<&Message> = buffer.entries().iter().collect();
        assert_eq!(retained.len(), 2);
        assert_eq!(retained[0].content, words("c", 20));
        assert_eq!(retained[1].role, Role::Assistant);
        assert_eq!(retained[1].content, block);

        assert_eq!(prompt.metadata.total_tokens, 90);
        assert!(total(&buffer, &message) <= 100);
        let buffer_drop = prompt
            .metadata
            .drops
            .iter()
            .find(|d| d.layer == "conversation_buffer")
            .unwrap();
        assert_eq!(buffer_drop.items_dropped, 2);
        assert_eq!(buffer_drop.tokens_dropped, 40);
    }

    #[test]
    fn message_over_budget_has_no_side_effects() {
        let mut buffer = buffer_of(&[(Role::Human, words("a", 5))]);
        let before = buffer.clone();
        let retrieved = vec![doc(9, "hello", "there")];

        let err = run(&mut buffer, &retrieved, &words("m", 150), 100).unwrap_err();
        assert_eq!(
            err,
            AssemblyError::MessageTooLong {
                tokens: 150,
                budget: 100
            }
        );
        assert_eq!(buffer, before);
    }

    #[test]
    fn message_exactly_at_budget_is_accepted() {
        let mut buffer = buffer_of(&[(Role::Human, words("a", 5))]);
        let retrieved = vec![doc(9, "hello", "there")];

        let prompt = run(&mut buffer, &retrieved, &words("m", 100), 100).unwrap();
        assert!(prompt.history_block.is_none());
        assert!(buffer.is_empty());
        assert_eq!(prompt.metadata.total_tokens, 100);
    }

    #[test]
    fn human_only_fallback_when_full_form_too_big() {
        // remaining = 35; full = 2 + 1 + 5 + 1 + 40 = 49; human-only = 8.
        let retrieved = vec![doc(9, &words("q", 5), &words("r", 40))];
        let mut buffer = ConversationBuffer::new();

        let prompt = run(&mut buffer, &retrieved, &words("m", 5), 40).unwrap();
        let block = prompt.history_block.unwrap();
        assert!(block.contains("Human: q0"));
        assert!(!block.contains("Assistant:"));
        assert_eq!(prompt.metadata.human_only_fallbacks, 1);
        assert_eq!(buffer.len(), 1);
    }

    #[test]
    fn stops_at_first_document_that_does_not_fit() {
        let retrieved = vec![
            // Newer and tiny, but comes after the blocker.
            doc(11, "hi", "yo"),
            // Oldest; neither form fits in 35 tokens.
            doc(8, &words("q", 40), &words("r", 40)),
        ];
        let mut buffer = ConversationBuffer::new();

        let prompt = run(&mut buffer, &retrieved, &words("m", 5), 40).unwrap();
        assert!(prompt.history_block.is_none());
        assert!(buffer.is_empty());
        let drop = &prompt.metadata.drops[0];
        assert_eq!(drop.layer, "retrieved_history");
        assert_eq!(drop.items_dropped, 2);
    }

    #[test]
    fn blocks_rendered_oldest_first() {
        let retrieved = vec![doc(12, "later", "b"), doc(7, "earlier", "a")];
        let mut buffer = ConversationBuffer::new();

        let prompt = run(&mut buffer, &retrieved, "hi", 200).unwrap();
        let block = prompt.history_block.unwrap();
        let earlier = block.find("earlier").unwrap();
        let later = block.find("later").unwrap();
        assert!(earlier < later);
        assert!(block.contains("[2024-05-01 07:00]\nHuman: earlier\nAssistant: a\n\n[2024-05-01 12:00]"));
    }

    #[test]
    fn preamble_cost_sheds_newest_block() {
        // Each full block is 6 tokens; the wrapped form adds the 6-token preamble.
        let retrieved = vec![doc(7, "x", "y"), doc(8, "x", "y")];

        let mut buffer = ConversationBuffer::new();
        let prompt = run(&mut buffer, &retrieved, "m", 19).unwrap();
        assert_eq!(prompt.history_block.unwrap().matches("Human:").count(), 2);

        // 13 available: both blocks fit (12) but the wrapped form (18) does not.
        let mut buffer = ConversationBuffer::new();
        let prompt = run(&mut buffer, &retrieved, "m", 14).unwrap();
        assert_eq!(prompt.history_block.unwrap().matches("Human:").count(), 1);

        // 11 available: even one wrapped block (12) is too big.
        let mut buffer = ConversationBuffer::new();
        let prompt = run(&mut buffer, &retrieved, "m", 12).unwrap();
        assert!(prompt.history_block.is_none());
        assert!(buffer.is_empty());
    }

    #[test]
    fn empty_inputs_are_valid() {
        let mut buffer = ConversationBuffer::new();
        let prompt = run(&mut buffer, &[], "hello", 10).unwrap();
        assert!(prompt.history_block.is_none());
        assert!(buffer.is_empty());
        assert_eq!(prompt.user_message, "hello");
        assert!(prompt.metadata.drops.is_empty());
    }

    #[test]
    fn never_exceeds_budget() {
        let retrieved = vec![
            doc(6, &words("a", 7), &words("b", 9)),
            doc(7, &words("c", 3), &words("d", 30)),
            doc(8, &words("e", 12), &words("f", 2)),
        ];
        let history: Vec<(Role, String)> = (0..12)
            .map(|i| {
                let role = if i % 2 == 0 { Role::Human } else { Role::Assistant };
                (role, words("w", 3 + (i * 5) % 11))
            })
            .collect();

        for budget in (4..120).step_by(3) {
            let mut buffer = buffer_of(&history);
            let message = words("m", 4);
            let prompt = run(&mut buffer, &retrieved, &message, budget).unwrap();
            assert!(total(&buffer, &message) <= budget, "budget {budget}");
            assert_eq!(prompt.metadata.total_tokens, total(&buffer, &message));
        }
    }

    #[test]
    fn retained_window_is_a_suffix() {
        let history: Vec<(Role, String)> = (0..6)
            .map(|i| (Role::Human, format!("{} {}", i, words("x", 4))))
            .collect();
        let mut buffer = buffer_of(&history);

        run(&mut buffer, &[], "m", 16).unwrap();
        let firsts: Vec<&str> = buffer
            .entries()
            .iter()
            .map(|m| m.content.split(' ').next().unwrap())
            .collect();
        assert_eq!(firsts, vec!["3", "4", "5"]);
    }

    #[test]
    fn deterministic_for_identical_inputs() {
        let retrieved = vec![doc(9, "alpha", "beta"), doc(10, "gamma", "delta")];
        let history = vec![(Role::Human, words("h", 6)), (Role::Assistant, words("a", 6))];

        let mut first = buffer_of(&history);
        let mut second = buffer_of(&history);
        let a = run(&mut first, &retrieved, "query", 30).unwrap();
        let b = run(&mut second, &retrieved, "query", 30).unwrap();

        assert_eq!(a.history_block, b.history_block);
        assert_eq!(first, second);
    }

    #[test]
    fn assembler_binds_model_and_budget() {
        let assembler = PromptAssembler::new(Arc::new(WordTokenizer), MODEL, 50);
        assert_eq!(assembler.budget(), 50);
        assert_eq!(assembler.count_tokens("two words"), 2);

        let mut buffer = ConversationBuffer::new();
        let err = assembler
            .assemble(&mut buffer, &[], &words("m", 51))
            .unwrap_err();
        assert!(matches!(err, AssemblyError::MessageTooLong { tokens: 51, .. }));
    }
}
