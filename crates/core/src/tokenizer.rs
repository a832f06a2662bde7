//! Tokenizer adapter trait.

/// Counts tokens in a string for a given model identifier.
///
/// Implementations must be pure: the same `(text, model_id)` always yields
/// the same count. Budget arithmetic throughout the engine relies on it.
pub trait Tokenizer: Send + Sync {
    fn count_tokens(&self, text: &str, model_id: &str) -> usize;
}
