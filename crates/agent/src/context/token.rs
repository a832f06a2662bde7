//! Token counting.
//!
//! [`ModelTokenizer`] counts real BPE tokens with `tiktoken-rs`, choosing the
//! vocabulary from the model identifier. Models tiktoken does not know are
//! counted with `cl100k_base`. Encoders are loaded once per model and cached.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use flint_core::{Error, Tokenizer};
use tiktoken_rs::CoreBPE;
use tracing::debug;

/// BPE [`Tokenizer`] keyed on the model identifier.
pub struct ModelTokenizer {
    fallback: Arc<CoreBPE>,
    encoders: RwLock<HashMap<String, Arc<CoreBPE>>>,
}

impl ModelTokenizer {
    /// Load the `cl100k_base` fallback vocabulary.
    pub fn new() -> Result<Self, Error> {
        let fallback = tiktoken_rs::cl100k_base()
            .map_err(|e| Error::Internal(format!("cl100k_base vocabulary unavailable: {e}")))?;
        Ok(Self {
            fallback: Arc::new(fallback),
            encoders: RwLock::new(HashMap::new()),
        })
    }

    fn encoder_for(&self, model_id: &str) -> Arc<CoreBPE> {
        // Provider-qualified ids such as "openai/gpt-4o" name the same model.
        let model = model_id.rsplit('/').next().unwrap_or(model_id);

        if let Some(bpe) = self
            .encoders
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(model)
        {
            return bpe.clone();
        }

        let bpe = match tiktoken_rs::get_bpe_from_model(model) {
            Ok(bpe) => Arc::new(bpe),
            Err(_) => {
                debug!(model, "No tiktoken vocabulary for model, using cl100k_base");
                self.fallback.clone()
            }
        };
        self.encoders
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .entry(model.to_string())
            .or_insert(bpe)
            .clone()
    }
}

impl std::fmt::Debug for ModelTokenizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let cached = self.encoders.read().map(|m| m.len()).unwrap_or(0);
        f.debug_struct("ModelTokenizer")
            .field("cached_models", &cached)
            .finish()
    }
}

impl Tokenizer for ModelTokenizer {
    fn count_tokens(&self, text: &str, model_id: &str) -> usize {
        if text.is_empty() {
            return 0;
        }
        self.encoder_for(model_id)
            .encode_with_special_tokens(text)
            .len()
    }
}

/// Quick model-agnostic estimate: 1 token ≈ 4 bytes, rounded up.
///
/// Used for log fields and diagnostics, never for budget decisions.
pub fn estimate_tokens(text: &str) -> usize {
    if text.is_empty() {
        return 0;
    }
    text.len().div_ceil(4)
}
