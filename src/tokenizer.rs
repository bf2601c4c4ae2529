// SPDX-License-Identifier: MIT OR Apache-2.0

//! Tokenizer abstraction over the `HuggingFace` `tokenizers` crate.
//!
//! [`Tokenize`] is the seam where tests substitute a fake tokenizer;
//! [`HfTokenizer`] is the production implementation, loading the exact
//! `tokenizer.json` shipped with the model weights. Attention weights are
//! meaningless under a mismatched vocabulary, so there is deliberately no
//! way to pair weights from one repo with a tokenizer from another.

use crate::error::{Result, ServiceError};

/// Text encoded into model inputs: token IDs plus the matching
/// human-readable token strings, in order.
#[derive(Debug, Clone)]
pub struct TokenizedText {
    /// Token IDs, ready to become the model's input tensor.
    pub ids: Vec<u32>,
    /// Token strings as the vocabulary spells them (for GPT-2's
    /// byte-level BPE this includes markers like `Ġ` for a leading space).
    /// `tokens[i]` corresponds to `ids[i]`.
    pub tokens: Vec<String>,
}

/// Encode text into token IDs and token strings.
pub trait Tokenize: Send + Sync {
    /// Encode `text`, preserving token order.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Tokenizer`] if encoding fails.
    fn encode(&self, text: &str) -> Result<TokenizedText>;
}

/// `HuggingFace` `tokenizers` backend.
pub struct HfTokenizer {
    /// The wrapped tokenizer.
    inner: Box<tokenizers::Tokenizer>,
}

impl HfTokenizer {
    /// Load a tokenizer from a `tokenizer.json` file.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Tokenizer`] if the file cannot be loaded
    /// or parsed.
    pub fn from_file(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let inner = tokenizers::Tokenizer::from_file(path.as_ref()).map_err(|e| {
            ServiceError::Tokenizer(format!(
                "failed to load tokenizer from {}: {e}",
                path.as_ref().display()
            ))
        })?;
        Ok(Self {
            inner: Box::new(inner),
        })
    }

    /// Download `tokenizer.json` from a `HuggingFace` model repo (or find
    /// it in the local cache) and load it.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Download`] if retrieval fails or
    /// [`ServiceError::Tokenizer`] if the file cannot be parsed.
    pub fn from_pretrained(model_id: &str) -> Result<Self> {
        let api = hf_hub::api::sync::Api::new()
            .map_err(|e| ServiceError::Download(format!("HF Hub API: {e}")))?;
        let path = api
            .model(model_id.to_owned())
            .get("tokenizer.json")
            .map_err(|e| ServiceError::Download(format!("tokenizer.json: {e}")))?;
        Self::from_file(path)
    }

    /// Vocabulary size, including added special tokens.
    #[must_use]
    pub fn vocab_size(&self) -> usize {
        self.inner.get_vocab_size(true)
    }
}

impl Tokenize for HfTokenizer {
    fn encode(&self, text: &str) -> Result<TokenizedText> {
        // Special tokens per the tokenizer's configured post-processor,
        // matching the HuggingFace convention for inference (a no-op for
        // GPT-2, which adds none).
        let encoding = self
            .inner
            .encode(text, true)
            .map_err(|e| ServiceError::Tokenizer(format!("encode failed: {e}")))?;
        Ok(TokenizedText {
            ids: encoding.get_ids().to_vec(),
            tokens: encoding.get_tokens().to_vec(),
        })
    }
}

impl std::fmt::Debug for HfTokenizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HfTokenizer")
            .field("vocab_size", &self.vocab_size())
            .finish()
    }
}
