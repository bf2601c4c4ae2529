// SPDX-License-Identifier: MIT OR Apache-2.0

//! The attention inspection pipeline.
//!
//! [`AttentionService`] owns the loaded model and tokenizer for the
//! process lifetime and turns one text into one token list plus one
//! averaged attention matrix. It is a pure request/response transform:
//! no state survives a call.

use candle_core::Tensor;

use crate::average;
use crate::backend::InspectionModel;
use crate::error::{Result, ServiceError};
use crate::tokenizer::Tokenize;

/// Tokens and their layer/head-averaged attention matrix.
///
/// `tokens[i]` corresponds to row and column `i` of `attention`; the
/// matrix is square with dimension `tokens.len()`.
#[derive(Debug, Clone)]
pub struct AttentionAnalysis {
    /// Token strings, in input order.
    pub tokens: Vec<String>,
    /// Averaged attention weights, each in `[0, 1]`.
    pub attention: Vec<Vec<f32>>,
}

/// Stateless (per-request) attention inspection over a persistently
/// loaded model and tokenizer.
pub struct AttentionService {
    /// The loaded model, read-only after construction.
    model: InspectionModel,
    /// The model's exact tokenizer.
    tokenizer: Box<dyn Tokenize>,
}

impl AttentionService {
    /// Combine a loaded model with its tokenizer.
    #[must_use]
    pub fn new(model: InspectionModel, tokenizer: Box<dyn Tokenize>) -> Self {
        Self { model, tokenizer }
    }

    /// Access the underlying model (for health/metadata reporting).
    #[must_use]
    pub const fn model(&self) -> &InspectionModel {
        &self.model
    }

    /// Tokenize `text`, run a forward pass with attention capture, and
    /// average the patterns over all layers and heads.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::BadRequest`] for empty input or input
    /// longer than the model's position table, [`ServiceError::Tokenizer`]
    /// if encoding fails, and [`ServiceError::Model`] on forward-pass
    /// failures.
    pub fn get_attention(&self, text: &str) -> Result<AttentionAnalysis> {
        if text.is_empty() {
            return Err(ServiceError::BadRequest("'text' must not be empty".into()));
        }
        tracing::info!(text, "received attention request");

        // --- Tokenize ---
        let encoded = self.tokenizer.encode(text)?;
        tracing::debug!(ids = ?encoded.ids, tokens = ?encoded.tokens, "tokenized input");

        if encoded.ids.is_empty() {
            return Err(ServiceError::BadRequest(
                "'text' produced no tokens".into(),
            ));
        }
        let max = self.model.max_positions();
        if encoded.ids.len() > max {
            return Err(ServiceError::BadRequest(format!(
                "input is {} tokens; the model supports at most {max}",
                encoded.ids.len()
            )));
        }

        // --- Forward pass with attention capture ---
        let input = Tensor::new(&encoded.ids[..], self.model.device())?.unsqueeze(0)?;
        let trace = self.model.forward(&input, true)?;

        // --- Average over layers and heads ---
        let matrix = average::average_attention(trace.attentions())?;
        let attention = average::to_rows(&matrix)?;

        tracing::debug!(
            rows = attention.len(),
            cols = attention.first().map_or(0, Vec::len),
            "averaged attention shape",
        );
        if let Some(first_row) = attention.first() {
            let sample: Vec<f32> = first_row.iter().copied().take(5).collect();
            tracing::debug!(?sample, "sample attention values");
        }

        Ok(AttentionAnalysis {
            tokens: encoded.tokens,
            attention,
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use candle_core::{DType, Device};

    use crate::backend::{AttentionBackend, ForwardTrace};
    use crate::tokenizer::TokenizedText;

    use super::*;

    /// Backend producing uniform row-normalized attention for every layer.
    struct UniformBackend {
        layers: usize,
        heads: usize,
        max_positions: usize,
    }

    impl AttentionBackend for UniformBackend {
        fn num_layers(&self) -> usize {
            self.layers
        }
        fn num_heads(&self) -> usize {
            self.heads
        }
        fn hidden_size(&self) -> usize {
            8
        }
        fn vocab_size(&self) -> usize {
            64
        }
        fn max_positions(&self) -> usize {
            self.max_positions
        }

        fn forward(&self, input_ids: &Tensor, capture_attentions: bool) -> Result<ForwardTrace> {
            let (batch, seq) = input_ids.dims2()?;
            let device = input_ids.device();
            let hidden = Tensor::zeros((batch, seq, 8), DType::F32, device)?;

            let mut attentions = Vec::new();
            if capture_attentions {
                #[allow(clippy::cast_precision_loss, clippy::as_conversions)]
                let uniform = 1.0_f32 / seq as f32;
                for _ in 0..self.layers {
                    attentions.push(Tensor::full(uniform, (batch, self.heads, seq, seq), device)?);
                }
            }
            Ok(ForwardTrace::new(hidden, attentions))
        }
    }

    /// Whitespace tokenizer: one token per word, IDs by position.
    struct WhitespaceTokenizer;

    impl Tokenize for WhitespaceTokenizer {
        fn encode(&self, text: &str) -> Result<TokenizedText> {
            let tokens: Vec<String> = text.split_whitespace().map(str::to_owned).collect();
            #[allow(clippy::cast_possible_truncation, clippy::as_conversions)]
            let ids: Vec<u32> = (0..tokens.len() as u32).collect();
            Ok(TokenizedText { ids, tokens })
        }
    }

    fn fake_service(max_positions: usize) -> AttentionService {
        let model = InspectionModel::new(
            Box::new(UniformBackend {
                layers: 3,
                heads: 4,
                max_positions,
            }),
            Device::Cpu,
            "fake-model".into(),
        );
        AttentionService::new(model, Box::new(WhitespaceTokenizer))
    }

    #[test]
    fn token_count_equals_matrix_dimension() {
        let service = fake_service(64);
        let analysis = service.get_attention("hello brave new world").unwrap();

        assert_eq!(analysis.tokens.len(), 4);
        assert_eq!(analysis.attention.len(), 4);
        for row in &analysis.attention {
            assert_eq!(row.len(), 4);
        }
    }

    #[test]
    fn values_stay_in_unit_interval() {
        let service = fake_service(64);
        let analysis = service.get_attention("one two three").unwrap();
        for row in &analysis.attention {
            for &val in row {
                assert!((0.0..=1.0).contains(&val));
            }
        }
    }

    #[test]
    fn repeated_calls_are_identical() {
        let service = fake_service(64);
        let first = service.get_attention("same input text").unwrap();
        let second = service.get_attention("same input text").unwrap();
        assert_eq!(first.tokens, second.tokens);
        assert_eq!(first.attention, second.attention);
    }

    #[test]
    fn empty_text_is_rejected() {
        let service = fake_service(64);
        match service.get_attention("") {
            Err(ServiceError::BadRequest(msg)) => assert!(msg.contains("empty")),
            other => panic!("expected BadRequest, got {other:?}"),
        }
    }

    #[test]
    fn whitespace_only_text_is_rejected() {
        // Tokenizes to zero tokens.
        let service = fake_service(64);
        assert!(matches!(
            service.get_attention("   "),
            Err(ServiceError::BadRequest(_))
        ));
    }

    #[test]
    fn over_length_input_is_rejected() {
        let service = fake_service(3);
        match service.get_attention("one two three four five") {
            Err(ServiceError::BadRequest(msg)) => assert!(msg.contains("at most 3")),
            other => panic!("expected BadRequest, got {other:?}"),
        }
    }

    #[test]
    fn single_token_yields_one_by_one_matrix() {
        let service = fake_service(64);
        let analysis = service.get_attention("hello").unwrap();
        assert_eq!(analysis.tokens, vec!["hello".to_owned()]);
        assert_eq!(analysis.attention, vec![vec![1.0]]);
    }
}
