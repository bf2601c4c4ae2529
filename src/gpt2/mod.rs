// SPDX-License-Identifier: MIT OR Apache-2.0

//! GPT-2 family forward pass with attention capture.
//!
//! Covers `gpt2`, `distilgpt2`, and the larger GPT-2 checkpoints,
//! parameterized by [`Gpt2Config`](crate::config::Gpt2Config). The pass
//! stops at the final `ln_f` hidden states; this service never projects to
//! vocabulary logits, so no LM head is loaded.

pub(crate) mod attention;
pub(crate) mod mlp;

use candle_core::{DType, Module, Tensor};
use candle_nn::{Embedding, LayerNorm, Linear, VarBuilder};

use crate::backend::{AttentionBackend, ForwardTrace};
use crate::config::Gpt2Config;
use crate::error::Result;
use crate::util::masks;

use self::attention::Attention;
use self::mlp::Mlp;

// ---------------------------------------------------------------------------
// Gpt2Block
// ---------------------------------------------------------------------------

/// A single GPT-2 decoder block (pre-LN).
struct Gpt2Block {
    /// Pre-attention layer norm (`ln_1`).
    ln_1: LayerNorm,
    /// Self-attention block.
    attn: Attention,
    /// Pre-MLP layer norm (`ln_2`).
    ln_2: LayerNorm,
    /// MLP block.
    mlp: Mlp,
}

impl Gpt2Block {
    /// Load a single decoder block from weights.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Model`](crate::ServiceError::Model) if
    /// weight loading fails.
    #[allow(clippy::needless_pass_by_value)] // VarBuilder is candle's pass-by-value convention
    fn load(config: &Gpt2Config, vb: VarBuilder<'_>) -> Result<Self> {
        let ln_1 = candle_nn::layer_norm(config.hidden_size, config.layer_norm_eps, vb.pp("ln_1"))?;
        let attn = Attention::load(config, vb.pp("attn"))?;
        let ln_2 = candle_nn::layer_norm(config.hidden_size, config.layer_norm_eps, vb.pp("ln_2"))?;
        let mlp = Mlp::load(config, vb.pp("mlp"))?;

        Ok(Self {
            ln_1,
            attn,
            ln_2,
            mlp,
        })
    }
}

// ---------------------------------------------------------------------------
// Gpt2Model
// ---------------------------------------------------------------------------

/// GPT-2 family backend: token + learned position embeddings, pre-LN
/// decoder blocks, final layer norm.
pub struct Gpt2Model {
    /// Token embedding matrix (`wte`).
    wte: Embedding,
    /// Learned position embedding matrix (`wpe`).
    wpe: Embedding,
    /// Decoder blocks (`h.{i}`).
    blocks: Vec<Gpt2Block>,
    /// Final layer norm (`ln_f`).
    ln_f: LayerNorm,
    /// Model configuration.
    config: Gpt2Config,
}

impl Gpt2Model {
    /// Load a GPT-2 model from a [`VarBuilder`].
    ///
    /// Handles both weight layouts found on the Hub: tensors at the root
    /// (`wte.weight`, original OpenAI conversion) and tensors under a
    /// `transformer.` prefix (checkpoints saved from `GPT2LMHeadModel`).
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Model`](crate::ServiceError::Model) if
    /// weight loading fails or dimensions are inconsistent.
    #[allow(clippy::needless_pass_by_value)] // VarBuilder is candle's pass-by-value convention
    pub fn load(config: &Gpt2Config, vb: VarBuilder<'_>) -> Result<Self> {
        let vb_model = if vb.contains_tensor("wte.weight") {
            vb
        } else {
            vb.pp("transformer")
        };

        // --- Embeddings ---
        let wte = candle_nn::embedding(config.vocab_size, config.hidden_size, vb_model.pp("wte"))?;
        let wpe = candle_nn::embedding(
            config.max_position_embeddings,
            config.hidden_size,
            vb_model.pp("wpe"),
        )?;

        // --- Blocks ---
        let mut blocks = Vec::with_capacity(config.num_layers);
        for i in 0..config.num_layers {
            let block = Gpt2Block::load(config, vb_model.pp(format!("h.{i}")))?;
            blocks.push(block);
        }

        // --- Final norm ---
        let ln_f =
            candle_nn::layer_norm(config.hidden_size, config.layer_norm_eps, vb_model.pp("ln_f"))?;

        Ok(Self {
            wte,
            wpe,
            blocks,
            ln_f,
            config: config.clone(),
        })
    }

    /// Access the model configuration.
    #[must_use]
    pub const fn config(&self) -> &Gpt2Config {
        &self.config
    }
}

// ---------------------------------------------------------------------------
// AttentionBackend implementation
// ---------------------------------------------------------------------------

impl AttentionBackend for Gpt2Model {
    fn num_layers(&self) -> usize {
        self.config.num_layers
    }

    fn num_heads(&self) -> usize {
        self.config.num_heads
    }

    fn hidden_size(&self) -> usize {
        self.config.hidden_size
    }

    fn vocab_size(&self) -> usize {
        self.config.vocab_size
    }

    fn max_positions(&self) -> usize {
        self.config.max_position_embeddings
    }

    fn forward(&self, input_ids: &Tensor, capture_attentions: bool) -> Result<ForwardTrace> {
        let device = input_ids.device();
        let (_batch, seq_len) = input_ids.dims2()?;

        // --- Embeddings: token + learned position ---
        let tok_emb = self.wte.forward(input_ids)?;
        #[allow(clippy::cast_possible_truncation, clippy::as_conversions)]
        // seq_len is bounded by max_position_embeddings, far below u32::MAX
        let positions = Tensor::arange(0u32, seq_len as u32, device)?;
        let pos_emb = self.wpe.forward(&positions)?;
        let mut hidden = tok_emb.broadcast_add(&pos_emb)?;

        // Causal mask is shared by every layer (GPT-2 has no sliding window).
        let mask = masks::create_causal_mask(seq_len, device, DType::F32)?;

        let mut attentions = if capture_attentions {
            Vec::with_capacity(self.config.num_layers)
        } else {
            Vec::new()
        };

        // --- Block loop ---
        for block in &self.blocks {
            let residual = hidden.clone();
            hidden = block.ln_1.forward(&hidden)?;
            hidden = block
                .attn
                .forward(&hidden, &mask, capture_attentions, &mut attentions)?;
            hidden = (residual + &hidden)?;

            let residual = hidden.clone();
            hidden = block.ln_2.forward(&hidden)?;
            hidden = block.mlp.forward(&hidden)?;
            hidden = (residual + &hidden)?;
        }

        // --- Final norm ---
        hidden = self.ln_f.forward(&hidden)?;

        Ok(ForwardTrace::new(hidden, attentions))
    }
}

// ---------------------------------------------------------------------------
// Weight helpers
// ---------------------------------------------------------------------------

/// Load an HF `Conv1D` weight as a [`Linear`] layer.
///
/// GPT-2 checkpoints store projection weights in `Conv1D` layout
/// `[in_dim, out_dim]`; candle's `Linear` expects `[out_dim, in_dim]`,
/// so the weight is transposed once at load time.
#[allow(clippy::needless_pass_by_value)] // VarBuilder convention
pub(crate) fn load_conv1d(in_dim: usize, out_dim: usize, vb: VarBuilder<'_>) -> Result<Linear> {
    let weight = vb.get((in_dim, out_dim), "weight")?.t()?.contiguous()?;
    let bias = vb.get(out_dim, "bias")?;
    Ok(Linear::new(weight, Some(bias)))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
