// SPDX-License-Identifier: MIT OR Apache-2.0

//! GPT-2 multi-head attention with fused QKV and pattern capture.
//!
//! GPT-2 projects Q, K, V through a single fused `c_attn` layer and uses
//! plain multi-head attention with no grouped-query variants and no rotary
//! embeddings; positions are handled by the learned embedding table.

use candle_core::{D, Module, Tensor};
use candle_nn::{Linear, VarBuilder};

use crate::config::Gpt2Config;
use crate::error::Result;

use super::load_conv1d;

/// Multi-head attention layer with attention-pattern capture.
pub struct Attention {
    /// Fused QKV projection (`c_attn`), `[hidden, 3 * hidden]` in HF layout.
    c_attn: Linear,
    /// Output projection (`c_proj`).
    c_proj: Linear,
    /// Number of attention heads.
    num_heads: usize,
    /// Dimension per head.
    head_dim: usize,
    /// Attention scale factor: `1/sqrt(head_dim)`.
    scale: f64,
}

impl Attention {
    /// Load attention weights from a [`VarBuilder`].
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Model`](crate::ServiceError::Model) if
    /// weight loading fails.
    #[allow(clippy::needless_pass_by_value)] // VarBuilder is candle's pass-by-value convention
    pub fn load(config: &Gpt2Config, vb: VarBuilder<'_>) -> Result<Self> {
        let hidden = config.hidden_size;
        let c_attn = load_conv1d(hidden, 3 * hidden, vb.pp("c_attn"))?;
        let c_proj = load_conv1d(hidden, hidden, vb.pp("c_proj"))?;

        #[allow(clippy::cast_precision_loss, clippy::as_conversions)]
        let scale = 1.0 / (config.head_dim as f64).sqrt();

        Ok(Self {
            c_attn,
            c_proj,
            num_heads: config.num_heads,
            head_dim: config.head_dim,
            scale,
        })
    }

    /// Run the attention forward pass, optionally capturing the
    /// post-softmax pattern.
    ///
    /// # Shapes
    /// - `x`: `[batch, seq, hidden_size]`
    /// - `mask`: `[1, 1, seq, seq]` causal mask
    /// - captured pattern: `[batch, heads, seq, seq]`
    /// - returns: `[batch, seq, hidden_size]`
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Model`](crate::ServiceError::Model) on
    /// tensor operation failures.
    pub fn forward(
        &self,
        x: &Tensor,
        mask: &Tensor,
        capture: bool,
        attentions: &mut Vec<Tensor>,
    ) -> Result<Tensor> {
        let (batch, seq_len, _hidden) = x.dims3()?;
        let proj_dim = self.num_heads * self.head_dim;

        // --- Fused QKV projection, split via narrow ---
        let qkv = self.c_attn.forward(x)?;
        let q = qkv.narrow(D::Minus1, 0, proj_dim)?;
        let k = qkv.narrow(D::Minus1, proj_dim, proj_dim)?;
        let v = qkv.narrow(D::Minus1, 2 * proj_dim, proj_dim)?;

        // Reshape to [batch, seq, heads, head_dim] then transpose to
        // [batch, heads, seq, head_dim]
        let q = q
            .reshape((batch, seq_len, self.num_heads, self.head_dim))?
            .transpose(1, 2)?;
        let k = k
            .reshape((batch, seq_len, self.num_heads, self.head_dim))?
            .transpose(1, 2)?;
        let v = v
            .reshape((batch, seq_len, self.num_heads, self.head_dim))?
            .transpose(1, 2)?;

        // --- Attention scores ---
        // matmul needs contiguous inputs after the head transpose
        let k_t = k.contiguous()?.transpose(2, 3)?;
        let q = q.contiguous()?;

        let mut scores = q.matmul(&k_t)?;
        scores = (scores * self.scale)?;
        scores = scores.broadcast_add(mask)?;

        // Softmax rows are each normalized to sum to 1; these are the
        // per-head attention distributions the service averages.
        let pattern = candle_nn::ops::softmax_last_dim(&scores)?;

        if capture {
            attentions.push(pattern.clone());
        }

        // --- Attention output ---
        let v = v.contiguous()?;
        let attn_output = pattern.matmul(&v)?;

        // Reshape back to [batch, seq, heads * head_dim]
        let attn_output = attn_output
            .transpose(1, 2)?
            .contiguous()?
            .reshape((batch, seq_len, proj_dim))?;

        // Output projection
        Ok(self.c_proj.forward(&attn_output)?)
    }
}
