// SPDX-License-Identifier: MIT OR Apache-2.0

//! GPT-2 MLP: plain (non-gated) feed-forward with GELU.

use candle_core::{Module, Tensor};
use candle_nn::{Linear, VarBuilder};

use crate::config::Gpt2Config;
use crate::error::Result;

use super::load_conv1d;

/// Plain GELU MLP: `c_proj(gelu(c_fc(x)))`.
pub struct Mlp {
    /// First projection (`c_fc`): `[hidden_size, intermediate_size]`.
    c_fc: Linear,
    /// Second projection (`c_proj`): `[intermediate_size, hidden_size]`.
    c_proj: Linear,
}

impl Mlp {
    /// Load MLP weights from a [`VarBuilder`].
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Model`](crate::ServiceError::Model) if
    /// weight loading fails.
    #[allow(clippy::needless_pass_by_value)] // VarBuilder is candle's pass-by-value convention
    pub fn load(config: &Gpt2Config, vb: VarBuilder<'_>) -> Result<Self> {
        let c_fc = load_conv1d(config.hidden_size, config.intermediate_size, vb.pp("c_fc"))?;
        let c_proj = load_conv1d(config.intermediate_size, config.hidden_size, vb.pp("c_proj"))?;
        Ok(Self { c_fc, c_proj })
    }

    /// Run the MLP forward pass.
    ///
    /// GPT-2 uses the tanh-approximated GELU (`gelu_new` in the HF config),
    /// which is candle's default `gelu`.
    ///
    /// # Shapes
    /// - `x`: `[batch, seq, hidden_size]`
    /// - returns: `[batch, seq, hidden_size]`
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Model`](crate::ServiceError::Model) on
    /// tensor operation failures.
    pub fn forward(&self, x: &Tensor) -> Result<Tensor> {
        let hidden = self.c_fc.forward(x)?.gelu()?;
        Ok(self.c_proj.forward(&hidden)?)
    }
}
