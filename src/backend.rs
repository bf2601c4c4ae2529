// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core backend trait and model wrapper.
//!
//! [`AttentionBackend`] is the trait a model implements to participate in
//! attention inspection. [`InspectionModel`] wraps a backend with device
//! metadata and handles loading pretrained weights from the `HuggingFace`
//! Hub. The trait is the seam where tests substitute a synthetic backend
//! for the real model.

use candle_core::{DType, Device, Tensor};

use crate::error::{Result, ServiceError};

// ---------------------------------------------------------------------------
// ForwardTrace
// ---------------------------------------------------------------------------

/// Output of a forward pass: final hidden states plus any captured
/// per-layer attention patterns.
///
/// Returned by [`AttentionBackend::forward`]. When capture was not
/// requested, [`attentions`](Self::attentions) is empty and the forward
/// pass performed no extra clones.
#[derive(Debug)]
pub struct ForwardTrace {
    /// Final hidden states, `[batch, seq, hidden_size]`.
    hidden: Tensor,
    /// Post-softmax attention patterns, one per layer,
    /// each `[batch, heads, seq, seq]`, in layer order.
    attentions: Vec<Tensor>,
}

impl ForwardTrace {
    /// Create a trace from the forward output and captured patterns.
    #[must_use]
    pub fn new(hidden: Tensor, attentions: Vec<Tensor>) -> Self {
        Self { hidden, attentions }
    }

    /// Final hidden states from the forward pass.
    #[must_use]
    pub const fn hidden(&self) -> &Tensor {
        &self.hidden
    }

    /// Captured attention patterns, in layer order.
    #[must_use]
    pub fn attentions(&self) -> &[Tensor] {
        &self.attentions
    }

    /// Consume the trace and return the captured attention patterns.
    #[must_use]
    pub fn into_attentions(self) -> Vec<Tensor> {
        self.attentions
    }

    /// Number of layers with a captured pattern.
    #[must_use]
    pub fn num_captured_layers(&self) -> usize {
        self.attentions.len()
    }
}

// ---------------------------------------------------------------------------
// AttentionBackend trait
// ---------------------------------------------------------------------------

/// Unified interface for models that can expose attention patterns.
///
/// Implementing this trait is the only requirement for serving a model
/// through the inspection endpoint. The single [`forward`](Self::forward)
/// method covers both plain inference and attention capture: when
/// `capture_attentions` is `false` the pass is equivalent to a plain
/// forward with zero extra allocations.
pub trait AttentionBackend: Send + Sync {
    // --- Metadata --------------------------------------------------------

    /// Number of transformer layers.
    fn num_layers(&self) -> usize;

    /// Number of attention heads per layer.
    fn num_heads(&self) -> usize;

    /// Hidden dimension (`d_model`).
    fn hidden_size(&self) -> usize;

    /// Vocabulary size.
    fn vocab_size(&self) -> usize;

    /// Maximum sequence length the model can embed. Inputs longer than
    /// this are rejected before the forward pass.
    fn max_positions(&self) -> usize;

    // --- Core forward pass -----------------------------------------------

    /// Forward pass with optional attention-pattern capture.
    ///
    /// # Shapes
    /// - `input_ids`: `[batch, seq]` -- token IDs
    /// - returns: [`ForwardTrace`] with hidden states at
    ///   `[batch, seq, hidden_size]` and, when requested, one
    ///   `[batch, heads, seq, seq]` pattern per layer.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Model`] on tensor operation failures.
    fn forward(&self, input_ids: &Tensor, capture_attentions: bool) -> Result<ForwardTrace>;
}

// ---------------------------------------------------------------------------
// InspectionModel
// ---------------------------------------------------------------------------

/// High-level model wrapper combining a backend with device metadata.
///
/// Loaded once at process start and shared read-only for the process
/// lifetime; all request-scoped tensors are created against
/// [`device`](Self::device).
pub struct InspectionModel {
    /// The underlying model backend.
    backend: Box<dyn AttentionBackend>,
    /// The device this model lives on.
    device: Device,
    /// The HuggingFace model ID (or local identifier) this model was
    /// loaded from.
    model_id: String,
}

impl InspectionModel {
    /// Load a GPT-2 family model from a `HuggingFace` model ID.
    ///
    /// Downloads `config.json` and `model.safetensors` (or finds them in
    /// the local `HuggingFace` cache), then loads weights onto the best
    /// available device.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Download`] if artifact retrieval fails,
    /// [`ServiceError::Config`] if the config is unsupported, or
    /// [`ServiceError::Model`] if weight loading fails.
    pub fn from_pretrained(model_id: &str) -> Result<Self> {
        use crate::config::Gpt2Config;
        use crate::gpt2::Gpt2Model;

        let device = select_device()?;

        // --- Download / resolve local files ---
        let api = hf_hub::api::sync::Api::new()
            .map_err(|e| ServiceError::Download(format!("HF Hub API: {e}")))?;
        let repo = api.model(model_id.to_owned());

        let config_path = repo
            .get("config.json")
            .map_err(|e| ServiceError::Download(format!("config.json: {e}")))?;
        let config_str = std::fs::read_to_string(&config_path)
            .map_err(|e| ServiceError::Config(format!("read config.json: {e}")))?;
        let json: serde_json::Value = serde_json::from_str(&config_str)
            .map_err(|e| ServiceError::Config(format!("parse config.json: {e}")))?;
        let config = Gpt2Config::from_hf_config(&json)?;

        let weights_path = repo
            .get("model.safetensors")
            .map_err(|e| ServiceError::Download(format!("model.safetensors: {e}")))?;

        // --- Load weights ---
        // F32 throughout: the serialized attention values are f32 and the
        // GPT-2 family is small enough that full precision costs little.
        let vb = buffered_var_builder(&weights_path, DType::F32, &device)?;
        let model = Gpt2Model::load(&config, vb)?;

        tracing::info!(
            model_id,
            layers = config.num_layers,
            heads = config.num_heads,
            hidden = config.hidden_size,
            device = ?device,
            "model loaded",
        );

        Ok(Self::new(Box::new(model), device, model_id.to_owned()))
    }

    /// Wrap an existing backend.
    #[must_use]
    pub fn new(backend: Box<dyn AttentionBackend>, device: Device, model_id: String) -> Self {
        Self {
            backend,
            device,
            model_id,
        }
    }

    /// The device this model lives on.
    #[must_use]
    pub const fn device(&self) -> &Device {
        &self.device
    }

    /// The model ID this model was loaded from.
    #[must_use]
    pub fn model_id(&self) -> &str {
        &self.model_id
    }

    /// Number of transformer layers.
    #[must_use]
    pub fn num_layers(&self) -> usize {
        self.backend.num_layers()
    }

    /// Number of attention heads per layer.
    #[must_use]
    pub fn num_heads(&self) -> usize {
        self.backend.num_heads()
    }

    /// Hidden dimension.
    #[must_use]
    pub fn hidden_size(&self) -> usize {
        self.backend.hidden_size()
    }

    /// Vocabulary size.
    #[must_use]
    pub fn vocab_size(&self) -> usize {
        self.backend.vocab_size()
    }

    /// Maximum sequence length the model can embed.
    #[must_use]
    pub fn max_positions(&self) -> usize {
        self.backend.max_positions()
    }

    /// Run a forward pass, optionally capturing attention patterns.
    ///
    /// # Errors
    ///
    /// Propagates errors from the underlying backend.
    pub fn forward(&self, input_ids: &Tensor, capture_attentions: bool) -> Result<ForwardTrace> {
        self.backend.forward(input_ids, capture_attentions)
    }
}

// ---------------------------------------------------------------------------
// Loading helpers
// ---------------------------------------------------------------------------

/// Select the best available device (CUDA GPU 0, or CPU fallback).
fn select_device() -> Result<Device> {
    match Device::cuda_if_available(0) {
        Ok(dev) => Ok(dev),
        Err(e) => Err(ServiceError::Model(e)),
    }
}

/// Load weights via buffered (safe) reading; the full file lands in RAM.
///
/// GPT-2 family checkpoints ship as a single `model.safetensors`, so no
/// shard handling is needed.
fn buffered_var_builder(
    path: &std::path::Path,
    dtype: DType,
    device: &Device,
) -> Result<candle_nn::VarBuilder<'static>> {
    let data = std::fs::read(path).map_err(|e| {
        ServiceError::Model(candle_core::Error::Msg(format!(
            "read {}: {e}",
            path.display()
        )))
    })?;
    let vb = candle_nn::VarBuilder::from_buffered_safetensors(data, dtype, device)?;
    Ok(vb)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn forward_trace_accessors() {
        let device = Device::Cpu;
        let hidden = Tensor::zeros((1, 4, 8), DType::F32, &device).unwrap();
        let pattern = Tensor::zeros((1, 2, 4, 4), DType::F32, &device).unwrap();

        let trace = ForwardTrace::new(hidden, vec![pattern.clone(), pattern]);
        assert_eq!(trace.hidden().dims(), &[1, 4, 8]);
        assert_eq!(trace.num_captured_layers(), 2);
        assert_eq!(trace.attentions().len(), 2);

        let attentions = trace.into_attentions();
        assert_eq!(attentions.len(), 2);
    }

    #[test]
    fn forward_trace_without_capture_is_empty() {
        let hidden = Tensor::zeros((1, 4, 8), DType::F32, &Device::Cpu).unwrap();
        let trace = ForwardTrace::new(hidden, Vec::new());
        assert_eq!(trace.num_captured_layers(), 0);
    }
}
