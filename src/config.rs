// SPDX-License-Identifier: MIT OR Apache-2.0

//! GPT-2 configuration and `HuggingFace` `config.json` parsing.
//!
//! [`Gpt2Config`] captures the handful of dimension and hyperparameter
//! fields a GPT-2 family checkpoint (`gpt2`, `distilgpt2`, `gpt2-medium`,
//! ...) declares in its `HuggingFace` `config.json`.
//!
//! # Usage
//!
//! ```
//! use attention_lens::Gpt2Config;
//!
//! let config_str = r#"{"model_type": "gpt2", "n_embd": 768,
//!     "n_layer": 6, "n_head": 12, "n_positions": 1024,
//!     "vocab_size": 50257, "layer_norm_epsilon": 1e-5}"#;
//! let json: serde_json::Value = serde_json::from_str(config_str).unwrap();
//! let config = Gpt2Config::from_hf_config(&json).unwrap();
//! assert_eq!(config.num_layers, 6);
//! assert_eq!(config.head_dim, 64);
//! ```

use serde_json::Value;

use crate::error::{Result, ServiceError};

/// Configuration for a GPT-2 family decoder-only transformer.
///
/// Parsed from `HuggingFace` `config.json` via
/// [`from_hf_config`](Self::from_hf_config). GPT-2 checkpoints use the
/// original OpenAI field names (`n_embd`, `n_layer`, `n_head`) rather than
/// the newer `hidden_size`/`num_hidden_layers` convention.
#[derive(Debug, Clone)]
pub struct Gpt2Config {
    /// Hidden dimension (`n_embd`).
    pub hidden_size: usize,
    /// Number of transformer blocks (`n_layer`).
    pub num_layers: usize,
    /// Number of attention heads (`n_head`).
    pub num_heads: usize,
    /// Dimension per head (`n_embd / n_head`).
    pub head_dim: usize,
    /// MLP intermediate dimension (`n_inner`, defaults to `4 * n_embd`).
    pub intermediate_size: usize,
    /// Vocabulary size.
    pub vocab_size: usize,
    /// Size of the learned position embedding table (`n_positions`).
    /// Sequences longer than this cannot be embedded.
    pub max_position_embeddings: usize,
    /// Epsilon for the `LayerNorm` layers (`layer_norm_epsilon`).
    pub layer_norm_eps: f64,
}

impl Gpt2Config {
    /// Parse a [`Gpt2Config`] from a `HuggingFace` `config.json` value.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Config`] if `model_type` is missing or not
    /// `"gpt2"`, or if required dimension fields are absent.
    pub fn from_hf_config(config: &Value) -> Result<Self> {
        let model_type = config
            .get("model_type")
            .and_then(Value::as_str)
            .ok_or_else(|| ServiceError::Config("missing 'model_type' field".into()))?;

        if model_type != "gpt2" {
            return Err(ServiceError::Config(format!(
                "unsupported model_type: '{model_type}' (expected 'gpt2')"
            )));
        }

        let hidden_size = get_usize(config, "n_embd")?;
        let num_heads = get_usize(config, "n_head")?;
        if num_heads == 0 || !hidden_size.is_multiple_of(num_heads) {
            return Err(ServiceError::Config(format!(
                "n_embd {hidden_size} is not divisible by n_head {num_heads}"
            )));
        }

        Ok(Self {
            hidden_size,
            num_layers: get_usize(config, "n_layer")?,
            num_heads,
            head_dim: hidden_size / num_heads,
            // n_inner is null in stock GPT-2 configs, meaning 4 * n_embd.
            intermediate_size: get_usize_or(config, "n_inner", 4 * hidden_size),
            vocab_size: get_usize(config, "vocab_size")?,
            max_position_embeddings: get_usize_or(config, "n_positions", 1024),
            layer_norm_eps: get_f64_or(config, "layer_norm_epsilon", 1e-5),
        })
    }
}

// ---------------------------------------------------------------------------
// JSON extraction helpers
// ---------------------------------------------------------------------------

/// Extract a required `usize` field from a JSON object.
fn get_usize(config: &Value, key: &str) -> Result<usize> {
    let val = config
        .get(key)
        .and_then(Value::as_u64)
        .ok_or_else(|| ServiceError::Config(format!("missing or invalid field '{key}'")))?;
    usize::try_from(val)
        .map_err(|_| ServiceError::Config(format!("field '{key}' value {val} overflows usize")))
}

/// Extract an optional `usize` field, returning a default if absent or null.
fn get_usize_or(config: &Value, key: &str, default: usize) -> usize {
    config
        .get(key)
        .and_then(Value::as_u64)
        .and_then(|v| usize::try_from(v).ok())
        .unwrap_or(default)
}

/// Extract an `f64` field, returning a default if absent.
fn get_f64_or(config: &Value, key: &str, default: f64) -> f64 {
    config.get(key).and_then(Value::as_f64).unwrap_or(default)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    /// Helper to create a distilgpt2-shaped config JSON.
    fn distilgpt2_config_json() -> Value {
        serde_json::json!({
            "model_type": "gpt2",
            "n_embd": 768,
            "n_layer": 6,
            "n_head": 12,
            "n_positions": 1024,
            "n_inner": null,
            "vocab_size": 50257,
            "layer_norm_epsilon": 1e-5
        })
    }

    #[test]
    fn parse_distilgpt2() {
        let config = Gpt2Config::from_hf_config(&distilgpt2_config_json()).unwrap();
        assert_eq!(config.hidden_size, 768);
        assert_eq!(config.num_layers, 6);
        assert_eq!(config.num_heads, 12);
        assert_eq!(config.head_dim, 64);
        assert_eq!(config.intermediate_size, 3072);
        assert_eq!(config.vocab_size, 50257);
        assert_eq!(config.max_position_embeddings, 1024);
        assert!((config.layer_norm_eps - 1e-5).abs() < f64::EPSILON);
    }

    #[test]
    fn n_inner_overrides_default() {
        let json = serde_json::json!({
            "model_type": "gpt2",
            "n_embd": 64,
            "n_layer": 2,
            "n_head": 4,
            "n_inner": 128,
            "vocab_size": 1000
        });
        let config = Gpt2Config::from_hf_config(&json).unwrap();
        assert_eq!(config.intermediate_size, 128);
        // Defaults for absent optional fields.
        assert_eq!(config.max_position_embeddings, 1024);
    }

    #[test]
    fn unsupported_model_type_errors() {
        let json = serde_json::json!({ "model_type": "bert", "n_embd": 768 });
        assert!(Gpt2Config::from_hf_config(&json).is_err());
    }

    #[test]
    fn missing_model_type_errors() {
        let json = serde_json::json!({ "n_embd": 768 });
        assert!(Gpt2Config::from_hf_config(&json).is_err());
    }

    #[test]
    fn indivisible_heads_errors() {
        let json = serde_json::json!({
            "model_type": "gpt2",
            "n_embd": 100,
            "n_layer": 2,
            "n_head": 12,
            "vocab_size": 1000
        });
        assert!(Gpt2Config::from_hf_config(&json).is_err());
    }
}
