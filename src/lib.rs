// SPDX-License-Identifier: MIT OR Apache-2.0

//! # attention-lens
//!
//! An attention inspection service in Rust, built on
//! [candle](https://github.com/huggingface/candle).
//!
//! attention-lens loads a pretrained GPT-2 family model once at startup,
//! then serves a single HTTP endpoint: given text, it tokenizes with the
//! model's own tokenizer, runs a forward pass with attention capture
//! enabled, averages the attention weights across all layers and heads,
//! and returns the token sequence alongside the averaged matrix.
//!
//! ## Pipeline
//!
//! ```text
//! POST /get_attention
//!   -> tokenize -> forward pass (attentions captured)
//!   -> average over layers and heads -> { tokens, attention }
//! ```
//!
//! The model and tokenizer are read-only after load; every other value is
//! request-scoped. [`AttentionBackend`] and [`Tokenize`] are the seams
//! where tests substitute synthetic doubles.

#![warn(missing_docs)]

pub mod average;
pub mod backend;
pub mod config;
pub mod error;
pub(crate) mod gpt2;
pub mod server;
pub mod service;
pub mod tokenizer;
pub(crate) mod util;

pub use backend::{AttentionBackend, ForwardTrace, InspectionModel};
pub use config::Gpt2Config;
pub use error::{Result, ServiceError};
pub use gpt2::Gpt2Model;
pub use service::{AttentionAnalysis, AttentionService};
pub use tokenizer::{HfTokenizer, Tokenize, TokenizedText};
