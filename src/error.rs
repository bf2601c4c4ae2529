// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for attention-lens.

/// Errors that can occur while serving an attention inspection request.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    /// Model loading or forward pass error (wraps candle).
    #[error("model error: {0}")]
    Model(#[from] candle_core::Error),

    /// Tokenizer loading or encoding error.
    #[error("tokenizer error: {0}")]
    Tokenizer(String),

    /// Model configuration parsing error.
    #[error("config error: {0}")]
    Config(String),

    /// Model artifact download error.
    #[error("download error: {0}")]
    Download(String),

    /// Invalid client input (empty text, input longer than the model's
    /// position table). Maps to HTTP 400.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// I/O error.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Result type alias for attention-lens operations.
pub type Result<T> = std::result::Result<T, ServiceError>;
