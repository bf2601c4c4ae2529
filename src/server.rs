// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP API for attention inspection, built on axum.
//!
//! ## Endpoints
//!
//! - `POST /get_attention` - Tokenize text and return the layer/head-averaged
//!   attention matrix
//! - `GET /health` - Health check with model metadata
//!
//! Cross-origin requests are permitted from any origin.
//!
//! ## Example
//!
//! ```rust,ignore
//! use attention_lens::server::{create_router, AppState};
//!
//! let state = AppState::new(service);
//! let app = create_router(state);
//! axum::serve(listener, app).await?;
//! ```

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;

use crate::error::{Result, ServiceError};
use crate::service::AttentionService;

// ---------------------------------------------------------------------------
// Request / response types
// ---------------------------------------------------------------------------

/// Request body for `POST /get_attention`.
#[derive(Debug, Deserialize)]
pub struct GetAttentionRequest {
    /// Raw input text of arbitrary length.
    pub text: String,
}

/// Response body for `POST /get_attention`.
///
/// `tokens[i]` corresponds to row and column `i` of `attention`.
#[derive(Debug, Serialize)]
pub struct GetAttentionResponse {
    /// Token strings, in input order.
    pub tokens: Vec<String>,
    /// Square matrix of averaged attention weights.
    pub attention: Vec<Vec<f32>>,
}

/// Response body for `GET /health`.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Always `"ok"` once the model is loaded.
    pub status: String,
    /// The loaded model's ID.
    pub model: String,
    /// Number of transformer layers.
    pub layers: usize,
    /// Number of attention heads per layer.
    pub heads: usize,
    /// The device the model lives on.
    pub device: String,
}

/// Error body for all non-200 responses.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Human-readable failure description.
    pub error: String,
}

// ---------------------------------------------------------------------------
// Error mapping
// ---------------------------------------------------------------------------

/// Deliberate error-to-status mapping: client mistakes are 400, everything
/// else is an opaque 500 whose detail lives only in server-side logs.
impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = match &self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Model(_) | Self::Tokenizer(_) | Self::Config(_) | Self::Download(_)
            | Self::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }
        (
            status,
            Json(ErrorResponse {
                error: self.to_string(),
            }),
        )
            .into_response()
    }
}

// ---------------------------------------------------------------------------
// AppState & router
// ---------------------------------------------------------------------------

/// Application state shared across handlers: the service holding the
/// process-lifetime model and tokenizer.
#[derive(Clone)]
pub struct AppState {
    /// Shared read-only inspection service.
    service: Arc<AttentionService>,
}

impl AppState {
    /// Wrap a service for sharing across handlers.
    #[must_use]
    pub fn new(service: Arc<AttentionService>) -> Self {
        Self { service }
    }
}

/// Build the axum router with all routes and a permissive CORS layer.
#[must_use]
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/get_attention", post(get_attention_handler))
        .route("/health", get(health_handler))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Start the HTTP listener on `host:port` and serve until Ctrl-C.
///
/// # Errors
///
/// Returns [`ServiceError::Io`] if binding or serving fails.
pub async fn run(state: AppState, host: &str, port: u16) -> Result<()> {
    let addr = format!("{host}:{port}");
    let app = create_router(state);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(%addr, "listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

/// Resolve when the process receives Ctrl-C, letting in-flight requests
/// finish before the server exits.
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to install Ctrl-C handler");
    }
    tracing::info!("shutdown signal received");
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// `POST /get_attention`: the whole pipeline for one text.
///
/// The forward pass is synchronous and CPU/GPU-bound, so it runs on the
/// blocking thread pool rather than stalling the async executor.
async fn get_attention_handler(
    State(state): State<AppState>,
    Json(request): Json<GetAttentionRequest>,
) -> std::result::Result<Json<GetAttentionResponse>, ServiceError> {
    let service = Arc::clone(&state.service);
    let analysis = tokio::task::spawn_blocking(move || service.get_attention(&request.text))
        .await
        .map_err(|e| {
            ServiceError::Model(candle_core::Error::Msg(format!("inference task failed: {e}")))
        })??;

    tracing::info!(tokens = analysis.tokens.len(), "sending response");
    Ok(Json(GetAttentionResponse {
        tokens: analysis.tokens,
        attention: analysis.attention,
    }))
}

/// `GET /health`: model metadata for liveness checks.
async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    let model = state.service.model();
    Json(HealthResponse {
        status: "ok".into(),
        model: model.model_id().to_owned(),
        layers: model.num_layers(),
        heads: model.num_heads(),
        device: format!("{:?}", model.device()),
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn error_status_mapping() {
        let bad = ServiceError::BadRequest("empty".into());
        assert_eq!(bad.into_response().status(), StatusCode::BAD_REQUEST);

        let model = ServiceError::Model(candle_core::Error::Msg("boom".into()));
        assert_eq!(
            model.into_response().status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );

        let tok = ServiceError::Tokenizer("bad vocab".into());
        assert_eq!(
            tok.into_response().status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
