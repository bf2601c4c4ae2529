// SPDX-License-Identifier: MIT OR Apache-2.0

//! attention-lens server binary: load a pretrained GPT-2 model once, then
//! serve attention inspection requests over HTTP.

use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use attention_lens::server::{self, AppState};
use attention_lens::{AttentionService, HfTokenizer, InspectionModel};

/// Serve layer/head-averaged attention weights from a pretrained model.
#[derive(Debug, Parser)]
#[command(name = "attention-lens", version, about)]
struct Args {
    /// HuggingFace model ID to load at startup.
    #[arg(long, default_value = "distilgpt2")]
    model_id: String,

    /// Address to bind the HTTP listener to.
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Port to bind the HTTP listener to.
    #[arg(long, default_value_t = 5000)]
    port: u16,
}

#[tokio::main]
async fn main() -> attention_lens::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    tracing::info!(model_id = %args.model_id, "loading model and tokenizer");
    let model = InspectionModel::from_pretrained(&args.model_id)?;
    let tokenizer = HfTokenizer::from_pretrained(&args.model_id)?;

    let service = Arc::new(AttentionService::new(model, Box::new(tokenizer)));
    server::run(AppState::new(service), &args.host, args.port).await
}
