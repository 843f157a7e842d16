mod api;
mod balances;
mod config;
mod error;
mod labels;
mod models;
mod parser;
mod pipeline;
mod prompt;
mod relay;
mod rpc;
mod sse;
mod tokens;

use std::sync::Arc;
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::api::AppState;
use crate::labels::TokenListLabeler;
use crate::pipeline::Explorer;
use crate::prompt::NarrativePromptBuilder;
use crate::relay::CompletionClient;
use crate::rpc::RpcClient;
use crate::tokens::RpcOwnerResolver;

#[tokio::main]
async fn main() -> eyre::Result<()> {
    // Logs to stdout, INFO unless RUST_LOG says otherwise
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stdout)
        .with_target(false)
        .init();

    info!("Transaction explainer starting...");

    // Load configuration
    let cfg = config::load()?;
    info!("  RPC URL: {}", cfg.rpc_http_url);
    info!("  Cluster: {}", cfg.cluster);
    info!("  Listen: {}:{}", cfg.bind_addr, cfg.port);
    info!("  Model: {}", cfg.completion.model);

    // Shared clients, constructed once
    let rpc = RpcClient::new(cfg.rpc_http_url.clone())?;
    let labeler = TokenListLabeler::new(cfg.cluster.clone(), cfg.token_list_url.clone())?;
    let completion = CompletionClient::new(cfg.completion.clone())?;
    if !completion.is_configured() {
        warn!("COMPLETION_API_KEY not set: /api/ai will answer 503");
    }

    let state = Arc::new(AppState {
        explorer: Explorer {
            source: Arc::new(rpc.clone()),
            owners: Arc::new(RpcOwnerResolver::new(rpc)),
            labeler: Arc::new(labeler),
            owner_policy: cfg.owner_policy,
        },
        completion,
        prompt: NarrativePromptBuilder::new(cfg.prompt_hardening),
    });

    // Spawn API task
    let api_handle = tokio::spawn({
        let cfg = cfg.clone();
        async move { api::serve(cfg, state).await }
    });

    // Graceful shutdown
    tokio::select! {
        res = api_handle => match res {
            Ok(Ok(_)) => info!("API exited cleanly"),
            Ok(Err(e)) => error!("API error: {:?}", e),
            Err(e) => error!("API task panicked: {:?}", e),
        },
        _ = signal::ctrl_c() => {
            info!("Shutdown signal received, stopping...");
        }
    }

    info!("Transaction explainer stopped.");
    Ok(())
}
