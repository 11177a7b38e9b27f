pub mod agent_engine;
pub mod commands;
pub mod config;
pub mod errors;
pub mod executor;
pub mod llm;
pub mod perception;

use std::sync::Arc;

use tokio::task::JoinHandle;

use crate::agent_engine::engine::RunController;
use crate::config::AppConfig;
use crate::errors::DeskPilotResult;
use crate::executor::input::EnigoDriver;
use crate::llm::providers::anthropic::AnthropicProvider;
use crate::perception::screenshot::XcapScreen;

pub use crate::commands::OperatorHandle;

/// Installs the global tracing subscriber. `RUST_LOG` overrides the default `info` filter.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();
}

/// Builds the run controller on the real desktop backends and spawns it.
pub fn spawn(config: &AppConfig) -> DeskPilotResult<(OperatorHandle, JoinHandle<()>)> {
    let provider = Arc::new(AnthropicProvider::new(&config.decision)?);
    if config.decision.resolve_api_key().is_empty() {
        tracing::warn!("no API key configured; set DESKPILOT_API_KEY or ANTHROPIC_API_KEY");
    }

    let mut controller = RunController::new(
        config,
        Arc::new(XcapScreen::new()),
        provider,
        Arc::new(EnigoDriver::new()),
    );
    let handle = controller.handle();

    tracing::info!(model = %config.decision.model, "spawning run controller");
    let task = tokio::spawn(async move {
        controller.run_loop().await;
    });
    Ok((handle, task))
}
