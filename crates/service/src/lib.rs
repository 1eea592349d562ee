//! Momos Service
//!
//! HTTP front end for script generation and sandboxed runs.

pub mod agent;
pub mod config;
pub mod server;

use std::sync::Arc;
use tracing::warn;

use momos_runner::sandbox::{DockerProvider, LocalProvider};
use momos_runner::{Assembler, ExecutionGateway, Runner, SandboxPool, SandboxProvider};

use agent::{AnthropicAgent, DisabledAgent, GenerationAgent};
use config::{ProviderKind, ServiceConfig};
use server::AppState;

/// Build the sandbox provider selected by the configuration.
pub fn build_provider(config: &ServiceConfig) -> anyhow::Result<Arc<dyn SandboxProvider>> {
    let sandbox = &config.sandbox;
    let provider: Arc<dyn SandboxProvider> = match sandbox.provider {
        ProviderKind::Docker => Arc::new(
            DockerProvider::new(sandbox.image.clone())?.with_run_args(sandbox.run_args.clone()),
        ),
        ProviderKind::Local => Arc::new(LocalProvider::new(sandbox.workspace_dir.clone())),
    };
    Ok(provider)
}

/// Wire a runner around `provider` using the configured program and
/// gateway settings.
pub fn build_runner(config: &ServiceConfig, provider: Arc<dyn SandboxProvider>) -> Runner {
    Runner::new(ExecutionGateway::new(
        SandboxPool::new(provider),
        Assembler::new(config.program.clone()),
        config.sandbox.gateway_config(),
    ))
}

/// Build the agent, falling back to one that rejects every request when no
/// API key is available.
pub fn build_agent(config: &ServiceConfig) -> Arc<dyn GenerationAgent> {
    match AnthropicAgent::from_env(config.agent.clone()) {
        Ok(agent) => Arc::new(agent),
        Err(e) => {
            warn!("Script generation disabled: {}", e);
            Arc::new(DisabledAgent::new(e.to_string()))
        }
    }
}

/// Assemble the full application state from configuration.
pub fn build_state(config: &ServiceConfig) -> anyhow::Result<Arc<AppState>> {
    let provider = build_provider(config)?;
    Ok(Arc::new(AppState {
        runner: build_runner(config, provider),
        agent: build_agent(config),
    }))
}
