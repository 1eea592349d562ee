//! Execution gateway
//!
//! Drives one script through a sandbox: compile, lease the sandbox, wait for
//! its browser to answer the health check, write the assembled program into
//! the workspace and run it with `node`. The raw output is returned verbatim.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use momos_common::{ActionScript, Error, RawExecutionOutput, Result};

use crate::assembler::Assembler;
use crate::compiler::compile;
use crate::sandbox::{shell_quote, Sandbox, SandboxPool};

/// Health-check retry schedule: `initial_delay_ms`, doubling between attempts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackoffPolicy {
    pub initial_delay_ms: u64,
    pub max_attempts: u32,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            initial_delay_ms: 1000,
            max_attempts: 10,
        }
    }
}

impl BackoffPolicy {
    /// Delay to wait after the given failed attempt (1-based).
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let factor = 1u64.checked_shl(attempt.saturating_sub(1)).unwrap_or(u64::MAX);
        Duration::from_millis(self.initial_delay_ms.saturating_mul(factor))
    }
}

/// Where and how programs are run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    pub sandbox_name: String,
    /// Command printing the browser's `/json/version` document
    pub health_check_command: String,
    /// Sandbox path the program is written to
    pub program_path: String,
    pub backoff: BackoffPolicy,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            sandbox_name: "momos-sandbox".to_string(),
            health_check_command: "curl -s http://localhost:9222/json/version".to_string(),
            program_path: "/workspace/index.mjs".to_string(),
            backoff: BackoffPolicy::default(),
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DebuggerVersion {
    web_socket_debugger_url: String,
}

/// Extract the CDP websocket URL from a health-check response.
pub fn parse_debugger_target(response: &str) -> Option<String> {
    serde_json::from_str::<DebuggerVersion>(response.trim())
        .ok()
        .map(|v| v.web_socket_debugger_url)
        .filter(|url| !url.is_empty())
}

pub struct ExecutionGateway {
    pool: SandboxPool,
    assembler: Assembler,
    config: GatewayConfig,
}

impl ExecutionGateway {
    pub fn new(pool: SandboxPool, assembler: Assembler, config: GatewayConfig) -> Self {
        Self {
            pool,
            assembler,
            config,
        }
    }

    pub fn assembler(&self) -> &Assembler {
        &self.assembler
    }

    /// Run `script` in the configured sandbox.
    ///
    /// The script is compiled before the sandbox is touched, so an
    /// unsupported version fails without any sandbox traffic. The sandbox
    /// lease is held until the program exits.
    pub async fn execute(&self, script: &ActionScript) -> Result<RawExecutionOutput> {
        let block = compile(script)?;

        let sandbox = self.pool.lease(&self.config.sandbox_name).await?;
        info!("Acquired sandbox {}", sandbox.name());

        let target = self.wait_for_browser(&*sandbox).await?;
        info!("Browser ready at {}", target);

        let program = self.assembler.assemble(&block, &target);
        sandbox
            .write_file(&self.config.program_path, program.as_str())
            .await?;
        debug!(
            "Wrote {} bytes to {}",
            program.as_str().len(),
            self.config.program_path
        );

        let command = format!(
            "node {}",
            shell_quote(&sandbox.resolve_path(&self.config.program_path))
        );
        let output = sandbox.exec(&command).await?;
        info!("Program exited with code {}", output.exit_code);
        Ok(output)
    }

    /// Poll the health check until it yields a debugger URL.
    async fn wait_for_browser(&self, sandbox: &dyn Sandbox) -> Result<String> {
        let policy = self.config.backoff;
        let attempts = policy.max_attempts.max(1);
        let mut last_error = String::new();

        for attempt in 1..=attempts {
            debug!("Health check attempt {}/{}", attempt, attempts);
            match sandbox.exec(&self.config.health_check_command).await {
                Ok(out) if out.exit_code == 0 => match parse_debugger_target(&out.stdout) {
                    Some(target) => return Ok(target),
                    None => last_error = "response has no webSocketDebuggerUrl".to_string(),
                },
                Ok(out) => {
                    last_error = format!("exit code {}: {}", out.exit_code, out.stderr.trim());
                }
                Err(e) => last_error = e.to_string(),
            }

            warn!("Health check attempt {} failed: {}", attempt, last_error);
            if attempt < attempts {
                sleep(policy.delay_after(attempt)).await;
            }
        }

        Err(Error::SandboxUnavailable {
            name: sandbox.name().to_string(),
            attempts,
            last_error,
        })
    }
}
