//! Container-backed sandboxes
//!
//! Each sandbox is a named container driven through the Docker or Podman CLI.
//! The image is expected to start a Chromium with remote debugging on port
//! 9222 and to have `node`, `playwright` and `curl` available.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::process::{Command, Stdio};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::process::Command as AsyncCommand;
use tracing::{debug, info};

use momos_common::{Error, RawExecutionOutput, Result};

use super::{shell_quote, Sandbox, SandboxProvider};

/// Container runtime detection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerRuntime {
    Docker,
    Podman,
}

impl ContainerRuntime {
    /// Detect available container runtime
    pub fn detect() -> Option<Self> {
        // Check podman first (rootless friendly)
        if Command::new("podman").arg("--version").output().is_ok() {
            return Some(Self::Podman);
        }
        if Command::new("docker").arg("--version").output().is_ok() {
            return Some(Self::Docker);
        }
        None
    }

    /// Get the CLI command name
    pub fn command(&self) -> &'static str {
        match self {
            Self::Docker => "docker",
            Self::Podman => "podman",
        }
    }
}

/// Container state as reported by `inspect`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ContainerState {
    Running,
    Stopped,
    Missing,
}

/// Creates and reconnects to named containers
pub struct DockerProvider {
    runtime: ContainerRuntime,
    image: String,
    /// Extra arguments for `run` when a container has to be created
    run_args: Vec<String>,
}

impl DockerProvider {
    /// Use the detected container runtime.
    pub fn new(image: impl Into<String>) -> Result<Self> {
        let runtime = ContainerRuntime::detect()
            .ok_or_else(|| Error::Sandbox("No container runtime available".to_string()))?;
        Ok(Self::with_runtime(runtime, image))
    }

    pub fn with_runtime(runtime: ContainerRuntime, image: impl Into<String>) -> Self {
        Self {
            runtime,
            image: image.into(),
            run_args: Vec::new(),
        }
    }

    pub fn with_run_args(mut self, args: Vec<String>) -> Self {
        self.run_args = args;
        self
    }

    async fn state(&self, name: &str) -> Result<ContainerState> {
        let output = AsyncCommand::new(self.runtime.command())
            .args(["inspect", "--format", "{{.State.Running}}", name])
            .output()
            .await?;

        if !output.status.success() {
            return Ok(ContainerState::Missing);
        }

        match String::from_utf8_lossy(&output.stdout).trim() {
            "true" => Ok(ContainerState::Running),
            _ => Ok(ContainerState::Stopped),
        }
    }

    async fn run_checked(&self, args: &[&str]) -> Result<()> {
        let output = AsyncCommand::new(self.runtime.command())
            .args(args)
            .output()
            .await?;

        if !output.status.success() {
            return Err(Error::Sandbox(
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl SandboxProvider for DockerProvider {
    async fn acquire(&self, name: &str) -> Result<Arc<dyn Sandbox>> {
        match self.state(name).await? {
            ContainerState::Running => {
                debug!("Reusing running container {}", name);
            }
            ContainerState::Stopped => {
                info!("Starting stopped container {}", name);
                self.run_checked(&["start", name]).await?;
            }
            ContainerState::Missing => {
                info!("Creating container {} from {}", name, self.image);
                let mut args = vec!["run", "-d", "--name", name];
                args.extend(self.run_args.iter().map(String::as_str));
                args.push(&self.image);
                self.run_checked(&args).await?;
            }
        }

        Ok(Arc::new(DockerSandbox {
            runtime: self.runtime,
            name: name.to_string(),
        }))
    }
}

/// Handle to one named container
pub struct DockerSandbox {
    runtime: ContainerRuntime,
    name: String,
}

#[async_trait]
impl Sandbox for DockerSandbox {
    fn name(&self) -> &str {
        &self.name
    }

    async fn exec(&self, command: &str) -> Result<RawExecutionOutput> {
        let output = AsyncCommand::new(self.runtime.command())
            .args(["exec", &self.name, "sh", "-c", command])
            .output()
            .await?;

        Ok(RawExecutionOutput {
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            exit_code: output.status.code().unwrap_or(-1),
        })
    }

    async fn write_file(&self, path: &str, contents: &str) -> Result<()> {
        let script = write_command(path);
        let mut child = AsyncCommand::new(self.runtime.command())
            .args(["exec", "-i", &self.name, "sh", "-c", &script])
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(contents.as_bytes()).await?;
            stdin.shutdown().await?;
        }

        let output = child.wait_with_output().await?;
        if !output.status.success() {
            return Err(Error::Sandbox(format!(
                "failed to write {}: {}",
                path,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(())
    }
}

/// Shell snippet that writes stdin to `path`, creating parent directories.
fn write_command(path: &str) -> String {
    match Path::new(path).parent().and_then(|p| p.to_str()).filter(|p| !p.is_empty()) {
        Some(dir) => format!("mkdir -p {} && cat > {}", shell_quote(dir), shell_quote(path)),
        None => format!("cat > {}", shell_quote(path)),
    }
}
