//! Host-process sandboxes for development
//!
//! Commands run with `sh -c` on the host inside a per-sandbox directory.
//! Sandbox paths under `/workspace` are mapped into that directory, so a
//! program written to `/workspace/index.mjs` lands in `<root>/<name>/index.mjs`.
//! The browser is whatever Chromium the developer started with
//! `--remote-debugging-port=9222`.

use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::process::Command as AsyncCommand;
use tracing::debug;

use momos_common::{RawExecutionOutput, Result};

use super::{Sandbox, SandboxProvider};

const WORKSPACE_PREFIX: &str = "/workspace";

/// Hands out sandboxes rooted under one host directory
pub struct LocalProvider {
    root: PathBuf,
}

impl LocalProvider {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl SandboxProvider for LocalProvider {
    async fn acquire(&self, name: &str) -> Result<Arc<dyn Sandbox>> {
        let root = self.root.join(name);
        tokio::fs::create_dir_all(&root).await?;
        debug!("Local sandbox {} at {}", name, root.display());
        Ok(Arc::new(LocalSandbox {
            name: name.to_string(),
            root,
        }))
    }
}

/// One host directory acting as a sandbox workspace
pub struct LocalSandbox {
    name: String,
    root: PathBuf,
}

impl LocalSandbox {
    fn host_path(&self, path: &str) -> PathBuf {
        let relative = path
            .strip_prefix(WORKSPACE_PREFIX)
            .unwrap_or(path)
            .trim_start_matches('/');
        self.root.join(relative)
    }
}

#[async_trait]
impl Sandbox for LocalSandbox {
    fn name(&self) -> &str {
        &self.name
    }

    async fn exec(&self, command: &str) -> Result<RawExecutionOutput> {
        let output = AsyncCommand::new("sh")
            .args(["-c", command])
            .current_dir(&self.root)
            .output()
            .await?;

        Ok(RawExecutionOutput {
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            exit_code: output.status.code().unwrap_or(-1),
        })
    }

    async fn write_file(&self, path: &str, contents: &str) -> Result<()> {
        let target = self.host_path(path);
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&target, contents).await?;
        Ok(())
    }

    fn resolve_path(&self, path: &str) -> String {
        self.host_path(path).to_string_lossy().to_string()
    }
}
