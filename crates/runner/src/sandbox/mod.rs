//! Sandbox execution environments
//!
//! A sandbox is a named, long-lived environment with a running browser
//! (reachable over CDP from inside the sandbox), a writable workspace and a
//! shell. Handles are acquired by name; acquiring the same name twice reaches
//! the same environment.

use async_trait::async_trait;
use dashmap::DashMap;
use std::ops::Deref;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::debug;

use momos_common::{RawExecutionOutput, Result};

pub mod docker;
pub mod local;

pub use docker::{ContainerRuntime, DockerProvider, DockerSandbox};
pub use local::{LocalProvider, LocalSandbox};

/// Quote a value for POSIX `sh`.
pub fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}

/// A named execution environment
#[async_trait]
pub trait Sandbox: Send + Sync {
    /// Name the sandbox was acquired under
    fn name(&self) -> &str;

    /// Run a shell command and capture its output.
    async fn exec(&self, command: &str) -> Result<RawExecutionOutput>;

    /// Write a file into the sandbox workspace, replacing any existing file.
    async fn write_file(&self, path: &str, contents: &str) -> Result<()>;

    /// Translate a sandbox path into the form the sandbox's shell sees.
    fn resolve_path(&self, path: &str) -> String {
        path.to_string()
    }
}

/// Source of sandbox handles
#[async_trait]
pub trait SandboxProvider: Send + Sync {
    /// Get or create the sandbox called `name`.
    async fn acquire(&self, name: &str) -> Result<Arc<dyn Sandbox>>;
}

/// Sandbox handles keyed by name, with one exclusive lease per name
pub struct SandboxPool {
    provider: Arc<dyn SandboxProvider>,
    leases: DashMap<String, Arc<Mutex<()>>>,
}

impl SandboxPool {
    pub fn new(provider: Arc<dyn SandboxProvider>) -> Self {
        Self {
            provider,
            leases: DashMap::new(),
        }
    }

    /// Wait for exclusive use of the sandbox called `name`.
    ///
    /// The lease is held until the returned value is dropped; a second caller
    /// asking for the same name waits until then.
    pub async fn lease(&self, name: &str) -> Result<SandboxLease> {
        let lock = self.leases.entry(name.to_string()).or_default().clone();
        let guard = lock.lock_owned().await;
        debug!("Leased sandbox {}", name);

        let sandbox = self.provider.acquire(name).await?;
        Ok(SandboxLease {
            sandbox,
            _guard: guard,
        })
    }
}

/// Exclusive access to a sandbox for the duration of one run
pub struct SandboxLease {
    sandbox: Arc<dyn Sandbox>,
    _guard: OwnedMutexGuard<()>,
}

impl Deref for SandboxLease {
    type Target = dyn Sandbox;

    fn deref(&self) -> &Self::Target {
        self.sandbox.as_ref()
    }
}
