//! Service configuration

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use momos_runner::{AssemblerOptions, BackoffPolicy, GatewayConfig};

/// Default config file, relative to the working directory
pub const DEFAULT_CONFIG_FILE: &str = "momos.toml";

/// Service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// HTTP listen address
    pub listen: String,

    /// Where programs run
    pub sandbox: SandboxConfig,

    /// Generated program settings
    pub program: AssemblerOptions,

    /// Script generation model
    pub agent: AgentConfig,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            listen: "127.0.0.1:8787".to_string(),
            sandbox: SandboxConfig::default(),
            program: AssemblerOptions::default(),
            agent: AgentConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// Named container through the Docker/Podman CLI
    Docker,
    /// Host processes against a locally started browser
    Local,
}

impl FromStr for ProviderKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "docker" => Ok(Self::Docker),
            "local" => Ok(Self::Local),
            other => anyhow::bail!("unknown sandbox provider: {}", other),
        }
    }
}

/// Sandbox configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SandboxConfig {
    pub provider: ProviderKind,

    /// Sandbox name; runs against the same name are serialized
    pub name: String,

    /// Container image (docker provider)
    pub image: String,

    /// Extra `run` arguments when the container has to be created
    pub run_args: Vec<String>,

    /// Host directory backing `/workspace` (local provider)
    pub workspace_dir: PathBuf,

    pub program_path: String,

    pub health_check_command: String,

    pub backoff: BackoffPolicy,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        let gateway = GatewayConfig::default();
        Self {
            provider: ProviderKind::Docker,
            name: gateway.sandbox_name,
            image: "momos/sandbox:latest".to_string(),
            run_args: vec!["--shm-size=1g".to_string()],
            workspace_dir: std::env::temp_dir().join("momos"),
            program_path: gateway.program_path,
            health_check_command: gateway.health_check_command,
            backoff: gateway.backoff,
        }
    }
}

impl SandboxConfig {
    pub fn gateway_config(&self) -> GatewayConfig {
        GatewayConfig {
            sandbox_name: self.name.clone(),
            health_check_command: self.health_check_command.clone(),
            program_path: self.program_path.clone(),
            backoff: self.backoff,
        }
    }
}

/// Generation agent configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    pub model: String,

    /// Environment variable holding the API key
    pub api_key_env: String,

    pub max_tokens: u32,

    pub base_url: String,

    /// Let the model fetch the target page before choosing selectors
    pub web_fetch: bool,

    /// Page fetches allowed per generation
    pub web_fetch_max_uses: u32,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            model: "claude-opus-4-5".to_string(),
            api_key_env: "ANTHROPIC_API_KEY".to_string(),
            max_tokens: 4096,
            base_url: "https://api.anthropic.com".to_string(),
            web_fetch: true,
            web_fetch_max_uses: 5,
        }
    }
}

impl ServiceConfig {
    /// Load configuration from file, or use defaults when it does not exist
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: Self = toml::from_str(&content)?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        let content = toml::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Apply `MOMOS_*` overrides from the process environment
    pub fn apply_env(&mut self) -> anyhow::Result<()> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary variable lookup
    pub fn apply_overrides<F>(&mut self, lookup: F) -> anyhow::Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("MOMOS_LISTEN") {
            self.listen = v;
        }
        if let Some(v) = lookup("MOMOS_SANDBOX_PROVIDER") {
            self.sandbox.provider = v.parse()?;
        }
        if let Some(v) = lookup("MOMOS_SANDBOX_NAME") {
            self.sandbox.name = v;
        }
        if let Some(v) = lookup("MOMOS_SANDBOX_IMAGE") {
            self.sandbox.image = v;
        }
        if let Some(v) = lookup("MOMOS_WORKSPACE_DIR") {
            self.sandbox.workspace_dir = PathBuf::from(v);
        }
        if let Some(v) = lookup("MOMOS_TELEMETRY_ENABLED") {
            self.program.telemetry.enabled = parse_bool(&v)?;
        }
        if let Some(v) = lookup("MOMOS_AGENT_MODEL") {
            self.agent.model = v;
        }
        if let Some(v) = lookup("MOMOS_AGENT_BASE_URL") {
            self.agent.base_url = v;
        }
        if let Some(v) = lookup("MOMOS_AGENT_WEB_FETCH") {
            self.agent.web_fetch = parse_bool(&v)?;
        }
        Ok(())
    }
}

fn parse_bool(value: &str) -> anyhow::Result<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => anyhow::bail!("expected a boolean, got {}", other),
    }
}
