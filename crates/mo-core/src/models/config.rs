use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Directory holding one subdirectory per microservice.
    pub workspace_root: PathBuf,
    pub engine: EngineConfig,
    pub forwarder: ForwarderConfig,
    pub gateway: GatewayConfig,
    pub identity: Option<IdentityConfig>,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            workspace_root: PathBuf::from("microservices"),
            engine: EngineConfig::default(),
            forwarder: ForwarderConfig::default(),
            gateway: GatewayConfig::default(),
            identity: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub binary: String,
    /// Host address container ports are published on. Empty publishes on all interfaces.
    pub publish_address: String,
    pub build_timeout_secs: u64,
    pub run_timeout_secs: u64,
    pub command_timeout_secs: u64,
}

impl EngineConfig {
    pub fn build_timeout(&self) -> Duration {
        Duration::from_secs(self.build_timeout_secs)
    }

    pub fn run_timeout(&self) -> Duration {
        Duration::from_secs(self.run_timeout_secs)
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            binary: "docker".into(),
            publish_address: "127.0.0.1".into(),
            build_timeout_secs: 600,
            run_timeout_secs: 120,
            command_timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ForwarderConfig {
    /// Host the engine publishes container ports on.
    pub upstream_host: String,
    pub timeout_secs: u64,
}

impl ForwarderConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for ForwarderConfig {
    fn default() -> Self {
        Self {
            upstream_host: "127.0.0.1".into(),
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    pub bind: String,
    pub allowed_origins: Vec<String>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:8000".into(),
            allowed_origins: vec!["http://localhost:5173".into()],
        }
    }
}

/// Upstream identity provider. Auth routes are only mounted when this is set.
#[derive(Debug, Clone, Deserialize)]
pub struct IdentityConfig {
    pub base_url: String,
    pub project: String,
    #[serde(default = "default_identity_timeout_secs")]
    pub timeout_secs: u64,
}

impl IdentityConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

fn default_identity_timeout_secs() -> u64 {
    20
}
