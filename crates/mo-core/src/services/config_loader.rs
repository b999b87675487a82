use std::path::Path;

use crate::error::{OrchestratorError, Result};
use crate::models::{IdentityConfig, OrchestratorConfig};

pub const CONFIG_FILENAME: &str = "micro-orchestrator.yaml";

/// Load and validate a config file. Missing files are an error here.
pub fn load(config_path: &Path) -> Result<OrchestratorConfig> {
    if !config_path.exists() {
        return Err(OrchestratorError::ConfigNotFound(config_path.to_path_buf()));
    }
    let contents = std::fs::read_to_string(config_path)?;
    let config: OrchestratorConfig = serde_yaml::from_str(&contents)
        .map_err(|e| OrchestratorError::InvalidConfig(e.to_string()))?;
    validate(&config)?;
    Ok(config)
}

/// Load the config file if present, fall back to defaults otherwise, then
/// apply `.env` and process environment overrides.
pub fn load_with_env(config_path: &Path) -> Result<OrchestratorConfig> {
    let mut config = match load(config_path) {
        Ok(config) => config,
        Err(OrchestratorError::ConfigNotFound(path)) => {
            tracing::info!(path = %path.display(), "no config file, using defaults");
            OrchestratorConfig::default()
        }
        Err(e) => return Err(e),
    };

    // A missing .env is normal.
    dotenvy::dotenv().ok();
    apply_env_overrides(&mut config, |key| std::env::var(key).ok());
    validate(&config)?;
    Ok(config)
}

/// Apply environment overrides through `lookup` so tests need not touch the process env.
pub fn apply_env_overrides<F>(config: &mut OrchestratorConfig, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(root) = lookup("MO_WORKSPACE_ROOT") {
        config.workspace_root = root.into();
    }
    if let Some(bind) = lookup("MO_BIND") {
        config.gateway.bind = bind;
    }

    let base_url = lookup("MO_IDENTITY_BASE_URL").or_else(|| lookup("ROBLE_API_BASE_URL"));
    let project = lookup("MO_IDENTITY_PROJECT").or_else(|| lookup("ROBLE_PROJECT_NAME"));
    match (&mut config.identity, base_url, project) {
        (Some(identity), base_url, project) => {
            if let Some(base_url) = base_url {
                identity.base_url = base_url;
            }
            if let Some(project) = project {
                identity.project = project;
            }
        }
        (None, Some(base_url), Some(project)) => {
            config.identity = Some(IdentityConfig {
                base_url,
                project,
                timeout_secs: 20,
            });
        }
        _ => {}
    }
}

fn validate(config: &OrchestratorConfig) -> Result<()> {
    if config.workspace_root.as_os_str().is_empty() {
        return Err(OrchestratorError::InvalidConfig(
            "workspace_root must not be empty".into(),
        ));
    }
    if config.engine.binary.trim().is_empty() {
        return Err(OrchestratorError::InvalidConfig(
            "engine.binary must not be empty".into(),
        ));
    }
    let timeouts = [
        ("engine.build_timeout_secs", config.engine.build_timeout_secs),
        ("engine.run_timeout_secs", config.engine.run_timeout_secs),
        ("engine.command_timeout_secs", config.engine.command_timeout_secs),
        ("forwarder.timeout_secs", config.forwarder.timeout_secs),
    ];
    for (field, value) in timeouts {
        if value == 0 {
            return Err(OrchestratorError::InvalidConfig(format!(
                "{field} must be greater than zero"
            )));
        }
    }
    if let Some(identity) = &config.identity {
        if identity.base_url.trim().is_empty() || identity.project.trim().is_empty() {
            return Err(OrchestratorError::InvalidConfig(
                "identity.base_url and identity.project are required".into(),
            ));
        }
    }
    Ok(())
}
