use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{OrchestratorError, Result};

/// Prefix shared by every image tag and container name this orchestrator owns.
pub const RUNTIME_PREFIX: &str = "mo-";

const MAX_NAME_LEN: usize = 63;

static NAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z0-9][a-z0-9_.-]*$").unwrap());

/// A user-authored service as it exists in the workspace store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct MicroserviceDefinition {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub source_code: String,
}

impl MicroserviceDefinition {
    /// Build a definition from a user-supplied title, deriving and validating the name.
    pub fn from_title(title: &str, description: &str, source_code: &str) -> Result<Self> {
        let description = description.trim();
        Ok(Self {
            name: derive_name(title)?,
            description: (!description.is_empty()).then(|| description.to_string()),
            source_code: source_code.trim().to_string(),
        })
    }

    pub fn image_tag(&self) -> String {
        runtime_id(&self.name)
    }

    pub fn container_name(&self) -> String {
        runtime_id(&self.name)
    }
}

/// A live container derived from a definition. Never persisted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RuntimeInstance {
    pub name: String,
    pub image_tag: String,
    pub container_id: String,
    pub running: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host_port: Option<u16>,
    pub started_at: DateTime<Utc>,
}

/// One row of the reconciled listing: stored files plus live engine state.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct MicroserviceStatus {
    pub name: String,
    pub has_entry_point: bool,
    pub has_build_descriptor: bool,
    pub running: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host_port: Option<u16>,
}

/// Result of a stop request.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum StopOutcome {
    Stopped,
    NotRunning,
}

/// Derive the stored name from a title: trimmed, lowercased, spaces become underscores.
pub fn derive_name(title: &str) -> Result<String> {
    let name = title.trim().to_lowercase().replace(' ', "_");
    validate_name(&name)?;
    Ok(name)
}

/// Check that a name is usable as both a directory and a container-engine token.
pub fn validate_name(name: &str) -> Result<()> {
    if name.len() > MAX_NAME_LEN || !NAME_RE.is_match(name) {
        return Err(OrchestratorError::InvalidName(name.to_string()));
    }
    Ok(())
}

/// Deterministic image tag / container name for a microservice.
pub fn runtime_id(name: &str) -> String {
    format!("{RUNTIME_PREFIX}{name}")
}
