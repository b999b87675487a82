use std::collections::HashMap;
use std::path::Path;
use std::process::Stdio;
use std::sync::LazyLock;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use tokio::process::Command;

use crate::error::{OrchestratorError, Result};
use crate::models::EngineConfig;
use crate::services::scaffold::SERVICE_PORT;

/// Label attached to every container we start; `list_running` filters on it.
pub const MANAGED_LABEL: &str = "mo.managed=true";

static PORT_MAPPING_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r":(\d+)->(\d+)/tcp").unwrap());

/// Lifecycle primitives of the container engine.
///
/// `remove_image` and `remove_container` treat absence as success, so every
/// "ensure gone" step can be retried after a partial failure.
#[async_trait]
pub trait ContainerDriver: Send + Sync {
    /// Build `image_tag` from `source_path`, never reusing layer cache.
    async fn build_image(&self, source_path: &Path, image_tag: &str) -> Result<()>;

    async fn remove_image(&self, image_tag: &str) -> Result<()>;

    /// Start a detached container with the service port published on an
    /// engine-chosen host port. Returns the container id.
    async fn run_container(&self, image_tag: &str, container_name: &str) -> Result<String>;

    /// Force stop and remove.
    async fn remove_container(&self, container_name: &str) -> Result<()>;

    /// Live containers keyed by name, with their published host port if any.
    async fn list_running(&self) -> Result<HashMap<String, Option<u16>>>;
}

/// Drives the engine through its command-line client.
pub struct DockerCliDriver {
    binary: String,
    publish_address: String,
    build_timeout: Duration,
    run_timeout: Duration,
    command_timeout: Duration,
}

impl DockerCliDriver {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            binary: config.binary.clone(),
            publish_address: config.publish_address.clone(),
            build_timeout: config.build_timeout(),
            run_timeout: config.run_timeout(),
            command_timeout: config.command_timeout(),
        }
    }

    /// Run one engine command. On failure the error string carries the exit
    /// code and captured stderr.
    async fn run_engine(&self, args: &[&str], timeout: Duration) -> std::result::Result<String, String> {
        tracing::debug!(binary = %self.binary, args = ?args, "engine command");
        let mut cmd = Command::new(&self.binary);
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output = match tokio::time::timeout(timeout, cmd.output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => return Err(format!("failed to run {}: {e}", self.binary)),
            Err(_) => {
                return Err(format!(
                    "{} {} timed out after {}s",
                    self.binary,
                    args.first().copied().unwrap_or_default(),
                    timeout.as_secs()
                ))
            }
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(format!(
                "{} {} failed (exit {}): {}",
                self.binary,
                args.join(" "),
                output.status.code().unwrap_or(-1),
                stderr.trim()
            ));
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    fn publish_spec(&self) -> String {
        if self.publish_address.is_empty() {
            SERVICE_PORT.to_string()
        } else {
            format!("{}::{SERVICE_PORT}", self.publish_address)
        }
    }
}

#[async_trait]
impl ContainerDriver for DockerCliDriver {
    async fn build_image(&self, source_path: &Path, image_tag: &str) -> Result<()> {
        let path = source_path.to_string_lossy();
        self.run_engine(
            &["build", "--no-cache", "-t", image_tag, &path],
            self.build_timeout,
        )
        .await
        .map_err(|detail| OrchestratorError::BuildError { detail })?;
        Ok(())
    }

    async fn remove_image(&self, image_tag: &str) -> Result<()> {
        match self
            .run_engine(&["rmi", "-f", image_tag], self.command_timeout)
            .await
        {
            Ok(_) => Ok(()),
            Err(detail) if is_absent(&detail) => Ok(()),
            Err(detail) => Err(OrchestratorError::Engine { detail }),
        }
    }

    async fn run_container(&self, image_tag: &str, container_name: &str) -> Result<String> {
        let publish = self.publish_spec();
        let container_id = self
            .run_engine(
                &[
                    "run",
                    "-d",
                    "--name",
                    container_name,
                    "--label",
                    MANAGED_LABEL,
                    "-p",
                    &publish,
                    image_tag,
                ],
                self.run_timeout,
            )
            .await
            .map_err(|detail| OrchestratorError::RunError { detail })?;
        Ok(container_id)
    }

    async fn remove_container(&self, container_name: &str) -> Result<()> {
        match self
            .run_engine(&["rm", "-f", container_name], self.command_timeout)
            .await
        {
            Ok(_) => Ok(()),
            Err(detail) if is_absent(&detail) => Ok(()),
            Err(detail) => Err(OrchestratorError::Engine { detail }),
        }
    }

    async fn list_running(&self) -> Result<HashMap<String, Option<u16>>> {
        let label_filter = format!("label={MANAGED_LABEL}");
        let output = self
            .run_engine(
                &[
                    "ps",
                    "--filter",
                    &label_filter,
                    "--format",
                    "{{.Names}}\t{{.Ports}}",
                ],
                self.command_timeout,
            )
            .await
            .map_err(|detail| OrchestratorError::Engine { detail })?;
        Ok(parse_ps_output(&output, SERVICE_PORT))
    }
}

fn is_absent(detail: &str) -> bool {
    let lowered = detail.to_lowercase();
    lowered.contains("no such container") || lowered.contains("no such image")
}

/// Parse `NAME<TAB>PORTS` lines from `ps --format`.
pub fn parse_ps_output(output: &str, internal_port: u16) -> HashMap<String, Option<u16>> {
    output
        .lines()
        .filter(|l| !l.trim().is_empty())
        .map(|line| {
            let (name, ports) = line.split_once('\t').unwrap_or((line, ""));
            (name.trim().to_string(), parse_host_port(ports, internal_port))
        })
        .collect()
}

/// Host port published for `internal_port`, e.g. `0.0.0.0:49153->8000/tcp`.
pub fn parse_host_port(ports: &str, internal_port: u16) -> Option<u16> {
    PORT_MAPPING_RE.captures_iter(ports).find_map(|caps| {
        let container_port: u16 = caps[2].parse().ok()?;
        if container_port != internal_port {
            return None;
        }
        caps[1].parse().ok()
    })
}
