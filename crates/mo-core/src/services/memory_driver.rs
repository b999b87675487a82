//! In-memory [`ContainerDriver`] used to exercise the orchestrator without a
//! container engine.

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use tokio::sync::Notify;

use super::container_driver::ContainerDriver;
use super::scaffold::ENTRY_POINT_FILE;
use crate::error::{OrchestratorError, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DriverCall {
    BuildImage(String),
    RemoveImage(String),
    RunContainer { image_tag: String, container_name: String },
    RemoveContainer(String),
    ListRunning,
}

/// Pauses the next `build_image` until released.
#[derive(Debug, Clone, Default)]
pub struct BuildHold {
    entered: Arc<Notify>,
    release: Arc<Notify>,
}

impl BuildHold {
    /// Resolves once the held build has started.
    pub async fn entered(&self) {
        self.entered.notified().await;
    }

    pub fn release(&self) {
        self.release.notify_one();
    }
}

#[derive(Debug, Clone)]
struct FakeContainer {
    id: String,
    host_port: Option<u16>,
    /// Entry-point text baked into the image the container was started from.
    source: String,
}

#[derive(Default)]
struct MemoryState {
    /// image tag -> entry-point text captured at build time
    images: HashMap<String, String>,
    containers: HashMap<String, FakeContainer>,
    calls: Vec<DriverCall>,
    fixed_ports: HashMap<String, u16>,
    unpublished: HashSet<String>,
    next_port: u16,
    next_id: u64,
    fail_build: Option<String>,
    fail_run: Option<String>,
    fail_remove_container: Option<String>,
    fail_remove_image: Option<String>,
    fail_list: Option<String>,
    build_hold: Option<BuildHold>,
}

#[derive(Default)]
pub struct MemoryDriver {
    state: Mutex<MemoryState>,
}

impl MemoryDriver {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn calls(&self) -> Vec<DriverCall> {
        self.state().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.state().calls.clear();
    }

    pub fn has_image(&self, image_tag: &str) -> bool {
        self.state().images.contains_key(image_tag)
    }

    pub fn container_count(&self) -> usize {
        self.state().containers.len()
    }

    /// Entry-point text the named container is running, if it exists.
    pub fn running_source(&self, container_name: &str) -> Option<String> {
        self.state()
            .containers
            .get(container_name)
            .map(|c| c.source.clone())
    }

    /// Publish `container_name` on a specific host port, e.g. a local test server.
    pub fn set_host_port(&self, container_name: &str, port: u16) {
        self.state()
            .fixed_ports
            .insert(container_name.to_string(), port);
    }

    /// Start future containers with this name without any published port.
    pub fn leave_unpublished(&self, container_name: &str) {
        self.state().unpublished.insert(container_name.to_string());
    }

    /// Simulate a container dying outside the orchestrator's control.
    pub fn kill(&self, container_name: &str) {
        self.state().containers.remove(container_name);
    }

    pub fn fail_next_build(&self, detail: &str) {
        self.state().fail_build = Some(detail.to_string());
    }

    pub fn fail_next_run(&self, detail: &str) {
        self.state().fail_run = Some(detail.to_string());
    }

    pub fn fail_next_remove_container(&self, detail: &str) {
        self.state().fail_remove_container = Some(detail.to_string());
    }

    pub fn fail_next_remove_image(&self, detail: &str) {
        self.state().fail_remove_image = Some(detail.to_string());
    }

    pub fn fail_next_list(&self, detail: &str) {
        self.state().fail_list = Some(detail.to_string());
    }

    /// Block the next build mid-flight until [`BuildHold::release`].
    pub fn hold_next_build(&self) -> BuildHold {
        let hold = BuildHold::default();
        self.state().build_hold = Some(hold.clone());
        hold
    }
}

#[async_trait]
impl ContainerDriver for MemoryDriver {
    async fn build_image(&self, source_path: &Path, image_tag: &str) -> Result<()> {
        let hold = self.state().build_hold.take();
        if let Some(hold) = hold {
            hold.entered.notify_one();
            hold.release.notified().await;
        }
        let source = tokio::fs::read_to_string(source_path.join(ENTRY_POINT_FILE)).await;
        let mut state = self.state();
        state.calls.push(DriverCall::BuildImage(image_tag.to_string()));
        if let Some(detail) = state.fail_build.take() {
            return Err(OrchestratorError::BuildError { detail });
        }
        let source = source.map_err(|e| OrchestratorError::BuildError {
            detail: format!("missing build context: {e}"),
        })?;
        state.images.insert(image_tag.to_string(), source);
        Ok(())
    }

    async fn remove_image(&self, image_tag: &str) -> Result<()> {
        let mut state = self.state();
        state.calls.push(DriverCall::RemoveImage(image_tag.to_string()));
        if let Some(detail) = state.fail_remove_image.take() {
            return Err(OrchestratorError::Engine { detail });
        }
        state.images.remove(image_tag);
        Ok(())
    }

    async fn run_container(&self, image_tag: &str, container_name: &str) -> Result<String> {
        let mut state = self.state();
        state.calls.push(DriverCall::RunContainer {
            image_tag: image_tag.to_string(),
            container_name: container_name.to_string(),
        });
        if let Some(detail) = state.fail_run.take() {
            return Err(OrchestratorError::RunError { detail });
        }
        if state.containers.contains_key(container_name) {
            return Err(OrchestratorError::RunError {
                detail: format!("container name \"{container_name}\" is already in use"),
            });
        }
        let source = state
            .images
            .get(image_tag)
            .cloned()
            .ok_or_else(|| OrchestratorError::RunError {
                detail: format!("unable to find image '{image_tag}'"),
            })?;

        state.next_id += 1;
        let id = format!("{:064x}", state.next_id);
        let host_port = if state.unpublished.contains(container_name) {
            None
        } else if let Some(port) = state.fixed_ports.get(container_name) {
            Some(*port)
        } else {
            state.next_port = state.next_port.max(49152) + 1;
            Some(state.next_port)
        };
        state.containers.insert(
            container_name.to_string(),
            FakeContainer {
                id: id.clone(),
                host_port,
                source,
            },
        );
        Ok(id)
    }

    async fn remove_container(&self, container_name: &str) -> Result<()> {
        let mut state = self.state();
        state
            .calls
            .push(DriverCall::RemoveContainer(container_name.to_string()));
        if let Some(detail) = state.fail_remove_container.take() {
            return Err(OrchestratorError::Engine { detail });
        }
        state.containers.remove(container_name);
        Ok(())
    }

    async fn list_running(&self) -> Result<HashMap<String, Option<u16>>> {
        let mut state = self.state();
        state.calls.push(DriverCall::ListRunning);
        if let Some(detail) = state.fail_list.take() {
            return Err(OrchestratorError::Engine { detail });
        }
        Ok(state
            .containers
            .iter()
            .map(|(name, c)| (name.clone(), c.host_port))
            .collect())
    }
}
