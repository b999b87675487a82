use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::OwnedMutexGuard;

use crate::error::{OrchestratorError, Result};
use crate::models::microservice::{runtime_id, validate_name};
use crate::models::{MicroserviceDefinition, MicroserviceStatus, RuntimeInstance, StopOutcome};

use super::container_driver::ContainerDriver;
use super::name_locks::NameLocks;
use super::workspace_store::WorkspaceStore;

/// Owns the lifecycle of every microservice: `Absent -> Defined ->
/// Built+Running <-> Built+Stopped`.
///
/// Running state is never cached. Every query goes to the container driver.
pub struct Orchestrator {
    store: WorkspaceStore,
    driver: Arc<dyn ContainerDriver>,
    locks: NameLocks,
}

impl Orchestrator {
    pub fn new(store: WorkspaceStore, driver: Arc<dyn ContainerDriver>) -> Self {
        Self {
            store,
            driver,
            locks: NameLocks::new(),
        }
    }

    pub fn store(&self) -> &WorkspaceStore {
        &self.store
    }

    /// Define a new microservice from a title, description and handler code.
    pub async fn create(&self, title: &str, description: &str, code: &str) -> Result<String> {
        let definition = MicroserviceDefinition::from_title(title, description, code)?;
        if definition.source_code.is_empty() {
            return Err(OrchestratorError::MissingField("code"));
        }

        let guard = self.locks.acquire(&definition.name).await;
        let result = self.store.create_definition(&definition).await;
        self.unlock(&definition.name, guard).await;
        result?;
        tracing::info!(name = %definition.name, "microservice created");
        Ok(definition.name)
    }

    /// Rebuild from current source and run a fresh container.
    ///
    /// Any previous image and container are destroyed first, so the running
    /// instance always matches what is stored. A failed build or run leaves
    /// nothing running.
    pub async fn start(&self, name: &str) -> Result<RuntimeInstance> {
        self.ensure_defined(name).await?;
        let guard = self.locks.acquire(name).await;
        let result = self.start_locked(name).await;
        self.unlock(name, guard).await;
        result
    }

    async fn start_locked(&self, name: &str) -> Result<RuntimeInstance> {
        self.ensure_defined(name).await?;

        let tag = runtime_id(name);
        let container = runtime_id(name);

        self.remove_image_best_effort(name, &tag).await;

        tracing::info!(name, image = %tag, "building image");
        if let Err(e) = self
            .driver
            .build_image(&self.store.service_path(name), &tag)
            .await
        {
            tracing::warn!(name, error = %e, "build failed");
            self.remove_container_best_effort(name, &container).await;
            return Err(e);
        }

        self.remove_container_best_effort(name, &container).await;

        let container_id = match self.driver.run_container(&tag, &container).await {
            Ok(id) => id,
            Err(e) => {
                tracing::warn!(name, error = %e, "run failed");
                self.remove_container_best_effort(name, &container).await;
                return Err(e);
            }
        };

        let host_port = match self.driver.list_running().await {
            Ok(running) => running.get(&container).copied().flatten(),
            Err(e) => {
                tracing::warn!(name, error = %e, "could not resolve host port after start");
                None
            }
        };

        tracing::info!(name, container_id = %container_id, host_port = ?host_port, "microservice running");
        Ok(RuntimeInstance {
            name: name.to_string(),
            image_tag: tag,
            container_id,
            running: true,
            host_port,
            started_at: Utc::now(),
        })
    }

    /// Remove the running container. Succeeds as a no-op if nothing is running.
    pub async fn stop(&self, name: &str) -> Result<StopOutcome> {
        self.ensure_defined(name).await?;
        let guard = self.locks.acquire(name).await;
        let result = self.stop_locked(name).await;
        self.unlock(name, guard).await;
        result
    }

    async fn stop_locked(&self, name: &str) -> Result<StopOutcome> {
        self.ensure_defined(name).await?;

        let container = runtime_id(name);
        if !self.running_containers().await?.contains_key(&container) {
            return Ok(StopOutcome::NotRunning);
        }

        self.driver
            .remove_container(&container)
            .await
            .map_err(|e| OrchestratorError::StopError {
                detail: e.to_string(),
            })?;
        tracing::info!(name, "microservice stopped");
        Ok(StopOutcome::Stopped)
    }

    /// Tear down container, image and files. Unknown names succeed.
    ///
    /// Only a failure removing the stored files is surfaced; engine cleanup
    /// failures are logged so the name becomes creatable again regardless.
    pub async fn delete(&self, name: &str) -> Result<()> {
        if validate_name(name).is_err() {
            return Ok(());
        }
        let guard = self.locks.acquire(name).await;

        let id = runtime_id(name);
        self.remove_container_best_effort(name, &id).await;
        self.remove_image_best_effort(name, &id).await;

        let result = self
            .store
            .delete(name)
            .await
            .map_err(|e| OrchestratorError::PartialDeleteFailure {
                detail: e.to_string(),
            });
        self.locks.release(name, guard);

        if result.is_ok() {
            tracing::info!(name, "microservice deleted");
        }
        result
    }

    /// Every stored microservice reconciled against the engine's live containers.
    pub async fn list(&self) -> Result<Vec<MicroserviceStatus>> {
        let names = self.store.list().await?;
        let running = self.running_containers().await?;

        let mut statuses = Vec::with_capacity(names.len());
        for name in names {
            statuses.push(self.reconcile(name, &running).await?);
        }
        Ok(statuses)
    }

    /// Live status for a single microservice.
    pub async fn status(&self, name: &str) -> Result<MicroserviceStatus> {
        self.ensure_defined(name).await?;
        let running = self.running_containers().await?;
        self.reconcile(name.to_string(), &running).await
    }

    pub async fn read_source(&self, name: &str) -> Result<String> {
        self.store.read(name).await
    }

    /// Replace the stored entry-point. A running container keeps serving the
    /// old code until the next `start`.
    pub async fn update_source(&self, name: &str, code: &str) -> Result<()> {
        if code.trim().is_empty() {
            return Err(OrchestratorError::MissingField("code"));
        }
        self.ensure_defined(name).await?;
        let guard = self.locks.acquire(name).await;
        let result = self.update_locked(name, code).await;
        self.unlock(name, guard).await;
        result
    }

    async fn update_locked(&self, name: &str, code: &str) -> Result<()> {
        self.ensure_defined(name).await?;
        self.store.update(name, code).await?;
        tracing::info!(name, "microservice source updated");
        Ok(())
    }

    async fn reconcile(
        &self,
        name: String,
        running: &HashMap<String, Option<u16>>,
    ) -> Result<MicroserviceStatus> {
        let (has_entry_point, has_build_descriptor) = self.store.inspect(&name).await?;
        let live = running.get(&runtime_id(&name));
        Ok(MicroserviceStatus {
            name,
            has_entry_point,
            has_build_descriptor,
            running: live.is_some(),
            host_port: live.copied().flatten(),
        })
    }

    /// Drop `guard`, removing the lock entry too once `name` has no stored
    /// definition. Entries only live as long as their microservice.
    async fn unlock(&self, name: &str, guard: OwnedMutexGuard<()>) {
        let defined = validate_name(name).is_ok()
            && matches!(
                tokio::fs::try_exists(self.store.service_path(name)).await,
                Ok(true)
            );
        if defined {
            drop(guard);
        } else {
            self.locks.release(name, guard);
        }
    }

    async fn ensure_defined(&self, name: &str) -> Result<()> {
        if validate_name(name).is_err()
            || !tokio::fs::try_exists(self.store.service_path(name)).await?
        {
            return Err(OrchestratorError::NotFound(name.to_string()));
        }
        Ok(())
    }

    async fn running_containers(&self) -> Result<HashMap<String, Option<u16>>> {
        self.driver.list_running().await.map_err(|e| match e {
            OrchestratorError::Engine { .. } => e,
            other => OrchestratorError::Engine {
                detail: other.to_string(),
            },
        })
    }

    async fn remove_container_best_effort(&self, name: &str, container: &str) {
        if let Err(e) = self.driver.remove_container(container).await {
            tracing::warn!(name, container, error = %e, "container cleanup failed");
        }
    }

    async fn remove_image_best_effort(&self, name: &str, tag: &str) {
        if let Err(e) = self.driver.remove_image(tag).await {
            tracing::warn!(name, image = tag, error = %e, "image cleanup failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::memory_driver::{DriverCall, MemoryDriver};

    fn setup() -> (tempfile::TempDir, Arc<MemoryDriver>, Orchestrator) {
        let dir = tempfile::tempdir().unwrap();
        let driver = Arc::new(MemoryDriver::new());
        let orchestrator = Orchestrator::new(WorkspaceStore::new(dir.path()), driver.clone());
        (dir, driver, orchestrator)
    }

    #[tokio::test]
    async fn create_rejects_empty_code_before_touching_disk() {
        let (dir, driver, orch) = setup();
        let err = orch.create("svc", "", "   ").await.unwrap_err();
        assert!(matches!(err, OrchestratorError::MissingField("code")));
        assert!(!dir.path().join("svc").exists());
        assert!(driver.calls().is_empty());
    }

    #[tokio::test]
    async fn start_follows_destroy_and_recreate_order() {
        let (_dir, driver, orch) = setup();
        orch.create("svc", "", "def root(): pass").await.unwrap();

        orch.start("svc").await.unwrap();
        assert_eq!(
            driver.calls(),
            vec![
                DriverCall::RemoveImage("mo-svc".into()),
                DriverCall::BuildImage("mo-svc".into()),
                DriverCall::RemoveContainer("mo-svc".into()),
                DriverCall::RunContainer {
                    image_tag: "mo-svc".into(),
                    container_name: "mo-svc".into(),
                },
                DriverCall::ListRunning,
            ]
        );
    }

    #[tokio::test]
    async fn start_unknown_name_is_not_found_without_engine_calls() {
        let (_dir, driver, orch) = setup();
        assert!(matches!(
            orch.start("ghost").await,
            Err(OrchestratorError::NotFound(_))
        ));
        assert!(driver.calls().is_empty());
    }

    #[tokio::test]
    async fn build_failure_leaves_nothing_running() {
        let (_dir, driver, orch) = setup();
        orch.create("svc", "", "def root(): pass").await.unwrap();
        orch.start("svc").await.unwrap();

        driver.fail_next_build("syntax error in app.py");
        let err = orch.start("svc").await.unwrap_err();
        assert!(matches!(err, OrchestratorError::BuildError { detail } if detail.contains("syntax error")));
        assert_eq!(driver.container_count(), 0);

        let status = orch.status("svc").await.unwrap();
        assert!(!status.running);
    }

    #[tokio::test]
    async fn run_failure_surfaces_run_error() {
        let (_dir, driver, orch) = setup();
        orch.create("svc", "", "def root(): pass").await.unwrap();
        driver.fail_next_run("port is already allocated");

        let err = orch.start("svc").await.unwrap_err();
        assert!(matches!(err, OrchestratorError::RunError { .. }));
        assert_eq!(driver.container_count(), 0);
    }

    #[tokio::test]
    async fn cleanup_failures_do_not_block_start() {
        let (_dir, driver, orch) = setup();
        orch.create("svc", "", "def root(): pass").await.unwrap();
        driver.fail_next_remove_image("daemon hiccup");

        let instance = orch.start("svc").await.unwrap();
        assert!(instance.running);
    }

    #[tokio::test]
    async fn stop_when_not_running_is_a_no_op() {
        let (_dir, driver, orch) = setup();
        orch.create("svc", "", "def root(): pass").await.unwrap();
        assert_eq!(orch.stop("svc").await.unwrap(), StopOutcome::NotRunning);
        assert!(!driver
            .calls()
            .iter()
            .any(|c| matches!(c, DriverCall::RemoveContainer(_))));
    }

    #[tokio::test]
    async fn stop_engine_failure_is_stop_error() {
        let (_dir, driver, orch) = setup();
        orch.create("svc", "", "def root(): pass").await.unwrap();
        orch.start("svc").await.unwrap();

        driver.fail_next_remove_container("permission denied");
        let err = orch.stop("svc").await.unwrap_err();
        assert!(matches!(err, OrchestratorError::StopError { detail } if detail.contains("permission denied")));
    }

    #[tokio::test]
    async fn delete_swallows_engine_failures() {
        let (dir, driver, orch) = setup();
        orch.create("svc", "", "def root(): pass").await.unwrap();
        orch.start("svc").await.unwrap();

        driver.fail_next_remove_container("daemon busy");
        driver.fail_next_remove_image("daemon busy");
        orch.delete("svc").await.unwrap();
        assert!(!dir.path().join("svc").exists());
        assert!(orch.locks.is_empty());
    }

    #[tokio::test]
    async fn list_reflects_engine_not_local_state() {
        let (_dir, driver, orch) = setup();
        orch.create("svc", "", "def root(): pass").await.unwrap();
        orch.start("svc").await.unwrap();

        driver.kill("mo-svc");
        let listed = orch.list().await.unwrap();
        assert_eq!(listed.len(), 1);
        assert!(!listed[0].running);
        assert_eq!(listed[0].host_port, None);
    }

    #[tokio::test]
    async fn list_surfaces_engine_errors() {
        let (_dir, driver, orch) = setup();
        orch.create("svc", "", "def root(): pass").await.unwrap();
        driver.fail_next_list("cannot connect to daemon");
        assert!(matches!(
            orch.list().await,
            Err(OrchestratorError::Engine { .. })
        ));
    }

    #[tokio::test]
    async fn update_does_not_restart() {
        let (_dir, driver, orch) = setup();
        orch.create("svc", "", "def root(): return 'v1'").await.unwrap();
        orch.start("svc").await.unwrap();
        driver.clear_calls();

        orch.update_source("svc", "def root(): return 'v2'").await.unwrap();
        assert!(driver.calls().is_empty());
        assert!(driver.running_source("mo-svc").unwrap().contains("v1"));
    }

    #[tokio::test]
    async fn failed_calls_on_unknown_names_leave_no_lock_entries() {
        let (_dir, _driver, orch) = setup();
        for i in 0..100 {
            let name = format!("ghost_{i}");
            assert!(matches!(
                orch.update_source(&name, "x").await,
                Err(OrchestratorError::NotFound(_))
            ));
            assert!(orch.start(&name).await.is_err());
            assert!(orch.stop(&name).await.is_err());
        }
        let huge = "a".repeat(100_000);
        assert!(orch.update_source(&huge, "x").await.is_err());
        assert!(orch.locks.is_empty());
    }

    #[tokio::test]
    async fn lock_entries_live_only_as_long_as_the_definition() {
        let (_dir, _driver, orch) = setup();
        orch.create("svc", "", "def root(): pass").await.unwrap();
        orch.update_source("svc", "def root(): return 2").await.unwrap();
        assert_eq!(orch.locks.len(), 1);

        orch.delete("svc").await.unwrap();
        assert!(orch.locks.is_empty());
    }

    #[tokio::test]
    async fn start_queued_behind_delete_is_not_found() {
        let (_dir, driver, orch) = setup();
        let orch = Arc::new(orch);
        orch.create("svc", "", "def root(): pass").await.unwrap();
        let hold = driver.hold_next_build();

        let first = {
            let orch = orch.clone();
            tokio::spawn(async move { orch.start("svc").await })
        };
        hold.entered().await;

        let delete = {
            let orch = orch.clone();
            tokio::spawn(async move { orch.delete("svc").await })
        };
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        let second = {
            let orch = orch.clone();
            tokio::spawn(async move { orch.start("svc").await })
        };
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert!(!delete.is_finished());
        assert!(!second.is_finished());

        hold.release();
        assert!(first.await.unwrap().is_ok());
        delete.await.unwrap().unwrap();
        assert!(matches!(
            second.await.unwrap(),
            Err(OrchestratorError::NotFound(_))
        ));
        assert_eq!(driver.container_count(), 0);
        assert!(!driver.has_image("mo-svc"));
        assert!(orch.locks.is_empty());
    }
}
