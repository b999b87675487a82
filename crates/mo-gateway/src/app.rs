use std::sync::Arc;

use mo_core::error::Result;
use mo_core::models::OrchestratorConfig;
use mo_core::services::container_driver::{ContainerDriver, DockerCliDriver};
use mo_core::services::forwarder::Forwarder;
use mo_core::services::orchestrator::Orchestrator;
use mo_core::services::workspace_store::WorkspaceStore;

use crate::identity::IdentityClient;

/// Shared handles for every route.
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,
    pub forwarder: Arc<Forwarder>,
    /// `None` when no identity provider is configured; auth routes are then absent.
    pub identity: Option<Arc<IdentityClient>>,
}

impl AppState {
    /// Wire the orchestrator to the docker CLI driver described by `config`.
    pub fn from_config(config: &OrchestratorConfig) -> color_eyre::Result<Self> {
        let driver: Arc<dyn ContainerDriver> = Arc::new(DockerCliDriver::new(&config.engine));
        let mut state = Self::with_driver(config, driver)?;
        if let Some(identity) = &config.identity {
            state.identity = Some(Arc::new(IdentityClient::new(identity)?));
        }
        Ok(state)
    }

    /// Build state around any driver. Identity is left unset.
    pub fn with_driver(
        config: &OrchestratorConfig,
        driver: Arc<dyn ContainerDriver>,
    ) -> Result<Self> {
        let store = WorkspaceStore::new(config.workspace_root.clone());
        let orchestrator = Arc::new(Orchestrator::new(store, driver));
        let forwarder = Arc::new(Forwarder::new(orchestrator.clone(), &config.forwarder)?);
        Ok(Self {
            orchestrator,
            forwarder,
            identity: None,
        })
    }

    pub fn with_identity(mut self, identity: IdentityClient) -> Self {
        self.identity = Some(Arc::new(identity));
        self
    }
}
