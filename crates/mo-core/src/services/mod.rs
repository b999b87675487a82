pub mod config_loader;
pub mod container_driver;
pub mod forwarder;
#[cfg(any(test, feature = "testing"))]
pub mod memory_driver;
pub mod name_locks;
pub mod orchestrator;
pub mod scaffold;
pub mod workspace_store;
