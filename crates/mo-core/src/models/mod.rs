pub mod config;
pub mod microservice;

pub use config::{EngineConfig, ForwarderConfig, GatewayConfig, IdentityConfig, OrchestratorConfig};
pub use microservice::{
    MicroserviceDefinition, MicroserviceStatus, RuntimeInstance, StopOutcome,
};
