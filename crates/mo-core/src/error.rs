use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum OrchestratorError {
    #[error("invalid microservice name '{0}'")]
    InvalidName(String),

    #[error("microservice '{0}' already exists")]
    AlreadyExists(String),

    #[error("microservice '{0}' not found")]
    NotFound(String),

    #[error("missing required field '{0}'")]
    MissingField(&'static str),

    #[error("image build failed: {detail}")]
    BuildError { detail: String },

    #[error("container run failed: {detail}")]
    RunError { detail: String },

    #[error("container stop failed: {detail}")]
    StopError { detail: String },

    #[error("microservice '{0}' is not running")]
    NotRunning(String),

    #[error("microservice '{0}' is running but has no published port")]
    PortUnavailable(String),

    #[error("microservice unreachable: {detail}")]
    UpstreamUnreachable { detail: String },

    #[error("failed to remove microservice files: {detail}")]
    PartialDeleteFailure { detail: String },

    #[error("container engine query failed: {detail}")]
    Engine { detail: String },

    #[error("config file not found at {0}")]
    ConfigNotFound(PathBuf),

    #[error("invalid config: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),
}

pub type Result<T> = std::result::Result<T, OrchestratorError>;
