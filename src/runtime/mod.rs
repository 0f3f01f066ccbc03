//! Container runtime control API
//!
//! The reconciler only needs list, inspect, create, start and remove. This
//! module defines the records exchanged over that API and the trait the
//! reconciler drives; `docker` provides the Docker Engine implementation.

pub mod docker;

pub use docker::DockerRuntime;

use crate::config::RestartPolicy;
use crate::port_spec::{PortBindingMap, PortSpec};

/// Errors returned by a container runtime
#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    #[error("Docker API error: {0}")]
    Docker(#[from] bollard::errors::Error),
    #[error("Runtime response is missing {0}")]
    MissingField(&'static str),
    #[error("Runtime error: {0}")]
    Other(String),
}

/// Runtime-reported summary of an existing container
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContainerRecord {
    pub id: String,
    /// Names as the runtime reports them, each with a leading `/`
    pub names: Vec<String>,
    pub state: Option<String>,
}

impl ContainerRecord {
    /// The first reported name, which is the one used for matching
    pub fn primary_name(&self) -> Option<&str> {
        self.names.first().map(String::as_str)
    }
}

/// Everything needed to create the managed container
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DesiredContainerSpec {
    pub name: String,
    pub image: String,
    pub restart_policy: RestartPolicy,
    pub ports: PortSpec,
}

/// Trait for container runtime operations used during reconciliation
#[async_trait::async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// List containers; `all` includes stopped ones
    async fn list_containers(&self, all: bool) -> Result<Vec<ContainerRecord>, RuntimeError>;

    /// Current port bindings of a container
    async fn inspect_port_bindings(&self, id: &str) -> Result<PortBindingMap, RuntimeError>;

    /// Create a container and return its identifier
    async fn create_container(&self, spec: &DesiredContainerSpec) -> Result<String, RuntimeError>;

    async fn start_container(&self, id: &str) -> Result<(), RuntimeError>;

    /// Force-remove a container
    async fn remove_container(&self, id: &str) -> Result<(), RuntimeError>;
}
