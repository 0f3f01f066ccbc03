//! Ensure-container reconciliation
//!
//! Compares the desired container against what the runtime reports and takes
//! the smallest step needed: report the port of an existing container, or
//! create and start a new one. Nothing is kept between runs; the runtime's
//! container registry is the only durable state.

use std::fmt;
use std::future::Future;

use tokio_util::sync::CancellationToken;

use crate::config::ReconcilerConfig;
use crate::port_spec::{host_port_for, parse_port_specs, PortKey, PortSpecError};
use crate::runtime::{ContainerRecord, ContainerRuntime, DesiredContainerSpec, RuntimeError};

/// Step of the reconciliation at which a failure happened
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    List,
    Inspect,
    ParsePortSpec,
    Create,
    Start,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::List => "list",
            Stage::Inspect => "inspect",
            Stage::ParsePortSpec => "parse port spec",
            Stage::Create => "create",
            Stage::Start => "start",
        };
        f.write_str(name)
    }
}

/// Errors that abort a reconciliation attempt
#[derive(Debug, thiserror::Error)]
pub enum ReconcileError {
    #[error("Failed to list containers: {0}")]
    List(#[source] RuntimeError),
    #[error("Failed to inspect container {id}: {source}")]
    Inspect { id: String, source: RuntimeError },
    #[error("Failed to parse port spec: {0}")]
    ParsePortSpec(#[from] PortSpecError),
    #[error("Failed to create container {name}: {source}")]
    Create { name: String, source: RuntimeError },
    #[error("Failed to start container {id}: {source}")]
    Start { id: String, source: RuntimeError },
    #[error("Reconciliation cancelled during {stage}")]
    Cancelled { stage: Stage },
}

impl ReconcileError {
    pub fn stage(&self) -> Stage {
        match self {
            ReconcileError::List(_) => Stage::List,
            ReconcileError::Inspect { .. } => Stage::Inspect,
            ReconcileError::ParsePortSpec(_) => Stage::ParsePortSpec,
            ReconcileError::Create { .. } => Stage::Create,
            ReconcileError::Start { .. } => Stage::Start,
            ReconcileError::Cancelled { stage } => *stage,
        }
    }
}

/// Result of a successful reconciliation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// A container with the desired name exists; it was left untouched
    AlreadyRunning {
        container_id: String,
        /// `None` when the container does not publish the requested port
        host_port: Option<String>,
    },
    /// No container existed, so one was created and started
    Created { container_id: String },
}

pub struct Reconciler<R> {
    runtime: R,
    config: ReconcilerConfig,
}

impl<R: ContainerRuntime> Reconciler<R> {
    pub fn new(runtime: R, config: ReconcilerConfig) -> Self {
        Self { runtime, config }
    }

    /// Run one reconciliation pass
    pub async fn reconcile(&self, cancel: &CancellationToken) -> Result<Outcome, ReconcileError> {
        let containers = guard(cancel, Stage::List, self.runtime.list_containers(true))
            .await?
            .map_err(ReconcileError::List)?;

        match self.find_existing(&containers) {
            Some(existing) => self.report_existing(existing, cancel).await,
            None => self.create_and_start(cancel).await,
        }
    }

    fn find_existing<'a>(&self, containers: &'a [ContainerRecord]) -> Option<&'a ContainerRecord> {
        let wanted = self.config.match_name();
        let mut matches = containers
            .iter()
            .filter(|c| c.primary_name() == Some(wanted.as_str()));

        let first = matches.next()?;
        let duplicates: Vec<&str> = matches.map(|c| c.id.as_str()).collect();
        if !duplicates.is_empty() {
            log::warn!(
                "Multiple containers named {}, using {} and ignoring {:?}",
                wanted,
                first.id,
                duplicates
            );
        }

        Some(first)
    }

    async fn report_existing(
        &self,
        existing: &ContainerRecord,
        cancel: &CancellationToken,
    ) -> Result<Outcome, ReconcileError> {
        log::info!("Container already started: checking the exposed port");

        let bindings = guard(
            cancel,
            Stage::Inspect,
            self.runtime.inspect_port_bindings(&existing.id),
        )
        .await?
        .map_err(|source| ReconcileError::Inspect {
            id: existing.id.clone(),
            source,
        })?;

        let key = PortKey::new(self.config.container_port, self.config.protocol);
        log::info!("Looking for the host port for {} in container", key);

        let host_port = host_port_for(&bindings, key).map(str::to_string);
        match &host_port {
            Some(port) => log::info!("Found mapped port {} -> {}/{}", key, port, key.protocol),
            None => log::warn!("Container {} does not publish {}", existing.id, key),
        }

        Ok(Outcome::AlreadyRunning {
            container_id: existing.id.clone(),
            host_port,
        })
    }

    async fn create_and_start(&self, cancel: &CancellationToken) -> Result<Outcome, ReconcileError> {
        let spec = DesiredContainerSpec {
            name: self.config.container_name.clone(),
            image: self.config.image.clone(),
            restart_policy: self.config.restart_policy,
            ports: parse_port_specs(&[self.config.port_spec()])?,
        };

        if cancel.is_cancelled() {
            return Err(ReconcileError::Cancelled {
                stage: Stage::Create,
            });
        }

        // Create is never interrupted; a cancel that lands meanwhile discards
        // the new container below.
        let container_id = self
            .runtime
            .create_container(&spec)
            .await
            .map_err(|source| ReconcileError::Create {
                name: spec.name.clone(),
                source,
            })?;
        log::debug!("Created container {} with id {}", spec.name, container_id);

        if cancel.is_cancelled() {
            self.discard(&container_id).await;
            return Err(ReconcileError::Cancelled {
                stage: Stage::Create,
            });
        }

        let started = guard(cancel, Stage::Start, self.runtime.start_container(&container_id))
            .await
            .and_then(|result| {
                result.map_err(|source| ReconcileError::Start {
                    id: container_id.clone(),
                    source,
                })
            });

        if let Err(e) = started {
            self.discard(&container_id).await;
            return Err(e);
        }

        log::info!("Container '{}' started with ID: {}", spec.name, container_id);
        Ok(Outcome::Created { container_id })
    }

    /// Remove a container that was created but never started
    async fn discard(&self, container_id: &str) {
        match self.runtime.remove_container(container_id).await {
            Ok(()) => log::info!("Removed unstarted container {}", container_id),
            Err(e) => log::error!(
                "Failed to remove unstarted container {}, it is left behind: {}",
                container_id,
                e
            ),
        }
    }
}

/// Race a runtime call against cancellation
async fn guard<T>(
    cancel: &CancellationToken,
    stage: Stage,
    call: impl Future<Output = T>,
) -> Result<T, ReconcileError> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(ReconcileError::Cancelled { stage }),
        result = call => Ok(result),
    }
}
