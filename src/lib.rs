pub mod config;
pub mod port_spec;
pub mod reconciler;
pub mod runtime;

pub use config::{ReconcilerConfig, RestartPolicy};
pub use port_spec::{parse_port_specs, HostBinding, PortKey, PortSpec, PortSpecError, Protocol};
pub use reconciler::{Outcome, ReconcileError, Reconciler, Stage};
pub use runtime::{ContainerRecord, ContainerRuntime, DesiredContainerSpec, DockerRuntime, RuntimeError};
