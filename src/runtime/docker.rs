//! Docker Engine implementation of the container runtime API

use bollard::container::{
    Config, CreateContainerOptions, ListContainersOptions, RemoveContainerOptions,
};
use bollard::models::{
    ContainerSummary, HostConfig, PortBinding, PortMap, RestartPolicy as DockerRestartPolicy,
    RestartPolicyNameEnum,
};
use bollard::Docker;
use std::collections::HashMap;

use super::{ContainerRecord, ContainerRuntime, DesiredContainerSpec, RuntimeError};
use crate::config::RestartPolicy;
use crate::port_spec::{HostBinding, PortBindingMap, PortKey};

/// Container runtime backed by a Docker daemon
#[derive(Clone)]
pub struct DockerRuntime {
    docker: Docker,
}

impl DockerRuntime {
    pub fn new(docker: Docker) -> Self {
        Self { docker }
    }

    /// Connect using the environment (`DOCKER_HOST` or the local socket)
    /// and negotiate the API version with the daemon
    pub async fn connect() -> Result<Self, RuntimeError> {
        let docker = Docker::connect_with_local_defaults()?
            .negotiate_version()
            .await?;
        Ok(Self::new(docker))
    }
}

#[async_trait::async_trait]
impl ContainerRuntime for DockerRuntime {
    async fn list_containers(&self, all: bool) -> Result<Vec<ContainerRecord>, RuntimeError> {
        let options = ListContainersOptions::<String> {
            all,
            ..Default::default()
        };
        let containers = self.docker.list_containers(Some(options)).await?;

        Ok(containers.into_iter().filter_map(record_from_summary).collect())
    }

    async fn inspect_port_bindings(&self, id: &str) -> Result<PortBindingMap, RuntimeError> {
        let inspect = self.docker.inspect_container(id, None::<bollard::query_parameters::InspectContainerOptions>).await?;

        Ok(inspect
            .network_settings
            .and_then(|settings| settings.ports)
            .map(port_bindings_from_map)
            .unwrap_or_default())
    }

    async fn create_container(&self, spec: &DesiredContainerSpec) -> Result<String, RuntimeError> {
        let options = CreateContainerOptions {
            name: spec.name.clone(),
            ..Default::default()
        };

        let response = self
            .docker
            .create_container(Some(options), container_config(spec))
            .await?;

        if response.id.is_empty() {
            return Err(RuntimeError::MissingField("container id"));
        }
        for warning in &response.warnings {
            log::warn!("Runtime warning while creating '{}': {}", spec.name, warning);
        }

        Ok(response.id)
    }

    async fn start_container(&self, id: &str) -> Result<(), RuntimeError> {
        self.docker.start_container(id, None::<bollard::query_parameters::StartContainerOptions>).await?;
        Ok(())
    }

    async fn remove_container(&self, id: &str) -> Result<(), RuntimeError> {
        let options = RemoveContainerOptions {
            force: true,
            ..Default::default()
        };
        self.docker.remove_container(id, Some(options)).await?;
        Ok(())
    }
}

fn record_from_summary(summary: ContainerSummary) -> Option<ContainerRecord> {
    let Some(id) = summary.id else {
        log::warn!("Skipping container without an id: {:?}", summary.names);
        return None;
    };

    Some(ContainerRecord {
        id,
        names: summary.names.unwrap_or_default(),
        state: summary.state.map(|state| state.to_string()),
    })
}

/// Convert the runtime's port map, skipping keys that are not `<port>/<proto>`
fn port_bindings_from_map(ports: PortMap) -> PortBindingMap {
    let mut bindings = PortBindingMap::new();

    for (raw_key, host_bindings) in ports {
        let key = match raw_key.parse::<PortKey>() {
            Ok(key) => key,
            Err(e) => {
                log::debug!("Ignoring port map entry '{}': {}", raw_key, e);
                continue;
            }
        };

        let host_bindings = host_bindings
            .unwrap_or_default()
            .into_iter()
            .map(|binding| HostBinding {
                host_ip: binding.host_ip.unwrap_or_default(),
                host_port: binding.host_port.unwrap_or_default(),
            })
            .collect();

        bindings.entry(key).or_insert(host_bindings);
    }

    bindings
}

fn port_map_from_bindings(bindings: &PortBindingMap) -> PortMap {
    bindings
        .iter()
        .map(|(key, host_bindings)| {
            let host_bindings = host_bindings
                .iter()
                .map(|binding| PortBinding {
                    host_ip: non_empty(&binding.host_ip),
                    host_port: non_empty(&binding.host_port),
                })
                .collect();
            (key.to_string(), Some(host_bindings))
        })
        .collect()
}

fn non_empty(value: &str) -> Option<String> {
    (!value.is_empty()).then(|| value.to_string())
}

fn restart_policy_name(policy: RestartPolicy) -> RestartPolicyNameEnum {
    match policy {
        RestartPolicy::No => RestartPolicyNameEnum::NO,
        RestartPolicy::Always => RestartPolicyNameEnum::ALWAYS,
        RestartPolicy::OnFailure => RestartPolicyNameEnum::ON_FAILURE,
        RestartPolicy::UnlessStopped => RestartPolicyNameEnum::UNLESS_STOPPED,
    }
}

fn container_config(spec: &DesiredContainerSpec) -> Config<String> {
    let host_config = HostConfig {
        restart_policy: Some(DockerRestartPolicy {
            name: Some(restart_policy_name(spec.restart_policy)),
            ..Default::default()
        }),
        port_bindings: Some(port_map_from_bindings(&spec.ports.bindings)),
        ..Default::default()
    };

    Config {
        image: Some(spec.image.clone()),
        exposed_ports: Some(
            spec.ports
                .exposed
                .iter()
                .map(|key| (key.to_string(), HashMap::new()))
                .collect(),
        ),
        host_config: Some(host_config),
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::port_spec::parse_port_specs;

    fn nginx_spec() -> DesiredContainerSpec {
        DesiredContainerSpec {
            name: "nginx-test".to_string(),
            image: "nginx".to_string(),
            restart_policy: RestartPolicy::UnlessStopped,
            ports: parse_port_specs(&["80/tcp"]).unwrap(),
        }
    }

    #[test]
    fn test_container_config_from_spec() {
        let config = container_config(&nginx_spec());

        assert_eq!(config.image, Some("nginx".to_string()));
        let exposed = config.exposed_ports.unwrap();
        assert_eq!(exposed.len(), 1);
        assert!(exposed.contains_key("80/tcp"));

        let host_config = config.host_config.unwrap();
        assert_eq!(
            host_config.restart_policy.unwrap().name,
            Some(RestartPolicyNameEnum::UNLESS_STOPPED)
        );
        let port_bindings = host_config.port_bindings.unwrap();
        assert_eq!(
            port_bindings.get("80/tcp"),
            Some(&Some(vec![PortBinding {
                host_ip: None,
                host_port: None,
            }]))
        );
    }

    #[test]
    fn test_restart_policy_names() {
        assert_eq!(restart_policy_name(RestartPolicy::No), RestartPolicyNameEnum::NO);
        assert_eq!(
            restart_policy_name(RestartPolicy::Always),
            RestartPolicyNameEnum::ALWAYS
        );
        assert_eq!(
            restart_policy_name(RestartPolicy::OnFailure),
            RestartPolicyNameEnum::ON_FAILURE
        );
        assert_eq!(
            restart_policy_name(RestartPolicy::UnlessStopped),
            RestartPolicyNameEnum::UNLESS_STOPPED
        );
    }

    #[test]
    fn test_port_bindings_from_map() {
        let mut ports: PortMap = HashMap::new();
        ports.insert(
            "80/tcp".to_string(),
            Some(vec![PortBinding {
                host_ip: Some("0.0.0.0".to_string()),
                host_port: Some("32768".to_string()),
            }]),
        );
        ports.insert("443/tcp".to_string(), None);
        ports.insert("not-a-port".to_string(), None);

        let bindings = port_bindings_from_map(ports);

        assert_eq!(bindings.len(), 2);
        assert_eq!(
            bindings[&PortKey::tcp(80)],
            vec![HostBinding::new("0.0.0.0", "32768")]
        );
        assert!(bindings[&PortKey::tcp(443)].is_empty());
    }

    #[test]
    fn test_record_from_summary() {
        let summary = ContainerSummary {
            id: Some("xyz".to_string()),
            names: Some(vec!["/nginx-test".to_string()]),
            ..Default::default()
        };
        let record = record_from_summary(summary).unwrap();
        assert_eq!(record.id, "xyz");
        assert_eq!(record.primary_name(), Some("/nginx-test"));

        assert!(record_from_summary(ContainerSummary::default()).is_none());
    }
}
