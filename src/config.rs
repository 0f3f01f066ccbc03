use crate::port_spec::Protocol;

/// Restart policy applied to a newly created container
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestartPolicy {
    No,
    Always,
    OnFailure,
    /// Restart unless the container was manually stopped
    UnlessStopped,
}

impl RestartPolicy {
    /// Name understood by the runtime API
    pub fn as_str(&self) -> &'static str {
        match self {
            RestartPolicy::No => "no",
            RestartPolicy::Always => "always",
            RestartPolicy::OnFailure => "on-failure",
            RestartPolicy::UnlessStopped => "unless-stopped",
        }
    }
}

/// Desired state of the single container managed by the reconciler
#[derive(Debug, Clone)]
pub struct ReconcilerConfig {
    /// Container name without the runtime's leading `/`
    pub container_name: String,
    /// Image reference used when the container has to be created
    pub image: String,
    /// Container-side port to expose and look up
    pub container_port: u16,
    /// Protocol of the exposed port
    pub protocol: Protocol,
    pub restart_policy: RestartPolicy,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            container_name: "nginx-test".to_string(),
            image: "nginx".to_string(),
            container_port: 80,
            protocol: Protocol::Tcp,
            restart_policy: RestartPolicy::UnlessStopped,
        }
    }
}

impl ReconcilerConfig {
    /// Name as reported by the runtime's container list, e.g. `/nginx-test`
    pub fn match_name(&self) -> String {
        format!("/{}", self.container_name)
    }

    /// Port spec in `<port>/<proto>` form, e.g. `80/tcp`
    pub fn port_spec(&self) -> String {
        format!("{}/{}", self.container_port, self.protocol)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ReconcilerConfig::default();
        assert_eq!(config.container_name, "nginx-test");
        assert_eq!(config.image, "nginx");
        assert_eq!(config.match_name(), "/nginx-test");
        assert_eq!(config.port_spec(), "80/tcp");
        assert_eq!(config.restart_policy.as_str(), "unless-stopped");
    }

    #[test]
    fn test_restart_policy_names() {
        assert_eq!(RestartPolicy::No.as_str(), "no");
        assert_eq!(RestartPolicy::Always.as_str(), "always");
        assert_eq!(RestartPolicy::OnFailure.as_str(), "on-failure");
    }
}
