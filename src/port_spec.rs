//! Port specification parsing
//!
//! Turns publish specs of the form `[[ip:][hostPort]:]containerPort[/proto]`
//! into the two shapes the runtime API wants: the set of exposed container
//! ports and the map from container port to requested host bindings.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;

/// Errors that can occur while parsing a port spec
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PortSpecError {
    #[error("Empty port spec")]
    Empty,
    #[error("No container port specified in '{0}'")]
    MissingContainerPort(String),
    #[error("Invalid protocol: {0}")]
    InvalidProtocol(String),
    #[error("Invalid port: {0}")]
    InvalidPort(String),
    #[error("Invalid port range: {0}")]
    InvalidRange(String),
    #[error("Invalid IP address: {0}")]
    InvalidIp(String),
    #[error("Host port range {host} does not match container port range {container}")]
    RangeMismatch { host: String, container: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Protocol {
    Tcp,
    Udp,
    Sctp,
}

impl Protocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::Tcp => "tcp",
            Protocol::Udp => "udp",
            Protocol::Sctp => "sctp",
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Protocol {
    type Err = PortSpecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "tcp" => Ok(Protocol::Tcp),
            "udp" => Ok(Protocol::Udp),
            "sctp" => Ok(Protocol::Sctp),
            _ => Err(PortSpecError::InvalidProtocol(s.to_string())),
        }
    }
}

/// Container port plus protocol, rendered as `80/tcp`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PortKey {
    pub port: u16,
    pub protocol: Protocol,
}

impl PortKey {
    pub fn new(port: u16, protocol: Protocol) -> Self {
        Self { port, protocol }
    }

    pub fn tcp(port: u16) -> Self {
        Self::new(port, Protocol::Tcp)
    }
}

impl fmt::Display for PortKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.port, self.protocol)
    }
}

impl FromStr for PortKey {
    type Err = PortSpecError;

    /// Parses `80/tcp`; a bare `80` defaults to tcp
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (port, protocol) = match s.split_once('/') {
            Some((port, proto)) => (port, proto.parse()?),
            None => (s, Protocol::Tcp),
        };
        Ok(Self::new(parse_port(port)?, protocol))
    }
}

/// Host side of a port mapping, as reported by the runtime
///
/// Empty strings mean "any interface" and "any free port" respectively.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HostBinding {
    pub host_ip: String,
    pub host_port: String,
}

impl HostBinding {
    pub fn new(host_ip: impl Into<String>, host_port: impl Into<String>) -> Self {
        Self {
            host_ip: host_ip.into(),
            host_port: host_port.into(),
        }
    }
}

pub type ExposedPorts = BTreeSet<PortKey>;
pub type PortBindingMap = BTreeMap<PortKey, Vec<HostBinding>>;

/// Parsed form of one or more publish specs
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PortSpec {
    pub exposed: ExposedPorts,
    pub bindings: PortBindingMap,
}

/// Parse a list of publish specs into exposed ports and port bindings
///
/// # Examples
/// ```
/// # use nginx_bootstrap::port_spec::*;
/// let spec = parse_port_specs(&["80/tcp"])?;
/// assert!(spec.exposed.contains(&PortKey::tcp(80)));
/// # Ok::<(), PortSpecError>(())
/// ```
pub fn parse_port_specs<S: AsRef<str>>(specs: &[S]) -> Result<PortSpec, PortSpecError> {
    let mut parsed = PortSpec::default();

    for raw in specs {
        for (key, binding) in parse_port_spec(raw.as_ref())? {
            parsed.exposed.insert(key);
            parsed.bindings.entry(key).or_default().push(binding);
        }
    }

    Ok(parsed)
}

/// Look up the host port bound to `key`, reading only the first binding
pub fn host_port_for(bindings: &PortBindingMap, key: PortKey) -> Option<&str> {
    bindings
        .get(&key)
        .and_then(|list| list.first())
        .map(|binding| binding.host_port.as_str())
        .filter(|port| !port.is_empty())
}

fn parse_port_spec(raw: &str) -> Result<Vec<(PortKey, HostBinding)>, PortSpecError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(PortSpecError::Empty);
    }

    let (rest, protocol) = match raw.rsplit_once('/') {
        Some((rest, proto)) => (rest, proto.parse::<Protocol>()?),
        None => (raw, Protocol::Tcp),
    };

    // rsplitn keeps any colons of an unbracketed IPv6 address in the last part
    let parts: Vec<&str> = rest.rsplitn(3, ':').collect();
    let (ip, host, container) = match parts.as_slice() {
        [container] => ("", "", *container),
        [container, host] => ("", *host, *container),
        [container, host, ip] => (*ip, *host, *container),
        _ => return Err(PortSpecError::MissingContainerPort(raw.to_string())),
    };

    if container.is_empty() {
        return Err(PortSpecError::MissingContainerPort(raw.to_string()));
    }

    let host_ip = parse_host_ip(ip)?;
    let (container_start, container_end) = parse_range(container)?;
    let host_range = if host.is_empty() {
        None
    } else {
        Some(parse_range(host)?)
    };

    let container_len = container_end - container_start;
    if let Some((host_start, host_end)) = host_range {
        let host_len = host_end - host_start;
        // A single container port may pick any port out of a host range
        if container_len != 0 && host_len != container_len {
            return Err(PortSpecError::RangeMismatch {
                host: host.to_string(),
                container: container.to_string(),
            });
        }
    }

    let mut entries = Vec::with_capacity(usize::from(container_len) + 1);
    for offset in 0..=container_len {
        let host_port = match host_range {
            None => String::new(),
            Some((start, end)) if container_len == 0 && start != end => {
                format!("{}-{}", start, end)
            }
            Some((start, _)) => (start + offset).to_string(),
        };
        entries.push((
            PortKey::new(container_start + offset, protocol),
            HostBinding::new(host_ip.clone(), host_port),
        ));
    }

    Ok(entries)
}

fn parse_host_ip(ip: &str) -> Result<String, PortSpecError> {
    if ip.is_empty() {
        return Ok(String::new());
    }

    let bare = ip.trim_start_matches('[').trim_end_matches(']');
    bare.parse::<IpAddr>()
        .map_err(|_| PortSpecError::InvalidIp(ip.to_string()))?;
    Ok(bare.to_string())
}

fn parse_range(s: &str) -> Result<(u16, u16), PortSpecError> {
    match s.split_once('-') {
        Some((start, end)) => {
            let start = parse_port(start)?;
            let end = parse_port(end)?;
            if end < start {
                return Err(PortSpecError::InvalidRange(s.to_string()));
            }
            Ok((start, end))
        }
        None => {
            let port = parse_port(s)?;
            Ok((port, port))
        }
    }
}

fn parse_port(s: &str) -> Result<u16, PortSpecError> {
    s.parse::<u16>()
        .map_err(|_| PortSpecError::InvalidPort(s.to_string()))
}
