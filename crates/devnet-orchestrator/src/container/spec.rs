//! Container definitions.
//!
//! A [`ContainerDefinition`] is the engine-neutral description of a container
//! to create. The `*_definition` functions build the three service
//! definitions from a resolved [`ClusterConfig`].

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::{ClusterConfig, ServiceRole, NETWORK_ID};

/// Label carrying the cluster name.
pub const CLUSTER_LABEL: &str = "devnet.cluster";
/// Label carrying the service role.
pub const SERVICE_LABEL: &str = "devnet.service";

/// Where the proof server keeps its proving parameters.
pub const PROOF_PARAMS_PATH: &str = "/root/.cache/midnight/zk-params";

/// Development-only storage secret for the standalone indexer.
const INDEXER_DEV_SECRET: &str = "303132333435363738393031323334353637383930313233343536373839303f";

/// Maps a container port to a host port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortMapping {
    /// Port inside the container.
    pub container_port: u16,
    /// Port on the host.
    pub host_port: u16,
}

impl PortMapping {
    /// Creates a TCP port mapping.
    pub fn tcp(container_port: u16, host_port: u16) -> Self {
        Self {
            container_port,
            host_port,
        }
    }

    /// Returns the engine port key, e.g. `9944/tcp`.
    pub fn container_key(&self) -> String {
        format!("{}/tcp", self.container_port)
    }
}

/// Host path bind mounted into a container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeBind {
    /// Path on the host.
    pub host_path: PathBuf,
    /// Path in the container.
    pub container_path: String,
}

impl VolumeBind {
    /// Returns the engine bind string, `host:container`.
    pub fn as_bind(&self) -> String {
        format!("{}:{}", self.host_path.display(), self.container_path)
    }
}

/// Engine-side health check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthCheck {
    /// Check command, in engine form (`["CMD-SHELL", "..."]`).
    pub test: Vec<String>,
    /// Time between checks.
    pub interval: Duration,
    /// Time allowed for one check.
    pub timeout: Duration,
    /// Consecutive failures before the container is unhealthy.
    pub retries: u32,
    /// Grace period before failures count.
    pub start_period: Duration,
}

impl HealthCheck {
    /// Creates a shell health check that fails when `curl -f url` fails.
    pub fn http(url: &str) -> Self {
        Self {
            test: vec![
                "CMD-SHELL".to_string(),
                format!("curl -f {} || exit 1", url),
            ],
            interval: Duration::from_secs(5),
            timeout: Duration::from_secs(5),
            retries: 24,
            start_period: Duration::from_secs(10),
        }
    }
}

/// Everything needed to create a container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerDefinition {
    /// Container name.
    pub name: String,
    /// Image reference.
    pub image: String,
    /// Environment variables.
    pub env: BTreeMap<String, String>,
    /// Published ports.
    pub ports: Vec<PortMapping>,
    /// Host path binds.
    pub binds: Vec<VolumeBind>,
    /// Network to attach to.
    pub network: Option<String>,
    /// Aliases on that network.
    pub aliases: Vec<String>,
    /// Links to other containers, `name:alias`.
    pub links: Vec<String>,
    /// Command override.
    pub command: Option<Vec<String>>,
    /// Engine health check.
    pub health_check: Option<HealthCheck>,
    /// Labels.
    pub labels: BTreeMap<String, String>,
}

impl ContainerDefinition {
    /// Creates a definition with only a name and image.
    pub fn new(name: impl Into<String>, image: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            image: image.into(),
            env: BTreeMap::new(),
            ports: Vec::new(),
            binds: Vec::new(),
            network: None,
            aliases: Vec::new(),
            links: Vec::new(),
            command: None,
            health_check: None,
            labels: BTreeMap::new(),
        }
    }

    /// Adds an environment variable.
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Adds a port mapping.
    pub fn port(mut self, mapping: PortMapping) -> Self {
        self.ports.push(mapping);
        self
    }

    /// Adds a bind mount.
    pub fn bind(mut self, bind: VolumeBind) -> Self {
        self.binds.push(bind);
        self
    }

    /// Attaches the container to a network under the given alias.
    pub fn network(mut self, network: impl Into<String>, alias: impl Into<String>) -> Self {
        self.network = Some(network.into());
        self.aliases.push(alias.into());
        self
    }

    /// Links another container under an alias.
    pub fn link(mut self, container: &str, alias: &str) -> Self {
        self.links.push(format!("{}:{}", container, alias));
        self
    }

    /// Sets the command.
    pub fn command<I, S>(mut self, command: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.command = Some(command.into_iter().map(Into::into).collect());
        self
    }

    /// Sets the health check.
    pub fn health_check(mut self, check: HealthCheck) -> Self {
        self.health_check = Some(check);
        self
    }

    /// Adds a label.
    pub fn label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    /// Returns the host ports this container publishes.
    pub fn host_ports(&self) -> impl Iterator<Item = u16> + '_ {
        self.ports.iter().map(|p| p.host_port)
    }
}

fn service_base(config: &ClusterConfig, role: ServiceRole) -> ContainerDefinition {
    let name = config.container_name(role);
    ContainerDefinition::new(name.clone(), config.image(role))
        .port(PortMapping::tcp(role.internal_port(), config.port(role)))
        .network(config.network_name(), name)
        .label(CLUSTER_LABEL, config.cluster_name.clone())
        .label(SERVICE_LABEL, role.name())
}

/// Builds the node container definition.
pub fn node_definition(config: &ClusterConfig) -> ContainerDefinition {
    service_base(config, ServiceRole::Node).env("CFG_PRESET", config.node.preset.clone())
}

/// Builds the indexer container definition.
///
/// The indexer reaches the node by its container name on the cluster
/// network, so the node container must exist before this one is created.
pub fn indexer_definition(config: &ClusterConfig) -> ContainerDefinition {
    let node_name = config.container_name(ServiceRole::Node);
    let node_url = format!("ws://{}:{}", node_name, ServiceRole::Node.internal_port());

    service_base(config, ServiceRole::Indexer)
        .link(&node_name, ServiceRole::Node.name())
        .env("RUST_LOG", config.indexer.log_level.clone())
        .env("APP__APPLICATION__NETWORK_ID", NETWORK_ID)
        .env("APP__INFRA__NODE__URL", node_url)
        .env("APP__INFRA__SECRET", INDEXER_DEV_SECRET)
        .health_check(HealthCheck::http(&format!(
            "http://localhost:{}/ready",
            ServiceRole::Indexer.internal_port()
        )))
}

/// Builds the proof server container definition.
pub fn proof_server_definition(config: &ClusterConfig) -> ContainerDefinition {
    let mut definition = service_base(config, ServiceRole::ProofServer)
        .env("RUST_BACKTRACE", "1")
        .command(["midnight-proof-server", "--network", NETWORK_ID]);

    if let Some(cache) = &config.proof_server.params_cache {
        definition = definition.bind(VolumeBind {
            host_path: cache.clone(),
            container_path: PROOF_PARAMS_PATH.to_string(),
        });
    }

    definition
}

/// Builds the definition for one service.
pub fn definition_for(config: &ClusterConfig, role: ServiceRole) -> ContainerDefinition {
    match role {
        ServiceRole::Node => node_definition(config),
        ServiceRole::Indexer => indexer_definition(config),
        ServiceRole::ProofServer => proof_server_definition(config),
    }
}
