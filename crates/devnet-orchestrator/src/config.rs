//! Cluster configuration.
//!
//! [`ClusterOverrides`] is the user-facing partial configuration: every field
//! is optional and unknown fields are ignored. [`ClusterConfig::resolve`]
//! merges it against the pinned defaults into the immutable configuration the
//! rest of the crate works from.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{OrchestratorError, Result};

/// Default cluster name.
pub const DEFAULT_CLUSTER_NAME: &str = "devnet";

/// Default node image.
pub const DEFAULT_NODE_IMAGE: &str = "midnightnetwork/midnight-node:0.12.0";
/// Default indexer image.
pub const DEFAULT_INDEXER_IMAGE: &str = "midnightntwrk/indexer-standalone:3.0.0";
/// Default proof server image.
pub const DEFAULT_PROOF_SERVER_IMAGE: &str = "midnightnetwork/proof-server:4.0.0";

/// Node RPC port inside its container.
pub const NODE_PORT: u16 = 9944;
/// Indexer API port inside its container.
pub const INDEXER_PORT: u16 = 8088;
/// Proof server port inside its container.
pub const PROOF_SERVER_PORT: u16 = 6300;

/// Default node configuration preset.
pub const DEFAULT_NODE_PRESET: &str = "dev";
/// Default indexer log level.
pub const DEFAULT_INDEXER_LOG_LEVEL: &str = "info";

/// Network id reported to clients of the devnet.
pub const NETWORK_ID: &str = "undeployed";

/// One of the three services making up a cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ServiceRole {
    /// The chain node.
    Node,
    /// The chain indexer.
    Indexer,
    /// The zero-knowledge proof server.
    ProofServer,
}

impl ServiceRole {
    /// All roles in start order.
    pub const ALL: [ServiceRole; 3] = [Self::Node, Self::Indexer, Self::ProofServer];

    /// Returns the role name, also used as the container name suffix.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Node => "node",
            Self::Indexer => "indexer",
            Self::ProofServer => "proof-server",
        }
    }

    /// Returns the port the service listens on inside its container.
    pub fn internal_port(&self) -> u16 {
        match self {
            Self::Node => NODE_PORT,
            Self::Indexer => INDEXER_PORT,
            Self::ProofServer => PROOF_SERVER_PORT,
        }
    }

    /// Returns the deterministic container name for this role.
    pub fn container_name(&self, cluster_name: &str) -> String {
        format!("{}-{}", cluster_name, self.name())
    }
}

impl fmt::Display for ServiceRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Returns the name of the cluster's dedicated network.
pub fn network_name(cluster_name: &str) -> String {
    format!("{}-network", cluster_name)
}

/// Partial node settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeOverrides {
    /// Image reference.
    pub image: Option<String>,
    /// Host port.
    pub port: Option<u16>,
    /// Node configuration preset name.
    pub preset: Option<String>,
}

/// Partial indexer settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexerOverrides {
    /// Image reference.
    pub image: Option<String>,
    /// Host port.
    pub port: Option<u16>,
    /// Log level.
    pub log_level: Option<String>,
}

/// Partial proof server settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProofServerOverrides {
    /// Image reference.
    pub image: Option<String>,
    /// Host port.
    pub port: Option<u16>,
    /// Host directory to mount as the proving parameter cache.
    pub params_cache: Option<PathBuf>,
}

/// Partial health settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthOverrides {
    /// Node readiness timeout in seconds.
    pub node_timeout_secs: Option<u64>,
    /// Indexer readiness timeout in seconds.
    pub indexer_timeout_secs: Option<u64>,
    /// Proof server readiness timeout in seconds.
    pub proof_server_timeout_secs: Option<u64>,
    /// Interval between probe attempts in milliseconds.
    pub poll_interval_ms: Option<u64>,
    /// Consecutive successes required before a service counts as ready.
    pub required_successes: Option<u32>,
    /// How node readiness is probed.
    pub node_probe: Option<NodeProbe>,
    /// How indexer readiness is probed.
    pub indexer_probe: Option<IndexerProbe>,
}

/// User-supplied partial cluster configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterOverrides {
    /// Cluster name; prefixes every container and the network.
    pub cluster_name: Option<String>,
    /// Node settings.
    pub node: Option<NodeOverrides>,
    /// Indexer settings.
    pub indexer: Option<IndexerOverrides>,
    /// Proof server settings.
    pub proof_server: Option<ProofServerOverrides>,
    /// Health settings.
    pub health: Option<HealthOverrides>,
}

impl ClusterOverrides {
    /// Creates overrides with only the cluster name set.
    pub fn named(cluster_name: impl Into<String>) -> Self {
        Self {
            cluster_name: Some(cluster_name.into()),
            ..Default::default()
        }
    }

    /// Loads overrides from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            OrchestratorError::configuration(format!("reading {}: {}", path.display(), e))
        })?;
        Self::from_toml(&content)
    }

    /// Parses overrides from a TOML document.
    pub fn from_toml(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Sets the node host port.
    pub fn node_port(mut self, port: u16) -> Self {
        self.node.get_or_insert_with(Default::default).port = Some(port);
        self
    }

    /// Sets the indexer host port.
    pub fn indexer_port(mut self, port: u16) -> Self {
        self.indexer.get_or_insert_with(Default::default).port = Some(port);
        self
    }

    /// Sets the proof server host port.
    pub fn proof_server_port(mut self, port: u16) -> Self {
        self.proof_server.get_or_insert_with(Default::default).port = Some(port);
        self
    }
}

/// How node readiness is probed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NodeProbe {
    /// HTTP GET on the node's `/health` endpoint.
    #[default]
    Http,
    /// WebSocket handshake on the node's RPC endpoint.
    #[serde(rename = "websocket")]
    WebSocket,
}

/// How indexer readiness is probed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum IndexerProbe {
    /// GraphQL liveness, then GraphQL tip height.
    #[default]
    Graphql,
    /// Engine-reported health, then GraphQL tip height.
    EngineHealth,
}

/// Resolved node settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NodeConfig {
    /// Image reference.
    pub image: String,
    /// Host port.
    pub port: u16,
    /// Configuration preset.
    pub preset: String,
}

/// Resolved indexer settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IndexerConfig {
    /// Image reference.
    pub image: String,
    /// Host port.
    pub port: u16,
    /// Log level.
    pub log_level: String,
}

/// Resolved proof server settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProofServerConfig {
    /// Image reference.
    pub image: String,
    /// Host port.
    pub port: u16,
    /// Host parameter cache, bind mounted when set.
    pub params_cache: Option<PathBuf>,
}

/// Resolved health settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HealthSettings {
    /// Node readiness timeout.
    pub node_timeout: Duration,
    /// Indexer readiness timeout, applied to each phase.
    pub indexer_timeout: Duration,
    /// Proof server readiness timeout.
    pub proof_server_timeout: Duration,
    /// Interval between probe attempts.
    pub poll_interval: Duration,
    /// Consecutive successes required.
    pub required_successes: u32,
    /// Node probe kind.
    pub node_probe: NodeProbe,
    /// Indexer probe kind.
    pub indexer_probe: IndexerProbe,
}

impl Default for HealthSettings {
    fn default() -> Self {
        Self {
            node_timeout: Duration::from_secs(90),
            indexer_timeout: Duration::from_secs(120),
            proof_server_timeout: Duration::from_secs(60),
            poll_interval: Duration::from_secs(1),
            required_successes: 1,
            node_probe: NodeProbe::default(),
            indexer_probe: IndexerProbe::default(),
        }
    }
}

/// Port of each service on the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ServicePorts {
    /// Node port.
    pub node: u16,
    /// Indexer port.
    pub indexer: u16,
    /// Proof server port.
    pub proof_server: u16,
}

impl Default for ServicePorts {
    fn default() -> Self {
        Self {
            node: NODE_PORT,
            indexer: INDEXER_PORT,
            proof_server: PROOF_SERVER_PORT,
        }
    }
}

/// Immutable, fully resolved cluster configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClusterConfig {
    /// Cluster name.
    pub cluster_name: String,
    /// Node settings.
    pub node: NodeConfig,
    /// Indexer settings.
    pub indexer: IndexerConfig,
    /// Proof server settings.
    pub proof_server: ProofServerConfig,
    /// Health settings.
    pub health: HealthSettings,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self::resolve(&ClusterOverrides::default())
    }
}

impl ClusterConfig {
    /// Merges overrides against the defaults.
    pub fn resolve(overrides: &ClusterOverrides) -> Self {
        let node = overrides.node.clone().unwrap_or_default();
        let indexer = overrides.indexer.clone().unwrap_or_default();
        let proof_server = overrides.proof_server.clone().unwrap_or_default();
        let health = overrides.health.clone().unwrap_or_default();
        let defaults = HealthSettings::default();

        Self {
            cluster_name: overrides
                .cluster_name
                .clone()
                .unwrap_or_else(|| DEFAULT_CLUSTER_NAME.to_string()),
            node: NodeConfig {
                image: node.image.unwrap_or_else(|| DEFAULT_NODE_IMAGE.to_string()),
                port: node.port.unwrap_or(NODE_PORT),
                preset: node
                    .preset
                    .unwrap_or_else(|| DEFAULT_NODE_PRESET.to_string()),
            },
            indexer: IndexerConfig {
                image: indexer
                    .image
                    .unwrap_or_else(|| DEFAULT_INDEXER_IMAGE.to_string()),
                port: indexer.port.unwrap_or(INDEXER_PORT),
                log_level: indexer
                    .log_level
                    .unwrap_or_else(|| DEFAULT_INDEXER_LOG_LEVEL.to_string()),
            },
            proof_server: ProofServerConfig {
                image: proof_server
                    .image
                    .unwrap_or_else(|| DEFAULT_PROOF_SERVER_IMAGE.to_string()),
                port: proof_server.port.unwrap_or(PROOF_SERVER_PORT),
                params_cache: proof_server.params_cache,
            },
            health: HealthSettings {
                node_timeout: health
                    .node_timeout_secs
                    .map(Duration::from_secs)
                    .unwrap_or(defaults.node_timeout),
                indexer_timeout: health
                    .indexer_timeout_secs
                    .map(Duration::from_secs)
                    .unwrap_or(defaults.indexer_timeout),
                proof_server_timeout: health
                    .proof_server_timeout_secs
                    .map(Duration::from_secs)
                    .unwrap_or(defaults.proof_server_timeout),
                poll_interval: health
                    .poll_interval_ms
                    .map(Duration::from_millis)
                    .unwrap_or(defaults.poll_interval),
                required_successes: health
                    .required_successes
                    .unwrap_or(defaults.required_successes)
                    .max(1),
                node_probe: health.node_probe.unwrap_or(defaults.node_probe),
                indexer_probe: health.indexer_probe.unwrap_or(defaults.indexer_probe),
            },
        }
    }

    /// Returns the host port of each service.
    pub fn ports(&self) -> ServicePorts {
        ServicePorts {
            node: self.node.port,
            indexer: self.indexer.port,
            proof_server: self.proof_server.port,
        }
    }

    /// Returns the host port of one service.
    pub fn port(&self, role: ServiceRole) -> u16 {
        match role {
            ServiceRole::Node => self.node.port,
            ServiceRole::Indexer => self.indexer.port,
            ServiceRole::ProofServer => self.proof_server.port,
        }
    }

    /// Returns the image of one service.
    pub fn image(&self, role: ServiceRole) -> &str {
        match role {
            ServiceRole::Node => &self.node.image,
            ServiceRole::Indexer => &self.indexer.image,
            ServiceRole::ProofServer => &self.proof_server.image,
        }
    }

    /// Returns the deterministic container name of one service.
    pub fn container_name(&self, role: ServiceRole) -> String {
        role.container_name(&self.cluster_name)
    }

    /// Returns the name of the cluster network.
    pub fn network_name(&self) -> String {
        network_name(&self.cluster_name)
    }
}

/// Connection endpoints of a running devnet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkEndpoints {
    /// Network id.
    pub network_id: String,
    /// Indexer GraphQL HTTP endpoint.
    pub indexer: String,
    /// Indexer GraphQL WebSocket endpoint.
    #[serde(rename = "indexerWS")]
    pub indexer_ws: String,
    /// Node RPC endpoint.
    pub node: String,
    /// Proof server endpoint.
    pub proof_server: String,
}

/// Maps service ports to the endpoints clients connect to.
pub fn endpoints_for(ports: ServicePorts) -> NetworkEndpoints {
    NetworkEndpoints {
        network_id: NETWORK_ID.to_string(),
        indexer: format!("http://localhost:{}/api/v3/graphql", ports.indexer),
        indexer_ws: format!("ws://localhost:{}/api/v3/graphql/ws", ports.indexer),
        node: format!("ws://localhost:{}", ports.node),
        proof_server: format!("http://localhost:{}", ports.proof_server),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ClusterConfig::default();
        assert_eq!(config.cluster_name, "devnet");
        assert_eq!(config.ports(), ServicePorts::default());
        assert_eq!(config.node.preset, "dev");
        assert_eq!(config.indexer.log_level, "info");
        assert!(config.proof_server.params_cache.is_none());
        assert_eq!(config.health.node_timeout, Duration::from_secs(90));
        assert_eq!(config.health.indexer_timeout, Duration::from_secs(120));
        assert_eq!(config.health.proof_server_timeout, Duration::from_secs(60));
    }

    #[test]
    fn test_partial_overrides_keep_other_defaults() {
        let overrides = ClusterOverrides {
            cluster_name: Some("t1".to_string()),
            indexer: Some(IndexerOverrides {
                log_level: Some("debug".to_string()),
                ..Default::default()
            }),
            ..Default::default()
        }
        .node_port(19944);

        let config = ClusterConfig::resolve(&overrides);
        assert_eq!(config.node.port, 19944);
        assert_eq!(config.node.image, DEFAULT_NODE_IMAGE);
        assert_eq!(config.indexer.port, INDEXER_PORT);
        assert_eq!(config.indexer.log_level, "debug");
        assert_eq!(config.container_name(ServiceRole::ProofServer), "t1-proof-server");
        assert_eq!(config.network_name(), "t1-network");
    }

    #[test]
    fn test_toml_ignores_unknown_fields() {
        let overrides = ClusterOverrides::from_toml(
            r#"
            cluster_name = "local"
            colour = "blue"

            [proof_server]
            port = 16300
            params_cache = "/tmp/zk-params"
            flavour = "spicy"

            [health]
            node_probe = "websocket"
            indexer_probe = "engine-health"
            required_successes = 0
            "#,
        )
        .unwrap();

        let config = ClusterConfig::resolve(&overrides);
        assert_eq!(config.cluster_name, "local");
        assert_eq!(config.proof_server.port, 16300);
        assert_eq!(
            config.proof_server.params_cache,
            Some(PathBuf::from("/tmp/zk-params"))
        );
        assert_eq!(config.health.node_probe, NodeProbe::WebSocket);
        assert_eq!(config.health.indexer_probe, IndexerProbe::EngineHealth);
        assert_eq!(config.health.required_successes, 1);
    }

    #[test]
    fn test_probe_kinds_use_config_names() {
        assert_eq!(serde_json::to_value(NodeProbe::WebSocket).unwrap(), "websocket");
        assert_eq!(serde_json::to_value(NodeProbe::Http).unwrap(), "http");
        assert_eq!(
            serde_json::to_value(IndexerProbe::EngineHealth).unwrap(),
            "engine-health"
        );

        let hyphenated = ClusterOverrides::from_toml("[health]\nnode_probe = \"web-socket\"\n");
        assert!(matches!(hyphenated, Err(OrchestratorError::Configuration(_))));
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("devnet.toml");
        std::fs::write(&path, "[node]\nport = 29944\n").unwrap();

        let overrides = ClusterOverrides::from_file(&path).unwrap();
        assert_eq!(ClusterConfig::resolve(&overrides).node.port, 29944);

        let missing = ClusterOverrides::from_file(dir.path().join("missing.toml"));
        assert!(matches!(missing, Err(OrchestratorError::Configuration(_))));
    }

    #[test]
    fn test_endpoints_for_ports() {
        let endpoints = endpoints_for(ServicePorts {
            node: 19944,
            indexer: 18088,
            proof_server: 16300,
        });

        assert_eq!(endpoints.network_id, "undeployed");
        assert_eq!(endpoints.indexer, "http://localhost:18088/api/v3/graphql");
        assert_eq!(endpoints.indexer_ws, "ws://localhost:18088/api/v3/graphql/ws");
        assert_eq!(endpoints.node, "ws://localhost:19944");
        assert_eq!(endpoints.proof_server, "http://localhost:16300");
    }

    #[test]
    fn test_endpoints_serialize_with_client_keys() {
        let json = serde_json::to_value(endpoints_for(ServicePorts::default())).unwrap();
        assert_eq!(json["networkId"], "undeployed");
        assert_eq!(json["indexerWS"], "ws://localhost:8088/api/v3/graphql/ws");
        assert_eq!(json["proofServer"], "http://localhost:6300");
    }
}
