//! Cluster data and observed state.

use std::fmt;
use std::sync::Arc;

use serde::Serialize;

use crate::config::{ClusterConfig, ServiceRole};
use crate::container::ContainerHandle;
use crate::error::OrchestratorError;

/// The containers of one devnet and the configuration they were made from.
///
/// Built by [`Cluster::make`](super::Cluster::make) or
/// [`Cluster::attach`](super::Cluster::attach) and never modified afterwards.
#[derive(Debug, Clone)]
pub struct ClusterData {
    node: ContainerHandle,
    indexer: ContainerHandle,
    proof_server: ContainerHandle,
    config: Arc<ClusterConfig>,
}

impl ClusterData {
    pub(crate) fn new(
        node: ContainerHandle,
        indexer: ContainerHandle,
        proof_server: ContainerHandle,
        config: Arc<ClusterConfig>,
    ) -> Self {
        Self {
            node,
            indexer,
            proof_server,
            config,
        }
    }

    /// Node container.
    pub fn node(&self) -> &ContainerHandle {
        &self.node
    }

    /// Indexer container.
    pub fn indexer(&self) -> &ContainerHandle {
        &self.indexer
    }

    /// Proof server container.
    pub fn proof_server(&self) -> &ContainerHandle {
        &self.proof_server
    }

    /// Container of the given service.
    pub fn handle(&self, role: ServiceRole) -> &ContainerHandle {
        match role {
            ServiceRole::Node => &self.node,
            ServiceRole::Indexer => &self.indexer,
            ServiceRole::ProofServer => &self.proof_server,
        }
    }

    /// Resolved configuration.
    pub fn config(&self) -> &ClusterConfig {
        &self.config
    }

    /// Cluster name.
    pub fn cluster_name(&self) -> &str {
        &self.config.cluster_name
    }
}

/// Observed state of one service container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ServiceStatus {
    /// The container exists and is running.
    Running,

    /// The container exists and is not running, or it does not exist.
    Stopped,

    /// The engine could not tell.
    Unknown,
}

/// Lifecycle state of a cluster, derived from its services.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ClusterState {
    /// Every service is running.
    Running,

    /// No service is running.
    Stopped,

    /// Some services are running.
    Degraded,

    /// At least one service could not be inspected.
    Unknown,
}

impl fmt::Display for ClusterState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Running => "running",
            Self::Stopped => "stopped",
            Self::Degraded => "degraded",
            Self::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

/// Per-service status of a cluster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClusterStatus {
    /// Cluster name.
    pub cluster: String,
    /// Status of the node.
    pub node: ServiceStatus,
    /// Status of the indexer.
    pub indexer: ServiceStatus,
    /// Status of the proof server.
    pub proof_server: ServiceStatus,
}

impl ClusterStatus {
    /// Status of the given service.
    pub fn service(&self, role: ServiceRole) -> ServiceStatus {
        match role {
            ServiceRole::Node => self.node,
            ServiceRole::Indexer => self.indexer,
            ServiceRole::ProofServer => self.proof_server,
        }
    }

    /// Folds the service statuses into a cluster state.
    pub fn state(&self) -> ClusterState {
        let all = [self.node, self.indexer, self.proof_server];
        if all.contains(&ServiceStatus::Unknown) {
            ClusterState::Unknown
        } else if all.iter().all(|s| *s == ServiceStatus::Running) {
            ClusterState::Running
        } else if all.iter().all(|s| *s == ServiceStatus::Stopped) {
            ClusterState::Stopped
        } else {
            ClusterState::Degraded
        }
    }
}

/// Outcome of tearing down one service.
pub type ServiceOutcome = Result<(), OrchestratorError>;

/// Outcomes of a best-effort stop or remove.
#[derive(Debug)]
pub struct TeardownReport {
    /// Cluster name.
    pub cluster: String,
    /// Node outcome.
    pub node: ServiceOutcome,
    /// Indexer outcome.
    pub indexer: ServiceOutcome,
    /// Proof server outcome.
    pub proof_server: ServiceOutcome,
    /// Network removal outcome; `None` when the network was not touched.
    pub network: Option<ServiceOutcome>,
}

impl TeardownReport {
    /// Outcome for the given service.
    pub fn service(&self, role: ServiceRole) -> &ServiceOutcome {
        match role {
            ServiceRole::Node => &self.node,
            ServiceRole::Indexer => &self.indexer,
            ServiceRole::ProofServer => &self.proof_server,
        }
    }

    /// Returns true if every step succeeded.
    pub fn is_clean(&self) -> bool {
        self.failures().next().is_none()
    }

    /// Iterates over the failed steps, labelled by service or `"network"`.
    pub fn failures(&self) -> impl Iterator<Item = (&'static str, &OrchestratorError)> {
        ServiceRole::ALL
            .into_iter()
            .filter_map(|role| self.service(role).as_ref().err().map(|e| (role.name(), e)))
            .chain(
                self.network
                    .as_ref()
                    .and_then(|outcome| outcome.as_ref().err())
                    .map(|e| ("network", e)),
            )
    }
}
