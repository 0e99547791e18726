//! Devnet cluster orchestration.

use std::sync::Arc;

use futures::future::join_all;
use tracing::{debug, info, warn};

use crate::cluster::data::{ClusterData, ClusterStatus, ServiceStatus, TeardownReport};
use crate::cluster::readiness::{ProbeReadiness, Readiness};
use crate::config::{endpoints_for, ClusterConfig, ClusterOverrides, NetworkEndpoints, ServiceRole};
use crate::container::{self, ContainerHandle};
use crate::engine::{ContainerEngine, DockerEngine};
use crate::error::{
    ClusterError, ClusterOperation, ContainerError, ContainerErrorReason, HealthCheckError,
    OrchestratorError, Result,
};

/// Makes, starts and tears down devnet clusters on a container engine.
///
/// A `Cluster` holds no state about the clusters it manages; every query goes
/// to the engine. The same `Cluster` can drive any number of differently
/// named clusters.
#[derive(Clone)]
pub struct Cluster {
    engine: Arc<dyn ContainerEngine>,
    readiness: Arc<dyn Readiness>,
}

impl Cluster {
    /// Connects to the local Docker daemon.
    pub async fn connect() -> Result<Self> {
        let engine = DockerEngine::connect()
            .await
            .map_err(OrchestratorError::EngineUnreachable)?;
        Ok(Self::new(Arc::new(engine)))
    }

    /// Creates an orchestrator over `engine` using the configured probes for
    /// readiness.
    pub fn new(engine: Arc<dyn ContainerEngine>) -> Self {
        let readiness = Arc::new(ProbeReadiness::new(engine.clone()));
        Self { engine, readiness }
    }

    /// Creates an orchestrator with a custom readiness policy.
    pub fn with_readiness(engine: Arc<dyn ContainerEngine>, readiness: Arc<dyn Readiness>) -> Self {
        Self { engine, readiness }
    }

    /// The underlying engine.
    pub fn engine(&self) -> &Arc<dyn ContainerEngine> {
        &self.engine
    }

    /// Creates the cluster's network and containers, leaving them stopped.
    ///
    /// Containers already holding the cluster's names are removed first;
    /// failures while doing so are ignored. The indexer and proof server are
    /// created concurrently once the node exists.
    pub async fn make(&self, overrides: &ClusterOverrides) -> Result<ClusterData> {
        let config = Arc::new(ClusterConfig::resolve(overrides));
        let cluster = config.cluster_name.as_str();
        let engine = self.engine.as_ref();
        let failed = |service: Option<ServiceRole>| {
            move |e: OrchestratorError| ClusterError::new(ClusterOperation::Make, cluster, service, e)
        };

        info!(cluster = %cluster, engine = %engine.name(), "Making cluster");
        self.clear_stale(&config).await;

        let network = config.network_name();
        engine.ensure_network(&network).await.map_err(|e| {
            ClusterError::new(
                ClusterOperation::Make,
                cluster,
                None,
                ContainerError::from_engine(ContainerErrorReason::CreateFailed, &network, e),
            )
        })?;

        let node = container::create_node(engine, &config)
            .await
            .map_err(failed(Some(ServiceRole::Node)))?;

        let (indexer, proof_server) = tokio::try_join!(
            async {
                container::create_indexer(engine, &config)
                    .await
                    .map_err(failed(Some(ServiceRole::Indexer)))
            },
            async {
                container::create_proof_server(engine, &config)
                    .await
                    .map_err(failed(Some(ServiceRole::ProofServer)))
            },
        )?;

        info!(cluster = %cluster, "Cluster created");
        Ok(ClusterData::new(node, indexer, proof_server, config))
    }

    async fn clear_stale(&self, config: &ClusterConfig) {
        let engine = self.engine.as_ref();
        let removals = ServiceRole::ALL.map(|role| {
            let name = config.container_name(role);
            async move {
                match container::remove_by_name(engine, &name).await {
                    Ok(true) => info!(container = %name, "Removed stale container"),
                    Ok(false) => {}
                    Err(e) => debug!(container = %name, error = %e, "Stale container cleanup failed"),
                }
            }
        });
        join_all(removals).await;
    }

    async fn wait_ready(
        &self,
        data: &ClusterData,
        role: ServiceRole,
    ) -> std::result::Result<(), HealthCheckError> {
        match role {
            ServiceRole::Node => self.readiness.node_ready(data).await,
            ServiceRole::Indexer => self.readiness.indexer_ready(data).await,
            ServiceRole::ProofServer => self.readiness.proof_server_ready(data).await,
        }
    }

    /// Starts node, indexer and proof server in that order, waiting for each
    /// to become ready before starting the next.
    ///
    /// The first failure aborts the sequence. Services already started are
    /// left running.
    pub async fn start(&self, data: &ClusterData) -> Result<()> {
        let cluster = data.cluster_name();
        info!(cluster = %cluster, "Starting cluster");

        for role in ServiceRole::ALL {
            let failed = |e: OrchestratorError| {
                ClusterError::new(ClusterOperation::Start, cluster, Some(role), e)
            };

            container::start(self.engine.as_ref(), data.handle(role))
                .await
                .map_err(failed)?;
            self.wait_ready(data, role)
                .await
                .map_err(|e| failed(e.into()))?;
        }

        info!(cluster = %cluster, "Cluster running");
        Ok(())
    }

    /// Stops all three services concurrently.
    ///
    /// Never fails; per-service outcomes are returned in the report and
    /// failures are logged.
    pub async fn stop(&self, data: &ClusterData) -> TeardownReport {
        info!(cluster = %data.cluster_name(), "Stopping cluster");
        let engine = self.engine.as_ref();

        let (node, indexer, proof_server) = tokio::join!(
            container::stop(engine, data.node()),
            container::stop(engine, data.indexer()),
            container::stop(engine, data.proof_server()),
        );

        let report = self.report(ClusterOperation::Stop, data, [node, indexer, proof_server], None);
        log_report(ClusterOperation::Stop, &report);
        report
    }

    /// Removes all three containers concurrently, then the cluster network.
    ///
    /// Never fails; a missing network counts as removed.
    pub async fn remove(&self, data: &ClusterData) -> TeardownReport {
        let cluster = data.cluster_name();
        info!(cluster = %cluster, "Removing cluster");
        let engine = self.engine.as_ref();

        let (node, indexer, proof_server) = tokio::join!(
            container::remove(engine, data.node()),
            container::remove(engine, data.indexer()),
            container::remove(engine, data.proof_server()),
        );

        let network_outcome = self.remove_network(data.config()).await;

        let report = self.report(
            ClusterOperation::Remove,
            data,
            [node, indexer, proof_server],
            Some(network_outcome),
        );
        log_report(ClusterOperation::Remove, &report);
        report
    }

    /// Removes whatever is left of a cluster, found by its container names.
    ///
    /// Works on partially made clusters, where [`attach`](Self::attach)
    /// fails. Containers and a network that do not exist count as removed.
    pub async fn remove_named(&self, overrides: &ClusterOverrides) -> TeardownReport {
        let config = ClusterConfig::resolve(overrides);
        let cluster = config.cluster_name.as_str();
        info!(cluster = %cluster, "Removing cluster by name");
        let engine = self.engine.as_ref();

        let remove = |role: ServiceRole| {
            let name = config.container_name(role);
            async move {
                let removed = container::remove_by_name(engine, &name).await?;
                if !removed {
                    debug!(container = %name, "Container already gone");
                }
                Ok::<_, OrchestratorError>(())
            }
        };

        let (node, indexer, proof_server) = tokio::join!(
            remove(ServiceRole::Node),
            remove(ServiceRole::Indexer),
            remove(ServiceRole::ProofServer),
        );

        let network = self.remove_network(&config).await;
        let wrap = |role: ServiceRole, outcome: Result<()>| -> Result<()> {
            outcome.map_err(|e| {
                ClusterError::new(ClusterOperation::Remove, cluster, Some(role), e).into()
            })
        };

        let report = TeardownReport {
            cluster: cluster.to_string(),
            node: wrap(ServiceRole::Node, node),
            indexer: wrap(ServiceRole::Indexer, indexer),
            proof_server: wrap(ServiceRole::ProofServer, proof_server),
            network: Some(network),
        };
        log_report(ClusterOperation::Remove, &report);
        report
    }

    async fn remove_network(&self, config: &ClusterConfig) -> Result<()> {
        let network = config.network_name();
        match self.engine.remove_network(&network).await {
            Ok(()) => Ok(()),
            Err(e) if e.is_not_found() => {
                debug!(network = %network, "Network already gone");
                Ok(())
            }
            Err(e) => Err(ClusterError::new(
                ClusterOperation::Remove,
                &config.cluster_name,
                None,
                ContainerError::from_engine(ContainerErrorReason::RemovalFailed, &network, e),
            )
            .into()),
        }
    }

    fn report(
        &self,
        operation: ClusterOperation,
        data: &ClusterData,
        outcomes: [Result<()>; 3],
        network: Option<Result<()>>,
    ) -> TeardownReport {
        let cluster = data.cluster_name();
        let [node, indexer, proof_server] = outcomes;
        let wrap = |role: ServiceRole, outcome: Result<()>| -> Result<()> {
            outcome.map_err(|e| ClusterError::new(operation, cluster, Some(role), e).into())
        };

        TeardownReport {
            cluster: cluster.to_string(),
            node: wrap(ServiceRole::Node, node),
            indexer: wrap(ServiceRole::Indexer, indexer),
            proof_server: wrap(ServiceRole::ProofServer, proof_server),
            network,
        }
    }

    /// Returns true only if all three containers are running.
    ///
    /// A container that cannot be inspected counts as not running; use
    /// [`status`](Self::status) to tell the two apart.
    pub async fn is_running(&self, data: &ClusterData) -> bool {
        let engine = self.engine.as_ref();
        let (node, indexer, proof_server) = tokio::join!(
            container::is_running(engine, data.node()),
            container::is_running(engine, data.indexer()),
            container::is_running(engine, data.proof_server()),
        );
        node && indexer && proof_server
    }

    /// Returns the endpoints clients use to reach the cluster.
    pub fn network_config(&self, data: &ClusterData) -> NetworkEndpoints {
        endpoints_for(data.config().ports())
    }

    /// Rebuilds the data of an existing cluster from its container names.
    pub async fn attach(&self, overrides: &ClusterOverrides) -> Result<ClusterData> {
        let config = Arc::new(ClusterConfig::resolve(overrides));
        let cluster = config.cluster_name.as_str();
        let engine = self.engine.as_ref();

        let find = |role: ServiceRole| {
            let name = config.container_name(role);
            async move {
                let found = container::find_by_name(engine, &name)
                    .await
                    .and_then(|handle| {
                        handle.ok_or_else(|| ContainerError::not_found(&name).into())
                    });
                found.map_err(|e| ClusterError::new(ClusterOperation::Attach, cluster, Some(role), e))
            }
        };

        let (node, indexer, proof_server) = tokio::try_join!(
            find(ServiceRole::Node),
            find(ServiceRole::Indexer),
            find(ServiceRole::ProofServer),
        )?;

        debug!(cluster = %cluster, "Attached to cluster");
        Ok(ClusterData::new(node, indexer, proof_server, config))
    }

    /// Inspects every service.
    ///
    /// Unlike [`is_running`](Self::is_running), a failed inspection is
    /// reported as [`ServiceStatus::Unknown`] rather than as stopped. A
    /// missing container is stopped.
    pub async fn status(&self, data: &ClusterData) -> ClusterStatus {
        let (node, indexer, proof_server) = tokio::join!(
            self.service_status(data.node()),
            self.service_status(data.indexer()),
            self.service_status(data.proof_server()),
        );

        ClusterStatus {
            cluster: data.cluster_name().to_string(),
            node,
            indexer,
            proof_server,
        }
    }

    async fn service_status(&self, handle: &ContainerHandle) -> ServiceStatus {
        match container::get_status(self.engine.as_ref(), handle).await {
            Ok(status) if status.is_running() => ServiceStatus::Running,
            Ok(_) => ServiceStatus::Stopped,
            Err(e) if e.is_not_found() => ServiceStatus::Stopped,
            Err(e) => {
                debug!(container = %handle.name, error = %e, "Status unknown");
                ServiceStatus::Unknown
            }
        }
    }
}

fn log_report(operation: ClusterOperation, report: &TeardownReport) {
    let mut clean = true;
    for (what, error) in report.failures() {
        clean = false;
        warn!(
            cluster = %report.cluster,
            operation = %operation,
            service = %what,
            error = %error,
            "Teardown step failed"
        );
    }
    if clean {
        info!(cluster = %report.cluster, operation = %operation, "Teardown complete");
    }
}
