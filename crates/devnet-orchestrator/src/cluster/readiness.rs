use std::sync::Arc;

use async_trait::async_trait;

use crate::cluster::ClusterData;
use crate::config::IndexerProbe;
use crate::engine::ContainerEngine;
use crate::error::HealthCheckError;
use crate::health;

/// Decides when a started service is ready for the next one to start.
#[async_trait]
pub trait Readiness: Send + Sync {
    /// Waits until the node serves RPC.
    async fn node_ready(&self, data: &ClusterData) -> Result<(), HealthCheckError>;

    /// Waits until the indexer serves queries and has indexed past genesis.
    async fn indexer_ready(&self, data: &ClusterData) -> Result<(), HealthCheckError>;

    /// Waits until the proof server accepts connections.
    async fn proof_server_ready(&self, data: &ClusterData) -> Result<(), HealthCheckError>;
}

/// Readiness through the network probes configured in
/// [`HealthSettings`](crate::config::HealthSettings).
#[derive(Clone)]
pub struct ProbeReadiness {
    engine: Arc<dyn ContainerEngine>,
}

impl ProbeReadiness {
    /// Creates probe-based readiness. The engine is used by the engine
    /// health indexer probe.
    pub fn new(engine: Arc<dyn ContainerEngine>) -> Self {
        Self { engine }
    }
}

#[async_trait]
impl Readiness for ProbeReadiness {
    async fn node_ready(&self, data: &ClusterData) -> Result<(), HealthCheckError> {
        health::wait_for_node(data.config()).await
    }

    async fn indexer_ready(&self, data: &ClusterData) -> Result<(), HealthCheckError> {
        match data.config().health.indexer_probe {
            IndexerProbe::Graphql => health::wait_for_indexer(data.config()).await,
            IndexerProbe::EngineHealth => {
                health::wait_for_indexer_engine_health(
                    self.engine.clone(),
                    data.indexer(),
                    data.config(),
                )
                .await
            }
        }
    }

    async fn proof_server_ready(&self, data: &ClusterData) -> Result<(), HealthCheckError> {
        health::wait_for_proof_server(data.config()).await
    }
}
