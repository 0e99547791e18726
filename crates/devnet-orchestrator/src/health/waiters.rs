//! Per-service readiness waits.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info};

use crate::config::{endpoints_for, ClusterConfig, HealthSettings, NodeProbe, ServiceRole};
use crate::container::ContainerHandle;
use crate::engine::ContainerEngine;
use crate::error::{HealthCheckCause, HealthCheckError};
use crate::health::poll::{poll_until, PollOptions, ProbeFailure};
use crate::health::probe::{
    EngineHealthProbe, GraphqlProbe, HttpProbe, Probe, TcpProbe, WebSocketProbe,
};

/// Minimum indexed height before the indexer counts as synced.
pub const MIN_SYNCED_HEIGHT: u64 = 1;

fn options(health: &HealthSettings, timeout: Duration) -> PollOptions {
    PollOptions::new(timeout, health.poll_interval).required_successes(health.required_successes)
}

fn invalid_probe(service: ServiceRole, target: String, failure: ProbeFailure) -> HealthCheckError {
    HealthCheckError::new(service.name(), target, HealthCheckCause::InvalidProbe(failure.0))
}

/// Polls `probe` until it is ready or `options.timeout` runs out.
pub async fn wait_for(
    probe: &dyn Probe,
    service: ServiceRole,
    options: PollOptions,
) -> Result<(), HealthCheckError> {
    let target = probe.target();
    debug!(service = %service, target = %target, timeout = ?options.timeout, "Waiting for service");

    let attempts = poll_until(options, || probe.attempt())
        .await
        .map_err(|timeout| HealthCheckError::new(service.name(), target.clone(), timeout))?;

    info!(service = %service, target = %target, attempts, "Service ready");
    Ok(())
}

/// Waits for the node's RPC endpoint.
pub async fn wait_for_node(config: &ClusterConfig) -> Result<(), HealthCheckError> {
    let health = &config.health;
    let options = options(health, health.node_timeout);

    match health.node_probe {
        NodeProbe::Http => {
            let url = format!("http://localhost:{}/health", config.node.port);
            let probe = HttpProbe::new(&url)
                .map_err(|e| invalid_probe(ServiceRole::Node, url, e))?;
            wait_for(&probe, ServiceRole::Node, options).await
        }
        NodeProbe::WebSocket => {
            let probe = WebSocketProbe::new(format!("ws://localhost:{}", config.node.port));
            wait_for(&probe, ServiceRole::Node, options).await
        }
    }
}

async fn wait_for_indexer_sync(config: &ClusterConfig) -> Result<(), HealthCheckError> {
    let url = endpoints_for(config.ports()).indexer;
    let probe = GraphqlProbe::synced(&url, MIN_SYNCED_HEIGHT)
        .map_err(|e| invalid_probe(ServiceRole::Indexer, url, e))?;
    wait_for(
        &probe,
        ServiceRole::Indexer,
        options(&config.health, config.health.indexer_timeout),
    )
    .await
}

/// Waits for the indexer's GraphQL API, then for it to index a block.
pub async fn wait_for_indexer(config: &ClusterConfig) -> Result<(), HealthCheckError> {
    let url = endpoints_for(config.ports()).indexer;
    let probe = GraphqlProbe::liveness(&url)
        .map_err(|e| invalid_probe(ServiceRole::Indexer, url, e))?;
    wait_for(
        &probe,
        ServiceRole::Indexer,
        options(&config.health, config.health.indexer_timeout),
    )
    .await?;

    wait_for_indexer_sync(config).await
}

/// Waits for the engine to report the indexer healthy, then for it to index
/// a block.
pub async fn wait_for_indexer_engine_health(
    engine: Arc<dyn ContainerEngine>,
    handle: &ContainerHandle,
    config: &ClusterConfig,
) -> Result<(), HealthCheckError> {
    let probe = EngineHealthProbe::new(engine, handle.clone());
    wait_for(
        &probe,
        ServiceRole::Indexer,
        options(&config.health, config.health.indexer_timeout),
    )
    .await?;

    wait_for_indexer_sync(config).await
}

/// Waits for the proof server to accept connections.
pub async fn wait_for_proof_server(config: &ClusterConfig) -> Result<(), HealthCheckError> {
    let probe = TcpProbe::new("127.0.0.1", config.proof_server.port);
    wait_for(
        &probe,
        ServiceRole::ProofServer,
        options(&config.health, config.health.proof_server_timeout),
    )
    .await
}
