//! Container lifecycle primitives.
//!
//! Thin wrappers over a [`ContainerEngine`] that operate on a
//! [`ContainerHandle`] and translate engine failures into
//! [`ContainerError`]s. Nothing here retries.

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::{ClusterConfig, ServiceRole};
use crate::container::spec::{definition_for, ContainerDefinition};
use crate::engine::ContainerEngine;
use crate::error::{ContainerError, ContainerErrorReason, Result};
use crate::images;

/// Handle to an engine-managed container.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContainerHandle {
    /// Container ID assigned by the engine.
    pub id: String,

    /// Container name.
    pub name: String,
}

impl ContainerHandle {
    /// Creates a new container handle.
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }

    /// Returns the short container ID (first 12 characters).
    pub fn short_id(&self) -> &str {
        if self.id.len() > 12 {
            &self.id[..12]
        } else {
            &self.id
        }
    }
}

/// Run state reported by the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContainerState {
    /// Container has been created but not started.
    Created,

    /// Container is running.
    Running,

    /// Container is paused.
    Paused,

    /// Container is being restarted.
    Restarting,

    /// Container is being removed.
    Removing,

    /// Container has exited.
    Exited {
        /// Exit code.
        exit_code: i64,
    },

    /// Container is dead.
    Dead,

    /// The engine reported no recognizable state.
    Unknown,
}

impl ContainerState {
    /// Returns true if the container is running.
    pub fn is_running(&self) -> bool {
        matches!(self, Self::Running)
    }

    /// Returns true if the container has stopped.
    pub fn is_stopped(&self) -> bool {
        matches!(self, Self::Exited { .. } | Self::Dead)
    }
}

/// Health status reported by an engine-side health check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EngineHealth {
    /// The check has not passed yet.
    Starting,

    /// The check passes.
    Healthy,

    /// The check has failed its retries.
    Unhealthy,
}

/// Inspected status of a container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerStatus {
    /// Run state.
    pub state: ContainerState,

    /// Health check status, if a health check is configured.
    pub health: Option<EngineHealth>,
}

impl ContainerStatus {
    /// Returns true if the container is running.
    pub fn is_running(&self) -> bool {
        self.state.is_running()
    }
}

/// Starts a container.
pub async fn start(engine: &dyn ContainerEngine, handle: &ContainerHandle) -> Result<()> {
    engine.start_container(&handle.id).await.map_err(|e| {
        ContainerError::from_engine(ContainerErrorReason::StartFailed, &handle.name, e)
    })?;
    info!(container = %handle.name, id = %handle.short_id(), "Started container");
    Ok(())
}

/// Stops a container if it is running.
///
/// A container that is already stopped is left alone, so stopping twice is
/// not an error.
pub async fn stop(engine: &dyn ContainerEngine, handle: &ContainerHandle) -> Result<()> {
    let status = get_status(engine, handle).await?;
    if !status.is_running() {
        debug!(container = %handle.name, state = ?status.state, "Container not running");
        return Ok(());
    }

    match engine.stop_container(&handle.id).await {
        Ok(()) => {}
        Err(e) if e.is_not_modified() => {}
        Err(e) => {
            return Err(
                ContainerError::from_engine(ContainerErrorReason::StopFailed, &handle.name, e)
                    .into(),
            )
        }
    }

    info!(container = %handle.name, "Stopped container");
    Ok(())
}

/// Stops and removes a container.
///
/// A failed stop is logged and the container is force-removed anyway; only a
/// missing container or a failed removal is an error.
pub async fn remove(engine: &dyn ContainerEngine, handle: &ContainerHandle) -> Result<()> {
    if let Err(e) = stop(engine, handle).await {
        if e.is_not_found() {
            return Err(e);
        }
        warn!(container = %handle.name, error = %e, "Failed to stop container, removing anyway");
    }

    engine.remove_container(&handle.id).await.map_err(|e| {
        ContainerError::from_engine(ContainerErrorReason::RemovalFailed, &handle.name, e)
    })?;

    info!(container = %handle.name, "Removed container");
    Ok(())
}

/// Inspects a container.
pub async fn get_status(
    engine: &dyn ContainerEngine,
    handle: &ContainerHandle,
) -> Result<ContainerStatus> {
    engine.inspect_container(&handle.id).await.map_err(|e| {
        ContainerError::from_engine(ContainerErrorReason::InspectionFailed, &handle.name, e).into()
    })
}

/// Returns true if the container is running.
///
/// Any inspection failure, including a missing container, counts as not
/// running.
pub async fn is_running(engine: &dyn ContainerEngine, handle: &ContainerHandle) -> bool {
    match get_status(engine, handle).await {
        Ok(status) => status.is_running(),
        Err(e) => {
            debug!(container = %handle.name, error = %e, "Inspection failed");
            false
        }
    }
}

/// Finds the container with exactly this name.
pub async fn find_by_name(
    engine: &dyn ContainerEngine,
    name: &str,
) -> Result<Option<ContainerHandle>> {
    let found = engine.find_containers(name).await.map_err(|e| {
        ContainerError::from_engine(ContainerErrorReason::InspectionFailed, name, e)
    })?;
    Ok(found.into_iter().next())
}

/// Removes the container with this name, if there is one.
///
/// Returns true if a container was removed.
pub async fn remove_by_name(engine: &dyn ContainerEngine, name: &str) -> Result<bool> {
    match find_by_name(engine, name).await? {
        Some(handle) => {
            debug!(container = %name, id = %handle.short_id(), "Removing existing container");
            remove(engine, &handle).await?;
            Ok(true)
        }
        None => Ok(false),
    }
}

/// Ensures the image is present, then creates the container.
pub async fn create(
    engine: &dyn ContainerEngine,
    definition: &ContainerDefinition,
) -> Result<ContainerHandle> {
    images::ensure_available(engine, &definition.image).await?;

    let id = engine.create_container(definition).await.map_err(|e| {
        ContainerError::from_engine(ContainerErrorReason::CreateFailed, &definition.name, e)
    })?;

    let handle = ContainerHandle::new(id, &definition.name);
    info!(
        container = %handle.name,
        id = %handle.short_id(),
        image = %definition.image,
        "Created container"
    );
    Ok(handle)
}

/// Creates the container for one service of the cluster.
pub async fn create_service(
    engine: &dyn ContainerEngine,
    config: &ClusterConfig,
    role: ServiceRole,
) -> Result<ContainerHandle> {
    create(engine, &definition_for(config, role)).await
}

/// Creates the node container.
pub async fn create_node(
    engine: &dyn ContainerEngine,
    config: &ClusterConfig,
) -> Result<ContainerHandle> {
    create_service(engine, config, ServiceRole::Node).await
}

/// Creates the indexer container. The node container must already exist.
pub async fn create_indexer(
    engine: &dyn ContainerEngine,
    config: &ClusterConfig,
) -> Result<ContainerHandle> {
    create_service(engine, config, ServiceRole::Indexer).await
}

/// Creates the proof server container.
pub async fn create_proof_server(
    engine: &dyn ContainerEngine,
    config: &ClusterConfig,
) -> Result<ContainerHandle> {
    create_service(engine, config, ServiceRole::ProofServer).await
}
