//! Container engine abstraction.
//!
//! The engine is treated as a keyed external store: containers and networks
//! are created, looked up and deleted by their deterministic names, and their
//! run state is read back on every query. Nothing here caches identity or
//! state locally.

mod docker;
#[cfg(test)]
pub(crate) mod memory;

use async_trait::async_trait;

use crate::container::{ContainerDefinition, ContainerHandle, ContainerStatus};
use crate::error::EngineError;

pub use docker::DockerEngine;

/// Result type for raw engine calls.
pub type EngineResult<T> = std::result::Result<T, EngineError>;

/// One progress event of an image pull.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PullProgress {
    /// Layer id the event refers to, if any.
    pub id: Option<String>,
    /// Status line (e.g. "Downloading").
    pub status: Option<String>,
    /// Progress bar text.
    pub progress: Option<String>,
}

/// Callback receiving pull progress events.
pub type ProgressSink<'a> = &'a mut (dyn FnMut(PullProgress) + Send);

/// Operations the orchestrator needs from a container engine.
///
/// Implementations must be thread-safe (`Send + Sync`); the orchestrator
/// issues calls for different services concurrently.
#[async_trait]
pub trait ContainerEngine: Send + Sync {
    /// Checks that the engine is reachable.
    async fn ping(&self) -> EngineResult<()>;

    /// Creates (but does not start) a container, returning its id.
    async fn create_container(&self, definition: &ContainerDefinition) -> EngineResult<String>;

    /// Starts a container.
    async fn start_container(&self, id: &str) -> EngineResult<()>;

    /// Stops a running container.
    async fn stop_container(&self, id: &str) -> EngineResult<()>;

    /// Removes a container.
    async fn remove_container(&self, id: &str) -> EngineResult<()>;

    /// Reads the current state of a container.
    async fn inspect_container(&self, id: &str) -> EngineResult<ContainerStatus>;

    /// Lists containers, running or not, whose name is exactly `name`.
    async fn find_containers(&self, name: &str) -> EngineResult<Vec<ContainerHandle>>;

    /// Lists local image ids matching a reference.
    async fn list_images(&self, reference: &str) -> EngineResult<Vec<String>>;

    /// Pulls an image, reporting progress until the pull completes.
    async fn pull_image(&self, reference: &str, progress: ProgressSink<'_>) -> EngineResult<()>;

    /// Returns the id of the named network, creating it if needed.
    async fn ensure_network(&self, name: &str) -> EngineResult<String>;

    /// Removes the named network.
    async fn remove_network(&self, name: &str) -> EngineResult<()>;

    /// Returns the name of this engine.
    fn name(&self) -> &str;
}
