//! In-memory container engine for tests.
//!
//! Keeps containers, images and networks in maps keyed the way the Docker
//! daemon keys them, and mimics the daemon's failure modes the orchestrator
//! cares about: name conflicts, host port conflicts, 404s and 304s.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::container::{
    ContainerDefinition, ContainerHandle, ContainerState, ContainerStatus, EngineHealth,
};
use crate::engine::{ContainerEngine, EngineResult, ProgressSink, PullProgress};
use crate::error::{EngineError, EngineErrorKind};

#[derive(Debug)]
struct Record {
    name: String,
    definition: ContainerDefinition,
    state: ContainerState,
    health: Option<EngineHealth>,
}

#[derive(Debug)]
struct State {
    reachable: bool,
    next_id: u64,
    containers: HashMap<String, Record>,
    images: HashSet<String>,
    failing_pulls: HashSet<String>,
    failing_removals: HashSet<String>,
    failing_stops: HashSet<String>,
    pulls: usize,
    networks: HashMap<String, String>,
    events: Vec<String>,
}

/// Engine double backed by in-process maps.
#[derive(Debug, Clone)]
pub(crate) struct InMemoryEngine {
    state: Arc<RwLock<State>>,
}

impl InMemoryEngine {
    pub(crate) fn new() -> Self {
        Self {
            state: Arc::new(RwLock::new(State {
                reachable: true,
                next_id: 1,
                containers: HashMap::new(),
                images: HashSet::new(),
                failing_pulls: HashSet::new(),
                failing_removals: HashSet::new(),
                failing_stops: HashSet::new(),
                pulls: 0,
                networks: HashMap::new(),
                events: Vec::new(),
            })),
        }
    }

    pub(crate) async fn set_reachable(&self, reachable: bool) {
        self.state.write().await.reachable = reachable;
    }

    pub(crate) async fn add_image(&self, reference: &str) {
        self.state.write().await.images.insert(reference.to_string());
    }

    pub(crate) async fn fail_pulls_of(&self, reference: &str) {
        self.state
            .write()
            .await
            .failing_pulls
            .insert(reference.to_string());
    }

    pub(crate) async fn fail_removals_of(&self, name: &str) {
        self.state
            .write()
            .await
            .failing_removals
            .insert(name.to_string());
    }

    pub(crate) async fn fail_stops_of(&self, name: &str) {
        self.state
            .write()
            .await
            .failing_stops
            .insert(name.to_string());
    }

    pub(crate) async fn pull_count(&self) -> usize {
        self.state.read().await.pulls
    }

    /// Appends an entry to the shared event log.
    pub(crate) async fn record(&self, event: impl Into<String>) {
        self.state.write().await.events.push(event.into());
    }

    pub(crate) async fn events(&self) -> Vec<String> {
        self.state.read().await.events.clone()
    }

    pub(crate) async fn has_network(&self, name: &str) -> bool {
        self.state.read().await.networks.contains_key(name)
    }

    pub(crate) async fn container_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .state
            .read()
            .await
            .containers
            .values()
            .map(|r| r.name.clone())
            .collect();
        names.sort();
        names
    }

    pub(crate) async fn definition_of(&self, name: &str) -> Option<ContainerDefinition> {
        self.state
            .read()
            .await
            .containers
            .values()
            .find(|r| r.name == name)
            .map(|r| r.definition.clone())
    }

    pub(crate) async fn set_health(&self, name: &str, health: EngineHealth) {
        let mut state = self.state.write().await;
        if let Some(record) = state.containers.values_mut().find(|r| r.name == name) {
            record.health = Some(health);
        }
    }

    /// Deletes a container behind the orchestrator's back.
    pub(crate) async fn remove_out_of_band(&self, name: &str) {
        self.state
            .write()
            .await
            .containers
            .retain(|_, r| r.name != name);
    }

    fn check_reachable(state: &State) -> EngineResult<()> {
        if state.reachable {
            Ok(())
        } else {
            Err(EngineError::new(
                EngineErrorKind::Unreachable,
                "error trying to connect: No such file or directory",
            ))
        }
    }

    fn no_such_container(id: &str) -> EngineError {
        EngineError::not_found(format!("No such container: {}", id))
    }
}

#[async_trait]
impl ContainerEngine for InMemoryEngine {
    async fn ping(&self) -> EngineResult<()> {
        Self::check_reachable(&*self.state.read().await)
    }

    async fn create_container(&self, definition: &ContainerDefinition) -> EngineResult<String> {
        let mut state = self.state.write().await;
        Self::check_reachable(&state)?;

        if !state.images.contains(&definition.image) {
            return Err(EngineError::not_found(format!(
                "No such image: {}",
                definition.image
            )));
        }
        if state.containers.values().any(|r| r.name == definition.name) {
            return Err(EngineError::new(
                EngineErrorKind::Conflict,
                format!(
                    "Conflict. The container name \"/{}\" is already in use",
                    definition.name
                ),
            ));
        }

        let id = format!("{:064x}", state.next_id);
        state.next_id += 1;
        state.events.push(format!("create:{}", definition.name));
        state.containers.insert(
            id.clone(),
            Record {
                name: definition.name.clone(),
                definition: definition.clone(),
                state: ContainerState::Created,
                health: definition.health_check.as_ref().map(|_| EngineHealth::Starting),
            },
        );
        Ok(id)
    }

    async fn start_container(&self, id: &str) -> EngineResult<()> {
        let mut state = self.state.write().await;
        Self::check_reachable(&state)?;

        let record = state
            .containers
            .get(id)
            .ok_or_else(|| Self::no_such_container(id))?;
        let ports: Vec<u16> = record.definition.host_ports().collect();

        let taken = state.containers.iter().find_map(|(other_id, other)| {
            if other_id == id || !other.state.is_running() {
                return None;
            }
            other.definition.host_ports().find(|p| ports.contains(p))
        });
        if let Some(port) = taken {
            return Err(EngineError::new(
                EngineErrorKind::Other,
                format!(
                    "driver failed programming external connectivity: Bind for 0.0.0.0:{} failed: port is already allocated",
                    port
                ),
            ));
        }

        let record = state
            .containers
            .get_mut(id)
            .ok_or_else(|| Self::no_such_container(id))?;
        record.state = ContainerState::Running;
        let name = record.name.clone();
        state.events.push(format!("start:{}", name));
        Ok(())
    }

    async fn stop_container(&self, id: &str) -> EngineResult<()> {
        let mut guard = self.state.write().await;
        let state = &mut *guard;
        Self::check_reachable(state)?;

        let record = state
            .containers
            .get_mut(id)
            .ok_or_else(|| Self::no_such_container(id))?;
        if !record.state.is_running() {
            return Err(EngineError::new(EngineErrorKind::NotModified, ""));
        }
        if state.failing_stops.contains(&record.name) {
            return Err(EngineError::new(
                EngineErrorKind::Other,
                format!(
                    "cannot stop container: {}: did not receive an exit event",
                    record.name
                ),
            ));
        }
        record.state = ContainerState::Exited { exit_code: 0 };
        let name = record.name.clone();
        state.events.push(format!("stop:{}", name));
        Ok(())
    }

    async fn remove_container(&self, id: &str) -> EngineResult<()> {
        let mut state = self.state.write().await;
        Self::check_reachable(&state)?;

        let name = state
            .containers
            .get(id)
            .map(|r| r.name.clone())
            .ok_or_else(|| Self::no_such_container(id))?;
        if state.failing_removals.contains(&name) {
            return Err(EngineError::new(
                EngineErrorKind::Other,
                format!("removal of container {} is already in progress", name),
            ));
        }
        state.containers.remove(id);
        state.events.push(format!("remove:{}", name));
        Ok(())
    }

    async fn inspect_container(&self, id: &str) -> EngineResult<ContainerStatus> {
        let state = self.state.read().await;
        Self::check_reachable(&state)?;

        let record = state
            .containers
            .get(id)
            .ok_or_else(|| Self::no_such_container(id))?;
        Ok(ContainerStatus {
            state: record.state.clone(),
            health: record.health,
        })
    }

    async fn find_containers(&self, name: &str) -> EngineResult<Vec<ContainerHandle>> {
        let state = self.state.read().await;
        Self::check_reachable(&state)?;

        Ok(state
            .containers
            .iter()
            .filter(|(_, r)| r.name == name)
            .map(|(id, r)| ContainerHandle::new(id.clone(), r.name.clone()))
            .collect())
    }

    async fn list_images(&self, reference: &str) -> EngineResult<Vec<String>> {
        let state = self.state.read().await;
        Self::check_reachable(&state)?;

        Ok(state
            .images
            .iter()
            .filter(|image| image.as_str() == reference)
            .map(|image| format!("sha256:{}", image))
            .collect())
    }

    async fn pull_image(&self, reference: &str, progress: ProgressSink<'_>) -> EngineResult<()> {
        {
            let state = self.state.read().await;
            Self::check_reachable(&state)?;
            if state.failing_pulls.contains(reference) {
                return Err(EngineError::not_found(format!(
                    "pull access denied for {}, repository does not exist",
                    reference
                )));
            }
        }

        for status in ["Pulling fs layer", "Downloading", "Pull complete"] {
            progress(PullProgress {
                id: Some("layer0".to_string()),
                status: Some(status.to_string()),
                progress: None,
            });
        }

        let mut state = self.state.write().await;
        state.pulls += 1;
        state.images.insert(reference.to_string());
        Ok(())
    }

    async fn ensure_network(&self, name: &str) -> EngineResult<String> {
        let mut state = self.state.write().await;
        Self::check_reachable(&state)?;

        let next = format!("net-{}", state.networks.len() + 1);
        Ok(state
            .networks
            .entry(name.to_string())
            .or_insert(next)
            .clone())
    }

    async fn remove_network(&self, name: &str) -> EngineResult<()> {
        let mut state = self.state.write().await;
        Self::check_reachable(&state)?;

        state
            .networks
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| EngineError::not_found(format!("network {} not found", name)))
    }

    fn name(&self) -> &str {
        "in-memory"
    }
}
