//! Docker engine implementation.
//!
//! Talks to the local Docker daemon through bollard.

use std::collections::HashMap;

use async_trait::async_trait;
use bollard::container::{
    Config, CreateContainerOptions, InspectContainerOptions, ListContainersOptions,
    NetworkingConfig, RemoveContainerOptions, StartContainerOptions, StopContainerOptions,
};
use bollard::image::{CreateImageOptions, ListImagesOptions};
use bollard::network::{CreateNetworkOptions, ListNetworksOptions};
use bollard::secret::{ContainerStateStatusEnum, HealthStatusEnum};
use bollard::service::{EndpointSettings, HealthConfig, HostConfig, PortBinding};
use bollard::Docker;
use futures::StreamExt;
use tracing::{debug, info};

use crate::container::{
    ContainerDefinition, ContainerHandle, ContainerState, ContainerStatus, EngineHealth,
};
use crate::engine::{ContainerEngine, EngineResult, ProgressSink, PullProgress};
use crate::error::{EngineError, EngineErrorKind};

/// Label marking networks created by the orchestrator.
const NETWORK_LABEL: &str = "devnet.network";

/// Seconds the daemon waits for a container to exit before killing it.
const STOP_TIMEOUT_SECS: i64 = 10;

/// Container engine backed by the local Docker daemon.
#[derive(Debug, Clone)]
pub struct DockerEngine {
    docker: Docker,
}

impl DockerEngine {
    /// Connects to the daemon using the local defaults (socket or
    /// `DOCKER_HOST`) and verifies the connection.
    pub async fn connect() -> EngineResult<Self> {
        let docker = Docker::connect_with_local_defaults()?;
        let engine = Self::from_client(docker);
        engine.ping().await?;

        info!("Connected to Docker daemon");
        Ok(engine)
    }

    /// Wraps an existing bollard client.
    pub fn from_client(docker: Docker) -> Self {
        Self { docker }
    }

    fn container_config(definition: &ContainerDefinition) -> Config<String> {
        let exposed_ports: HashMap<String, HashMap<(), ()>> = definition
            .ports
            .iter()
            .map(|p| (p.container_key(), HashMap::new()))
            .collect();

        let port_bindings: HashMap<String, Option<Vec<PortBinding>>> = definition
            .ports
            .iter()
            .map(|p| {
                let binding = PortBinding {
                    host_ip: None,
                    host_port: Some(p.host_port.to_string()),
                };
                (p.container_key(), Some(vec![binding]))
            })
            .collect();

        let binds: Vec<String> = definition.binds.iter().map(|b| b.as_bind()).collect();

        let host_config = HostConfig {
            port_bindings: Some(port_bindings),
            binds: (!binds.is_empty()).then_some(binds),
            network_mode: definition.network.clone(),
            ..Default::default()
        };

        let networking_config = definition.network.as_ref().map(|network| {
            let endpoint = EndpointSettings {
                aliases: Some(definition.aliases.clone()),
                links: (!definition.links.is_empty()).then(|| definition.links.clone()),
                ..Default::default()
            };
            NetworkingConfig {
                endpoints_config: HashMap::from([(network.clone(), endpoint)]),
            }
        });

        let healthcheck = definition.health_check.as_ref().map(|check| HealthConfig {
            test: Some(check.test.clone()),
            interval: Some(check.interval.as_nanos() as i64),
            timeout: Some(check.timeout.as_nanos() as i64),
            retries: Some(i64::from(check.retries)),
            start_period: Some(check.start_period.as_nanos() as i64),
            ..Default::default()
        });

        Config {
            image: Some(definition.image.clone()),
            env: Some(
                definition
                    .env
                    .iter()
                    .map(|(k, v)| format!("{}={}", k, v))
                    .collect(),
            ),
            cmd: definition.command.clone(),
            labels: Some(definition.labels.clone().into_iter().collect()),
            exposed_ports: Some(exposed_ports),
            host_config: Some(host_config),
            networking_config,
            healthcheck,
            ..Default::default()
        }
    }
}

fn map_state(state: Option<&bollard::models::ContainerState>) -> ContainerStatus {
    let Some(state) = state else {
        return ContainerStatus {
            state: ContainerState::Unknown,
            health: None,
        };
    };

    let run_state = match state.status {
        Some(ContainerStateStatusEnum::CREATED) => ContainerState::Created,
        Some(ContainerStateStatusEnum::RUNNING) => ContainerState::Running,
        Some(ContainerStateStatusEnum::PAUSED) => ContainerState::Paused,
        Some(ContainerStateStatusEnum::RESTARTING) => ContainerState::Restarting,
        Some(ContainerStateStatusEnum::REMOVING) => ContainerState::Removing,
        Some(ContainerStateStatusEnum::EXITED) => ContainerState::Exited {
            exit_code: state.exit_code.unwrap_or_default(),
        },
        Some(ContainerStateStatusEnum::DEAD) => ContainerState::Dead,
        _ if state.running == Some(true) => ContainerState::Running,
        _ => ContainerState::Unknown,
    };

    let health = state
        .health
        .as_ref()
        .and_then(|h| h.status)
        .and_then(|status| match status {
            HealthStatusEnum::STARTING => Some(EngineHealth::Starting),
            HealthStatusEnum::HEALTHY => Some(EngineHealth::Healthy),
            HealthStatusEnum::UNHEALTHY => Some(EngineHealth::Unhealthy),
            _ => None,
        });

    ContainerStatus {
        state: run_state,
        health,
    }
}

#[async_trait]
impl ContainerEngine for DockerEngine {
    async fn ping(&self) -> EngineResult<()> {
        self.docker.ping().await?;
        Ok(())
    }

    async fn create_container(&self, definition: &ContainerDefinition) -> EngineResult<String> {
        let options = CreateContainerOptions {
            name: definition.name.as_str(),
            platform: None,
        };

        let response = self
            .docker
            .create_container(Some(options), Self::container_config(definition))
            .await?;

        for warning in &response.warnings {
            debug!(container = %definition.name, warning = %warning, "Engine warning");
        }

        Ok(response.id)
    }

    async fn start_container(&self, id: &str) -> EngineResult<()> {
        self.docker
            .start_container(id, None::<StartContainerOptions<String>>)
            .await?;
        Ok(())
    }

    async fn stop_container(&self, id: &str) -> EngineResult<()> {
        let options = StopContainerOptions {
            t: STOP_TIMEOUT_SECS,
        };
        self.docker.stop_container(id, Some(options)).await?;
        Ok(())
    }

    async fn remove_container(&self, id: &str) -> EngineResult<()> {
        let options = RemoveContainerOptions {
            force: true,
            v: true,
            ..Default::default()
        };
        self.docker.remove_container(id, Some(options)).await?;
        Ok(())
    }

    async fn inspect_container(&self, id: &str) -> EngineResult<ContainerStatus> {
        let inspect = self
            .docker
            .inspect_container(id, None::<InspectContainerOptions>)
            .await?;
        Ok(map_state(inspect.state.as_ref()))
    }

    async fn find_containers(&self, name: &str) -> EngineResult<Vec<ContainerHandle>> {
        // The name filter matches substrings; keep exact matches only.
        let filters: HashMap<String, Vec<String>> =
            [("name".to_string(), vec![name.to_string()])]
                .into_iter()
                .collect();

        let options = ListContainersOptions {
            all: true,
            filters,
            ..Default::default()
        };

        let expected = format!("/{}", name);
        let containers = self.docker.list_containers(Some(options)).await?;

        Ok(containers
            .into_iter()
            .filter(|c| {
                c.names
                    .as_ref()
                    .is_some_and(|names| names.iter().any(|n| n == &expected || n == name))
            })
            .filter_map(|c| c.id.map(|id| ContainerHandle::new(id, name)))
            .collect())
    }

    async fn list_images(&self, reference: &str) -> EngineResult<Vec<String>> {
        let filters: HashMap<String, Vec<String>> =
            [("reference".to_string(), vec![reference.to_string()])]
                .into_iter()
                .collect();

        let options = ListImagesOptions {
            all: false,
            filters,
            ..Default::default()
        };

        let images = self.docker.list_images(Some(options)).await?;
        Ok(images.into_iter().map(|image| image.id).collect())
    }

    async fn pull_image(&self, reference: &str, progress: ProgressSink<'_>) -> EngineResult<()> {
        let options = CreateImageOptions {
            from_image: reference,
            ..Default::default()
        };

        let mut stream = self.docker.create_image(Some(options), None, None);

        while let Some(result) = stream.next().await {
            let info = result?;
            progress(PullProgress {
                id: info.id,
                status: info.status,
                progress: info.progress,
            });
        }

        Ok(())
    }

    async fn ensure_network(&self, name: &str) -> EngineResult<String> {
        let filters: HashMap<String, Vec<String>> =
            [("name".to_string(), vec![name.to_string()])]
                .into_iter()
                .collect();

        let existing = self
            .docker
            .list_networks(Some(ListNetworksOptions { filters }))
            .await?;

        if let Some(id) = existing
            .into_iter()
            .find(|n| n.name.as_deref() == Some(name))
            .and_then(|n| n.id)
        {
            debug!(network = %name, id = %id, "Using existing network");
            return Ok(id);
        }

        let labels: HashMap<&str, &str> = [(NETWORK_LABEL, name)].into_iter().collect();
        let options = CreateNetworkOptions {
            name,
            driver: "bridge",
            labels,
            ..Default::default()
        };

        let response = self.docker.create_network(options).await?;
        if response.id.is_empty() {
            return Err(EngineError::new(
                EngineErrorKind::Other,
                format!("no id returned for network {}", name),
            ));
        }

        info!(network = %name, id = %response.id, "Created network");
        Ok(response.id)
    }

    async fn remove_network(&self, name: &str) -> EngineResult<()> {
        self.docker.remove_network(name).await?;
        info!(network = %name, "Removed network");
        Ok(())
    }

    fn name(&self) -> &str {
        "docker"
    }
}
