//! Container definitions and lifecycle primitives.
//!
//! This module provides the engine-neutral container definition types, the
//! builders for the three service containers, and the start/stop/remove/
//! inspect primitives over a [`ContainerHandle`].

mod lifecycle;
mod spec;

pub use lifecycle::{
    create, create_indexer, create_node, create_proof_server, create_service, find_by_name,
    get_status, is_running, remove, remove_by_name, start, stop, ContainerHandle, ContainerState,
    ContainerStatus, EngineHealth,
};
pub use spec::{
    definition_for, indexer_definition, node_definition, proof_server_definition,
    ContainerDefinition, HealthCheck, PortMapping, VolumeBind, CLUSTER_LABEL, PROOF_PARAMS_PATH,
    SERVICE_LABEL,
};
