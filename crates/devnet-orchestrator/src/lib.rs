//! Local devnet orchestration.
//!
//! This crate provisions, starts, health-verifies and tears down a three
//! service devnet (chain node, indexer and proof server) as containers on the
//! local Docker daemon, for use by integration test suites and developer
//! tooling.
//!
//! # Overview
//!
//! - **Make**: create the cluster network and the three containers under
//!   deterministic names, replacing any stale containers with those names
//! - **Start**: start node, indexer and proof server strictly in order,
//!   waiting for each to pass its readiness probe
//! - **Stop / remove**: tear all three down concurrently, collecting
//!   per-service outcomes instead of failing
//! - **Endpoints**: derive the URLs clients connect to from the configured
//!   ports
//!
//! # Architecture
//!
//! - [`config`]: overrides, resolved configuration and the endpoint view
//! - [`engine`]: the container engine trait and its Docker implementation
//! - [`images`]: image presence checks and pulls
//! - [`container`]: container definitions and lifecycle primitives
//! - [`health`]: probes and the poll-until-ready combinator
//! - [`cluster`]: the orchestrator tying the above together
//! - [`error`]: error types
//!
//! # Example
//!
//! ```ignore
//! use devnet_orchestrator::{Cluster, ClusterOverrides};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let cluster = Cluster::connect().await?;
//!
//!     let overrides = ClusterOverrides::named("t1")
//!         .node_port(19944)
//!         .indexer_port(18088)
//!         .proof_server_port(16300);
//!
//!     let data = cluster.make(&overrides).await?;
//!     let started = cluster.start(&data).await;
//!
//!     if started.is_ok() {
//!         let endpoints = cluster.network_config(&data);
//!         println!("indexer at {}", endpoints.indexer);
//!     }
//!
//!     // Always clean up, even after a failed start.
//!     cluster.remove(&data).await;
//!     started?;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod cluster;
pub mod config;
pub mod container;
pub mod engine;
pub mod error;
pub mod health;
pub mod images;

// Re-export commonly used types at the crate root
pub use cluster::{
    Cluster, ClusterData, ClusterState, ClusterStatus, ServiceStatus, TeardownReport,
};
pub use config::{ClusterConfig, ClusterOverrides, NetworkEndpoints, ServiceRole};
pub use container::{ContainerHandle, ContainerState};
pub use engine::{ContainerEngine, DockerEngine};
pub use error::{OrchestratorError, Result};
