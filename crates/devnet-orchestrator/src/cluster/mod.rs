//! Cluster lifecycle.
//!
//! A cluster moves through made, running, stopped and removed:
//!
//! ```text
//! make ──► start ──► stop ──► remove
//!   │         │                  ▲
//!   └─────────┴──────────────────┘
//! ```
//!
//! [`Cluster::make`] and [`Cluster::start`] fail fast with a [`ClusterError`]
//! naming the service; [`Cluster::stop`] and [`Cluster::remove`] always try
//! every service and return a [`TeardownReport`].
//!
//! [`ClusterError`]: crate::error::ClusterError

mod data;
mod orchestrator;
mod readiness;

pub use data::{
    ClusterData, ClusterState, ClusterStatus, ServiceOutcome, ServiceStatus, TeardownReport,
};
pub use orchestrator::Cluster;
pub use readiness::{ProbeReadiness, Readiness};
