//! Error types for the orchestrator crate.
//!
//! Errors are layered the way the orchestrator is: engine failures are wrapped
//! into [`ContainerError`] or [`ImageError`] by the primitives, health waits
//! fail with [`HealthCheckError`], and the cluster operations wrap whichever
//! of those stopped them into a [`ClusterError`] naming the operation and the
//! service.

use std::fmt;
use std::time::Duration;

use thiserror::Error;

use crate::config::ServiceRole;

/// Result type for orchestrator operations.
pub type Result<T> = std::result::Result<T, OrchestratorError>;

/// Errors that can occur during orchestration operations.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// A cluster-level operation failed.
    #[error(transparent)]
    Cluster(#[from] ClusterError),

    /// A container primitive failed.
    #[error(transparent)]
    Container(#[from] ContainerError),

    /// A readiness wait failed.
    #[error(transparent)]
    HealthCheck(#[from] HealthCheckError),

    /// Image inspection or pull failed.
    #[error(transparent)]
    Image(#[from] ImageError),

    /// The container engine could not be reached at all.
    #[error("container engine unreachable: {0}")]
    EngineUnreachable(#[source] EngineError),

    /// Configuration could not be loaded.
    #[error("configuration error: {0}")]
    Configuration(String),
}

impl OrchestratorError {
    /// Creates a configuration error.
    pub fn configuration(reason: impl Into<String>) -> Self {
        Self::Configuration(reason.into())
    }

    /// Returns the innermost container error, looking through cluster layers.
    pub fn container_error(&self) -> Option<&ContainerError> {
        match self {
            Self::Container(err) => Some(err),
            Self::Cluster(err) => err.cause.container_error(),
            _ => None,
        }
    }

    /// Returns the innermost health check error, looking through cluster layers.
    pub fn health_check_error(&self) -> Option<&HealthCheckError> {
        match self {
            Self::HealthCheck(err) => Some(err),
            Self::Cluster(err) => err.cause.health_check_error(),
            _ => None,
        }
    }

    /// Returns true if this is a not found error.
    pub fn is_not_found(&self) -> bool {
        self.container_error()
            .is_some_and(|e| e.reason == ContainerErrorReason::NotFound)
    }
}

impl From<toml::de::Error> for OrchestratorError {
    fn from(err: toml::de::Error) -> Self {
        Self::Configuration(err.to_string())
    }
}

/// Cluster lifecycle operation, used to label [`ClusterError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClusterOperation {
    /// Creating the cluster containers.
    Make,
    /// Starting and health-checking the services.
    Start,
    /// Stopping the services.
    Stop,
    /// Removing the containers and network.
    Remove,
    /// Attaching to an already created cluster.
    Attach,
}

impl ClusterOperation {
    /// Returns the operation name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Make => "make",
            Self::Start => "start",
            Self::Stop => "stop",
            Self::Remove => "remove",
            Self::Attach => "attach",
        }
    }
}

impl fmt::Display for ClusterOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A cluster operation failed at a given service.
#[derive(Debug)]
pub struct ClusterError {
    /// The operation that failed.
    pub operation: ClusterOperation,
    /// The cluster name.
    pub cluster: String,
    /// The service being handled when the failure happened, if any.
    pub service: Option<ServiceRole>,
    /// The underlying failure.
    pub cause: Box<OrchestratorError>,
}

impl ClusterError {
    /// Creates a cluster error.
    pub fn new(
        operation: ClusterOperation,
        cluster: impl Into<String>,
        service: Option<ServiceRole>,
        cause: impl Into<OrchestratorError>,
    ) -> Self {
        Self {
            operation,
            cluster: cluster.into(),
            service,
            cause: Box::new(cause.into()),
        }
    }
}

impl fmt::Display for ClusterError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cluster {} {} failed", self.cluster, self.operation)?;
        if let Some(service) = self.service {
            write!(f, " at {}", service)?;
        }
        write!(f, ": {}", self.cause)
    }
}

impl std::error::Error for ClusterError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(self.cause.as_ref())
    }
}

/// Reason code carried by a [`ContainerError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerErrorReason {
    /// Creating the container from its definition failed.
    CreateFailed,
    /// The engine refused to start the container.
    StartFailed,
    /// The engine failed to stop the container.
    StopFailed,
    /// The engine failed to remove the container.
    RemovalFailed,
    /// Inspecting the container failed.
    InspectionFailed,
    /// No container with the given id or name exists.
    NotFound,
}

impl ContainerErrorReason {
    /// Returns the reason code.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CreateFailed => "container_create_failed",
            Self::StartFailed => "container_start_failed",
            Self::StopFailed => "container_stop_failed",
            Self::RemovalFailed => "container_removal_failed",
            Self::InspectionFailed => "container_inspection_failed",
            Self::NotFound => "container_not_found",
        }
    }
}

impl fmt::Display for ContainerErrorReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A container lifecycle primitive failed.
#[derive(Debug)]
pub struct ContainerError {
    /// Reason code.
    pub reason: ContainerErrorReason,
    /// Container name or id.
    pub container: String,
    /// Human-readable message.
    pub message: String,
    /// Engine error that caused the failure, if any.
    pub cause: Option<EngineError>,
}

impl ContainerError {
    /// Creates a container error wrapping an engine failure.
    pub fn from_engine(
        reason: ContainerErrorReason,
        container: impl Into<String>,
        cause: EngineError,
    ) -> Self {
        let reason = if cause.kind == EngineErrorKind::NotFound {
            ContainerErrorReason::NotFound
        } else {
            reason
        };
        Self {
            reason,
            container: container.into(),
            message: cause.message.clone(),
            cause: Some(cause),
        }
    }

    /// Creates a container not found error.
    pub fn not_found(container: impl Into<String>) -> Self {
        let container = container.into();
        Self {
            reason: ContainerErrorReason::NotFound,
            message: format!("no container named {}", container),
            container,
            cause: None,
        }
    }

    /// Returns a remediation hint for failures with a known fix.
    pub fn hint(&self) -> Option<&'static str> {
        let message = self.message.to_ascii_lowercase();
        match self.reason {
            ContainerErrorReason::StartFailed
                if message.contains("port is already allocated")
                    || message.contains("address already in use") =>
            {
                Some("the host port is already in use; configure another port or stop the cluster holding it")
            }
            ContainerErrorReason::CreateFailed if message.contains("is already in use") => {
                Some("a container with this name already exists; remove the stale cluster first")
            }
            _ => None,
        }
    }
}

impl fmt::Display for ContainerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} for {}: {}", self.reason, self.container, self.message)?;
        if let Some(hint) = self.hint() {
            write!(f, " (hint: {})", hint)?;
        }
        Ok(())
    }
}

impl std::error::Error for ContainerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.cause
            .as_ref()
            .map(|e| e as &(dyn std::error::Error + 'static))
    }
}

/// A readiness wait failed.
#[derive(Debug, Error)]
#[error("health check failed for {service} ({target}): {cause}")]
pub struct HealthCheckError {
    /// Service being waited on.
    pub service: String,
    /// Probed target (URL, address or container).
    pub target: String,
    /// Why the wait failed.
    #[source]
    pub cause: HealthCheckCause,
}

impl HealthCheckError {
    /// Creates a health check error.
    pub fn new(
        service: impl Into<String>,
        target: impl Into<String>,
        cause: impl Into<HealthCheckCause>,
    ) -> Self {
        Self {
            service: service.into(),
            target: target.into(),
            cause: cause.into(),
        }
    }

    /// Returns true if the wait ran out of time.
    pub fn is_timeout(&self) -> bool {
        matches!(self.cause, HealthCheckCause::Timeout(_))
    }
}

/// Cause of a [`HealthCheckError`].
#[derive(Debug, Error)]
pub enum HealthCheckCause {
    /// The probe never reached the required success streak.
    #[error(transparent)]
    Timeout(#[from] PollTimeout),

    /// The probe could not be constructed.
    #[error("invalid probe: {0}")]
    InvalidProbe(String),
}

/// The poll combinator gave up.
#[derive(Debug, Clone, Error)]
#[error("timed out after {elapsed:?} ({attempts} attempts){}", last_error_suffix(.last_error))]
pub struct PollTimeout {
    /// Time spent polling.
    pub elapsed: Duration,
    /// Number of attempts made.
    pub attempts: u32,
    /// The failure reported by the last attempt.
    pub last_error: Option<String>,
}

fn last_error_suffix(last_error: &Option<String>) -> String {
    last_error
        .as_ref()
        .map(|e| format!(", last error: {}", e))
        .unwrap_or_default()
}

/// Reason code carried by an [`ImageError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageErrorReason {
    /// Listing local images failed.
    InspectionFailed,
    /// Pulling the image failed.
    PullFailed,
}

impl fmt::Display for ImageErrorReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::InspectionFailed => "image_inspection_failed",
            Self::PullFailed => "image_pull_failed",
        })
    }
}

/// An image operation failed.
#[derive(Debug, Error)]
#[error("{reason} for {image}: {cause}")]
pub struct ImageError {
    /// Reason code.
    pub reason: ImageErrorReason,
    /// Image reference.
    pub image: String,
    /// Engine error that caused the failure.
    #[source]
    pub cause: EngineError,
}

impl ImageError {
    /// Creates an image inspection failed error.
    pub fn inspection_failed(image: impl Into<String>, cause: EngineError) -> Self {
        Self {
            reason: ImageErrorReason::InspectionFailed,
            image: image.into(),
            cause,
        }
    }

    /// Creates an image pull failed error.
    pub fn pull_failed(image: impl Into<String>, cause: EngineError) -> Self {
        Self {
            reason: ImageErrorReason::PullFailed,
            image: image.into(),
            cause,
        }
    }
}

/// Classification of an [`EngineError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineErrorKind {
    /// The addressed object does not exist.
    NotFound,
    /// The request was a no-op (e.g. stopping a stopped container).
    NotModified,
    /// The request conflicts with existing engine state.
    Conflict,
    /// The engine could not be reached.
    Unreachable,
    /// Anything else.
    Other,
}

/// An error reported by the container engine.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct EngineError {
    /// Classification.
    pub kind: EngineErrorKind,
    /// Engine message.
    pub message: String,
}

impl EngineError {
    /// Creates an engine error.
    pub fn new(kind: EngineErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Creates a not found engine error.
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(EngineErrorKind::NotFound, message)
    }

    /// Returns true if the object does not exist.
    pub fn is_not_found(&self) -> bool {
        self.kind == EngineErrorKind::NotFound
    }

    /// Returns true if the request was a no-op.
    pub fn is_not_modified(&self) -> bool {
        self.kind == EngineErrorKind::NotModified
    }
}

impl From<bollard::errors::Error> for EngineError {
    fn from(err: bollard::errors::Error) -> Self {
        use bollard::errors::Error as Bollard;

        let kind = match &err {
            Bollard::DockerResponseServerError { status_code, .. } => match status_code {
                404 => EngineErrorKind::NotFound,
                304 => EngineErrorKind::NotModified,
                409 => EngineErrorKind::Conflict,
                _ => EngineErrorKind::Other,
            },
            Bollard::SocketNotFoundError(_)
            | Bollard::IOError { .. }
            | Bollard::RequestTimeoutError => EngineErrorKind::Unreachable,
            _ => EngineErrorKind::Other,
        };

        let message = match err {
            Bollard::DockerResponseServerError { message, .. } => message,
            other => other.to_string(),
        };

        Self { kind, message }
    }
}
