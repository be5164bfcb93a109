//! Runtime-neutral interface over the external container engine.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::translate::ContainerSpec;

/// Graceful stop timeout, in seconds, for a single container.
pub const STOP_TIMEOUT_SECS: i64 = 10;

/// Canonical status of a managed container, mapped from engine-reported
/// states.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerStatus {
    Created,
    Running,
    Healthy,
    Unhealthy,
    Stopped,
    #[default]
    Error,
}

impl std::fmt::Display for ContainerStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ContainerStatus::Created => "created",
            ContainerStatus::Running => "running",
            ContainerStatus::Healthy => "healthy",
            ContainerStatus::Unhealthy => "unhealthy",
            ContainerStatus::Stopped => "stopped",
            ContainerStatus::Error => "error",
        };
        f.write_str(s)
    }
}

/// Current state of a managed container as reported by the engine.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ContainerInfo {
    pub id: String,
    pub name: String,
    pub image: String,
    pub status: ContainerStatus,
}

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("connect to container engine: {message}")]
    Connect { message: String },
    #[error("pull image {image:?}: {message}")]
    Pull { image: String, message: String },
    #[error("create network {name:?}: {message}")]
    Network { name: String, message: String },
    #[error("create container {name:?}: {message}")]
    Create { name: String, message: String },
    #[error("start container {id:?}: {message}")]
    Start { id: String, message: String },
    #[error("stop container {id:?}: {message}")]
    Stop { id: String, message: String },
    #[error("remove container {id:?}: {message}")]
    Remove { id: String, message: String },
    #[error("inspect container {id:?}: {message}")]
    Inspect { id: String, message: String },
    #[error("list containers: {message}")]
    List { message: String },
}

/// Errors collected while tearing everything down. Teardown never
/// short-circuits; this joins whatever failed along the way.
#[derive(Debug, Default, Error)]
#[error("teardown: {}", .errors.iter().map(|e| e.to_string()).collect::<Vec<_>>().join("; "))]
pub struct TeardownError {
    pub errors: Vec<RuntimeError>,
}

impl TeardownError {
    pub fn push(&mut self, err: RuntimeError) {
        self.errors.push(err);
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    /// `Ok(())` when nothing failed, otherwise the joined error.
    pub fn into_result(self) -> Result<(), TeardownError> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }
}

/// Narrow interface over the external container engine.
///
/// Implementations track the set of containers they created (the managed
/// set) so that teardown and health polling can operate without outside
/// bookkeeping.
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Creates the shared bridge network, reusing it if it already exists.
    async fn create_network(&self) -> Result<(), RuntimeError>;

    /// Removes the shared network. Absent network is not an error.
    async fn remove_network(&self) -> Result<(), RuntimeError>;

    /// Pulls the image to completion, creates the container with the
    /// managed name prefix, attaches it to the shared network, and records
    /// it in the managed set. Returns the engine container id.
    async fn create_container(&self, spec: &ContainerSpec) -> Result<String, RuntimeError>;

    async fn start_container(&self, container_id: &str) -> Result<(), RuntimeError>;

    /// Gracefully stops the container with the standard timeout.
    async fn stop_container(&self, container_id: &str) -> Result<(), RuntimeError>;

    /// Force-removes the container and drops it from the managed set.
    async fn remove_container(&self, container_id: &str) -> Result<(), RuntimeError>;

    /// Lists all containers carrying the managed name prefix.
    async fn list_containers(&self) -> Result<Vec<ContainerInfo>, RuntimeError>;

    async fn inspect_container(&self, container_id: &str) -> Result<ContainerInfo, RuntimeError>;

    /// Inspects one container and maps its state. A vanished container is
    /// locally recoverable: it is dropped from the managed set and
    /// reported as `Error` without an error value.
    async fn health_check(&self, container_id: &str) -> Result<ContainerStatus, RuntimeError>;

    /// Snapshot of the managed container ids.
    fn managed_ids(&self) -> Vec<String>;

    /// Stops and removes every managed container, then removes the shared
    /// network. Continues on failure, collecting errors; "not found" at
    /// any step is ignored. Idempotent.
    async fn teardown_all(&self) -> Result<(), TeardownError>;
}
