use std::sync::Arc;

use heph_core::docker::DockerRuntime;
use heph_core::hub::StatusHub;
use heph_core::manager::DeploymentManager;

use crate::config::ServerConfig;
use crate::storage::FileStore;

/// Shared handles for the HTTP layer.
#[derive(Clone)]
pub struct AppState {
    pub cfg: Arc<ServerConfig>,
    pub manager: Arc<DeploymentManager<DockerRuntime>>,
    pub hub: Arc<StatusHub>,
    pub store: Arc<FileStore>,
}
