//! Docker implementation of the container runtime interface, built on
//! bollard.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use bollard::container::{
    Config, CreateContainerOptions, InspectContainerOptions, ListContainersOptions,
    NetworkingConfig, RemoveContainerOptions, StartContainerOptions, StopContainerOptions,
};
use bollard::errors::Error as BollardError;
use bollard::image::CreateImageOptions;
use bollard::models::{
    ContainerState, ContainerStateStatusEnum, EndpointSettings, HealthStatusEnum, HostConfig,
    PortBinding,
};
use bollard::network::{CreateNetworkOptions, ListNetworksOptions};
use bollard::Docker;
use futures_util::StreamExt;
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::catalog::{CONTAINER_NAME_PREFIX, NETWORK_NAME};
use crate::runtime::{
    ContainerInfo, ContainerRuntime, ContainerStatus, RuntimeError, TeardownError,
    STOP_TIMEOUT_SECS,
};
use crate::translate::ContainerSpec;

#[derive(Default)]
struct Managed {
    network_id: Option<String>,
    /// Container id → prefixed name.
    containers: BTreeMap<String, String>,
}

/// Docker-backed container runtime. Tracks the containers it created so
/// teardown and polling work over the managed set only.
pub struct DockerRuntime {
    client: Docker,
    managed: Mutex<Managed>,
}

impl DockerRuntime {
    /// Connects with local defaults and verifies the daemon responds.
    pub async fn connect() -> Result<Self, RuntimeError> {
        let client =
            Docker::connect_with_local_defaults().map_err(|e| RuntimeError::Connect {
                message: e.to_string(),
            })?;

        client.ping().await.map_err(|e| RuntimeError::Connect {
            message: format!("ping failed: {e}"),
        })?;

        Ok(Self::with_client(client))
    }

    /// Builds a client from local defaults without contacting the daemon.
    /// Connection problems surface on the first engine call.
    pub fn from_local_defaults() -> Result<Self, RuntimeError> {
        let client =
            Docker::connect_with_local_defaults().map_err(|e| RuntimeError::Connect {
                message: e.to_string(),
            })?;
        Ok(Self::with_client(client))
    }

    pub fn with_client(client: Docker) -> Self {
        Self {
            client,
            managed: Mutex::new(Managed::default()),
        }
    }

    /// Checks that the engine responds.
    pub async fn ping(&self) -> Result<(), RuntimeError> {
        self.client
            .ping()
            .await
            .map(|_| ())
            .map_err(|e| RuntimeError::Connect {
                message: format!("ping failed: {e}"),
            })
    }

    async fn pull_image(&self, image: &str) -> Result<(), RuntimeError> {
        debug!(image, "pulling image");
        let options = CreateImageOptions {
            from_image: image.to_string(),
            ..Default::default()
        };

        let mut stream = self.client.create_image(Some(options), None, None);
        while let Some(progress) = stream.next().await {
            progress.map_err(|e| RuntimeError::Pull {
                image: image.to_string(),
                message: e.to_string(),
            })?;
        }
        Ok(())
    }
}

fn is_not_found(err: &BollardError) -> bool {
    matches!(
        err,
        BollardError::DockerResponseServerError {
            status_code: 404,
            ..
        }
    )
}

fn env_pairs(spec: &ContainerSpec) -> Vec<String> {
    spec.env.iter().map(|(k, v)| format!("{k}={v}")).collect()
}

/// Builds bollard's exposed-port and port-binding maps from a spec's
/// host-port → container-port mapping.
fn port_maps(
    spec: &ContainerSpec,
) -> (
    HashMap<String, HashMap<(), ()>>,
    HashMap<String, Option<Vec<PortBinding>>>,
) {
    let mut exposed = HashMap::new();
    let mut bindings = HashMap::new();
    for (host_port, container_port) in &spec.ports {
        let key = format!("{container_port}/tcp");
        exposed.insert(key.clone(), HashMap::new());
        bindings.insert(
            key,
            Some(vec![PortBinding {
                host_ip: None,
                host_port: Some(host_port.clone()),
            }]),
        );
    }
    (exposed, bindings)
}

fn volume_binds(spec: &ContainerSpec) -> Vec<String> {
    spec.volumes
        .iter()
        .map(|(host, container)| format!("{host}:{container}"))
        .collect()
}

/// Maps Docker's short state string (from container listings) to the
/// canonical status.
fn map_list_state(state: Option<&str>) -> ContainerStatus {
    match state {
        Some("created") => ContainerStatus::Created,
        Some("running") => ContainerStatus::Running,
        Some("exited") | Some("dead") => ContainerStatus::Stopped,
        _ => ContainerStatus::Error,
    }
}

/// Maps the detailed inspect state, including health probe results when
/// the engine reports them.
fn map_inspect_state(state: Option<&ContainerState>) -> ContainerStatus {
    let Some(state) = state else {
        return ContainerStatus::Error;
    };

    match state.status {
        Some(ContainerStateStatusEnum::CREATED) => ContainerStatus::Created,
        Some(ContainerStateStatusEnum::RUNNING) => {
            match state.health.as_ref().and_then(|h| h.status) {
                Some(HealthStatusEnum::HEALTHY) => ContainerStatus::Healthy,
                Some(HealthStatusEnum::UNHEALTHY) => ContainerStatus::Unhealthy,
                _ => ContainerStatus::Running,
            }
        }
        Some(ContainerStateStatusEnum::EXITED) | Some(ContainerStateStatusEnum::DEAD) => {
            ContainerStatus::Stopped
        }
        _ => ContainerStatus::Error,
    }
}

#[async_trait]
impl ContainerRuntime for DockerRuntime {
    async fn create_network(&self) -> Result<(), RuntimeError> {
        let mut filters = HashMap::new();
        filters.insert("name", vec![NETWORK_NAME]);

        let existing = self
            .client
            .list_networks(Some(ListNetworksOptions { filters }))
            .await
            .map_err(|e| RuntimeError::Network {
                name: NETWORK_NAME.to_string(),
                message: format!("list networks: {e}"),
            })?;

        if let Some(found) = existing
            .iter()
            .find(|n| n.name.as_deref() == Some(NETWORK_NAME))
        {
            let handle = found.id.clone().unwrap_or_else(|| NETWORK_NAME.to_string());
            self.managed.lock().network_id = Some(handle);
            return Ok(());
        }

        let response = self
            .client
            .create_network(CreateNetworkOptions {
                name: NETWORK_NAME,
                driver: "bridge",
                ..Default::default()
            })
            .await
            .map_err(|e| RuntimeError::Network {
                name: NETWORK_NAME.to_string(),
                message: e.to_string(),
            })?;

        let response_id = response.id.unwrap_or_else(|| NETWORK_NAME.to_string());
        info!(network = NETWORK_NAME, id = %response_id, "created shared network");
        self.managed.lock().network_id = Some(response_id);
        Ok(())
    }

    async fn remove_network(&self) -> Result<(), RuntimeError> {
        let network_id = self.managed.lock().network_id.clone();
        let Some(network_id) = network_id else {
            return Ok(());
        };

        match self.client.remove_network(&network_id).await {
            Ok(()) => {}
            Err(e) if is_not_found(&e) => {}
            Err(e) => {
                return Err(RuntimeError::Network {
                    name: NETWORK_NAME.to_string(),
                    message: e.to_string(),
                })
            }
        }

        self.managed.lock().network_id = None;
        Ok(())
    }

    async fn create_container(&self, spec: &ContainerSpec) -> Result<String, RuntimeError> {
        self.pull_image(&spec.image).await?;

        let prefixed_name = format!("{CONTAINER_NAME_PREFIX}{}", spec.name);
        let (exposed_ports, port_bindings) = port_maps(spec);
        let binds = volume_binds(spec);

        let hostname = if spec.hostname.is_empty() {
            spec.name.clone()
        } else {
            spec.hostname.clone()
        };

        let network = if spec.network.is_empty() {
            NETWORK_NAME.to_string()
        } else {
            spec.network.clone()
        };
        let mut endpoints_config = HashMap::new();
        endpoints_config.insert(network, EndpointSettings::default());

        let config = Config {
            image: Some(spec.image.clone()),
            cmd: if spec.cmd.is_empty() {
                None
            } else {
                Some(spec.cmd.clone())
            },
            env: Some(env_pairs(spec)),
            exposed_ports: Some(exposed_ports),
            hostname: Some(hostname),
            host_config: Some(HostConfig {
                port_bindings: Some(port_bindings),
                binds: if binds.is_empty() { None } else { Some(binds) },
                ..Default::default()
            }),
            networking_config: Some(NetworkingConfig { endpoints_config }),
            ..Default::default()
        };

        let response = self
            .client
            .create_container(
                Some(CreateContainerOptions {
                    name: prefixed_name.clone(),
                    platform: None,
                }),
                config,
            )
            .await
            .map_err(|e| RuntimeError::Create {
                name: prefixed_name.clone(),
                message: e.to_string(),
            })?;

        info!(name = %prefixed_name, id = %response.id, "created container");
        self.managed
            .lock()
            .containers
            .insert(response.id.clone(), prefixed_name);

        Ok(response.id)
    }

    async fn start_container(&self, container_id: &str) -> Result<(), RuntimeError> {
        self.client
            .start_container(container_id, None::<StartContainerOptions<String>>)
            .await
            .map_err(|e| RuntimeError::Start {
                id: container_id.to_string(),
                message: e.to_string(),
            })
    }

    async fn stop_container(&self, container_id: &str) -> Result<(), RuntimeError> {
        self.client
            .stop_container(
                container_id,
                Some(StopContainerOptions {
                    t: STOP_TIMEOUT_SECS,
                }),
            )
            .await
            .map_err(|e| RuntimeError::Stop {
                id: container_id.to_string(),
                message: e.to_string(),
            })
    }

    async fn remove_container(&self, container_id: &str) -> Result<(), RuntimeError> {
        self.client
            .remove_container(
                container_id,
                Some(RemoveContainerOptions {
                    force: true,
                    ..Default::default()
                }),
            )
            .await
            .map_err(|e| RuntimeError::Remove {
                id: container_id.to_string(),
                message: e.to_string(),
            })?;

        self.managed.lock().containers.remove(container_id);
        Ok(())
    }

    async fn list_containers(&self) -> Result<Vec<ContainerInfo>, RuntimeError> {
        let mut filters = HashMap::new();
        filters.insert("name".to_string(), vec![CONTAINER_NAME_PREFIX.to_string()]);

        let containers = self
            .client
            .list_containers(Some(ListContainersOptions {
                all: true,
                filters,
                ..Default::default()
            }))
            .await
            .map_err(|e| RuntimeError::List {
                message: e.to_string(),
            })?;

        Ok(containers
            .into_iter()
            .map(|c| ContainerInfo {
                id: c.id.unwrap_or_default(),
                name: c
                    .names
                    .as_ref()
                    .and_then(|names| names.first())
                    .map(|n| n.trim_start_matches('/').to_string())
                    .unwrap_or_default(),
                image: c.image.unwrap_or_default(),
                status: map_list_state(c.state.as_deref()),
            })
            .collect())
    }

    async fn inspect_container(&self, container_id: &str) -> Result<ContainerInfo, RuntimeError> {
        let response = self
            .client
            .inspect_container(container_id, None::<InspectContainerOptions>)
            .await
            .map_err(|e| RuntimeError::Inspect {
                id: container_id.to_string(),
                message: e.to_string(),
            })?;

        Ok(ContainerInfo {
            id: response.id.unwrap_or_default(),
            name: response
                .name
                .map(|n| n.trim_start_matches('/').to_string())
                .unwrap_or_default(),
            image: response
                .config
                .and_then(|c| c.image)
                .unwrap_or_default(),
            status: map_inspect_state(response.state.as_ref()),
        })
    }

    async fn health_check(&self, container_id: &str) -> Result<ContainerStatus, RuntimeError> {
        match self
            .client
            .inspect_container(container_id, None::<InspectContainerOptions>)
            .await
        {
            Ok(response) => Ok(map_inspect_state(response.state.as_ref())),
            Err(e) if is_not_found(&e) => {
                // The container vanished out from under us; reconcile
                // tracking and report error status without failing the poll.
                warn!(id = container_id, "managed container disappeared");
                self.managed.lock().containers.remove(container_id);
                Ok(ContainerStatus::Error)
            }
            Err(e) => Err(RuntimeError::Inspect {
                id: container_id.to_string(),
                message: e.to_string(),
            }),
        }
    }

    fn managed_ids(&self) -> Vec<String> {
        self.managed.lock().containers.keys().cloned().collect()
    }

    async fn teardown_all(&self) -> Result<(), TeardownError> {
        let ids = self.managed_ids();
        let mut errors = TeardownError::default();

        for id in &ids {
            match self
                .client
                .stop_container(
                    id,
                    Some(StopContainerOptions {
                        t: STOP_TIMEOUT_SECS,
                    }),
                )
                .await
            {
                Ok(()) => {}
                Err(e) if is_not_found(&e) => {}
                Err(e) => errors.push(RuntimeError::Stop {
                    id: id.clone(),
                    message: e.to_string(),
                }),
            }

            match self
                .client
                .remove_container(
                    id,
                    Some(RemoveContainerOptions {
                        force: true,
                        ..Default::default()
                    }),
                )
                .await
            {
                Ok(()) => {}
                Err(e) if is_not_found(&e) => {}
                Err(e) => errors.push(RuntimeError::Remove {
                    id: id.clone(),
                    message: e.to_string(),
                }),
            }
        }

        // Clear tracking regardless of per-container outcomes.
        let network_id = {
            let mut managed = self.managed.lock();
            managed.containers.clear();
            managed.network_id.take()
        };

        if let Some(network_id) = network_id {
            match self.client.remove_network(&network_id).await {
                Ok(()) => {}
                Err(e) if is_not_found(&e) => {}
                Err(e) => errors.push(RuntimeError::Network {
                    name: NETWORK_NAME.to_string(),
                    message: e.to_string(),
                }),
            }
        }

        if !errors.is_empty() {
            warn!(count = errors.errors.len(), "teardown finished with errors");
        }
        errors.into_result()
    }
}
