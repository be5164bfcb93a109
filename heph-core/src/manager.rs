//! The deployment state machine: drives diagrams into running containers
//! and tracks the node ↔ container mapping.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::Mutex;
use thiserror::Error;
use tracing::{error, info};

use crate::catalog::sanitize_name;
use crate::model::{Diagram, DiagramEdge, DiagramNode};
use crate::runtime::{ContainerRuntime, ContainerStatus, RuntimeError, TeardownError};
use crate::status::{DeployState, NodeStatus, StatusMessage, STATUS_MESSAGE_TYPE};
use crate::translate::{TranslateError, Translator};

#[derive(Debug, Error)]
pub enum DeployError {
    #[error("deployment already in progress")]
    AlreadyDeploying,
    #[error("no active deployment")]
    NotDeployed,
    #[error("translate diagram: {0}")]
    Translate(#[from] TranslateError),
    #[error(transparent)]
    Runtime(#[from] RuntimeError),
    #[error(transparent)]
    Teardown(#[from] TeardownError),
}

struct ManagerState {
    state: DeployState,
    /// Node id → container id.
    node_containers: BTreeMap<String, String>,
    /// Container id → node id. Inverse of `node_containers`.
    container_nodes: BTreeMap<String, String>,
    last_diagram: Option<Diagram>,
}

/// Coordinates deployments against a container runtime.
///
/// All bookkeeping lives behind one mutex which is only ever held across
/// map reads and writes, never across runtime I/O.
pub struct DeploymentManager<R: ContainerRuntime> {
    runtime: Arc<R>,
    inner: Mutex<ManagerState>,
}

impl<R: ContainerRuntime> DeploymentManager<R> {
    pub fn new(runtime: Arc<R>) -> Self {
        Self {
            runtime,
            inner: Mutex::new(ManagerState {
                state: DeployState::Idle,
                node_containers: BTreeMap::new(),
                container_nodes: BTreeMap::new(),
                last_diagram: None,
            }),
        }
    }

    pub fn runtime(&self) -> &Arc<R> {
        &self.runtime
    }

    fn set_state(&self, state: DeployState) {
        self.inner.lock().state = state;
    }

    fn record_mapping(&self, node_id: &str, container_id: &str) {
        let mut inner = self.inner.lock();
        inner
            .node_containers
            .insert(node_id.to_string(), container_id.to_string());
        inner
            .container_nodes
            .insert(container_id.to_string(), node_id.to_string());
    }

    /// Translates the diagram and starts its containers in dependency
    /// order. Fails fast with `AlreadyDeploying` when a deployment is in
    /// progress or live. Any failure transitions to `Error`, leaving the
    /// partial mapping visible so `teardown` can reclaim it.
    pub async fn deploy(&self, diagram: &Diagram) -> Result<(), DeployError> {
        {
            let mut inner = self.inner.lock();
            if matches!(inner.state, DeployState::Deploying | DeployState::Deployed) {
                return Err(DeployError::AlreadyDeploying);
            }
            inner.state = DeployState::Deploying;
            inner.node_containers.clear();
            inner.container_nodes.clear();
        }

        info!(diagram = %diagram.id, nodes = diagram.nodes.len(), "deploying diagram");

        // A fresh translator per call: its port allocator must not be
        // shared between concurrent translations.
        let mut translator = Translator::new();
        let specs = match translator.translate(diagram) {
            Ok(specs) => specs,
            Err(e) => {
                self.set_state(DeployState::Error);
                return Err(e.into());
            }
        };

        if let Err(e) = self.runtime.create_network().await {
            self.set_state(DeployState::Error);
            return Err(e.into());
        }

        // Container spec names are sanitized node names; invert that to
        // correlate created containers back to their nodes.
        let node_by_name: BTreeMap<String, &str> = diagram
            .nodes
            .iter()
            .map(|n| (sanitize_name(&n.name), n.id.as_str()))
            .collect();

        for spec in &specs {
            let container_id = match self.runtime.create_container(spec).await {
                Ok(id) => id,
                Err(e) => {
                    error!(container = %spec.name, "create failed during deploy");
                    self.set_state(DeployState::Error);
                    return Err(e.into());
                }
            };

            if let Err(e) = self.runtime.start_container(&container_id).await {
                error!(container = %spec.name, "start failed during deploy");
                // Record before bailing so teardown can see the container.
                if let Some(node_id) = node_by_name.get(&spec.name) {
                    self.record_mapping(node_id, &container_id);
                }
                self.set_state(DeployState::Error);
                return Err(e.into());
            }

            if let Some(node_id) = node_by_name.get(&spec.name) {
                self.record_mapping(node_id, &container_id);
            }
        }

        {
            let mut inner = self.inner.lock();
            inner.state = DeployState::Deployed;
            inner.last_diagram = Some(diagram.clone());
        }
        info!(diagram = %diagram.id, containers = specs.len(), "deploy complete");

        Ok(())
    }

    /// Stops and removes everything, then returns to `Idle`. Local
    /// bookkeeping is cleared even when the runtime reports errors; those
    /// errors are still surfaced to the caller.
    pub async fn teardown(&self) -> Result<(), DeployError> {
        {
            let mut inner = self.inner.lock();
            if !matches!(inner.state, DeployState::Deployed | DeployState::Error) {
                return Err(DeployError::NotDeployed);
            }
            inner.state = DeployState::TearingDown;
        }

        info!("tearing down deployment");
        let result = self.runtime.teardown_all().await;

        {
            let mut inner = self.inner.lock();
            inner.state = DeployState::Idle;
            inner.node_containers.clear();
            inner.container_nodes.clear();
            inner.last_diagram = None;
        }

        result.map_err(DeployError::Teardown)
    }

    /// Applies an incremental diff: removed nodes are stopped and removed
    /// first, then added nodes are translated (with the shared edge set
    /// for ordering context) and started. Survivors are untouched.
    pub async fn apply_diff(
        &self,
        added: &[DiagramNode],
        removed: &[DiagramNode],
        edges: &[DiagramEdge],
    ) -> Result<(), DeployError> {
        {
            let inner = self.inner.lock();
            if inner.state != DeployState::Deployed {
                return Err(DeployError::NotDeployed);
            }
        }

        for node in removed {
            let container_id = self.inner.lock().node_containers.get(&node.id).cloned();
            let Some(container_id) = container_id else {
                continue;
            };

            self.runtime.stop_container(&container_id).await?;
            self.runtime.remove_container(&container_id).await?;

            let mut inner = self.inner.lock();
            inner.node_containers.remove(&node.id);
            inner.container_nodes.remove(&container_id);
            info!(node = %node.id, "removed node from deployment");
        }

        if !added.is_empty() {
            let added_diagram = Diagram {
                id: String::new(),
                name: String::new(),
                nodes: added.to_vec(),
                edges: edges.to_vec(),
            };

            let mut translator = Translator::new();
            let specs = translator.translate(&added_diagram)?;

            let node_by_name: BTreeMap<String, &str> = added
                .iter()
                .map(|n| (sanitize_name(&n.name), n.id.as_str()))
                .collect();

            for spec in &specs {
                let container_id = self.runtime.create_container(spec).await?;
                self.runtime.start_container(&container_id).await?;

                if let Some(node_id) = node_by_name.get(&spec.name) {
                    self.record_mapping(node_id, &container_id);
                    info!(node = %node_id, "added node to deployment");
                }
            }
        }

        Ok(())
    }

    /// Current state plus one health-checked status per mapped container.
    pub async fn get_status(&self) -> (DeployState, Vec<NodeStatus>) {
        let (state, node_containers) = {
            let inner = self.inner.lock();
            (inner.state, inner.node_containers.clone())
        };

        if state == DeployState::Idle || node_containers.is_empty() {
            return (state, Vec::new());
        }

        let mut statuses = Vec::with_capacity(node_containers.len());
        for (node_id, container_id) in node_containers {
            let status = match self.runtime.health_check(&container_id).await {
                Ok(status) => status,
                Err(_) => ContainerStatus::Error,
            };
            statuses.push(NodeStatus {
                node_id,
                container_id,
                status,
            });
        }

        (state, statuses)
    }

    /// Pure projection of a poller snapshot into a broadcast message.
    /// Containers tracked here but missing from the snapshot surface as
    /// `Error`.
    pub fn build_status_message(
        &self,
        container_statuses: &BTreeMap<String, ContainerStatus>,
    ) -> StatusMessage {
        let (state, container_nodes) = {
            let inner = self.inner.lock();
            (inner.state, inner.container_nodes.clone())
        };

        let node_statuses = container_nodes
            .into_iter()
            .map(|(container_id, node_id)| NodeStatus {
                status: container_statuses
                    .get(&container_id)
                    .copied()
                    .unwrap_or(ContainerStatus::Error),
                node_id,
                container_id,
            })
            .collect();

        StatusMessage {
            message_type: STATUS_MESSAGE_TYPE.to_string(),
            deploy_status: state,
            node_statuses,
        }
    }

    pub fn state(&self) -> DeployState {
        self.inner.lock().state
    }

    /// The last successfully deployed diagram, if any.
    pub fn last_diagram(&self) -> Option<Diagram> {
        self.inner.lock().last_diagram.clone()
    }

    /// Replaces the stored diagram snapshot after an incremental update.
    pub fn update_last_diagram(&self, diagram: Diagram) {
        self.inner.lock().last_diagram = Some(diagram);
    }

    /// Node id for a container id, when tracked.
    pub fn node_for_container(&self, container_id: &str) -> Option<String> {
        self.inner.lock().container_nodes.get(container_id).cloned()
    }

    #[cfg(test)]
    fn mapping_sizes(&self) -> (usize, usize) {
        let inner = self.inner.lock();
        (inner.node_containers.len(), inner.container_nodes.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Position;
    use crate::runtime::ContainerInfo;
    use crate::translate::ContainerSpec;
    use async_trait::async_trait;

    #[derive(Default)]
    struct FakeState {
        next_id: u64,
        /// Container id → (name, status).
        containers: BTreeMap<String, (String, ContainerStatus)>,
        created_order: Vec<String>,
        started: Vec<String>,
        stopped: Vec<String>,
        removed: Vec<String>,
        network_creates: u64,
        fail_start_of: Option<String>,
        fail_teardown: bool,
    }

    #[derive(Default)]
    struct FakeRuntime {
        state: Mutex<FakeState>,
    }

    impl FakeRuntime {
        fn failing_start_of(name: &str) -> Self {
            let fake = Self::default();
            fake.state.lock().fail_start_of = Some(name.to_string());
            fake
        }

        fn set_status(&self, container_id: &str, status: ContainerStatus) {
            if let Some(entry) = self.state.lock().containers.get_mut(container_id) {
                entry.1 = status;
            }
        }

        fn created_order(&self) -> Vec<String> {
            self.state.lock().created_order.clone()
        }

        fn stopped(&self) -> Vec<String> {
            self.state.lock().stopped.clone()
        }

        fn removed(&self) -> Vec<String> {
            self.state.lock().removed.clone()
        }
    }

    #[async_trait]
    impl ContainerRuntime for FakeRuntime {
        async fn create_network(&self) -> Result<(), RuntimeError> {
            self.state.lock().network_creates += 1;
            Ok(())
        }

        async fn remove_network(&self) -> Result<(), RuntimeError> {
            Ok(())
        }

        async fn create_container(&self, spec: &ContainerSpec) -> Result<String, RuntimeError> {
            let mut state = self.state.lock();
            state.next_id += 1;
            let id = format!("ctr-{}", state.next_id);
            state
                .containers
                .insert(id.clone(), (spec.name.clone(), ContainerStatus::Created));
            state.created_order.push(spec.name.clone());
            Ok(id)
        }

        async fn start_container(&self, container_id: &str) -> Result<(), RuntimeError> {
            let mut state = self.state.lock();
            let name = state
                .containers
                .get(container_id)
                .map(|(name, _)| name.clone())
                .unwrap_or_default();
            if state.fail_start_of.as_deref() == Some(name.as_str()) {
                return Err(RuntimeError::Start {
                    id: container_id.to_string(),
                    message: "injected failure".to_string(),
                });
            }
            if let Some(entry) = state.containers.get_mut(container_id) {
                entry.1 = ContainerStatus::Running;
            }
            state.started.push(container_id.to_string());
            Ok(())
        }

        async fn stop_container(&self, container_id: &str) -> Result<(), RuntimeError> {
            let mut state = self.state.lock();
            if let Some(entry) = state.containers.get_mut(container_id) {
                entry.1 = ContainerStatus::Stopped;
            }
            state.stopped.push(container_id.to_string());
            Ok(())
        }

        async fn remove_container(&self, container_id: &str) -> Result<(), RuntimeError> {
            let mut state = self.state.lock();
            state.containers.remove(container_id);
            state.removed.push(container_id.to_string());
            Ok(())
        }

        async fn list_containers(&self) -> Result<Vec<ContainerInfo>, RuntimeError> {
            Ok(self
                .state
                .lock()
                .containers
                .iter()
                .map(|(id, (name, status))| ContainerInfo {
                    id: id.clone(),
                    name: name.clone(),
                    image: String::new(),
                    status: *status,
                })
                .collect())
        }

        async fn inspect_container(
            &self,
            container_id: &str,
        ) -> Result<ContainerInfo, RuntimeError> {
            self.state
                .lock()
                .containers
                .get(container_id)
                .map(|(name, status)| ContainerInfo {
                    id: container_id.to_string(),
                    name: name.clone(),
                    image: String::new(),
                    status: *status,
                })
                .ok_or_else(|| RuntimeError::Inspect {
                    id: container_id.to_string(),
                    message: "no such container".to_string(),
                })
        }

        async fn health_check(&self, container_id: &str) -> Result<ContainerStatus, RuntimeError> {
            let mut state = self.state.lock();
            match state.containers.get(container_id) {
                Some((_, status)) => Ok(*status),
                None => {
                    state.containers.remove(container_id);
                    Ok(ContainerStatus::Error)
                }
            }
        }

        fn managed_ids(&self) -> Vec<String> {
            self.state.lock().containers.keys().cloned().collect()
        }

        async fn teardown_all(&self) -> Result<(), TeardownError> {
            let mut state = self.state.lock();
            state.containers.clear();
            if state.fail_teardown {
                let mut err = TeardownError::default();
                err.push(RuntimeError::Stop {
                    id: "ctr-1".to_string(),
                    message: "injected teardown failure".to_string(),
                });
                return Err(err);
            }
            Ok(())
        }
    }

    fn node(id: &str, class: &str) -> DiagramNode {
        DiagramNode {
            id: id.to_string(),
            class: class.to_string(),
            name: id.to_string(),
            description: String::new(),
            position: Some(Position::default()),
            config: None,
        }
    }

    fn edge(source: &str, target: &str) -> DiagramEdge {
        DiagramEdge {
            id: format!("{source}->{target}"),
            source: source.to_string(),
            target: target.to_string(),
            label: String::new(),
        }
    }

    fn chain_diagram() -> Diagram {
        Diagram {
            id: "d1".to_string(),
            name: "chain".to_string(),
            nodes: vec![
                node("db", "relational-db"),
                node("api", "api-service"),
                node("gw", "reverse-proxy"),
            ],
            edges: vec![edge("api", "db"), edge("gw", "api")],
        }
    }

    fn manager() -> (Arc<FakeRuntime>, DeploymentManager<FakeRuntime>) {
        let runtime = Arc::new(FakeRuntime::default());
        let manager = DeploymentManager::new(runtime.clone());
        (runtime, manager)
    }

    #[tokio::test]
    async fn test_deploy_linear_chain() {
        let (runtime, manager) = manager();
        manager.deploy(&chain_diagram()).await.unwrap();

        assert_eq!(manager.state(), DeployState::Deployed);
        assert_eq!(runtime.created_order(), vec!["db", "api", "gw"]);
        assert_eq!(runtime.state.lock().network_creates, 1);
        assert_eq!(manager.mapping_sizes(), (3, 3));

        // The two maps are inverses.
        for node_id in ["db", "api", "gw"] {
            let container = manager
                .inner
                .lock()
                .node_containers
                .get(node_id)
                .cloned()
                .unwrap();
            assert_eq!(manager.node_for_container(&container).unwrap(), node_id);
        }

        let (state, statuses) = manager.get_status().await;
        assert_eq!(state, DeployState::Deployed);
        assert_eq!(statuses.len(), 3);
        assert!(statuses
            .iter()
            .all(|s| s.status == ContainerStatus::Running));
    }

    #[tokio::test]
    async fn test_deploy_while_deployed_fails_fast() {
        let (_runtime, manager) = manager();
        manager.deploy(&chain_diagram()).await.unwrap();

        let err = manager.deploy(&chain_diagram()).await.unwrap_err();
        assert!(matches!(err, DeployError::AlreadyDeploying));
    }

    #[tokio::test]
    async fn test_teardown_while_idle_fails() {
        let (_runtime, manager) = manager();
        let err = manager.teardown().await.unwrap_err();
        assert!(matches!(err, DeployError::NotDeployed));
    }

    #[tokio::test]
    async fn test_apply_diff_requires_deployed() {
        let (_runtime, manager) = manager();
        let err = manager.apply_diff(&[], &[], &[]).await.unwrap_err();
        assert!(matches!(err, DeployError::NotDeployed));
    }

    #[tokio::test]
    async fn test_deploy_failure_leaves_partial_state_for_teardown() {
        let runtime = Arc::new(FakeRuntime::failing_start_of("api"));
        let manager = DeploymentManager::new(runtime.clone());

        let err = manager.deploy(&chain_diagram()).await.unwrap_err();
        assert!(matches!(err, DeployError::Runtime(RuntimeError::Start { .. })));
        assert_eq!(manager.state(), DeployState::Error);

        // db started, api created-but-failed; both are visible in the
        // mapping so teardown can reclaim them.
        assert_eq!(manager.mapping_sizes(), (2, 2));

        manager.teardown().await.unwrap();
        assert_eq!(manager.state(), DeployState::Idle);
        assert_eq!(manager.mapping_sizes(), (0, 0));
    }

    #[tokio::test]
    async fn test_teardown_clears_state_even_when_runtime_fails() {
        let (runtime, manager) = manager();
        manager.deploy(&chain_diagram()).await.unwrap();
        runtime.state.lock().fail_teardown = true;

        let err = manager.teardown().await.unwrap_err();
        assert!(matches!(err, DeployError::Teardown(_)));
        assert_eq!(manager.state(), DeployState::Idle);
        assert_eq!(manager.mapping_sizes(), (0, 0));
        assert!(manager.last_diagram().is_none());
    }

    #[tokio::test]
    async fn test_teardown_then_redeploy() {
        let (_runtime, manager) = manager();
        manager.deploy(&chain_diagram()).await.unwrap();
        manager.teardown().await.unwrap();
        manager.deploy(&chain_diagram()).await.unwrap();
        assert_eq!(manager.state(), DeployState::Deployed);
    }

    #[tokio::test]
    async fn test_apply_diff_add_only_touches_new_node() {
        let (runtime, manager) = manager();
        manager.deploy(&chain_diagram()).await.unwrap();
        let creates_before = runtime.created_order().len();

        manager
            .apply_diff(&[node("cache", "cache")], &[], &chain_diagram().edges)
            .await
            .unwrap();

        assert_eq!(runtime.created_order().len(), creates_before + 1);
        assert_eq!(runtime.created_order().last().unwrap(), "cache");
        assert!(runtime.stopped().is_empty());
        assert!(runtime.removed().is_empty());
        assert_eq!(manager.mapping_sizes(), (4, 4));
        assert_eq!(manager.state(), DeployState::Deployed);
    }

    #[tokio::test]
    async fn test_apply_diff_remove_only_touches_removed_node() {
        let (runtime, manager) = manager();
        manager.deploy(&chain_diagram()).await.unwrap();

        let api_container = manager
            .inner
            .lock()
            .node_containers
            .get("api")
            .cloned()
            .unwrap();

        manager
            .apply_diff(&[], &[node("api", "api-service")], &[])
            .await
            .unwrap();

        assert_eq!(runtime.stopped(), vec![api_container.clone()]);
        assert_eq!(runtime.removed(), vec![api_container]);
        assert_eq!(manager.mapping_sizes(), (2, 2));

        // Survivors were never stopped.
        let (_, statuses) = manager.get_status().await;
        assert_eq!(statuses.len(), 2);
        assert!(statuses
            .iter()
            .all(|s| s.status == ContainerStatus::Running));
    }

    #[tokio::test]
    async fn test_apply_diff_unmapped_removed_node_is_skipped() {
        let (runtime, manager) = manager();
        manager.deploy(&chain_diagram()).await.unwrap();

        manager
            .apply_diff(&[], &[node("ghost", "cache")], &[])
            .await
            .unwrap();

        assert!(runtime.stopped().is_empty());
        assert_eq!(manager.mapping_sizes(), (3, 3));
    }

    #[tokio::test]
    async fn test_get_status_idle_is_empty() {
        let (_runtime, manager) = manager();
        let (state, statuses) = manager.get_status().await;
        assert_eq!(state, DeployState::Idle);
        assert!(statuses.is_empty());
    }

    #[tokio::test]
    async fn test_get_status_reports_per_container_health() {
        let (runtime, manager) = manager();
        manager.deploy(&chain_diagram()).await.unwrap();

        let db_container = manager
            .inner
            .lock()
            .node_containers
            .get("db")
            .cloned()
            .unwrap();
        runtime.set_status(&db_container, ContainerStatus::Unhealthy);

        let (_, statuses) = manager.get_status().await;
        let db = statuses.iter().find(|s| s.node_id == "db").unwrap();
        assert_eq!(db.status, ContainerStatus::Unhealthy);
    }

    #[tokio::test]
    async fn test_build_status_message_marks_missing_containers_error() {
        let (runtime, manager) = manager();
        manager.deploy(&chain_diagram()).await.unwrap();

        let mut snapshot = BTreeMap::new();
        for id in runtime.managed_ids() {
            snapshot.insert(id, ContainerStatus::Healthy);
        }
        // Drop one container from the snapshot.
        let dropped = snapshot.keys().next().cloned().unwrap();
        snapshot.remove(&dropped);

        let msg = manager.build_status_message(&snapshot);
        assert_eq!(msg.message_type, "status_update");
        assert_eq!(msg.deploy_status, DeployState::Deployed);
        assert_eq!(msg.node_statuses.len(), 3);

        let missing = msg
            .node_statuses
            .iter()
            .find(|s| s.container_id == dropped)
            .unwrap();
        assert_eq!(missing.status, ContainerStatus::Error);
        assert!(msg
            .node_statuses
            .iter()
            .filter(|s| s.container_id != dropped)
            .all(|s| s.status == ContainerStatus::Healthy));
    }

    #[tokio::test]
    async fn test_deploy_stores_diagram_snapshot() {
        let (_runtime, manager) = manager();
        assert!(manager.last_diagram().is_none());
        manager.deploy(&chain_diagram()).await.unwrap();
        assert_eq!(manager.last_diagram().unwrap().id, "d1");
    }
}
