//! Translation of a diagram into an ordered, port-disjoint list of
//! container specifications.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::catalog;
use crate::model::{
    ApiServiceConfig, CacheConfig, Diagram, DiagramNode, MessageBrokerConfig, ReverseProxyConfig,
    ServiceClass,
};
use crate::openapi::{self, OpenApiError};
use crate::ports::{PortAllocator, PortsExhausted};
use crate::resolver::{self, CyclicDependency};

/// Path inside the mock-server container where the generated OpenAPI spec
/// is mounted.
const CONTAINER_SPEC_PATH: &str = "/tmp/spec.json";

/// A runtime-neutral description of one container to be created.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ContainerSpec {
    pub image: String,
    /// Sanitized name, without the managed prefix.
    pub name: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub cmd: Vec<String>,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    /// Host port → container port, both decimal strings.
    #[serde(default)]
    pub ports: BTreeMap<String, String>,
    /// Host path → container path.
    #[serde(default)]
    pub volumes: BTreeMap<String, String>,
    pub hostname: String,
    pub network: String,
}

#[derive(Debug, Error)]
pub enum TranslateError {
    #[error("unsupported service type {class:?} for node {node:?}")]
    UnsupportedServiceType { node: String, class: String },
    #[error("resolve dependencies: {0}")]
    Cycle(#[from] CyclicDependency),
    #[error("allocate ports for node {node:?}: {source}")]
    Ports {
        node: String,
        source: PortsExhausted,
    },
    #[error("parse {class} config for node {node:?}: {source}")]
    Config {
        node: String,
        class: ServiceClass,
        source: serde_json::Error,
    },
    #[error("materialize openapi spec for node {node:?}: {source}")]
    OpenApi { node: String, source: OpenApiError },
}

/// Converts diagrams into ordered container specs.
///
/// Not safe for concurrent use: each call resets the internal port
/// allocator. Callers wanting concurrent translations must build one
/// `Translator` per call.
pub struct Translator {
    allocator: PortAllocator,
}

impl Translator {
    pub fn new() -> Self {
        Self {
            allocator: PortAllocator::with_defaults(),
        }
    }

    /// Translator over a custom host port range.
    pub fn with_port_range(min: u16, max: u16) -> Self {
        Self {
            allocator: PortAllocator::new(min, max),
        }
    }

    /// Produces container specs in dependency order (infrastructure before
    /// application). The port allocator is reset at the start of every
    /// call, so host ports are disjoint within one translation.
    pub fn translate(&mut self, diagram: &Diagram) -> Result<Vec<ContainerSpec>, TranslateError> {
        if diagram.nodes.is_empty() {
            return Ok(Vec::new());
        }

        let mut nodes: BTreeMap<&str, (&DiagramNode, ServiceClass)> = BTreeMap::new();
        for node in &diagram.nodes {
            let class = node.service_class().ok_or_else(|| {
                TranslateError::UnsupportedServiceType {
                    node: node.id.clone(),
                    class: node.class.clone(),
                }
            })?;
            nodes.insert(node.id.as_str(), (node, class));
        }

        let order = resolver::resolve_dependencies(&diagram.nodes, &diagram.edges)?;

        self.allocator.reset();

        let mut specs = Vec::with_capacity(order.len());
        for node_id in &order {
            let (node, class) = nodes[node_id.as_str()];

            let ports = self
                .allocator
                .allocate_n(catalog::ports_required(class))
                .map_err(|source| TranslateError::Ports {
                    node: node.id.clone(),
                    source,
                })?;

            specs.push(build_spec(node, class, &ports)?);
        }

        Ok(specs)
    }
}

impl Default for Translator {
    fn default() -> Self {
        Self::new()
    }
}

/// Dispatches to the per-class builder. The set of classes is closed, so
/// this match is total.
fn build_spec(
    node: &DiagramNode,
    class: ServiceClass,
    host_ports: &[String],
) -> Result<ContainerSpec, TranslateError> {
    match class {
        ServiceClass::ApiService => build_api_service(node, &host_ports[0]),
        ServiceClass::RelationalDb => build_relational_db(node, &host_ports[0]),
        ServiceClass::Cache => build_cache(node, &host_ports[0]),
        ServiceClass::ReverseProxy => build_reverse_proxy(node, &host_ports[0]),
        ServiceClass::MessageBroker => build_message_broker(node, &host_ports[0], &host_ports[1]),
    }
}

fn parse_config<T: Default + serde::de::DeserializeOwned>(
    node: &DiagramNode,
    class: ServiceClass,
) -> Result<T, TranslateError> {
    match &node.config {
        None => Ok(T::default()),
        Some(raw) => {
            serde_json::from_value(raw.clone()).map_err(|source| TranslateError::Config {
                node: node.id.clone(),
                class,
                source,
            })
        }
    }
}

fn base_spec(node: &DiagramNode, image: &str) -> ContainerSpec {
    let hostname = catalog::sanitize_name(&node.name);
    ContainerSpec {
        image: image.to_string(),
        name: hostname.clone(),
        hostname,
        network: catalog::NETWORK_NAME.to_string(),
        ..ContainerSpec::default()
    }
}

/// Mock API service: generates an OpenAPI document from the node's
/// endpoint config, writes it to the host spec directory, and mounts it
/// into the mock-server container.
fn build_api_service(node: &DiagramNode, host_port: &str) -> Result<ContainerSpec, TranslateError> {
    let config: ApiServiceConfig = parse_config(node, ServiceClass::ApiService)?;

    let document = openapi::generate_document(&config.endpoints, &node.name).map_err(|source| {
        TranslateError::OpenApi {
            node: node.id.clone(),
            source,
        }
    })?;

    let mut spec = base_spec(node, catalog::IMAGE_API_SERVICE);

    let host_spec_path =
        openapi::write_spec_file(&spec.name, &document).map_err(|source| {
            TranslateError::OpenApi {
                node: node.id.clone(),
                source,
            }
        })?;

    spec.cmd = vec![
        "mock".to_string(),
        "-h".to_string(),
        "0.0.0.0".to_string(),
        CONTAINER_SPEC_PATH.to_string(),
    ];
    spec.ports.insert(
        host_port.to_string(),
        catalog::PORT_API_SERVICE.to_string(),
    );
    spec.volumes.insert(
        host_spec_path.to_string_lossy().into_owned(),
        CONTAINER_SPEC_PATH.to_string(),
    );

    Ok(spec)
}

fn build_relational_db(
    node: &DiagramNode,
    host_port: &str,
) -> Result<ContainerSpec, TranslateError> {
    // Config is validated for shape but carries no overridable fields yet:
    // engine/version do not affect the container for the default image.
    let _config: crate::model::RelationalDbConfig =
        parse_config(node, ServiceClass::RelationalDb)?;

    let mut spec = base_spec(node, catalog::IMAGE_RELATIONAL_DB);
    spec.env = catalog::default_relational_db_env();
    spec.ports.insert(
        host_port.to_string(),
        catalog::PORT_RELATIONAL_DB.to_string(),
    );

    Ok(spec)
}

fn build_cache(node: &DiagramNode, host_port: &str) -> Result<ContainerSpec, TranslateError> {
    let config: CacheConfig = parse_config(node, ServiceClass::Cache)?;

    let mut spec = base_spec(node, catalog::IMAGE_CACHE);
    if !config.max_memory.is_empty() {
        spec.env
            .insert("REDIS_MAXMEMORY".to_string(), config.max_memory);
    }
    if !config.eviction_policy.is_empty() {
        spec.env
            .insert("REDIS_EVICTION_POLICY".to_string(), config.eviction_policy);
    }
    spec.ports
        .insert(host_port.to_string(), catalog::PORT_CACHE.to_string());

    Ok(spec)
}

fn build_reverse_proxy(
    node: &DiagramNode,
    host_port: &str,
) -> Result<ContainerSpec, TranslateError> {
    let config: ReverseProxyConfig = parse_config(node, ServiceClass::ReverseProxy)?;

    let mut spec = base_spec(node, catalog::IMAGE_REVERSE_PROXY);
    if !config.upstream_servers.is_empty() {
        spec.env.insert(
            "NGINX_UPSTREAMS".to_string(),
            config.upstream_servers.join(","),
        );
    }
    spec.ports.insert(
        host_port.to_string(),
        catalog::PORT_REVERSE_PROXY.to_string(),
    );

    Ok(spec)
}

/// Message broker takes two host ports: data plane first, management UI
/// second.
fn build_message_broker(
    node: &DiagramNode,
    data_port: &str,
    management_port: &str,
) -> Result<ContainerSpec, TranslateError> {
    let config: MessageBrokerConfig = parse_config(node, ServiceClass::MessageBroker)?;

    let vhost = if config.vhost.is_empty() {
        "/".to_string()
    } else {
        config.vhost
    };

    let mut spec = base_spec(node, catalog::IMAGE_MESSAGE_BROKER);
    spec.env.insert("RABBITMQ_DEFAULT_VHOST".to_string(), vhost);
    spec.ports.insert(
        data_port.to_string(),
        catalog::PORT_MESSAGE_BROKER_DATA.to_string(),
    );
    spec.ports.insert(
        management_port.to_string(),
        catalog::PORT_MESSAGE_BROKER_MGMT.to_string(),
    );

    Ok(spec)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{DiagramEdge, Position};
    use serde_json::json;
    use std::collections::BTreeSet;

    fn node(id: &str, class: &str) -> DiagramNode {
        DiagramNode {
            id: id.to_string(),
            class: class.to_string(),
            name: format!("{id} svc"),
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

    fn diagram(nodes: Vec<DiagramNode>, edges: Vec<DiagramEdge>) -> Diagram {
        Diagram {
            id: "d1".to_string(),
            name: "demo".to_string(),
            nodes,
            edges,
        }
    }

    #[test]
    fn test_empty_diagram_translates_to_nothing() {
        let specs = Translator::new().translate(&diagram(vec![], vec![])).unwrap();
        assert!(specs.is_empty());
    }

    #[test]
    fn test_host_ports_are_pairwise_disjoint() {
        let d = diagram(
            vec![
                node("pg", "relational-db"),
                node("redis", "cache"),
                node("mq", "message-broker"),
                node("api", "api-service"),
                node("gw", "reverse-proxy"),
            ],
            vec![],
        );

        let specs = Translator::new().translate(&d).unwrap();
        let host_ports: Vec<&String> = specs.iter().flat_map(|s| s.ports.keys()).collect();
        let unique: BTreeSet<&&String> = host_ports.iter().collect();

        // The broker takes two ports, everything else one.
        assert_eq!(host_ports.len(), 6);
        assert_eq!(unique.len(), 6);
        for port in &host_ports {
            let n: u16 = port.parse().unwrap();
            assert!((10_000..=19_999).contains(&n));
        }
    }

    #[test]
    fn test_specs_follow_dependency_order() {
        let d = diagram(
            vec![
                node("gw", "reverse-proxy"),
                node("db", "relational-db"),
                node("api", "api-service"),
            ],
            vec![edge("api", "db"), edge("gw", "api")],
        );

        let specs = Translator::new().translate(&d).unwrap();
        let names: Vec<&str> = specs.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["db-svc", "api-svc", "gw-svc"]);
    }

    #[test]
    fn test_unsupported_service_type_is_rejected() {
        let d = diagram(vec![node("x", "mainframe")], vec![]);
        let err = Translator::new().translate(&d).unwrap_err();
        assert!(matches!(
            err,
            TranslateError::UnsupportedServiceType { node, class }
                if node == "x" && class == "mainframe"
        ));
    }

    #[test]
    fn test_cycle_fails_translation() {
        let d = diagram(
            vec![node("a", "api-service"), node("b", "api-service")],
            vec![edge("a", "b"), edge("b", "a")],
        );
        let err = Translator::new().translate(&d).unwrap_err();
        assert!(matches!(err, TranslateError::Cycle(_)));
    }

    #[test]
    fn test_relational_db_gets_bootstrap_credentials() {
        let d = diagram(vec![node("db", "relational-db")], vec![]);
        let specs = Translator::new().translate(&d).unwrap();

        assert_eq!(specs[0].image, catalog::IMAGE_RELATIONAL_DB);
        assert_eq!(specs[0].env.get("POSTGRES_USER").unwrap(), "heph");
        assert_eq!(specs[0].env.get("POSTGRES_PASSWORD").unwrap(), "heph");
        assert_eq!(specs[0].env.get("POSTGRES_DB").unwrap(), "heph");
        assert_eq!(
            specs[0].ports.values().next().unwrap(),
            catalog::PORT_RELATIONAL_DB
        );
    }

    #[test]
    fn test_cache_surfaces_optional_config_as_env() {
        let mut cache = node("redis", "cache");
        cache.config = Some(json!({
            "type": "cache",
            "maxMemory": "256mb",
            "evictionPolicy": "allkeys-lru"
        }));
        let specs = Translator::new()
            .translate(&diagram(vec![cache], vec![]))
            .unwrap();

        assert_eq!(specs[0].env.get("REDIS_MAXMEMORY").unwrap(), "256mb");
        assert_eq!(
            specs[0].env.get("REDIS_EVICTION_POLICY").unwrap(),
            "allkeys-lru"
        );

        // Absent config leaves the environment empty.
        let specs = Translator::new()
            .translate(&diagram(vec![node("redis", "cache")], vec![]))
            .unwrap();
        assert!(specs[0].env.is_empty());
    }

    #[test]
    fn test_reverse_proxy_joins_upstreams() {
        let mut gw = node("gw", "reverse-proxy");
        gw.config = Some(json!({
            "type": "reverse-proxy",
            "upstreamServers": ["api-1:4010", "api-2:4010"]
        }));
        let specs = Translator::new()
            .translate(&diagram(vec![gw], vec![]))
            .unwrap();

        assert_eq!(
            specs[0].env.get("NGINX_UPSTREAMS").unwrap(),
            "api-1:4010,api-2:4010"
        );
    }

    #[test]
    fn test_message_broker_maps_both_planes_and_defaults_vhost() {
        let d = diagram(vec![node("mq", "message-broker")], vec![]);
        let specs = Translator::new().translate(&d).unwrap();

        let containers: BTreeSet<&str> =
            specs[0].ports.values().map(String::as_str).collect();
        assert_eq!(
            containers,
            BTreeSet::from([
                catalog::PORT_MESSAGE_BROKER_DATA,
                catalog::PORT_MESSAGE_BROKER_MGMT
            ])
        );
        assert_eq!(specs[0].env.get("RABBITMQ_DEFAULT_VHOST").unwrap(), "/");
    }

    #[test]
    fn test_message_broker_custom_vhost() {
        let mut mq = node("mq", "message-broker");
        mq.config = Some(json!({"type": "message-broker", "vhost": "/orders"}));
        let specs = Translator::new()
            .translate(&diagram(vec![mq], vec![]))
            .unwrap();
        assert_eq!(
            specs[0].env.get("RABBITMQ_DEFAULT_VHOST").unwrap(),
            "/orders"
        );
    }

    #[test]
    fn test_api_service_mounts_generated_spec() {
        let mut api = node("api", "api-service");
        api.config = Some(json!({
            "type": "api-service",
            "endpoints": [
                {"method": "GET", "path": "/users", "responseSchema": ""}
            ]
        }));
        let specs = Translator::new()
            .translate(&diagram(vec![api], vec![]))
            .unwrap();

        let spec = &specs[0];
        assert_eq!(spec.image, catalog::IMAGE_API_SERVICE);
        assert_eq!(spec.cmd, vec!["mock", "-h", "0.0.0.0", "/tmp/spec.json"]);
        assert_eq!(spec.ports.values().next().unwrap(), "4010");

        let (host_path, container_path) = spec.volumes.iter().next().unwrap();
        assert_eq!(container_path, "/tmp/spec.json");
        assert!(host_path.ends_with("api-svc.json"));
        assert!(std::path::Path::new(host_path).exists());
        std::fs::remove_file(host_path).ok();
    }

    #[test]
    fn test_port_exhaustion_surfaces_as_error() {
        // One port for two single-port nodes.
        let d = diagram(
            vec![node("a", "cache"), node("b", "cache")],
            vec![],
        );
        let mut translator = Translator::with_port_range(10_000, 10_000);
        let err = translator.translate(&d).unwrap_err();
        assert!(matches!(err, TranslateError::Ports { .. }));
    }
}
