use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Unique identifier of a node within a diagram.
pub type NodeId = String;

/// The closed set of service classes a node can be.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ServiceClass {
    ApiService,
    RelationalDb,
    Cache,
    ReverseProxy,
    MessageBroker,
}

impl ServiceClass {
    /// All supported classes, in declaration order.
    pub const ALL: [ServiceClass; 5] = [
        ServiceClass::ApiService,
        ServiceClass::RelationalDb,
        ServiceClass::Cache,
        ServiceClass::ReverseProxy,
        ServiceClass::MessageBroker,
    ];

    /// The wire name used in diagram JSON (`type` fields).
    pub fn wire_name(&self) -> &'static str {
        match self {
            ServiceClass::ApiService => "api-service",
            ServiceClass::RelationalDb => "relational-db",
            ServiceClass::Cache => "cache",
            ServiceClass::ReverseProxy => "reverse-proxy",
            ServiceClass::MessageBroker => "message-broker",
        }
    }

    pub fn parse(s: &str) -> Option<ServiceClass> {
        Self::ALL.iter().copied().find(|c| c.wire_name() == s)
    }
}

impl std::fmt::Display for ServiceClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.wire_name())
    }
}

/// Canvas coordinates. Used by the editor, ignored by the deploy pipeline.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

/// A service node in the diagram.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DiagramNode {
    pub id: NodeId,
    #[serde(rename = "type")]
    pub class: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub position: Option<Position>,
    /// Service-class-specific configuration payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<Value>,
}

impl DiagramNode {
    /// The parsed service class, if `type` names a supported one.
    pub fn service_class(&self) -> Option<ServiceClass> {
        ServiceClass::parse(&self.class)
    }
}

/// A directed dependency between two nodes: `source` depends on `target`,
/// so `target` must reach steady state before `source` starts.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DiagramEdge {
    pub id: String,
    pub source: NodeId,
    pub target: NodeId,
    #[serde(default)]
    pub label: String,
}

/// The operator-authored declarative input: nodes plus dependency edges.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Diagram {
    pub id: String,
    pub name: String,
    pub nodes: Vec<DiagramNode>,
    pub edges: Vec<DiagramEdge>,
}

/// One endpoint of a mock API service.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Endpoint {
    pub method: String,
    pub path: String,
    #[serde(rename = "responseSchema", default)]
    pub response_schema: String,
}

/// Configuration payload for api-service nodes.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ApiServiceConfig {
    #[serde(rename = "type", default)]
    pub class: String,
    #[serde(default)]
    pub endpoints: Vec<Endpoint>,
    #[serde(default)]
    pub port: u16,
}

/// Configuration payload for relational-db nodes.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct RelationalDbConfig {
    #[serde(rename = "type", default)]
    pub class: String,
    #[serde(default)]
    pub engine: String,
    #[serde(default)]
    pub version: String,
}

/// Configuration payload for cache nodes.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(rename = "type", default)]
    pub class: String,
    #[serde(rename = "maxMemory", default)]
    pub max_memory: String,
    #[serde(rename = "evictionPolicy", default)]
    pub eviction_policy: String,
}

/// Configuration payload for reverse-proxy nodes.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ReverseProxyConfig {
    #[serde(rename = "type", default)]
    pub class: String,
    #[serde(rename = "upstreamServers", default)]
    pub upstream_servers: Vec<String>,
}

/// Configuration payload for message-broker nodes.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct MessageBrokerConfig {
    #[serde(rename = "type", default)]
    pub class: String,
    #[serde(default)]
    pub vhost: String,
}
