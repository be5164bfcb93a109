//! Service catalog: per-class images, container ports, and startup
//! priorities, plus the container-name sanitizer.

use std::collections::BTreeMap;

use crate::model::ServiceClass;

/// Prefix applied to every managed container name.
pub const CONTAINER_NAME_PREFIX: &str = "heph-";

/// Name of the shared bridge network joined by all managed containers.
pub const NETWORK_NAME: &str = "heph-network";

/// Container images per service class.
pub const IMAGE_API_SERVICE: &str = "stoplight/prism:latest";
pub const IMAGE_RELATIONAL_DB: &str = "postgres:16";
pub const IMAGE_CACHE: &str = "redis:7";
pub const IMAGE_REVERSE_PROXY: &str = "nginx:latest";
pub const IMAGE_MESSAGE_BROKER: &str = "rabbitmq:3-management";

/// Container-side ports per service class.
pub const PORT_API_SERVICE: &str = "4010";
pub const PORT_RELATIONAL_DB: &str = "5432";
pub const PORT_CACHE: &str = "6379";
pub const PORT_REVERSE_PROXY: &str = "80";
pub const PORT_MESSAGE_BROKER_DATA: &str = "5672";
pub const PORT_MESSAGE_BROKER_MGMT: &str = "15672";

/// Startup priority levels. Lower starts first.
pub const PRIORITY_INFRASTRUCTURE: u8 = 0;
pub const PRIORITY_APPLICATION: u8 = 1;

/// Number of host ports a service class needs. The message broker takes
/// two: data plane plus management UI.
pub fn ports_required(class: ServiceClass) -> usize {
    match class {
        ServiceClass::MessageBroker => 2,
        _ => 1,
    }
}

/// Startup priority for a service class: infrastructure before application.
pub fn priority(class: ServiceClass) -> u8 {
    match class {
        ServiceClass::RelationalDb | ServiceClass::Cache | ServiceClass::MessageBroker => {
            PRIORITY_INFRASTRUCTURE
        }
        ServiceClass::ApiService | ServiceClass::ReverseProxy => PRIORITY_APPLICATION,
    }
}

/// Bootstrap credentials for relational-db containers. Fixed values for a
/// local-dev workbench.
pub fn default_relational_db_env() -> BTreeMap<String, String> {
    let mut env = BTreeMap::new();
    env.insert("POSTGRES_USER".to_string(), "heph".to_string());
    env.insert("POSTGRES_PASSWORD".to_string(), "heph".to_string());
    env.insert("POSTGRES_DB".to_string(), "heph".to_string());
    env
}

/// Converts a node name into a runtime-legal container name: lowercase,
/// spaces replaced with hyphens, everything outside `[a-z0-9-]` dropped.
pub fn sanitize_name(name: &str) -> String {
    name.to_lowercase()
        .replace(' ', "-")
        .chars()
        .filter(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || *c == '-')
        .collect()
}
