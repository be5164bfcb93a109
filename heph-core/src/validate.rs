use serde_json::Value;
use thiserror::Error;

use crate::model::{Diagram, DiagramEdge, DiagramNode, ServiceClass};

/// All validation failures for a diagram, collected rather than
/// short-circuited so the operator sees everything at once.
#[derive(Clone, Debug, Error)]
#[error("validation failed: {}", .errors.join("; "))]
pub struct ValidationError {
    pub errors: Vec<String>,
}

/// Checks that a diagram has all required fields and valid values.
pub fn validate_diagram(diagram: &Diagram) -> Result<(), ValidationError> {
    let mut errors = Vec::new();

    if diagram.id.is_empty() {
        errors.push("id is required".to_string());
    }
    if diagram.name.is_empty() {
        errors.push("name is required".to_string());
    }

    for (i, node) in diagram.nodes.iter().enumerate() {
        validate_node(i, node, &mut errors);
    }
    for (i, edge) in diagram.edges.iter().enumerate() {
        validate_edge(i, edge, &mut errors);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(ValidationError { errors })
    }
}

fn validate_node(index: usize, node: &DiagramNode, errors: &mut Vec<String>) {
    let prefix = format!("nodes[{index}]");

    if node.id.is_empty() {
        errors.push(format!("{prefix}.id is required"));
    }
    if node.class.is_empty() {
        errors.push(format!("{prefix}.type is required"));
    } else if ServiceClass::parse(&node.class).is_none() {
        errors.push(format!(
            "{prefix}.type {:?} is not a valid service type",
            node.class
        ));
    }
    if node.name.is_empty() {
        errors.push(format!("{prefix}.name is required"));
    }
    if node.position.is_none() {
        errors.push(format!("{prefix}.position is required"));
    }

    if let Some(config) = &node.config {
        validate_config(&prefix, &node.class, config, errors);
    }
}

fn validate_edge(index: usize, edge: &DiagramEdge, errors: &mut Vec<String>) {
    let prefix = format!("edges[{index}]");

    if edge.id.is_empty() {
        errors.push(format!("{prefix}.id is required"));
    }
    if edge.source.is_empty() {
        errors.push(format!("{prefix}.source is required"));
    }
    if edge.target.is_empty() {
        errors.push(format!("{prefix}.target is required"));
    }
}

fn validate_config(prefix: &str, node_class: &str, config: &Value, errors: &mut Vec<String>) {
    if !config.is_object() {
        errors.push(format!("{prefix}.config must be an object"));
        return;
    }
    if let Some(declared) = config.get("type").and_then(Value::as_str) {
        if declared != node_class {
            errors.push(format!(
                "{prefix}.config.type {declared:?} does not match node type {node_class:?}"
            ));
        }
    }
}
