use std::collections::BTreeSet;

use crate::model::DiagramNode;

/// Result of comparing two diagram node sets by id.
#[derive(Clone, Debug, Default)]
pub struct DiffResult {
    pub added: Vec<DiagramNode>,
    pub removed: Vec<DiagramNode>,
    pub unchanged: Vec<DiagramNode>,
}

/// Partitions nodes into added/removed/unchanged by comparing ids only.
/// Config changes on a same-id node are not observed: the node counts as
/// unchanged regardless of its payload.
pub fn compute_diff(current: &[DiagramNode], incoming: &[DiagramNode]) -> DiffResult {
    let current_ids: BTreeSet<&str> = current.iter().map(|n| n.id.as_str()).collect();
    let incoming_ids: BTreeSet<&str> = incoming.iter().map(|n| n.id.as_str()).collect();

    let mut result = DiffResult::default();

    for node in incoming {
        if current_ids.contains(node.id.as_str()) {
            result.unchanged.push(node.clone());
        } else {
            result.added.push(node.clone());
        }
    }

    for node in current {
        if !incoming_ids.contains(node.id.as_str()) {
            result.removed.push(node.clone());
        }
    }

    result
}
