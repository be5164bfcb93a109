use std::collections::BTreeMap;

use thiserror::Error;

use crate::catalog;
use crate::model::{DiagramEdge, DiagramNode, NodeId, ServiceClass};

#[derive(Clone, Debug, PartialEq, Eq, Error)]
#[error("cyclic dependency detected: processed {processed} of {total} nodes")]
pub struct CyclicDependency {
    pub processed: usize,
    pub total: usize,
}

/// Topological sort of diagram nodes using Kahn's algorithm.
///
/// An edge `source → target` means source depends on target, so the
/// adjacency runs `target → source`: the target must start first. Edges
/// referencing unknown node ids are skipped. Nodes that become ready
/// together are ordered by service-class priority (infrastructure first),
/// then by id.
pub fn resolve_dependencies(
    nodes: &[DiagramNode],
    edges: &[DiagramEdge],
) -> Result<Vec<NodeId>, CyclicDependency> {
    if nodes.is_empty() {
        return Ok(Vec::new());
    }

    let classes: BTreeMap<&str, Option<ServiceClass>> = nodes
        .iter()
        .map(|n| (n.id.as_str(), n.service_class()))
        .collect();

    let mut adjacency: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
    let mut in_degree: BTreeMap<&str, usize> = BTreeMap::new();
    for node in nodes {
        adjacency.insert(node.id.as_str(), Vec::new());
        in_degree.insert(node.id.as_str(), 0);
    }

    for edge in edges {
        if !classes.contains_key(edge.source.as_str())
            || !classes.contains_key(edge.target.as_str())
        {
            continue;
        }
        adjacency
            .get_mut(edge.target.as_str())
            .unwrap()
            .push(edge.source.as_str());
        *in_degree.get_mut(edge.source.as_str()).unwrap() += 1;
    }

    let mut queue: Vec<&str> = nodes
        .iter()
        .filter(|n| in_degree[n.id.as_str()] == 0)
        .map(|n| n.id.as_str())
        .collect();
    sort_by_priority(&mut queue, &classes);

    let mut result = Vec::with_capacity(nodes.len());
    while !queue.is_empty() {
        let current = queue.remove(0);
        result.push(current.to_string());

        let mut ready = Vec::new();
        for &dependent in &adjacency[current] {
            let degree = in_degree.get_mut(dependent).unwrap();
            *degree -= 1;
            if *degree == 0 {
                ready.push(dependent);
            }
        }
        if !ready.is_empty() {
            sort_by_priority(&mut ready, &classes);
            queue.extend(ready);
        }
    }

    if result.len() != nodes.len() {
        return Err(CyclicDependency {
            processed: result.len(),
            total: nodes.len(),
        });
    }

    Ok(result)
}

fn sort_by_priority(ids: &mut [&str], classes: &BTreeMap<&str, Option<ServiceClass>>) {
    ids.sort_by(|a, b| {
        let pa = classes[a].map(catalog::priority).unwrap_or(u8::MAX);
        let pb = classes[b].map(catalog::priority).unwrap_or(u8::MAX);
        pa.cmp(&pb).then_with(|| a.cmp(b))
    });
}
