//! Structural checks on a graph description before any worker is built.

use crate::error::GraphError;
use crate::types::GraphDescription;
use std::collections::{HashMap, HashSet, VecDeque};
use tracing::instrument;

/// Checks node ids, copy counts, edge endpoints, error edges and acyclicity. Returns the
/// node ids in topological order.
#[instrument(level = "trace", skip(desc), fields(pipeline = %desc.name))]
pub fn validate(desc: &GraphDescription) -> Result<Vec<String>, GraphError> {
  let mut ids = HashSet::new();
  for node in &desc.nodes {
    if node.id.trim().is_empty() {
      return Err(GraphError::InvalidNode {
        node: node.id.clone(),
        message: "node id must not be empty".to_string(),
      });
    }
    if !ids.insert(node.id.as_str()) {
      return Err(GraphError::DuplicateNode(node.id.clone()));
    }
    if node.copies == 0 {
      return Err(GraphError::ZeroCopies(node.id.clone()));
    }
  }

  let mut error_edges: HashSet<&str> = HashSet::new();
  for edge in &desc.edges {
    for end in [&edge.from, &edge.to] {
      if !ids.contains(end.as_str()) {
        return Err(GraphError::DanglingEdge {
          from: edge.from.clone(),
          to: edge.to.clone(),
          missing: end.clone(),
        });
      }
    }
    if edge.error && !error_edges.insert(edge.from.as_str()) {
      return Err(GraphError::MultipleErrorEdges(edge.from.clone()));
    }
  }

  topological_order(desc)
}

/// Kahn's algorithm over every edge, error edges included. Ties resolve in declaration
/// order. Fails with the nodes left on or behind a cycle.
pub fn topological_order(desc: &GraphDescription) -> Result<Vec<String>, GraphError> {
  let mut indegree: HashMap<&str, usize> =
    desc.nodes.iter().map(|n| (n.id.as_str(), 0)).collect();
  for edge in &desc.edges {
    if let Some(d) = indegree.get_mut(edge.to.as_str()) {
      *d += 1;
    }
  }

  let mut ready: VecDeque<&str> = desc
    .nodes
    .iter()
    .map(|n| n.id.as_str())
    .filter(|id| indegree[id] == 0)
    .collect();
  let mut order = Vec::with_capacity(desc.nodes.len());
  while let Some(id) = ready.pop_front() {
    order.push(id.to_string());
    for edge in desc.outgoing(id) {
      if let Some(d) = indegree.get_mut(edge.to.as_str()) {
        *d -= 1;
        if *d == 0 {
          ready.push_back(edge.to.as_str());
        }
      }
    }
  }

  if order.len() < desc.nodes.len() {
    let remaining = desc
      .nodes
      .iter()
      .filter(|n| indegree[n.id.as_str()] > 0)
      .map(|n| n.id.clone())
      .collect();
    return Err(GraphError::Cycle(remaining));
  }
  Ok(order)
}
