use std::collections::HashMap;

use conduit_config::{EdgeDef, FlowDef, NodeDef, NodeKind, TriggerDef};
use tracing::warn;

use crate::error::ValidationError;
use crate::graph::Graph;

/// A locked flow ready for execution.
///
/// Built once per run from an immutable [`FlowDef`] snapshot. Nodes and edges
/// keep declaration order; everything the scheduler needs (entry, reachability,
/// layers) is computed up front.
#[derive(Debug, Clone)]
pub struct Workflow {
  pub flow_id: String,
  pub name: String,
  pub trigger: TriggerDef,
  nodes: Vec<NodeDef>,
  edges: Vec<EdgeDef>,
  index: HashMap<String, usize>,
  graph: Graph,
  entry: usize,
  reachable: Vec<bool>,
  layers: Vec<Vec<usize>>,
}

impl Workflow {
  /// Validate a flow and lock it for execution.
  ///
  /// Checks run in order: unique ids and edge endpoints, a single entry
  /// trigger, then acyclicity. The first failure is returned.
  pub fn lock(flow: &FlowDef) -> Result<Self, ValidationError> {
    let nodes = flow.nodes().to_vec();
    let edges = flow.edges().to_vec();

    let mut index = HashMap::with_capacity(nodes.len());
    for (idx, node) in nodes.iter().enumerate() {
      if index.insert(node.id.clone(), idx).is_some() {
        return Err(ValidationError::DuplicateNode {
          node_id: node.id.clone(),
        });
      }
    }

    let mut pairs = Vec::with_capacity(edges.len());
    for edge in &edges {
      let endpoint = |node_id: &str| {
        index
          .get(node_id)
          .copied()
          .ok_or_else(|| ValidationError::DanglingEdge {
            edge_id: edge.id.clone(),
            node_id: node_id.to_string(),
          })
      };
      pairs.push((endpoint(&edge.source)?, endpoint(&edge.target)?));
    }

    let graph = Graph::new(nodes.len(), pairs);
    let entry = find_entry(&nodes, &graph)?;

    if let Some(edge_idx) = graph.find_cycle() {
      let edge = &edges[edge_idx];
      return Err(ValidationError::CycleDetected {
        edge_id: edge.id.clone(),
        from: edge.source.clone(),
        to: edge.target.clone(),
      });
    }

    let reachable = graph.reachable_from(entry);
    let layers = graph.layers(&reachable);

    for (node, _) in nodes.iter().zip(&reachable).filter(|(_, r)| !**r) {
      warn!(flow_id = %flow.id, node_id = %node.id, "node is unreachable from the trigger");
    }

    Ok(Self {
      flow_id: flow.id.clone(),
      name: flow.name.clone(),
      trigger: flow.trigger.clone(),
      nodes,
      edges,
      index,
      graph,
      entry,
      reachable,
      layers,
    })
  }

  /// All nodes, in declaration order.
  pub fn nodes(&self) -> &[NodeDef] {
    &self.nodes
  }

  pub fn edges(&self) -> &[EdgeDef] {
    &self.edges
  }

  pub fn node(&self, idx: usize) -> &NodeDef {
    &self.nodes[idx]
  }

  /// Get a node by ID.
  pub fn get_node(&self, node_id: &str) -> Option<&NodeDef> {
    self.index.get(node_id).map(|&idx| &self.nodes[idx])
  }

  pub fn graph(&self) -> &Graph {
    &self.graph
  }

  /// The trigger node every run starts from.
  pub fn entry(&self) -> usize {
    self.entry
  }

  pub fn is_reachable(&self, idx: usize) -> bool {
    self.reachable[idx]
  }

  /// Nodes that can never run because no path leads to them from the trigger.
  pub fn unreachable(&self) -> impl Iterator<Item = &NodeDef> {
    self
      .nodes
      .iter()
      .zip(&self.reachable)
      .filter(|(_, reachable)| !**reachable)
      .map(|(node, _)| node)
  }

  /// Reachable nodes grouped by dependency depth, declaration order within.
  pub fn layers(&self) -> &[Vec<usize>] {
    &self.layers
  }

  /// Reachable nodes in execution order.
  pub fn topological_order(&self) -> Vec<usize> {
    self.layers.iter().flatten().copied().collect()
  }

  /// Reachable nodes with no reachable downstream node: the ends of branches.
  pub fn sinks(&self) -> Vec<usize> {
    self
      .topological_order()
      .into_iter()
      .filter(|&idx| {
        self
          .graph
          .downstream(idx)
          .iter()
          .all(|&next| !self.reachable[next])
      })
      .collect()
  }
}

/// Exactly one trigger with no incoming edges; no other trigger anywhere.
fn find_entry(nodes: &[NodeDef], graph: &Graph) -> Result<usize, ValidationError> {
  let triggers: Vec<usize> = (0..nodes.len())
    .filter(|&idx| nodes[idx].kind == NodeKind::Trigger)
    .collect();

  let entries: Vec<usize> = triggers
    .iter()
    .copied()
    .filter(|&idx| graph.upstream(idx).is_empty())
    .collect();

  if entries.len() != 1 {
    return Err(ValidationError::MissingTrigger {
      found: entries.len(),
    });
  }

  if let Some(&misplaced) = triggers.iter().find(|&&idx| idx != entries[0]) {
    return Err(ValidationError::MisplacedTrigger {
      node_id: nodes[misplaced].id.clone(),
    });
  }

  Ok(entries[0])
}

#[cfg(test)]
mod tests {
  use conduit_config::{EdgeDef, FlowDef, NodeDef, NodeKind};
  use serde_json::json;

  use super::*;

  fn transform(id: &str) -> NodeDef {
    NodeDef::new(id, NodeKind::DataTransform, json!({ "transformations": [] }))
  }

  fn api(id: &str) -> NodeDef {
    NodeDef::new(id, NodeKind::ApiCall, json!({ "url": "https://example.com" }))
  }

  #[test]
  fn test_lock_linear_flow() {
    let flow = FlowDef::new("f", "linear")
      .with_node(NodeDef::trigger("start"))
      .with_node(api("fetch"))
      .with_node(transform("shape"))
      .with_edge(EdgeDef::new("e1", "start", "fetch"))
      .with_edge(EdgeDef::new("e2", "fetch", "shape"));

    let workflow = Workflow::lock(&flow).unwrap();

    assert_eq!(workflow.entry(), 0);
    assert_eq!(workflow.topological_order(), vec![0, 1, 2]);
    assert_eq!(workflow.sinks(), vec![2]);
    assert_eq!(workflow.unreachable().count(), 0);
    assert_eq!(workflow.get_node("fetch").map(|n| n.kind), Some(NodeKind::ApiCall));
  }

  #[test]
  fn test_tie_break_is_declaration_order() {
    // Declared b before a; both depend only on the trigger.
    let flow = FlowDef::new("f", "fan-out")
      .with_node(NodeDef::trigger("start"))
      .with_node(transform("b"))
      .with_node(transform("a"))
      .with_edge(EdgeDef::new("e2", "start", "a"))
      .with_edge(EdgeDef::new("e1", "start", "b"));

    let workflow = Workflow::lock(&flow).unwrap();
    let order: Vec<&str> = workflow
      .topological_order()
      .into_iter()
      .map(|idx| workflow.node(idx).id.as_str())
      .collect();

    assert_eq!(order, vec!["start", "b", "a"]);
  }

  #[test]
  fn test_dangling_edge() {
    let flow = FlowDef::new("f", "dangling")
      .with_node(NodeDef::trigger("start"))
      .with_edge(EdgeDef::new("e1", "start", "ghost"));

    assert_eq!(
      Workflow::lock(&flow).unwrap_err(),
      ValidationError::DanglingEdge {
        edge_id: "e1".to_string(),
        node_id: "ghost".to_string(),
      }
    );
  }

  #[test]
  fn test_duplicate_node() {
    let flow = FlowDef::new("f", "dup")
      .with_node(NodeDef::trigger("start"))
      .with_node(transform("x"))
      .with_node(transform("x"));

    assert!(matches!(
      Workflow::lock(&flow),
      Err(ValidationError::DuplicateNode { node_id }) if node_id == "x"
    ));
  }

  #[test]
  fn test_missing_trigger() {
    let flow = FlowDef::new("f", "no trigger").with_node(transform("x"));

    assert_eq!(
      Workflow::lock(&flow).unwrap_err(),
      ValidationError::MissingTrigger { found: 0 }
    );
  }

  #[test]
  fn test_ambiguous_trigger() {
    let flow = FlowDef::new("f", "two triggers")
      .with_node(NodeDef::trigger("a"))
      .with_node(NodeDef::trigger("b"));

    assert_eq!(
      Workflow::lock(&flow).unwrap_err(),
      ValidationError::MissingTrigger { found: 2 }
    );
  }

  #[test]
  fn test_trigger_with_incoming_edge() {
    let flow = FlowDef::new("f", "misplaced")
      .with_node(NodeDef::trigger("start"))
      .with_node(transform("x"))
      .with_node(NodeDef::trigger("late"))
      .with_edge(EdgeDef::new("e1", "start", "x"))
      .with_edge(EdgeDef::new("e2", "x", "late"));

    assert_eq!(
      Workflow::lock(&flow).unwrap_err(),
      ValidationError::MisplacedTrigger {
        node_id: "late".to_string()
      }
    );
  }

  #[test]
  fn test_cycle_detected() {
    let flow = FlowDef::new("f", "cycle")
      .with_node(NodeDef::trigger("start"))
      .with_node(transform("a"))
      .with_node(transform("b"))
      .with_edge(EdgeDef::new("e1", "start", "a"))
      .with_edge(EdgeDef::new("e2", "a", "b"))
      .with_edge(EdgeDef::new("e3", "b", "a"));

    assert_eq!(
      Workflow::lock(&flow).unwrap_err(),
      ValidationError::CycleDetected {
        edge_id: "e3".to_string(),
        from: "b".to_string(),
        to: "a".to_string(),
      }
    );
  }

  #[test]
  fn test_unreachable_nodes_are_informational() {
    let flow = FlowDef::new("f", "orphan")
      .with_node(NodeDef::trigger("start"))
      .with_node(transform("used"))
      .with_node(transform("orphan"))
      .with_edge(EdgeDef::new("e1", "start", "used"));

    let workflow = Workflow::lock(&flow).unwrap();
    let unreachable: Vec<&str> = workflow.unreachable().map(|n| n.id.as_str()).collect();

    assert_eq!(unreachable, vec!["orphan"]);
    assert_eq!(workflow.topological_order(), vec![0, 1]);
    assert!(!workflow.is_reachable(2));
  }
}
