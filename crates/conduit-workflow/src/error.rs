use thiserror::Error;

/// Structural problems found before anything executes.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
  #[error("duplicate node id: {node_id}")]
  DuplicateNode { node_id: String },

  #[error("edge '{edge_id}' references unknown node '{node_id}'")]
  DanglingEdge { edge_id: String, node_id: String },

  #[error("flow must have exactly one entry trigger, found {found}")]
  MissingTrigger { found: usize },

  #[error("trigger node '{node_id}' has incoming edges")]
  MisplacedTrigger { node_id: String },

  #[error("cycle detected at edge '{edge_id}' ({from} -> {to})")]
  CycleDetected {
    edge_id: String,
    from: String,
    to: String,
  },
}
