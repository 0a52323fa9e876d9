//! The run-scoped execution context templates resolve against.
//!
//! Root names:
//! - `trigger.input`: the run payload
//! - `connections.<id>`: public view of each connection resolved for the run
//! - `step_<nodeId>`: a node's value, published once the node has settled
//! - transform targets: aliases for `data_transform` outputs

use std::collections::HashMap;

use conduit_template::{LookupError, Scope};
use serde_json::map::Entry;
use serde_json::{Map, Value};

pub const TRIGGER_KEY: &str = "trigger";
pub const CONNECTIONS_KEY: &str = "connections";
pub const STEP_PREFIX: &str = "step_";

/// The context key a node's value is published under.
pub fn step_key(node_id: &str) -> String {
  format!("{}{}", STEP_PREFIX, node_id)
}

/// Names an alias may not take.
pub fn is_reserved(name: &str) -> bool {
  name == TRIGGER_KEY || name == CONNECTIONS_KEY || name.starts_with(STEP_PREFIX)
}

/// Values available to the nodes of one run.
///
/// `step_<id>` entries are write-once. Aliases follow last-writer order; the
/// aliases a node bound are also kept per node so a dependent can see its
/// own predecessors' aliases re-bound in edge order.
#[derive(Debug, Clone, Default)]
pub struct ExecutionContext {
  values: Map<String, Value>,
  aliases: HashMap<String, Value>,
  bindings: HashMap<String, Vec<(String, Value)>>,
}

impl ExecutionContext {
  /// A fresh context seeded with the run payload.
  pub fn new(payload: Value) -> Self {
    let mut values = Map::new();
    values.insert(TRIGGER_KEY.to_string(), serde_json::json!({ "input": payload }));
    values.insert(CONNECTIONS_KEY.to_string(), Value::Object(Map::new()));
    Self {
      values,
      ..Self::default()
    }
  }

  /// A context supplied wholesale by a caller.
  pub fn from_map(values: Map<String, Value>) -> Self {
    Self {
      values,
      ..Self::default()
    }
  }

  /// Expose a connection under `connections.<id>`.
  pub fn insert_connection(&mut self, connection_id: &str, view: Value) {
    let connections = self
      .values
      .entry(CONNECTIONS_KEY)
      .or_insert_with(|| Value::Object(Map::new()));
    if let Value::Object(map) = connections {
      map.insert(connection_id.to_string(), view);
    }
  }

  /// The run payload, `trigger.input`.
  pub fn payload(&self) -> Value {
    self
      .values
      .get(TRIGGER_KEY)
      .and_then(|trigger| trigger.get("input"))
      .cloned()
      .unwrap_or(Value::Null)
  }

  /// Publish a settled node's value under `step_<id>`.
  ///
  /// Returns `false`, leaving the existing value in place, if the node
  /// already has one.
  pub fn insert_step(&mut self, node_id: &str, value: Value) -> bool {
    match self.values.entry(step_key(node_id)) {
      Entry::Occupied(_) => false,
      Entry::Vacant(entry) => {
        entry.insert(value);
        true
      }
    }
  }

  /// Bind the aliases a node produced.
  pub fn bind_aliases(&mut self, node_id: &str, aliases: Vec<(String, Value)>) {
    if aliases.is_empty() {
      return;
    }
    for (name, value) in &aliases {
      self.aliases.insert(name.clone(), value.clone());
    }
    self.bindings.insert(node_id.to_string(), aliases);
  }

  pub fn get(&self, key: &str) -> Option<&Value> {
    self.values.get(key).or_else(|| self.aliases.get(key))
  }

  /// The view of the context for a node whose direct predecessors are
  /// `upstream`, listed in edge declaration order.
  pub fn scope<'s>(&self, upstream: impl IntoIterator<Item = &'s str>) -> NodeScope<'_> {
    let mut overlay = HashMap::new();
    for node_id in upstream {
      if let Some(bound) = self.bindings.get(node_id) {
        for (name, value) in bound {
          overlay.insert(name.as_str(), value);
        }
      }
    }
    NodeScope {
      context: self,
      overlay,
    }
  }
}

impl Scope for ExecutionContext {
  fn get_root(&self, key: &str) -> Result<&Value, LookupError> {
    self.get(key).ok_or_else(|| LookupError::MissingKey {
      key: key.to_string(),
    })
  }
}

/// An [`ExecutionContext`] as seen by one node.
#[derive(Debug)]
pub struct NodeScope<'a> {
  context: &'a ExecutionContext,
  overlay: HashMap<&'a str, &'a Value>,
}

impl Scope for NodeScope<'_> {
  fn get_root(&self, key: &str) -> Result<&Value, LookupError> {
    match self.overlay.get(key).copied() {
      Some(value) => Ok(value),
      None => self.context.get_root(key),
    }
  }
}
