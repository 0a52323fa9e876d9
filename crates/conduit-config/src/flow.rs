use serde::{Deserialize, Serialize};

use crate::edge::EdgeDef;
use crate::node::NodeDef;
use crate::trigger::TriggerDef;

/// A flow document as stored and edited.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlowDef {
  pub id: String,
  pub name: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub organization_id: Option<String>,
  #[serde(default)]
  pub trigger: TriggerDef,
  pub definition: Definition,
  #[serde(default = "enabled")]
  pub is_enabled: bool,
}

/// The graph part of a flow, in declaration order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Definition {
  #[serde(default)]
  pub nodes: Vec<NodeDef>,
  #[serde(default)]
  pub edges: Vec<EdgeDef>,
}

fn enabled() -> bool {
  true
}

impl FlowDef {
  pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
    Self {
      id: id.into(),
      name: name.into(),
      organization_id: None,
      trigger: TriggerDef::default(),
      definition: Definition::default(),
      is_enabled: true,
    }
  }

  pub fn with_node(mut self, node: NodeDef) -> Self {
    self.definition.nodes.push(node);
    self
  }

  pub fn with_edge(mut self, edge: EdgeDef) -> Self {
    self.definition.edges.push(edge);
    self
  }

  pub fn nodes(&self) -> &[NodeDef] {
    &self.definition.nodes
  }

  pub fn edges(&self) -> &[EdgeDef] {
    &self.definition.edges
  }
}

#[cfg(test)]
mod tests {
  use serde_json::json;

  use super::*;
  use crate::{NodeKind, TriggerType};

  #[test]
  fn test_parse_flow_document() {
    let flow: FlowDef = serde_json::from_value(json!({
      "id": "flow-1",
      "name": "Quote lead",
      "trigger": { "type": "manual_lead_action", "config": {} },
      "definition": {
        "nodes": [
          { "id": "start", "kind": "trigger", "position": { "x": 0, "y": 0 } },
          {
            "id": "quote",
            "kind": "api_call",
            "timeoutMs": 500,
            "config": { "connectionId": "crm", "method": "POST", "url": "/quotes" }
          }
        ],
        "edges": [{ "id": "e1", "source": "start", "target": "quote" }]
      }
    }))
    .unwrap();

    assert!(flow.is_enabled);
    assert_eq!(flow.trigger.trigger_type, TriggerType::ManualLeadAction);
    assert_eq!(flow.nodes().len(), 2);
    assert_eq!(flow.nodes()[1].kind, NodeKind::ApiCall);
    assert_eq!(flow.nodes()[1].timeout_ms, Some(500));
    assert_eq!(flow.edges()[0].target, "quote");
  }

  #[test]
  fn test_disabled_flow_round_trips_flag() {
    let flow: FlowDef = serde_json::from_value(json!({
      "id": "f",
      "name": "off",
      "definition": { "nodes": [], "edges": [] },
      "isEnabled": false
    }))
    .unwrap();

    assert!(!flow.is_enabled);
    assert_eq!(serde_json::to_value(&flow).unwrap()["isEnabled"], false);
  }
}
