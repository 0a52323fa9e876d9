use serde::{Deserialize, Serialize};

/// The closed set of step kinds the engine knows how to execute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
  Trigger,
  ApiCall,
  DataTransform,
}

impl NodeKind {
  pub fn as_str(&self) -> &'static str {
    match self {
      NodeKind::Trigger => "trigger",
      NodeKind::ApiCall => "api_call",
      NodeKind::DataTransform => "data_transform",
    }
  }
}

impl std::fmt::Display for NodeKind {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str(self.as_str())
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeDef {
  pub id: String,
  pub kind: NodeKind,
  /// Kind-specific configuration, possibly containing `{{path}}` placeholders.
  #[serde(default)]
  pub config: serde_json::Value,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub timeout_ms: Option<u64>,
  /// Canvas position. Presentation only, never read by the engine.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub position: Option<serde_json::Value>,
}

impl NodeDef {
  pub fn new(id: impl Into<String>, kind: NodeKind, config: serde_json::Value) -> Self {
    Self {
      id: id.into(),
      kind,
      config,
      timeout_ms: None,
      position: None,
    }
  }

  pub fn trigger(id: impl Into<String>) -> Self {
    Self::new(id, NodeKind::Trigger, serde_json::Value::Null)
  }

  pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
    self.timeout_ms = Some(timeout_ms);
    self
  }
}
