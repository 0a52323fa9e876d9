//! Typed step configuration.
//!
//! A node's raw `config` is resolved against the execution context first
//! (placeholders substituted), then parsed into a [`StepConfig`] matching the
//! node's kind. Parsing after resolution is what lets a placeholder stand in
//! for a number, an object or an array.
//!
//! ```json
//! {
//!   "connectionId": "crm",
//!   "method": "POST",
//!   "url": "/quotes",
//!   "headers": { "X-Lead": "{{trigger.input.leadId}}" },
//!   "body": { "price": "{{step_pricing.total}}" }
//! }
//! ```

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::node::NodeKind;

/// Resolved configuration of one step, one variant per [`NodeKind`].
#[derive(Debug, Clone, PartialEq)]
pub enum StepConfig {
  Trigger,
  ApiCall(ApiCallConfig),
  DataTransform(DataTransformConfig),
}

impl StepConfig {
  /// Parse an already-resolved config for the given node kind.
  ///
  /// A `null` config is treated as an empty object, so kinds with all-default
  /// fields can omit `config` entirely.
  pub fn parse(kind: NodeKind, config: serde_json::Value) -> Result<Self, serde_json::Error> {
    let config = match config {
      serde_json::Value::Null => serde_json::Value::Object(serde_json::Map::new()),
      other => other,
    };

    match kind {
      NodeKind::Trigger => Ok(StepConfig::Trigger),
      NodeKind::ApiCall => serde_json::from_value(config).map(StepConfig::ApiCall),
      NodeKind::DataTransform => serde_json::from_value(config).map(StepConfig::DataTransform),
    }
  }
}

/// Outbound HTTP call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiCallConfig {
  /// Connection supplying base URL, default headers and auth material.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub connection_id: Option<String>,
  #[serde(default = "default_method")]
  pub method: String,
  /// Absolute URL, or a path joined onto the connection's base URL.
  pub url: String,
  /// Header values are stringified when they resolved to non-strings.
  #[serde(default)]
  pub headers: BTreeMap<String, serde_json::Value>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub body: Option<serde_json::Value>,
  /// Request timeout. Falls back to the node timeout.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub timeout_ms: Option<u64>,
}

fn default_method() -> String {
  "GET".to_string()
}

/// Reshapes data from earlier steps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataTransformConfig {
  pub transformations: Vec<Transformation>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Transformation {
  /// Copy values out of `source` into a new object.
  Map {
    /// Context path of the value to read, e.g. `step_fetch.data`.
    source: String,
    /// Extra context name the output is published under.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    target: Option<String>,
    /// Output key to path inside `source`, e.g. `"price": "resumen.precio[0]"`.
    mapping: BTreeMap<String, String>,
  },
}

impl Transformation {
  pub fn target(&self) -> Option<&str> {
    match self {
      Transformation::Map { target, .. } => target.as_deref(),
    }
  }
}

#[cfg(test)]
mod tests {
  use serde_json::json;

  use super::*;

  #[test]
  fn test_parse_api_call_defaults() {
    let step = StepConfig::parse(NodeKind::ApiCall, json!({ "url": "https://example.com" })).unwrap();

    let StepConfig::ApiCall(config) = step else {
      panic!("expected api_call config");
    };
    assert_eq!(config.method, "GET");
    assert!(config.headers.is_empty());
    assert_eq!(config.connection_id, None);
    assert_eq!(config.body, None);
  }

  #[test]
  fn test_parse_trigger_ignores_config() {
    assert_eq!(
      StepConfig::parse(NodeKind::Trigger, json!({ "anything": 1 })).unwrap(),
      StepConfig::Trigger
    );
    assert_eq!(
      StepConfig::parse(NodeKind::Trigger, serde_json::Value::Null).unwrap(),
      StepConfig::Trigger
    );
  }

  #[test]
  fn test_parse_transform() {
    let step = StepConfig::parse(
      NodeKind::DataTransform,
      json!({
        "transformations": [{
          "type": "map",
          "source": "step_fetch",
          "target": "lead",
          "mapping": { "title": "name" }
        }]
      }),
    )
    .unwrap();

    let StepConfig::DataTransform(config) = step else {
      panic!("expected data_transform config");
    };
    assert_eq!(config.transformations.len(), 1);
    assert_eq!(config.transformations[0].target(), Some("lead"));
  }

  #[test]
  fn test_parse_rejects_non_string_url() {
    let result = StepConfig::parse(NodeKind::ApiCall, json!({ "url": 42 }));
    assert!(result.is_err());
  }
}
