use serde::{Deserialize, Serialize};

/// How a flow gets started.
///
/// The engine itself only cares that a payload arrives; the type is kept so
/// callers (and stored execution records) know where the payload came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerType {
  ManualLeadAction,
  Schedule,
  Webhook,
  Event,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggerDef {
  #[serde(rename = "type")]
  pub trigger_type: TriggerType,
  #[serde(default)]
  pub config: serde_json::Value,
}

impl Default for TriggerDef {
  fn default() -> Self {
    Self {
      trigger_type: TriggerType::ManualLeadAction,
      config: serde_json::Value::Null,
    }
  }
}
