//! Step executors, one per node kind.
//!
//! Executors receive fully resolved configuration. Only `api_call` suspends;
//! `trigger` and `data_transform` are computation only.

mod api_call;
mod transform;

pub use api_call::ApiCallExecutor;
pub use transform::transform;

/// What a successful step produces.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct StepOutput {
  pub value: serde_json::Value,
  /// Non-fatal anomalies worth surfacing in the record.
  pub warnings: Vec<String>,
  /// Extra context names to publish (part of) the value under.
  pub aliases: Vec<(String, serde_json::Value)>,
}

impl StepOutput {
  pub fn new(value: serde_json::Value) -> Self {
    Self {
      value,
      ..Self::default()
    }
  }
}

/// The trigger passes the run payload through unchanged.
pub fn trigger(payload: &serde_json::Value) -> StepOutput {
  StepOutput::new(payload.clone())
}
