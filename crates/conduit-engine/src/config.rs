//! Engine configuration.

use std::time::Duration;

use conduit_config::NodeDef;
use serde::{Deserialize, Serialize};

/// Default number of nodes that may run at once within a run.
pub const DEFAULT_MAX_CONCURRENCY: usize = 4;

/// Default per-node timeout in milliseconds.
pub const DEFAULT_NODE_TIMEOUT_MS: u64 = 30_000;

/// Configuration for the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EngineConfig {
  /// Size of the worker pool shared by the nodes of one run.
  pub max_concurrency: usize,
  /// Timeout applied to nodes that do not set their own `timeoutMs`.
  pub node_timeout_ms: u64,
  /// Wall-clock limit for a whole run. Unlimited when `None`.
  pub run_timeout_ms: Option<u64>,
}

impl Default for EngineConfig {
  fn default() -> Self {
    Self {
      max_concurrency: DEFAULT_MAX_CONCURRENCY,
      node_timeout_ms: DEFAULT_NODE_TIMEOUT_MS,
      run_timeout_ms: None,
    }
  }
}

impl EngineConfig {
  /// Pool size, never zero.
  pub fn concurrency(&self) -> usize {
    self.max_concurrency.max(1)
  }

  /// The timeout for `node` in milliseconds: its own, else the default.
  pub fn node_timeout_ms(&self, node: &NodeDef) -> u64 {
    node.timeout_ms.unwrap_or(self.node_timeout_ms)
  }

  pub fn run_timeout(&self) -> Option<Duration> {
    self.run_timeout_ms.map(Duration::from_millis)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_node_timeout_override() {
    let config = EngineConfig::default();
    let plain = NodeDef::trigger("start");
    let bounded = NodeDef::trigger("start").with_timeout_ms(250);

    assert_eq!(config.node_timeout_ms(&plain), DEFAULT_NODE_TIMEOUT_MS);
    assert_eq!(config.node_timeout_ms(&bounded), 250);
  }

  #[test]
  fn test_partial_config_uses_defaults() {
    let config: EngineConfig = serde_json::from_str(r#"{ "runTimeoutMs": 1000 }"#).unwrap();

    assert_eq!(config.max_concurrency, DEFAULT_MAX_CONCURRENCY);
    assert_eq!(config.run_timeout(), Some(Duration::from_secs(1)));
  }

  #[test]
  fn test_zero_concurrency_is_clamped() {
    let config = EngineConfig {
      max_concurrency: 0,
      ..EngineConfig::default()
    };
    assert_eq!(config.concurrency(), 1);
  }
}
