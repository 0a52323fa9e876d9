//! Run lifecycle events.
//!
//! Every node state transition is reported to an [`ExecutionNotifier`] so
//! embedders can stream progress, persist intermediate state or drive a UI.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::record::{NodeError, RunStatus, SkipReason};

/// Events emitted while a run progresses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ExecutionEvent {
  RunStarted {
    execution_id: String,
    flow_id: String,
  },

  /// A node left `pending` and is running.
  NodeStarted {
    execution_id: String,
    node_id: String,
  },

  NodeSucceeded {
    execution_id: String,
    node_id: String,
    output: serde_json::Value,
  },

  NodeFailed {
    execution_id: String,
    node_id: String,
    error: NodeError,
  },

  NodeSkipped {
    execution_id: String,
    node_id: String,
    reason: SkipReason,
  },

  /// The record is final.
  RunFinished {
    execution_id: String,
    status: RunStatus,
  },
}

/// Receives execution events.
///
/// Called inline by the engine, so implementations should hand events off
/// rather than block.
pub trait ExecutionNotifier: Send + Sync {
  fn notify(&self, event: ExecutionEvent);
}

/// Discards every event.
#[derive(Debug, Clone, Default)]
pub struct NoopNotifier;

impl ExecutionNotifier for NoopNotifier {
  fn notify(&self, _event: ExecutionEvent) {}
}

/// Forwards events to an unbounded channel.
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
  sender: mpsc::UnboundedSender<ExecutionEvent>,
}

impl ChannelNotifier {
  pub fn new(sender: mpsc::UnboundedSender<ExecutionEvent>) -> Self {
    Self { sender }
  }

  /// A notifier and the receiving end of its channel.
  pub fn channel() -> (Self, mpsc::UnboundedReceiver<ExecutionEvent>) {
    let (sender, receiver) = mpsc::unbounded_channel();
    (Self::new(sender), receiver)
  }
}

impl ExecutionNotifier for ChannelNotifier {
  fn notify(&self, event: ExecutionEvent) {
    // Receiver may have been dropped.
    let _ = self.sender.send(event);
  }
}
