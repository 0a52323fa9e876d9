//! Conduit Engine
//!
//! Runs flows: validates the graph, resolves each node's config against the
//! execution context, dispatches to the step executor for its kind and
//! produces an [`ExecutionResult`].
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use conduit_config::FlowDef;
//! use conduit_connection::MemoryConnections;
//! use conduit_engine::Engine;
//! use conduit_http::ReqwestClient;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example(flow: FlowDef) -> Result<(), conduit_engine::EngineError> {
//! let engine = Engine::new(
//!   Arc::new(MemoryConnections::new()),
//!   Arc::new(ReqwestClient::default()),
//! );
//! let result = engine
//!   .run(&flow, serde_json::json!({ "leadName": "Acme" }), CancellationToken::new())
//!   .await?;
//! println!("{:?}", result.status);
//! # Ok(())
//! # }
//! ```

mod config;
mod connections;
mod context;
mod engine;
mod error;
mod events;
mod executor;
mod record;

pub use config::{DEFAULT_MAX_CONCURRENCY, DEFAULT_NODE_TIMEOUT_MS, EngineConfig};
pub use context::{ExecutionContext, NodeScope, step_key};
pub use engine::Engine;
pub use error::{EngineError, StepError};
pub use events::{ChannelNotifier, ExecutionEvent, ExecutionNotifier, NoopNotifier};
pub use executor::{StepOutput, transform};
pub use record::{ErrorKind, ExecutionResult, NodeError, NodeOutcome, RunStatus, SkipReason};
