//! Conduit Workflow
//!
//! This crate provides the "locked" flow representation for conduit. A locked
//! workflow is a structurally validated snapshot of a [`FlowDef`] that is
//! ready for execution.
//!
//! Key differences from `conduit-config`:
//! - Edges reference existing nodes, node ids are unique
//! - Exactly one trigger node acts as the entry
//! - The graph is acyclic
//! - Nodes unreachable from the entry are identified
//! - Execution layers (dependency depth) are computed once, with declaration
//!   order as the tie-break
//!
//! [`FlowDef`]: conduit_config::FlowDef

mod error;
mod graph;
mod workflow;

pub use error::ValidationError;
pub use graph::Graph;
pub use workflow::Workflow;
