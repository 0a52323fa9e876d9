//! Conduit Config
//!
//! This crate contains the serializable flow definitions for conduit. These
//! types describe a flow as an editor or a flow store hands it over, before
//! the graph is validated and locked by `conduit-workflow`.
//!
//! Flows can be loaded from:
//! - JSON files (via the CLI, `conduit run flow flow.json`)
//! - a flow store (as JSON documents)
//!
//! Node configuration is kept as raw JSON. Strings inside it may contain
//! `{{path}}` placeholders, so it can only be parsed into typed step
//! configuration ([`StepConfig`]) after template resolution at run time.

mod edge;
mod flow;
mod node;
mod step;
mod trigger;

pub use edge::EdgeDef;
pub use flow::{Definition, FlowDef};
pub use node::{NodeDef, NodeKind};
pub use step::{ApiCallConfig, DataTransformConfig, StepConfig, Transformation};
pub use trigger::{TriggerDef, TriggerType};
